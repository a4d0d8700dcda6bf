//! 结果保存
//!
//! CSV tables of the refined reconstruction: `points3D.csv`, `images.csv`
//! and `tracks.csv`.
mod records;

pub use records::{ImageRow, PointRow, TrackRow};

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::map::Map;

pub const POINTS_FILE: &str = "points3D.csv";
pub const IMAGES_FILE: &str = "images.csv";
pub const TRACKS_FILE: &str = "tracks.csv";

/// Writes the three tables into `output_dir`, creating it when missing.
pub fn save_reconstruction(map: &Map, output_dir: impl AsRef<Path>) -> Result<()> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let points = PointRow::collect(map);
    let images = ImageRow::collect(map);
    let tracks = TrackRow::collect(map);
    write_rows(&output_dir.join(POINTS_FILE), &points)?;
    write_rows(&output_dir.join(IMAGES_FILE), &images)?;
    write_rows(&output_dir.join(TRACKS_FILE), &tracks)?;
    log::info!(
        "saved {} points, {} images, {} observations to {:?}",
        points.len(),
        images.len(),
        tracks.len(),
        output_dir
    );
    Ok(())
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_types::Observation;
    use crate::test_scene::TestScene;

    #[test]
    fn test_save_reconstruction() {
        let scene = TestScene::line_of_frames(3, 4);
        let mut map = scene.map_with_full_matches();
        for k in 0..3 {
            map.create_track(scene.points[k], &[Observation::new(0, k), Observation::new(2, k)])
                .unwrap();
        }
        map.retire_track(2);

        let output_dir = std::env::temp_dir().join(format!("sfm_tri_save_{}", std::process::id()));
        save_reconstruction(&map, &output_dir).unwrap();

        let mut reader = csv::Reader::from_path(output_dir.join(POINTS_FILE)).unwrap();
        let points: Vec<PointRow> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].id, 1);
        assert_eq!(points[1].num_observations, 2);
        assert!(points[1].mean_reprojection_error < 1e-9);

        let mut reader = csv::Reader::from_path(output_dir.join(IMAGES_FILE)).unwrap();
        let images: Vec<ImageRow> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[2].name, "000002.png");
        assert!((images[2].tx + 2.0).abs() < 1e-12);

        let mut reader = csv::Reader::from_path(output_dir.join(TRACKS_FILE)).unwrap();
        let tracks: Vec<TrackRow> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(tracks.len(), 4);
        assert!(tracks.iter().all(|row| row.track_id < 2));

        std::fs::remove_dir_all(&output_dir).unwrap();
    }
}
