use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use nalgebra::{Isometry3, Point2, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

use super::SceneReader;
use crate::camera::{PinholeCamera, PinholeParameters};
use crate::config::RunConfig;
use crate::error::Result;
use crate::global_types::{CameraId, FrameId, Match};
use crate::preprocess::{FeatureFrame, PosedFrame, RawPair, SceneInput};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CameraRecord {
    pub id: CameraId,
    #[serde(flatten)]
    pub parameters: PinholeParameters,
}

/// World→camera pose as in COLMAP's `images` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ImageRecord {
    pub id: FrameId,
    pub name: String,
    pub camera_id: CameraId,
    /// `[w, x, y, z]`
    pub qvec: [f64; 4],
    pub tvec: [f64; 3],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ReconstructionFile {
    pub cameras: Vec<CameraRecord>,
    pub frames: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FeatureRecord {
    pub id: FrameId,
    pub name: String,
    pub keypoints: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct FeatureFile {
    pub frames: Vec<FeatureRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PairRecord {
    pub id1: FrameId,
    pub id2: FrameId,
    pub matches: Vec<[usize; 2]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct MatchFile {
    pub pairs: Vec<PairRecord>,
}

#[derive(Debug, Clone)]
pub struct JsonScene {
    pub reconstruction_path: PathBuf,
    pub feature_path: PathBuf,
    pub matches_path: PathBuf,
}

impl JsonScene {
    pub fn new(
        reconstruction_path: impl Into<PathBuf>,
        feature_path: impl Into<PathBuf>,
        matches_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reconstruction_path: reconstruction_path.into(),
            feature_path: feature_path.into(),
            matches_path: matches_path.into(),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            &config.reconstruction_path,
            &config.feature_path,
            &config.matches_path,
        )
    }

    fn open(path: &Path) -> Result<BufReader<File>> {
        log::info!("read {:?}", path);
        Ok(BufReader::new(File::open(path)?))
    }
}

impl SceneReader for JsonScene {
    fn read_scene(&self) -> Result<SceneInput> {
        let reconstruction = Self::open(&self.reconstruction_path)?;
        let features = Self::open(&self.feature_path)?;
        let matches = Self::open(&self.matches_path)?;
        parse_scene(reconstruction, features, matches)
    }
}

pub(crate) fn parse_scene<R1: Read, R2: Read, R3: Read>(
    reconstruction: R1,
    features: R2,
    matches: R3,
) -> Result<SceneInput> {
    let reconstruction: ReconstructionFile = serde_json::from_reader(reconstruction)?;
    let features: FeatureFile = serde_json::from_reader(features)?;
    let matches: MatchFile = serde_json::from_reader(matches)?;

    let cameras = reconstruction
        .cameras
        .into_iter()
        .map(|record| PinholeCamera::new(record.id, record.parameters))
        .collect();
    let posed_frames = reconstruction
        .frames
        .into_iter()
        .map(|record| {
            let [w, x, y, z] = record.qvec;
            let [tx, ty, tz] = record.tvec;
            PosedFrame {
                id: record.id,
                name: record.name,
                camera_id: record.camera_id,
                tcw: Isometry3::from_parts(
                    Translation3::new(tx, ty, tz),
                    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)),
                ),
            }
        })
        .collect();
    let feature_frames = features
        .frames
        .into_iter()
        .map(|record| FeatureFrame {
            id: record.id,
            name: record.name,
            keypoints: record
                .keypoints
                .iter()
                .map(|[u, v]| Point2::new(*u, *v))
                .collect(),
        })
        .collect();
    let pairs = matches
        .pairs
        .into_iter()
        .map(|record| RawPair {
            id1: record.id1,
            id2: record.id2,
            matches: record
                .matches
                .iter()
                .map(|[idx1, idx2]| Match::new(*idx1, *idx2))
                .collect(),
        })
        .collect();

    Ok(SceneInput {
        cameras,
        posed_frames,
        feature_frames,
        pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SfmError;
    use nalgebra::Vector3;

    const RECONSTRUCTION: &str = r#"{
        "cameras": [
            { "id": 1, "fx": 500.0, "fy": 500.0, "cx": 320.0, "cy": 240.0, "k1": -0.1 }
        ],
        "frames": [
            { "id": 0, "name": "a.png", "camera_id": 1, "qvec": [1, 0, 0, 0], "tvec": [0, 0, 0] },
            { "id": 2, "name": "c.png", "camera_id": 1,
              "qvec": [0.7071067811865476, 0, 0.7071067811865476, 0], "tvec": [-1, 0, 0.5] }
        ]
    }"#;
    const FEATURES: &str = r#"{
        "frames": [
            { "id": 0, "name": "a.png", "keypoints": [[10.5, 20.0], [30.0, 40.0]] },
            { "id": 2, "name": "c.png", "keypoints": [[11.0, 21.0]] }
        ]
    }"#;
    const MATCHES: &str = r#"{ "pairs": [ { "id1": 0, "id2": 2, "matches": [[1, 0]] } ] }"#;

    #[test]
    fn test_parse_scene() {
        let input = parse_scene(RECONSTRUCTION.as_bytes(), FEATURES.as_bytes(), MATCHES.as_bytes()).unwrap();

        assert_eq!(input.cameras.len(), 1);
        let camera = &input.cameras[0];
        assert_eq!(camera.id, 1);
        assert_eq!(camera.intrinsics(), [500.0, 500.0, 320.0, 240.0]);
        assert!(camera.has_distortion);

        assert_eq!(input.posed_frames.len(), 2);
        let frame = &input.posed_frames[1];
        assert_eq!((frame.id, frame.name.as_str(), frame.camera_id), (2, "c.png", 1));
        // 90 degrees about +Y sends +X to -Z
        let rotated = frame.tcw.rotation * Vector3::x();
        assert!((rotated - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-9);
        assert_eq!(frame.tcw.translation.vector, Vector3::new(-1.0, 0.0, 0.5));

        assert_eq!(input.feature_frames[0].keypoints[0], Point2::new(10.5, 20.0));
        assert_eq!(input.pairs[0].matches, vec![Match::new(1, 0)]);
    }

    #[test]
    fn test_malformed_json() {
        let result = parse_scene(RECONSTRUCTION.as_bytes(), "{ \"frames\": 3 }".as_bytes(), MATCHES.as_bytes());
        assert!(matches!(result, Err(SfmError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let scene = JsonScene::new("/nonexistent/reconstruction.json", "f.json", "m.json");
        assert!(matches!(scene.read_scene(), Err(SfmError::Io(_))));
    }
}
