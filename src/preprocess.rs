//! 预处理
//!
//! Joins the posed reconstruction with the feature input, lays the frames out
//! densely, validates the raw matches, filters the pairs and builds the map.

use std::collections::{BTreeMap, HashMap};

use nalgebra::Point2;

use crate::camera::PinholeCamera;
use crate::config::TriangulationOptions;
use crate::error::{Result, SfmError};
use crate::global_types::{CameraId, FrameId, Match, Pose};
use crate::map::{Frame, FramePair, Map};
use crate::pair_filter::PairFilter;

/// A frame of an existing reconstruction.
#[derive(Debug, Clone)]
pub struct PosedFrame {
    pub id: FrameId,
    pub name: String,
    pub camera_id: CameraId,
    pub tcw: Pose,
}

/// Keypoints extracted from one image.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub id: FrameId,
    pub name: String,
    pub keypoints: Vec<Point2<f64>>,
}

/// Unfiltered matches of a frame pair.
#[derive(Debug, Clone)]
pub struct RawPair {
    pub id1: FrameId,
    pub id2: FrameId,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Default)]
pub struct SceneInput {
    pub cameras: Vec<PinholeCamera>,
    pub posed_frames: Vec<PosedFrame>,
    pub feature_frames: Vec<FeatureFrame>,
    pub pairs: Vec<RawPair>,
}

pub fn build_map(input: SceneInput, options: &TriangulationOptions) -> Result<Map> {
    let SceneInput {
        cameras,
        posed_frames,
        feature_frames,
        pairs,
    } = input;
    log::info!(
        "frame number(reconstruction): {} frame number(matching): {}",
        posed_frames.len(),
        feature_frames.len()
    );

    let frames = join_frames(&cameras, posed_frames, feature_frames)?;
    let pairs = pairs
        .into_iter()
        .map(|pair| {
            validate_raw_pair(&frames, &pair)?;
            Ok(FramePair::new(pair.id1, pair.id2, pair.matches))
        })
        .collect::<Result<Vec<_>>>()?;

    let pairs = PairFilter::from_options(options).filter_all(pairs, &frames);
    Map::new(frames, cameras, pairs)
}

/// Frames `0..=max feature id`; ids without features become unregistered
/// placeholders.
fn join_frames(
    cameras: &[PinholeCamera],
    posed_frames: Vec<PosedFrame>,
    feature_frames: Vec<FeatureFrame>,
) -> Result<Vec<Frame>> {
    let posed: HashMap<FrameId, PosedFrame> = posed_frames
        .into_iter()
        .map(|frame| (frame.id, frame))
        .collect();

    let mut features: BTreeMap<FrameId, FeatureFrame> = BTreeMap::new();
    for frame in feature_frames {
        let Some(pose) = posed.get(&frame.id) else {
            return Err(SfmError::MissingFrame(frame.id));
        };
        if pose.name != frame.name {
            return Err(SfmError::InconsistentFrameName {
                id: frame.id,
                reconstruction: pose.name.clone(),
                features: frame.name,
            });
        }
        if !cameras.iter().any(|camera| camera.id == pose.camera_id) {
            return Err(SfmError::MissingCamera {
                frame_id: frame.id,
                camera_id: pose.camera_id,
            });
        }
        if features.insert(frame.id, frame).is_some() {
            log::warn!("duplicate feature frame, keeping the last one");
        }
    }

    let num_frames = features.keys().next_back().map_or(0, |max_id| max_id + 1);
    let mut frames = Vec::with_capacity(num_frames);
    for id in 0..num_frames {
        let frame = match (features.remove(&id), posed.get(&id)) {
            (Some(feature), Some(pose)) => {
                Frame::new(id, feature.name, pose.camera_id, pose.tcw, feature.keypoints)
            }
            _ => Frame::placeholder(id),
        };
        frames.push(frame);
    }
    Ok(frames)
}

fn validate_raw_pair(frames: &[Frame], pair: &RawPair) -> Result<()> {
    let invalid = |reason: String| SfmError::InvalidMatch {
        id1: pair.id1,
        id2: pair.id2,
        reason,
    };
    if pair.id1 == pair.id2 {
        return Err(invalid("pair of a frame with itself".to_string()));
    }
    let frame1 = frames
        .get(pair.id1)
        .ok_or_else(|| invalid(format!("unknown frame {}", pair.id1)))?;
    let frame2 = frames
        .get(pair.id2)
        .ok_or_else(|| invalid(format!("unknown frame {}", pair.id2)))?;
    if let Some(m) = pair
        .matches
        .iter()
        .find(|m| m.idx1 >= frame1.num_keypoints() || m.idx2 >= frame2.num_keypoints())
    {
        return Err(invalid(format!("keypoint index out of range in {:?}", m)));
    }
    Ok(())
}
