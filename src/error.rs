//! 错误类型
//!
//! Fatal input inconsistencies and engine failures. Dropped pairs, rejected
//! triangulations and rejected merges are not errors.

use crate::global_types::{CameraId, FrameId, TrackId};

#[derive(Debug, thiserror::Error)]
pub enum SfmError {
    /// A frame of the feature input has no counterpart in the reconstruction input.
    #[error("missing corresponding frame id {0} in reconstruction input")]
    MissingFrame(FrameId),

    #[error("inconsistent frame name for id {id}: reconstruction `{reconstruction}`, features `{features}`")]
    InconsistentFrameName {
        id: FrameId,
        reconstruction: String,
        features: String,
    },

    #[error("missing camera {camera_id} referenced by frame {frame_id}")]
    MissingCamera {
        frame_id: FrameId,
        camera_id: CameraId,
    },

    #[error("invalid match between frames {id1} and {id2}: {reason}")]
    InvalidMatch {
        id1: FrameId,
        id2: FrameId,
        reason: String,
    },

    /// Map invariant breach, always a bug in the caller.
    #[error("track {track_id} conflicts with frame {frame_id}: {reason}")]
    TrackConflict {
        track_id: TrackId,
        frame_id: FrameId,
        reason: String,
    },

    #[error("optimization did not converge: {0}")]
    OptimizationDivergence(String),

    /// `frames[index]` carries another id.
    #[error("frame at index {index} has id {id}")]
    FrameIndexMismatch { index: usize, id: FrameId },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SfmError>;
