//! 场景数据读取
//!
//! JSON scene: `reconstruction.json` (cameras and posed frames),
//! `features.json` (keypoints per frame) and `matches.json` (raw pairs).
mod json_scene;

pub use json_scene::JsonScene;

use crate::error::Result;
use crate::preprocess::SceneInput;

pub type DefaultDataset = JsonScene;

pub trait SceneReader {
    /// 读取相机、位姿、特征点与匹配
    fn read_scene(&self) -> Result<SceneInput>;
}
