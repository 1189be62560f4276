use std::path::{Path, PathBuf};

use macroquad::input::KeyCode;

use crate::{
    model_download::ModelKind,
    pipeline::{TrackerConfig, landmarks::HandsConfig},
    types::HandLandmark,
};

const MODEL_DIR: &str = "models";

/// Locations of the two ONNX networks the landmark provider loads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPaths {
    pub palm_detector: PathBuf,
    pub handpose_estimator: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            palm_detector: dir.join(ModelKind::PalmDetector.file_name()),
            handpose_estimator: dir.join(ModelKind::HandposeEstimator.file_name()),
        }
    }

    pub fn path(&self, kind: ModelKind) -> &Path {
        match kind {
            ModelKind::PalmDetector => &self.palm_detector,
            ModelKind::HandposeEstimator => &self.handpose_estimator,
        }
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self::in_dir(Path::new(MODEL_DIR))
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub camera_index: u32,
    pub window_title: String,
    pub window_width: i32,
    pub window_height: i32,
    pub quit_key: KeyCode,
    /// Which detected hand `locate_landmarks` reports on.
    pub hand_index: usize,
    pub draw_overlay: bool,
    /// Landmark whose pixel position is logged every frame a hand is visible.
    pub diagnostic_landmark: Option<HandLandmark>,
    pub hands: HandsConfig,
    pub models: ModelPaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            window_title: "Image".to_string(),
            window_width: 640,
            window_height: 480,
            quit_key: KeyCode::Q,
            hand_index: 0,
            draw_overlay: true,
            diagnostic_landmark: Some(HandLandmark::ThumbTip),
            hands: HandsConfig::default(),
            models: ModelPaths::default(),
        }
    }
}

impl AppConfig {
    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            hand_index: self.hand_index,
            draw_overlay: self.draw_overlay,
            diagnostic_landmark: self.diagnostic_landmark,
        }
    }
}
