pub mod common;
pub mod ort;
pub mod palm;

use thiserror::Error;

use crate::types::{ChannelOrder, Frame, HandInstance};

pub use self::ort::OrtHandLandmarker;

/// Settings handed to the landmark provider on every call.
#[derive(Clone, Debug, PartialEq)]
pub struct HandsConfig {
    /// Treat every frame as an unrelated still image. When off, hands found in
    /// one frame seed the search in the next.
    pub static_image_mode: bool,
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            static_image_mode: false,
            max_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_hands must be at least 1")]
    NoHands,
    #[error("{name} must be within [0, 1], got {value}")]
    ConfidenceOutOfRange { name: &'static str, value: f32 },
}

impl HandsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hands == 0 {
            return Err(ConfigError::NoHands);
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ConfidenceOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// A hand landmark model. Given one frame it returns every hand it finds, each
/// as landmarks in normalized frame coordinates.
pub trait LandmarkProvider {
    /// Channel order the provider expects its input frames in.
    fn input_order(&self) -> ChannelOrder {
        ChannelOrder::Rgba
    }

    fn detect(&mut self, frame: &Frame, config: &HandsConfig) -> anyhow::Result<Vec<HandInstance>>;
}
