use std::borrow::Cow;

use thiserror::Error;

use super::{
    landmarks::{HandsConfig, LandmarkProvider},
    overlay::{BBOX_THICKNESS, Canvas, MAGENTA, MARKER_RADIUS},
};
use crate::types::{BoundingBox, Frame, HandInstance, PixelLandmark};

/// Pixels added on every side of the bounding box when it is drawn.
pub const BBOX_MARGIN: i32 = 20;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("hand index {index} out of range: {count} hand(s) detected")]
    HandIndexOutOfRange { index: usize, count: usize },
    #[error("landmark provider failed: {0:#}")]
    Provider(anyhow::Error),
    #[error("invalid hand detector config: {0}")]
    InvalidConfig(String),
}

/// Pixel-space landmarks of one hand and the box enclosing them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandLocation {
    pub landmarks: Vec<PixelLandmark>,
    pub bbox: Option<BoundingBox>,
}

impl HandLocation {
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn landmark(&self, id: usize) -> Option<&PixelLandmark> {
        self.landmarks.iter().find(|lm| lm.id == id)
    }
}

/// Runs a [`LandmarkProvider`] on frames and turns its normalized output into
/// pixel coordinates and overlays.
///
/// The result of the last [`detect_hands`](Self::detect_hands) call is kept
/// until the next one and read by [`locate_landmarks`](Self::locate_landmarks).
pub struct HandDetector<P> {
    provider: P,
    config: HandsConfig,
    last_detection: Vec<HandInstance>,
}

impl<P: LandmarkProvider> HandDetector<P> {
    pub fn new(provider: P, config: HandsConfig) -> Result<Self, DetectorError> {
        config
            .validate()
            .map_err(|err| DetectorError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            provider,
            config,
            last_detection: Vec::new(),
        })
    }

    /// Hands found by the most recent [`detect_hands`](Self::detect_hands).
    pub fn hands(&self) -> &[HandInstance] {
        &self.last_detection
    }

    /// Runs the provider once on `frame` and returns how many hands it found.
    /// With `draw` set, every hand's skeleton is painted onto `frame`.
    pub fn detect_hands(&mut self, frame: &mut Frame, draw: bool) -> Result<usize, DetectorError> {
        let input: Cow<'_, Frame> = if frame.order == self.provider.input_order() {
            Cow::Borrowed(&*frame)
        } else {
            Cow::Owned(frame.to_order(self.provider.input_order()))
        };

        let detected = self.provider.detect(&input, &self.config);
        // Release the borrow of `frame` before drawing on it.
        drop(input);
        self.last_detection = match detected {
            Ok(hands) => hands,
            Err(err) => {
                self.last_detection.clear();
                return Err(DetectorError::Provider(err));
            }
        };

        if draw && !self.last_detection.is_empty() {
            let size = (frame.width, frame.height);
            let mut canvas = Canvas::new(frame);
            for hand in &self.last_detection {
                canvas.draw_hand(&to_pixels(hand, size));
            }
        }

        Ok(self.last_detection.len())
    }

    /// Pixel landmarks and bounding box of hand `hand_index` from the last
    /// detection. Empty when no hands were found (or nothing was detected yet).
    /// With `draw` set, the box grown by [`BBOX_MARGIN`] and a marker on every
    /// landmark are painted onto `frame`.
    pub fn locate_landmarks(
        &self,
        frame: &mut Frame,
        hand_index: usize,
        draw: bool,
    ) -> Result<HandLocation, DetectorError> {
        if self.last_detection.is_empty() {
            return Ok(HandLocation::default());
        }

        let hand = self
            .last_detection
            .get(hand_index)
            .ok_or(DetectorError::HandIndexOutOfRange {
                index: hand_index,
                count: self.last_detection.len(),
            })?;

        let landmarks = to_pixels(hand, (frame.width, frame.height));
        let bbox = BoundingBox::enclosing(&landmarks);

        if draw {
            let mut canvas = Canvas::new(frame);
            if let Some(bbox) = &bbox {
                canvas.draw_rect(&bbox.expanded(BBOX_MARGIN), MAGENTA, BBOX_THICKNESS);
            }
            for lm in &landmarks {
                canvas.fill_circle((lm.x, lm.y), MARKER_RADIUS, MAGENTA);
            }
        }

        Ok(HandLocation { landmarks, bbox })
    }
}

fn to_pixels(hand: &HandInstance, (width, height): (u32, u32)) -> Vec<PixelLandmark> {
    hand.landmarks
        .iter()
        .map(|lm| PixelLandmark::from_normalized(lm, width, height))
        .collect()
}
