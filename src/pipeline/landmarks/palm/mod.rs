mod anchors;

use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::types::Frame;

use super::common::{CropRegion, LetterboxInfo, PALM_INPUT_SIZE, prepare_frame_with_size};

const PALM_KEYPOINTS: usize = 7;
/// Palm crops are enlarged so the fingers fit inside.
const PALM_CROP_SCALE: f32 = 2.6;
/// Crop center is pushed this far (in palm sizes) from the palm towards the fingers.
const PALM_CROP_SHIFT: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

/// A detected palm in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

impl PalmRegion {
    /// Rotated crop covering the whole hand. Keypoint 0 is the wrist center and
    /// keypoint 2 the middle finger base.
    pub fn crop(&self) -> CropRegion {
        let [x1, y1, x2, y2] = self.bbox;
        let box_center = ((x1 + x2) * 0.5, (y1 + y2) * 0.5);
        let size = (x2 - x1).abs().max((y2 - y1).abs());

        let angle = match (self.keypoints.first(), self.keypoints.get(2)) {
            (Some(wrist), Some(middle)) => {
                PI * 0.5 - (-(middle.1 - wrist.1)).atan2(middle.0 - wrist.0)
            }
            _ => 0.0,
        };

        // Shift "up" in crop space, then rotate into the frame.
        let (sin, cos) = angle.sin_cos();
        let shift = -size * PALM_CROP_SHIFT;
        let center = (box_center.0 - shift * sin, box_center.1 + shift * cos);

        CropRegion {
            center,
            side: size * PALM_CROP_SCALE,
            angle,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    cfg: PalmDetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: anchors::generate(),
            cfg,
        })
    }

    /// Returns palms scoring at least `score_threshold`, best first.
    pub fn detect(&mut self, frame: &Frame, score_threshold: f32) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_frame_with_size(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let box_and_keypoints = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;

        let raw = RawPalmOutput {
            boxes: box_and_keypoints
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            box_shape: box_and_keypoints.shape(),
            scores: scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            score_shape: scores.shape(),
        };

        decode_palm_outputs(&raw, &self.anchors, &letterbox, score_threshold, &self.cfg)
    }
}

struct RawPalmOutput<'a> {
    boxes: &'a [f32],
    box_shape: &'a [usize],
    scores: &'a [f32],
    score_shape: &'a [usize],
}

fn trailing_dims(shape: &[usize], what: &str) -> Result<(usize, usize)> {
    match shape {
        [.., anchors, features] if shape.len() >= 3 => Ok((*anchors, *features)),
        _ => Err(anyhow!(
            "unexpected palm {what} shape {shape:?}, need [batch, anchors, features]"
        )),
    }
}

fn decode_palm_outputs(
    raw: &RawPalmOutput<'_>,
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    score_threshold: f32,
    cfg: &PalmDetectorConfig,
) -> Result<Vec<PalmRegion>> {
    let (anchor_dim, feature_dim) = trailing_dims(raw.box_shape, "box")?;
    let (score_anchor_dim, score_feature_dim) = trailing_dims(raw.score_shape, "score")?;

    if feature_dim < 4 + PALM_KEYPOINTS * 2 {
        return Err(anyhow!(
            "palm box feature dimension too small: {feature_dim}"
        ));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }

    let count = anchors.len().min(anchor_dim);
    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let input = PALM_INPUT_SIZE as f32;

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().take(count).enumerate() {
        let raw_score = *raw
            .scores
            .get(idx * score_feature_dim)
            .ok_or_else(|| anyhow!("missing score for palm anchor {idx}"))?;
        let score = sigmoid(raw_score);
        if score < score_threshold {
            continue;
        }

        let features = raw
            .boxes
            .get(idx * feature_dim..idx * feature_dim + 4 + PALM_KEYPOINTS * 2)
            .ok_or_else(|| anyhow!("missing regressors for palm anchor {idx}"))?;

        let to_frame = |nx: f32, ny: f32| (nx * scale - pad_bias_x, ny * scale - pad_bias_y);

        let cx = features[0] / input + anchor[0];
        let cy = features[1] / input + anchor[1];
        let hw = features[2] / input / 2.0;
        let hh = features[3] / input / 2.0;

        let (mut x1, mut y1) = to_frame(cx - hw, cy - hh);
        let (mut x2, mut y2) = to_frame(cx + hw, cy + hh);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        clamp_box(
            &mut x1,
            &mut y1,
            &mut x2,
            &mut y2,
            letterbox.orig_w,
            letterbox.orig_h,
        );

        let keypoints = features[4..]
            .chunks_exact(2)
            .map(|kp| to_frame(kp[0] / input + anchor[0], kp[1] / input + anchor[1]))
            .collect();

        candidates.push(PalmRegion {
            bbox: [x1, y1, x2, y2],
            keypoints,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.top_k);
    Ok(kept
        .into_iter()
        .filter_map(|idx| candidates.get(idx).cloned())
        .collect())
}

/// Indices of the boxes surviving greedy non-maximum suppression, best first.
fn nms(candidates: &[PalmRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        for &k in &keep {
            if iou(&candidates[idx].bbox, &candidates[k].bbox) >= threshold {
                continue 'outer;
            }
        }
        keep.push(idx);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(x1: &mut f32, y1: &mut f32, x2: &mut f32, y2: &mut f32, w: u32, h: u32) {
    let max_w = (w.saturating_sub(1)) as f32;
    let max_h = (h.saturating_sub(1)) as f32;
    *x1 = x1.clamp(0.0, max_w);
    *y1 = y1.clamp(0.0, max_h);
    *x2 = x2.clamp(0.0, max_w);
    *y2 = y2.clamp(0.0, max_h);
}
