use std::cmp::Ordering;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandsConfig, LandmarkProvider,
    common::{self, CropRegion},
    palm::{self, PalmDetector, PalmDetectorConfig, PalmRegion},
};
use crate::{
    config::ModelPaths,
    types::{Frame, HandInstance, Handedness},
};

/// Palm detections overlapping a tracked hand by at least this much are the
/// same hand.
const TRACKING_IOU_THRESHOLD: f32 = 0.3;

/// Where a landmark crop came from; decides which confidence gate applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CropSource {
    Tracked,
    Detected,
}

struct LandmarkEstimate {
    points: Vec<(f32, f32)>,
    presence: f32,
    handedness: f32,
}

/// Two-stage MediaPipe hand pipeline on ONNX Runtime: a palm detector finds
/// hands, a landmark model regresses 21 joints inside a rotated crop. In
/// video mode the previous frame's landmarks replace palm detection for hands
/// that are still in view.
pub struct OrtHandLandmarker {
    handpose: Session,
    palm_detector: PalmDetector,
    tracked: Vec<Vec<(f32, f32)>>,
}

impl OrtHandLandmarker {
    pub fn new(models: &ModelPaths) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&models.handpose_estimator)
            .with_context(|| {
                format!(
                    "failed to load ORT session from {}",
                    models.handpose_estimator.display()
                )
            })?;

        let palm_detector = PalmDetector::new(&models.palm_detector, PalmDetectorConfig::default())?;

        log::info!(
            "handpose ORT backend ready using {} and palm detector {}",
            models.handpose_estimator.display(),
            models.palm_detector.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            tracked: Vec::new(),
        })
    }

    fn estimate(&mut self, frame: &Frame, region: CropRegion) -> Result<LandmarkEstimate> {
        let (input, transform) = common::prepare_rotated_crop(frame, region, common::INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        let scalar_output = |idx: usize| {
            if outputs.len() > idx {
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let presence = scalar_output(1);
        let handedness = scalar_output(2);

        Ok(LandmarkEstimate {
            points: landmarks
                .iter()
                .map(|[x, y, _z]| transform.project(*x, *y))
                .collect(),
            presence,
            handedness,
        })
    }
}

/// Crops to run the landmark model on: tracked hands first, then palms from
/// `detect_palms` that do not overlap them, up to `max_hands`. The palm
/// detector only runs while there is room for another hand.
fn collect_crops<F>(
    tracked: &[Vec<(f32, f32)>],
    config: &HandsConfig,
    detect_palms: F,
) -> Result<Vec<(CropRegion, CropSource)>>
where
    F: FnOnce(f32) -> Result<Vec<PalmRegion>>,
{
    let mut crops: Vec<(CropRegion, CropSource)> = if config.static_image_mode {
        Vec::new()
    } else {
        tracked
            .iter()
            .filter_map(|points| CropRegion::from_landmarks(points))
            .take(config.max_hands)
            .map(|crop| (crop, CropSource::Tracked))
            .collect()
    };
    if crops.len() >= config.max_hands {
        return Ok(crops);
    }

    let palms = detect_palms(config.min_detection_confidence).context("palm detection failed")?;
    log::debug!("palm detector found {} candidates", palms.len());

    for palm in palms {
        if crops.len() >= config.max_hands {
            break;
        }
        let overlaps_tracked = crops
            .iter()
            .any(|(crop, _)| palm::iou(&crop.bounds(), &palm.bbox) >= TRACKING_IOU_THRESHOLD);
        if !overlaps_tracked {
            crops.push((palm.crop(), CropSource::Detected));
        }
    }
    Ok(crops)
}

impl LandmarkProvider for OrtHandLandmarker {
    fn detect(&mut self, frame: &Frame, config: &HandsConfig) -> Result<Vec<HandInstance>> {
        if config.static_image_mode {
            self.tracked.clear();
        }

        let palm_detector = &mut self.palm_detector;
        let crops = collect_crops(&self.tracked, config, |min_score| {
            palm_detector.detect(frame, min_score)
        })?;

        let mut accepted: Vec<LandmarkEstimate> = Vec::with_capacity(crops.len());
        for (region, source) in crops {
            let estimate = self.estimate(frame, region)?;
            let threshold = match source {
                CropSource::Tracked => config.min_tracking_confidence,
                CropSource::Detected => config.min_detection_confidence,
            };
            if estimate.presence >= threshold {
                accepted.push(estimate);
            } else if source == CropSource::Tracked {
                log::debug!("lost tracked hand (presence {:.2})", estimate.presence);
            }
        }

        accepted.sort_by(|a, b| b.presence.partial_cmp(&a.presence).unwrap_or(Ordering::Equal));
        accepted.truncate(config.max_hands);

        self.tracked = if config.static_image_mode {
            Vec::new()
        } else {
            accepted.iter().map(|e| e.points.clone()).collect()
        };

        let (w, h) = (frame.width as f32, frame.height as f32);
        Ok(accepted
            .into_iter()
            .map(|e| {
                let normalized: Vec<(f32, f32)> =
                    e.points.iter().map(|&(x, y)| (x / w, y / h)).collect();
                HandInstance::from_points(
                    &normalized,
                    e.presence.clamp(0.0, 1.0),
                    Handedness::from_score(e.handedness),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_at(cx: f32, cy: f32) -> Vec<(f32, f32)> {
        (0..21)
            .map(|i| (cx + (i % 5) as f32 * 4.0 - 8.0, cy - (i / 5) as f32 * 6.0 + 12.0))
            .collect()
    }

    fn palm_at(cx: f32, cy: f32) -> PalmRegion {
        PalmRegion {
            bbox: [cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0],
            keypoints: vec![(cx, cy + 20.0), (cx, cy), (cx, cy - 20.0)],
            score: 0.9,
        }
    }

    #[test]
    fn palm_detector_failure_is_propagated() {
        let err = collect_crops(&[], &HandsConfig::default(), |_| {
            Err(anyhow!("unexpected palm box shape [1, 2016]"))
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("palm box shape"));
    }

    #[test]
    fn full_tracking_skips_palm_detection() {
        let tracked = vec![hand_at(100.0, 100.0), hand_at(300.0, 100.0)];
        let crops = collect_crops(&tracked, &HandsConfig::default(), |_| {
            Err(anyhow!("palm detector must not run"))
        })
        .unwrap();
        assert_eq!(crops.len(), 2);
        assert!(crops.iter().all(|(_, source)| *source == CropSource::Tracked));
    }

    #[test]
    fn palms_overlapping_tracked_hands_are_dropped() {
        let tracked = vec![hand_at(100.0, 100.0)];
        let config = HandsConfig {
            max_hands: 3,
            ..HandsConfig::default()
        };
        let crops = collect_crops(&tracked, &config, |min_score| {
            assert_eq!(min_score, config.min_detection_confidence);
            Ok(vec![palm_at(100.0, 100.0), palm_at(400.0, 300.0)])
        })
        .unwrap();

        let sources: Vec<CropSource> = crops.iter().map(|(_, s)| *s).collect();
        assert_eq!(sources, vec![CropSource::Tracked, CropSource::Detected]);
    }

    #[test]
    fn static_mode_ignores_tracked_hands() {
        let tracked = vec![hand_at(100.0, 100.0)];
        let config = HandsConfig {
            static_image_mode: true,
            max_hands: 1,
            ..HandsConfig::default()
        };
        let crops = collect_crops(&tracked, &config, |_| Ok(vec![palm_at(100.0, 100.0)])).unwrap();
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].1, CropSource::Detected);
    }
}
