use std::f32::consts::PI;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, NUM_LANDMARKS};

pub const INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

/// Crop side relative to the extent of the tracked landmarks.
const TRACKING_CROP_SCALE: f32 = 2.0;
const MIN_CROP_SIDE: f32 = 32.0;

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// A rotated square region of the frame, in frame pixels. `angle` rotates crop
/// space into frame space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRegion {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
}

impl CropRegion {
    /// Square crop around a previously found hand, rotated so the wrist sits
    /// below the middle finger knuckle in the crop.
    pub fn from_landmarks(points: &[(f32, f32)]) -> Option<Self> {
        if points.len() < NUM_LANDMARKS {
            return None;
        }
        let (min_x, max_x, min_y, max_y) = points.iter().fold(
            (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
            |acc, &(x, y)| (acc.0.min(x), acc.1.max(x), acc.2.min(y), acc.3.max(y)),
        );
        let center = ((min_x + max_x) * 0.5, (min_y + max_y) * 0.5);
        let side = ((max_x - min_x).max(max_y - min_y) * TRACKING_CROP_SCALE).max(MIN_CROP_SIDE);

        let wrist = points[0];
        let middle_mcp = points[9];
        let angle = PI * 0.5 - (-(middle_mcp.1 - wrist.1)).atan2(middle_mcp.0 - wrist.0);

        Some(Self {
            center,
            side,
            angle,
        })
    }

    /// Axis-aligned `[x1, y1, x2, y2]` box of the unrotated square.
    pub fn bounds(&self) -> [f32; 4] {
        let half = self.side * 0.5;
        [
            self.center.0 - half,
            self.center.1 - half,
            self.center.0 + half,
            self.center.1 + half,
        ]
    }
}

#[derive(Clone, Debug)]
pub struct CropTransform {
    pub region: CropRegion,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl CropTransform {
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.region.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.region.angle.sin_cos();
        let ox = self.region.center.0 + dx * cos - dy * sin;
        let oy = self.region.center.1 + dx * sin + dy * cos;
        (
            ox.clamp(0.0, (self.orig_w.saturating_sub(1)) as f32),
            oy.clamp(0.0, (self.orig_h.saturating_sub(1)) as f32),
        )
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    if frame.data.len() != frame.expected_len() {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.data.len(),
            frame.expected_len()
        ));
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!("empty frame {}x{}", frame.width, frame.height));
    }
    Ok(())
}

/// Letterboxes the frame into a `target_size` square NHWC tensor with values
/// in `0.0..=1.0`.
pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let channels = frame.order.channels();
    let pixel_type = if channels == 4 {
        fir::PixelType::U8x4
    } else {
        fir::PixelType::U8x3
    };

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image =
        fir::images::ImageRef::new(frame.width, frame.height, &frame.data, pixel_type)?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, pixel_type);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let side = target_size as usize;
    let [r, g, b] = frame.order.rgb_offsets();

    let mut normalized = vec![0.0f32; side * side * 3];
    normalized
        .par_chunks_exact_mut(side * 3)
        .enumerate()
        .for_each(|(row, dst)| {
            if row < pad_y || row >= pad_y + new_h as usize {
                return;
            }
            let src_row = row - pad_y;
            let src_stride = new_w as usize * channels;
            let src = &resized[src_row * src_stride..(src_row + 1) * src_stride];
            for (col, px) in src.chunks_exact(channels).enumerate() {
                let o = (pad_x + col) * 3;
                dst[o] = px[r] as f32 / 255.0;
                dst[o + 1] = px[g] as f32 / 255.0;
                dst[o + 2] = px[b] as f32 / 255.0;
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Samples a rotated square crop into an `output_size` NHWC tensor using
/// bilinear filtering. Pixels outside the frame read as black.
pub fn prepare_rotated_crop(
    frame: &Frame,
    region: CropRegion,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let size = output_size as usize;
    let half = output_size as f32 / 2.0;
    let scale = region.side / output_size as f32;
    let (sin, cos) = region.angle.sin_cos();

    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_exact_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = (y as f32 + 0.5 - half) * scale;
            for x in 0..size {
                let dx = (x as f32 + 0.5 - half) * scale;
                let src_x = region.center.0 + dx * cos - dy * sin;
                let src_y = region.center.1 + dx * sin + dy * cos;
                row[x * 3..x * 3 + 3].copy_from_slice(&sample_rgb(frame, src_x, src_y));
            }
        });

    let array = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    let transform = CropTransform {
        region,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((array, transform))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<Vec<[f32; 3]>> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    // Shift to pixel centers.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();

    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        if cx < 0.0 || cy < 0.0 {
            return [0.0, 0.0, 0.0];
        }
        match frame.rgb_at(cx as u32, cy as u32) {
            Some([r, g, b]) => [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
            None => [0.0, 0.0, 0.0],
        }
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|i| lerp(lerp(c00[i], c10[i], fx), lerp(c01[i], c11[i], fx), fy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelOrder;
    use approx::assert_abs_diff_eq;

    fn hand_pointing(dx: f32, dy: f32) -> Vec<(f32, f32)> {
        // Wrist at the origin, every other joint spread along the finger axis.
        (0..NUM_LANDMARKS)
            .map(|i| {
                let t = i as f32 * 5.0;
                (100.0 + dx * t, 100.0 + dy * t)
            })
            .collect()
    }

    #[test]
    fn upright_hand_needs_no_rotation() {
        let crop = CropRegion::from_landmarks(&hand_pointing(0.0, -1.0)).unwrap();
        assert_abs_diff_eq!(crop.angle, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn hand_pointing_right_rotates_a_quarter_turn() {
        let crop = CropRegion::from_landmarks(&hand_pointing(1.0, 0.0)).unwrap();
        assert_abs_diff_eq!(crop.angle, PI * 0.5, epsilon = 1e-5);
        // The top of the crop maps towards the fingertips.
        let transform = CropTransform {
            region: CropRegion {
                center: (100.0, 100.0),
                ..crop
            },
            output_size: 224,
            orig_w: 1000,
            orig_h: 1000,
        };
        let (x, y) = transform.project(112.0, 0.0);
        assert!(x > 100.0);
        assert_abs_diff_eq!(y, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn partial_hand_yields_no_crop() {
        assert!(CropRegion::from_landmarks(&[(1.0, 1.0); 5]).is_none());
    }

    #[test]
    fn decode_rejects_short_output() {
        assert!(decode_landmarks(&[0.0; 10]).is_err());
        let flat: Vec<f32> = (0..NUM_LANDMARKS * 3).map(|v| v as f32).collect();
        let decoded = decode_landmarks(&flat).unwrap();
        assert_eq!(decoded.len(), NUM_LANDMARKS);
        assert_eq!(decoded[1], [3.0, 4.0, 5.0]);
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = Frame::blank(200, 100, ChannelOrder::Rgb);
        let (input, letterbox) = prepare_frame_with_size(&frame, PALM_INPUT_SIZE).unwrap();
        assert_eq!(input.shape(), &[1, 192, 192, 3]);
        assert_abs_diff_eq!(letterbox.scale, 0.96, epsilon = 1e-6);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 48.0);
    }

    #[test]
    fn crop_samples_frame_colors() {
        let mut frame = Frame::blank(10, 10, ChannelOrder::Bgra);
        for px in frame.data.chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 255, 255]);
        }
        let region = CropRegion {
            center: (5.0, 5.0),
            side: 4.0,
            angle: 0.0,
        };
        let (input, _) = prepare_rotated_crop(&frame, region, 4).unwrap();
        assert_abs_diff_eq!(input[[0, 1, 1, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(input[[0, 1, 1, 2]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut frame = Frame::blank(4, 4, ChannelOrder::Rgba);
        frame.data.truncate(10);
        assert!(prepare_frame_with_size(&frame, PALM_INPUT_SIZE).is_err());
    }
}
