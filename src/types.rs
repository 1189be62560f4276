use std::time::Instant;

use rayon::prelude::*;

/// Byte layout of a single pixel in a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
    Rgba,
    #[allow(dead_code)]
    Bgra,
}

impl ChannelOrder {
    pub fn channels(self) -> usize {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Bgr => 3,
            ChannelOrder::Rgba | ChannelOrder::Bgra => 4,
        }
    }

    /// Offsets of the red, green and blue bytes within one pixel.
    pub fn rgb_offsets(self) -> [usize; 3] {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Rgba => [0, 1, 2],
            ChannelOrder::Bgr | ChannelOrder::Bgra => [2, 1, 0],
        }
    }

    pub fn alpha_offset(self) -> Option<usize> {
        match self {
            ChannelOrder::Rgb | ChannelOrder::Bgr => None,
            ChannelOrder::Rgba | ChannelOrder::Bgra => Some(3),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
    pub timestamp: Instant,
}

#[cfg(test)]
impl Frame {
    /// Creates a black, fully opaque frame.
    pub fn blank(width: u32, height: u32, order: ChannelOrder) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * order.channels()];
        if let Some(alpha) = order.alpha_offset() {
            data.par_chunks_exact_mut(order.channels())
                .for_each(|px| px[alpha] = 255);
        }
        Self {
            data,
            width,
            height,
            order,
            timestamp: Instant::now(),
        }
    }
}

impl Frame {
    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(self.order.channels())
    }

    /// Returns the `[r, g, b]` value at `(x, y)`, or `None` outside the frame.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.order.channels();
        let idx = (y as usize * self.width as usize + x as usize) * channels;
        let px = self.data.get(idx..idx + channels)?;
        let [r, g, b] = self.order.rgb_offsets();
        Some([px[r], px[g], px[b]])
    }

    /// Copies the frame into another channel order. Only bytes are moved; a
    /// missing alpha channel is filled with 255.
    pub fn to_order(&self, order: ChannelOrder) -> Frame {
        if order == self.order {
            return self.clone();
        }

        let src_channels = self.order.channels();
        let dst_channels = order.channels();
        let src_rgb = self.order.rgb_offsets();
        let dst_rgb = order.rgb_offsets();
        let src_alpha = self.order.alpha_offset();
        let dst_alpha = order.alpha_offset();

        let pixels = self.data.len() / src_channels;
        let mut data = vec![0u8; pixels * dst_channels];
        data.par_chunks_exact_mut(dst_channels)
            .zip(self.data.par_chunks_exact(src_channels))
            .for_each(|(dst, src)| {
                for (d, s) in dst_rgb.iter().zip(src_rgb.iter()) {
                    dst[*d] = src[*s];
                }
                if let Some(a) = dst_alpha {
                    dst[a] = src_alpha.map(|sa| src[sa]).unwrap_or(255);
                }
            });

        Frame {
            data,
            width: self.width,
            height: self.height,
            order,
            timestamp: self.timestamp,
        }
    }
}

pub const NUM_LANDMARKS: usize = 21;

/// Landmark ids of the 21-point hand topology.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum HandLandmark {
    Wrist = 0,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl HandLandmark {
    pub fn id(self) -> usize {
        self as usize
    }
}

/// Pairs of landmark ids joined by a stroke when a hand is drawn.
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// A landmark in normalized image coordinates (`0.0..=1.0` inside the frame).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub id: usize,
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    /// Maps the landmark model's handedness output (1.0 = right hand).
    pub fn from_score(score: f32) -> Self {
        if score.is_nan() {
            Handedness::Unknown
        } else if score >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
            Handedness::Unknown => "unknown",
        }
    }
}

/// All landmarks of one detected hand within one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct HandInstance {
    pub landmarks: Vec<Landmark>,
    pub score: f32,
    pub handedness: Handedness,
}

impl HandInstance {
    /// Builds a hand from points ordered by landmark id.
    pub fn from_points(points: &[(f32, f32)], score: f32, handedness: Handedness) -> Self {
        let landmarks = points
            .iter()
            .enumerate()
            .map(|(id, &(x, y))| Landmark { id, x, y })
            .collect();
        Self {
            landmarks,
            score,
            handedness,
        }
    }

}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelLandmark {
    pub id: usize,
    pub x: i32,
    pub y: i32,
}

impl PixelLandmark {
    /// Scales a normalized landmark to a `width` x `height` frame, rounding to
    /// the nearest pixel.
    pub fn from_normalized(landmark: &Landmark, width: u32, height: u32) -> Self {
        Self {
            id: landmark.id,
            x: (landmark.x * width as f32).round() as i32,
            y: (landmark.y * height as f32).round() as i32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl BoundingBox {
    /// Smallest box enclosing every point; `None` for an empty set.
    pub fn enclosing<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a PixelLandmark>,
    {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => BoundingBox {
                    min_x: p.x,
                    min_y: p.y,
                    max_x: p.x,
                    max_y: p.y,
                },
                Some(b) => BoundingBox {
                    min_x: b.min_x.min(p.x),
                    min_y: b.min_y.min(p.y),
                    max_x: b.max_x.max(p.x),
                    max_y: b.max_y.max(p.y),
                },
            })
        })
    }

    pub fn expanded(&self, margin: i32) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }
}

#[cfg(test)]
impl BoundingBox {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgr_frame() -> Frame {
        let mut frame = Frame::blank(2, 1, ChannelOrder::Bgr);
        frame.data = vec![10, 20, 30, 40, 50, 60];
        frame
    }

    #[test]
    fn bgr_to_rgb_swaps_red_and_blue() {
        let rgb = bgr_frame().to_order(ChannelOrder::Rgb);
        assert_eq!(rgb.data, vec![30, 20, 10, 60, 50, 40]);
        assert_eq!(rgb.order, ChannelOrder::Rgb);
    }

    #[test]
    fn three_channel_to_rgba_adds_opaque_alpha() {
        let rgba = bgr_frame().to_order(ChannelOrder::Rgba);
        assert_eq!(rgba.data, vec![30, 20, 10, 255, 60, 50, 40, 255]);
        assert_eq!(rgba.expected_len(), rgba.data.len());
    }

    #[test]
    fn reorder_keeps_colors() {
        let frame = bgr_frame();
        let bgra = frame.to_order(ChannelOrder::Bgra);
        let back = bgra.to_order(ChannelOrder::Bgr);
        assert_eq!(back.data, frame.data);
        assert_eq!(frame.rgb_at(1, 0), Some([60, 50, 40]));
        assert_eq!(bgra.rgb_at(1, 0), Some([60, 50, 40]));
        assert_eq!(bgra.rgb_at(2, 0), None);
    }

    #[test]
    fn blank_frame_is_opaque_black() {
        let frame = Frame::blank(3, 2, ChannelOrder::Rgba);
        assert_eq!(frame.data.len(), 24);
        assert!(frame.data.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn scaling_maps_unit_square_onto_frame_corners() {
        let origin = Landmark { id: 0, x: 0.0, y: 0.0 };
        let corner = Landmark { id: 1, x: 1.0, y: 1.0 };
        assert_eq!(
            PixelLandmark::from_normalized(&origin, 640, 480),
            PixelLandmark { id: 0, x: 0, y: 0 }
        );
        assert_eq!(
            PixelLandmark::from_normalized(&corner, 640, 480),
            PixelLandmark { id: 1, x: 640, y: 480 }
        );
    }

    #[test]
    fn scaling_rounds_to_nearest_pixel() {
        let lm = Landmark { id: 8, x: 0.2509, y: 0.1 };
        let px = PixelLandmark::from_normalized(&lm, 100, 45);
        assert_eq!((px.x, px.y), (25, 5));
    }

    #[test]
    fn enclosing_box_covers_all_points() {
        let points = [
            PixelLandmark { id: 0, x: 5, y: 9 },
            PixelLandmark { id: 1, x: -3, y: 12 },
            PixelLandmark { id: 2, x: 40, y: 1 },
        ];
        let bbox = BoundingBox::enclosing(&points).unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                min_x: -3,
                min_y: 1,
                max_x: 40,
                max_y: 12
            }
        );
        assert!(points.iter().all(|p| bbox.contains(p.x, p.y)));
        assert_eq!(BoundingBox::enclosing(&Vec::<PixelLandmark>::new()), None);
    }

    #[test]
    fn expanded_box_grows_on_every_side() {
        let bbox = BoundingBox {
            min_x: 10,
            min_y: 10,
            max_x: 20,
            max_y: 30,
        };
        let grown = bbox.expanded(20);
        assert_eq!((grown.min_x, grown.min_y), (-10, -10));
        assert_eq!((grown.max_x, grown.max_y), (40, 50));
        assert_eq!(grown.width(), bbox.width() + 40);
    }

    #[test]
    fn handedness_threshold() {
        assert_eq!(Handedness::from_score(0.9), Handedness::Right);
        assert_eq!(Handedness::from_score(0.1), Handedness::Left);
        assert_eq!(Handedness::from_score(f32::NAN), Handedness::Unknown);
    }

    #[test]
    fn hand_from_points_numbers_landmarks_in_order() {
        let hand = HandInstance::from_points(&[(0.1, 0.2), (0.3, 0.4)], 0.9, Handedness::Left);
        assert_eq!(hand.landmarks[1], Landmark { id: 1, x: 0.3, y: 0.4 });
        assert_eq!(hand.landmarks[HandLandmark::Wrist.id()].x, 0.1);
    }
}
