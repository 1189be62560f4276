use crate::types::{BoundingBox, Frame, HAND_CONNECTIONS, PixelLandmark};

pub type Rgb = [u8; 3];

pub const MAGENTA: Rgb = [255, 0, 255];
const CONNECTION_COLOR: Rgb = [224, 224, 224];
const JOINT_COLOR: Rgb = [255, 48, 48];

pub const CONNECTION_THICKNESS: i32 = 2;
const JOINT_RADIUS: i32 = 3;
pub const MARKER_RADIUS: i32 = 5;
pub const BBOX_THICKNESS: i32 = 2;

/// Drawing surface over a frame. Colors are given as RGB and written in the
/// frame's own channel order.
pub struct Canvas<'a> {
    frame: &'a mut Frame,
}

impl<'a> Canvas<'a> {
    pub fn new(frame: &'a mut Frame) -> Self {
        Self { frame }
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: Rgb) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.frame.width || uy >= self.frame.height {
            return;
        }
        let order = self.frame.order;
        let idx = (uy as usize * self.frame.width as usize + ux as usize) * order.channels();
        let Some(px) = self.frame.data.get_mut(idx..idx + order.channels()) else {
            return;
        };
        for (offset, value) in order.rgb_offsets().into_iter().zip(color) {
            px[offset] = value;
        }
    }

    pub fn draw_line(&mut self, p0: (i32, i32), p1: (i32, i32), color: Rgb, thickness: i32) {
        let (mut x0, mut y0) = p0;
        let (x1, y1) = p1;
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = thickness.max(1) / 2;

        loop {
            self.stamp(x0, y0, radius, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    // Diamond brush.
    fn stamp(&mut self, x: i32, y: i32, radius: i32, color: Rgb) {
        self.put_pixel(x, y, color);
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                    self.put_pixel(x + ox, y + oy, color);
                }
            }
        }
    }

    pub fn fill_circle(&mut self, center: (i32, i32), radius: i32, color: Rgb) {
        let (cx, cy) = center;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    pub fn draw_rect(&mut self, rect: &BoundingBox, color: Rgb, thickness: i32) {
        let (x1, y1, x2, y2) = (rect.min_x, rect.min_y, rect.max_x, rect.max_y);
        self.draw_line((x1, y1), (x2, y1), color, thickness);
        self.draw_line((x2, y1), (x2, y2), color, thickness);
        self.draw_line((x2, y2), (x1, y2), color, thickness);
        self.draw_line((x1, y2), (x1, y1), color, thickness);
    }

    /// Draws the hand skeleton: a stroke for each connected landmark pair and a
    /// dot on every joint. Pairs with a missing endpoint are skipped.
    pub fn draw_hand(&mut self, points: &[PixelLandmark]) {
        let find = |id: usize| points.iter().find(|p| p.id == id).map(|p| (p.x, p.y));
        for &(a, b) in HAND_CONNECTIONS {
            if let (Some(pa), Some(pb)) = (find(a), find(b)) {
                self.draw_line(pa, pb, CONNECTION_COLOR, CONNECTION_THICKNESS);
            }
        }
        for p in points {
            self.fill_circle((p.x, p.y), JOINT_RADIUS, JOINT_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelOrder;

    #[test]
    fn pixels_are_written_in_frame_channel_order() {
        let mut frame = Frame::blank(4, 4, ChannelOrder::Bgr);
        Canvas::new(&mut frame).put_pixel(1, 2, [10, 20, 30]);
        let idx = (2 * 4 + 1) * 3;
        assert_eq!(&frame.data[idx..idx + 3], &[30, 20, 10]);
        assert_eq!(frame.rgb_at(1, 2), Some([10, 20, 30]));
    }

    #[test]
    fn drawing_outside_the_frame_is_clipped() {
        let mut frame = Frame::blank(8, 8, ChannelOrder::Rgba);
        let before = frame.data.clone();
        let mut canvas = Canvas::new(&mut frame);
        canvas.put_pixel(-1, 3, MAGENTA);
        canvas.put_pixel(8, 3, MAGENTA);
        canvas.fill_circle((-20, -20), 5, MAGENTA);
        assert_eq!(frame.data, before);

        Canvas::new(&mut frame).fill_circle((0, 0), 5, MAGENTA);
        assert_eq!(frame.rgb_at(0, 0), Some(MAGENTA));
        assert_eq!(frame.rgb_at(7, 7), Some([0, 0, 0]));
    }

    #[test]
    fn line_covers_both_endpoints() {
        let mut frame = Frame::blank(16, 16, ChannelOrder::Rgb);
        Canvas::new(&mut frame).draw_line((2, 3), (12, 9), [1, 2, 3], 1);
        assert_eq!(frame.rgb_at(2, 3), Some([1, 2, 3]));
        assert_eq!(frame.rgb_at(12, 9), Some([1, 2, 3]));
    }

    #[test]
    fn rectangle_outline_leaves_interior_untouched() {
        let mut frame = Frame::blank(20, 20, ChannelOrder::Rgb);
        let rect = BoundingBox {
            min_x: 2,
            min_y: 2,
            max_x: 17,
            max_y: 17,
        };
        Canvas::new(&mut frame).draw_rect(&rect, MAGENTA, BBOX_THICKNESS);
        assert_eq!(frame.rgb_at(2, 10), Some(MAGENTA));
        assert_eq!(frame.rgb_at(17, 17), Some(MAGENTA));
        assert_eq!(frame.rgb_at(10, 10), Some([0, 0, 0]));
    }

    #[test]
    fn hand_skeleton_connects_landmarks() {
        let mut frame = Frame::blank(32, 32, ChannelOrder::Rgb);
        let points = [
            PixelLandmark { id: 0, x: 4, y: 16 },
            PixelLandmark { id: 1, x: 28, y: 16 },
        ];
        Canvas::new(&mut frame).draw_hand(&points);
        assert_eq!(frame.rgb_at(16, 16), Some(CONNECTION_COLOR));
        assert_eq!(frame.rgb_at(4, 16), Some(JOINT_COLOR));
    }
}
