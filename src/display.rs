use macroquad::{
    color::{BLACK, Color, WHITE},
    input::{KeyCode, is_key_pressed},
    math::vec2,
    text::draw_text,
    texture::{DrawTextureParams, FilterMode, Image, Texture2D, draw_texture_ex},
    window::{Conf, clear_background, screen_height, screen_width},
};

use crate::{
    config::AppConfig,
    pipeline::overlay::MAGENTA,
    types::{ChannelOrder, Frame},
};

/// Where the FPS readout sits, in frame pixels.
const FPS_ORIGIN: (f32, f32) = (10.0, 70.0);
const FPS_FONT_SIZE: f32 = 48.0;

pub fn window_conf(config: &AppConfig) -> Conf {
    Conf {
        window_title: config.window_title.clone(),
        window_width: config.window_width,
        window_height: config.window_height,
        window_resizable: true,
        ..Default::default()
    }
}

pub fn fps_label(fps: f64) -> String {
    format!("FPS: {}", fps as i64)
}

/// Per-axis factors that stretch a `frame` sized image over the `screen`.
fn fit_scale(frame: (u32, u32), screen: (f32, f32)) -> (f32, f32) {
    if frame.0 == 0 || frame.1 == 0 {
        return (1.0, 1.0);
    }
    (screen.0 / frame.0 as f32, screen.1 / frame.1 as f32)
}

/// The on-screen surface frames are presented on.
pub struct Window {
    texture: Option<Texture2D>,
    quit_key: KeyCode,
}

impl Window {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            texture: None,
            quit_key: config.quit_key,
        }
    }

    /// Whether the quit key went down since the last frame.
    pub fn quit_requested(&self) -> bool {
        is_key_pressed(self.quit_key)
    }

    /// Uploads `frame`, draws it stretched over the window and puts the FPS
    /// readout on top. Call once per loop iteration before `next_frame`.
    pub fn present(&mut self, frame: &Frame, fps: f64) {
        let Some((tex_w, tex_h)) = texture_size(frame.width, frame.height) else {
            log::warn!(
                "skipping {}x{} frame: larger than a texture can hold",
                frame.width,
                frame.height
            );
            return;
        };
        let rgba = match frame.order {
            ChannelOrder::Rgba => frame.data.clone(),
            _ => frame.to_order(ChannelOrder::Rgba).data,
        };
        let texture = self.upload(tex_w, tex_h, rgba);

        clear_background(BLACK);
        let (sx, sy) = fit_scale((frame.width, frame.height), (screen_width(), screen_height()));
        draw_texture_ex(
            &texture,
            0.0,
            0.0,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(frame.width as f32 * sx, frame.height as f32 * sy)),
                ..Default::default()
            },
        );

        let [r, g, b] = MAGENTA;
        draw_text(
            &fps_label(fps),
            FPS_ORIGIN.0 * sx,
            FPS_ORIGIN.1 * sy,
            FPS_FONT_SIZE * sy,
            Color::from_rgba(r, g, b, 255),
        );
    }

    fn upload(&mut self, width: u16, height: u16, rgba: Vec<u8>) -> Texture2D {
        // Rebuild only when the resolution changes.
        match &self.texture {
            Some(tex) if tex.width() == f32::from(width) && tex.height() == f32::from(height) => {
                tex.update(&Image {
                    bytes: rgba,
                    width,
                    height,
                });
                tex.clone()
            }
            _ => {
                let tex = Texture2D::from_rgba8(width, height, &rgba);
                tex.set_filter(FilterMode::Linear);
                self.texture = Some(tex.clone());
                tex
            }
        }
    }
}

/// Frame dimensions as texture dimensions, `None` when either exceeds `u16`.
fn texture_size(width: u32, height: u32) -> Option<(u16, u16)> {
    Some((u16::try_from(width).ok()?, u16::try_from(height).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_label_truncates() {
        assert_eq!(fps_label(0.0), "FPS: 0");
        assert_eq!(fps_label(29.97), "FPS: 29");
    }

    #[test]
    fn oversized_frames_have_no_texture_size() {
        assert_eq!(texture_size(640, 480), Some((640, 480)));
        assert_eq!(texture_size(65_535, 1), Some((65_535, 1)));
        assert_eq!(texture_size(70_000, 480), None);
        assert_eq!(texture_size(640, 65_536), None);
    }

    #[test]
    fn frame_is_stretched_per_axis() {
        assert_eq!(fit_scale((640, 480), (640.0, 480.0)), (1.0, 1.0));
        assert_eq!(fit_scale((640, 480), (1280.0, 240.0)), (2.0, 0.5));
        assert_eq!(fit_scale((0, 480), (1280.0, 240.0)), (1.0, 1.0));
    }

    #[test]
    fn window_matches_app_config() {
        let conf = window_conf(&AppConfig::default());
        assert_eq!(conf.window_title, "Image");
        assert_eq!((conf.window_width, conf.window_height), (640, 480));
        assert!(conf.window_resizable);
    }
}
