mod config;
mod display;
mod model_download;
mod pipeline;
mod types;

use anyhow::{Context, Result};
use macroquad::window::next_frame;
use nokhwa::utils::CameraIndex;

use config::AppConfig;
use display::Window;
use pipeline::{CameraSource, HandDetector, OrtHandLandmarker, Tracker, available_cameras};

type CameraTracker = Tracker<CameraSource, OrtHandLandmarker>;

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::default();
    // Downloads and session setup block, so they finish before the window
    // exists and its event loop starts.
    let tracker = prepare(&config)?;

    macroquad::Window::from_config(display::window_conf(&config), run_loop(tracker, config));
    Ok(())
}

fn prepare(config: &AppConfig) -> Result<CameraTracker> {
    model_download::ensure_models(&config.models)?;

    match available_cameras() {
        Ok(cameras) => {
            for camera in &cameras {
                log::info!("camera {}: {}", camera.index, camera.label);
            }
        }
        Err(err) => log::warn!("failed to enumerate cameras: {err:#}"),
    }

    let source = CameraSource::open(CameraIndex::Index(config.camera_index))
        .with_context(|| format!("failed to open camera {}", config.camera_index))?;
    let provider = OrtHandLandmarker::new(&config.models)?;
    let detector = HandDetector::new(provider, config.hands.clone())?;
    Ok(Tracker::new(source, detector, config.tracker()))
}

async fn run_loop(mut tracker: CameraTracker, config: AppConfig) {
    let mut window = Window::new(&config);
    let mut hand_visible = false;

    loop {
        if window.quit_requested() {
            log::info!("quit requested");
            break;
        }

        let tracked = match tracker.step() {
            Ok(tracked) => tracked,
            Err(err) => {
                log::error!("stopping: {err}");
                break;
            }
        };

        if tracked.location.is_empty() == hand_visible {
            hand_visible = !hand_visible;
            log::info!("hand {}", if hand_visible { "found" } else { "lost" });
        }

        window.present(&tracked.frame, tracked.fps);
        next_frame().await;
    }

    // Releases the camera before the window goes away.
    drop(tracker);
}
