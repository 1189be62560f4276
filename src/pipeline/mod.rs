pub mod camera;
pub mod detector;
pub mod driver;
pub mod fps;
pub mod frame_decoder;
pub mod landmarks;
pub mod overlay;

// Re-exports for convenience
pub use camera::{CameraSource, available_cameras};
pub use detector::HandDetector;
pub use driver::{Tracker, TrackerConfig};
pub use landmarks::OrtHandLandmarker;
