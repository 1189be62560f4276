use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};
use thiserror::Error;

use super::frame_decoder;
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Failure to obtain the next frame. The capture loop treats it as the end of
/// the stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera: {0}")]
    Open(#[source] NokhwaError),
    #[error("camera frame read failed: {0}")]
    Read(#[source] NokhwaError),
    #[error("failed to decode camera frame: {0:#}")]
    Decode(anyhow::Error),
    #[error("camera {0} rejected every requested format")]
    NoUsableFormat(String),
    #[error("frame source exhausted")]
    EndOfStream,
}

/// Anything that hands out successive frames.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> anyhow::Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    let description = info.description();
    if description.is_empty() {
        info.human_name()
    } else {
        format!("{} - {description}", info.human_name())
    }
}

/// An open camera stream. The stream is stopped when the source is dropped.
pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn open(index: CameraIndex) -> Result<Self, CaptureError> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        log::info!(
                            "camera {index} streaming {} @ {} fps ({:?})",
                            camera.resolution(),
                            camera.frame_rate(),
                            camera.frame_format()
                        );
                        return Ok(Self { camera });
                    }
                    Err(err) => last_err = Some(err),
                },
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err
            .map(CaptureError::Open)
            .unwrap_or_else(|| CaptureError::NoUsableFormat(index.to_string())))
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let buffer = self.camera.frame().map_err(CaptureError::Read)?;
        // Some backends hand out empty buffers once the device disappears.
        if buffer.buffer().is_empty() {
            return Err(CaptureError::EndOfStream);
        }
        frame_decoder::decode_camera_frame(&buffer).map_err(CaptureError::Decode)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        match self.camera.stop_stream() {
            Ok(()) => log::info!("camera stream released"),
            Err(err) => log::warn!("failed to stop camera stream: {err}"),
        }
    }
}
