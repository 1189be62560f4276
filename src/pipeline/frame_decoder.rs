use std::{fmt::Debug, time::Instant};

use anyhow::{Context, Result, anyhow, bail};
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::{ChannelOrder, Frame};

const RANGE: YuvRange = YuvRange::Full;
const MATRIX: YuvStandardMatrix = YuvStandardMatrix::Bt709;

/// Turns a raw camera buffer into a [`Frame`]. Uncompressed RGB, BGR and gray
/// buffers stay packed at three bytes per pixel; YUV and MJPEG come out as RGBA.
pub fn decode_camera_frame(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let format = buffer.source_frame_format();
    let data = sized(buffer.buffer(), format, width, height)?;

    let (data, order) = match format {
        FrameFormat::RAWRGB => (data.to_vec(), ChannelOrder::Rgb),
        FrameFormat::RAWBGR => (data.to_vec(), ChannelOrder::Bgr),
        FrameFormat::GRAY => (gray_to_rgb(data), ChannelOrder::Rgb),
        FrameFormat::NV12 => {
            let pixels = width as usize * height as usize;
            let image = YuvBiPlanarImage {
                y_plane: &data[..pixels],
                y_stride: width,
                uv_plane: &data[pixels..],
                uv_stride: width,
                width,
                height,
            };
            let rgba = convert_yuv(width, height, |dst, stride| {
                yuv_nv12_to_rgba(&image, dst, stride, RANGE, MATRIX, YuvConversionMode::Balanced)
            })?;
            (rgba, ChannelOrder::Rgba)
        }
        FrameFormat::YUYV => {
            let image = YuvPackedImage {
                yuy: data,
                yuy_stride: width * 2,
                width,
                height,
            };
            let rgba = convert_yuv(width, height, |dst, stride| {
                yuyv422_to_rgba(&image, dst, stride, RANGE, MATRIX)
            })?;
            (rgba, ChannelOrder::Rgba)
        }
        FrameFormat::MJPEG => (decode_mjpeg(data, width, height)?, ChannelOrder::Rgba),
    };

    Ok(Frame {
        data,
        width,
        height,
        order,
        timestamp: Instant::now(),
    })
}

/// Bytes an uncompressed `width` x `height` buffer of `format` occupies.
/// `None` for compressed formats.
fn required_len(format: FrameFormat, width: u32, height: u32) -> Option<usize> {
    let pixels = width as usize * height as usize;
    match format {
        FrameFormat::GRAY => Some(pixels),
        FrameFormat::NV12 => Some(pixels + pixels / 2),
        FrameFormat::YUYV => Some(pixels * 2),
        FrameFormat::RAWRGB | FrameFormat::RAWBGR => Some(pixels * 3),
        FrameFormat::MJPEG => None,
    }
}

/// `data` cut to exactly the bytes `format` needs. Short buffers are an error;
/// trailing padding is dropped.
fn sized(data: &[u8], format: FrameFormat, width: u32, height: u32) -> Result<&[u8]> {
    let Some(needed) = required_len(format, width, height) else {
        return Ok(data);
    };
    data.get(..needed).ok_or_else(|| {
        anyhow!(
            "{format:?} buffer for {width}x{height} holds {} bytes, needs {needed}",
            data.len()
        )
    })
}

fn gray_to_rgb(luma: &[u8]) -> Vec<u8> {
    luma.par_iter().flat_map_iter(|&v| [v, v, v]).collect()
}

fn convert_yuv<F, E>(width: u32, height: u32, convert: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut [u8], u32) -> std::result::Result<(), E>,
    E: Debug,
{
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    convert(&mut rgba, width * 4).map_err(|err| anyhow!("YUV conversion failed: {err:?}"))?;
    Ok(rgba)
}

fn decode_mjpeg(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let rgba = JpegDecoder::new_with_options(ZCursor::new(data), options)
        .decode()
        .map_err(|err| anyhow!("{err:?}"))
        .context("MJPEG decode failed")?;

    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        bail!(
            "MJPEG frame decoded to {} bytes, camera reported {width}x{height}",
            rgba.len()
        );
    }
    Ok(rgba)
}
