use std::{
    fs,
    io::{self, Read},
    path::Path,
    time::Duration,
};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

use crate::config::ModelPaths;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    HandposeEstimator,
    PalmDetector,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::PalmDetector, ModelKind::HandposeEstimator];

    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => "handpose_estimation_mediapipe_2023feb.onnx",
            ModelKind::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => {
                "https://github.com/opencv/opencv_zoo/raw/main/models/handpose_estimation_mediapipe/handpose_estimation_mediapipe_2023feb.onnx"
            }
            ModelKind::PalmDetector => {
                "https://github.com/opencv/opencv_zoo/raw/main/models/palm_detection_mediapipe/palm_detection_mediapipe_2023feb.onnx"
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::HandposeEstimator => "handpose estimator",
            ModelKind::PalmDetector => "palm detector",
        }
    }
}

/// Makes sure every network in `paths` is on disk, fetching the missing ones.
/// Blocks until all downloads finish.
pub fn ensure_models(paths: &ModelPaths) -> Result<()> {
    for kind in ModelKind::ALL {
        let path = paths.path(kind);
        if path.exists() {
            log::debug!("{} model found at {}", kind.label(), path.display());
            continue;
        }
        fetch(kind, path).with_context(|| format!("failed to download {} model", kind.label()))?;
    }
    Ok(())
}

fn fetch(kind: ModelKind, dest: &Path) -> Result<()> {
    log::info!("fetching {} model into {}", kind.label(), dest.display());

    let response = Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?
        .get(kind.url())
        .send()
        .context("request failed")?
        .error_for_status()?;

    let bar = progress_bar(kind, response.content_length());
    let bytes = store(bar.wrap_read(response), dest)?;
    bar.finish_with_message(format!("{} ready", kind.label()));
    log::info!("{} model stored ({bytes} bytes)", kind.label());
    Ok(())
}

/// Streams `source` into `dest` through a sibling `.download` file, so an
/// interrupted transfer never leaves a truncated model behind.
fn store<R: Read>(mut source: R, dest: &Path) -> Result<u64> {
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let partial = dest.with_extension("download");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("cannot create {}", partial.display()))?;
    let bytes = io::copy(&mut source, &mut file).context("transfer interrupted")?;
    file.sync_all()?;
    drop(file);

    fs::rename(&partial, dest)
        .with_context(|| format!("cannot move {} into place", partial.display()))?;
    Ok(bytes)
}

fn progress_bar(kind: ModelKind, total: Option<u64>) -> ProgressBar {
    let (bar, template) = match total {
        Some(len) if len > 0 => (
            ProgressBar::new(len),
            "{msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ),
        _ => (ProgressBar::new_spinner(), "{spinner:.green} {msg} {bytes}"),
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(kind.label());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
