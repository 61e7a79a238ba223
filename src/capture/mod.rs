mod screen;
mod window;
mod writer;

pub use screen::ScreenCapture;
pub use window::WindowCapture;
pub use writer::PngWriter;

use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use image::RgbaImage;
use std::path::Path;

use crate::error::{RecorderError, RecorderResult};

const MAX_CAPTURE_DIMENSION: u32 = 16384;
const MAX_CAPTURE_PIXELS: u64 = 256 * 1024 * 1024;
const WRITER_QUEUE_LEN: usize = 8;

/// Grabs the current contents of a capture source.
pub trait Capture {
    fn capture(&self) -> Result<RgbaImage>;
}

/// "Capture the current frame to this file", as seen by the recorder.
pub trait FrameCapture {
    fn capture_frame(&mut self, path: &Path) -> RecorderResult<()>;

    /// Blocks until every frame handed to `capture_frame` is on disk.
    fn flush(&mut self) -> RecorderResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// A monitor by id, or the primary one.
    Monitor(Option<u32>),
    Window(u32),
}

#[derive(Debug, Clone)]
pub struct MonitorInfo {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    pub app_name: String,
    pub width: u32,
    pub height: u32,
    pub is_visible: bool,
}

pub fn list_monitors() -> Result<Vec<MonitorInfo>> {
    let screens = xcap::Monitor::all()?;
    let monitors: Vec<MonitorInfo> = screens
        .into_iter()
        .map(|s| MonitorInfo {
            id: s.id(),
            name: s.name().to_string(),
            x: s.x(),
            y: s.y(),
            width: s.width(),
            height: s.height(),
            is_primary: s.is_primary(),
        })
        .collect();
    Ok(monitors)
}

pub fn list_windows() -> Result<Vec<WindowInfo>> {
    let windows = xcap::Window::all()?;
    let mut window_infos: Vec<WindowInfo> = windows
        .into_iter()
        .filter(|w| !w.title().is_empty() && w.width() > 0 && w.height() > 0)
        .map(|w| WindowInfo {
            id: w.id(),
            title: w.title().to_string(),
            app_name: w.app_name().to_string(),
            width: w.width(),
            height: w.height(),
            is_visible: !w.is_minimized(),
        })
        .collect();
    window_infos.sort_by(|a, b| a.title.cmp(&b.title));
    Ok(window_infos)
}

fn check_limits(img: &RgbaImage) -> Result<()> {
    if img.width() > MAX_CAPTURE_DIMENSION || img.height() > MAX_CAPTURE_DIMENSION {
        return Err(anyhow!("Captured image dimensions exceed safety limit"));
    }
    let pixel_count = (img.width() as u64).saturating_mul(img.height() as u64);
    if pixel_count > MAX_CAPTURE_PIXELS {
        return Err(anyhow!("Captured image exceeds maximum pixel count"));
    }
    Ok(())
}

/// Nearest-neighbour upscale so every source pixel keeps its exact value.
pub fn apply_size_multiplier(img: RgbaImage, multiplier: u32) -> Result<RgbaImage> {
    if multiplier <= 1 {
        return Ok(img);
    }
    let width = img.width().saturating_mul(multiplier);
    let height = img.height().saturating_mul(multiplier);
    if width > MAX_CAPTURE_DIMENSION || height > MAX_CAPTURE_DIMENSION {
        return Err(anyhow!(
            "Scaled frame {}x{} exceeds safety limit",
            width,
            height
        ));
    }
    Ok(image::imageops::resize(&img, width, height, FilterType::Nearest))
}

/// Screen-backed `FrameCapture`: grabs on the calling thread, encodes PNGs on a
/// background writer.
///
/// After a failed write every further capture is refused until `flush`, so no
/// frame lands on disk behind the missing one.
pub struct ScreenFrameCapture {
    source: Box<dyn Capture + Send>,
    size_multiplier: u32,
    writer: Option<PngWriter>,
    write_error: Option<RecorderError>,
}

impl ScreenFrameCapture {
    pub fn new(source: Box<dyn Capture + Send>, size_multiplier: u32) -> Self {
        Self {
            source,
            size_multiplier: size_multiplier.max(1),
            writer: None,
            write_error: None,
        }
    }

    pub fn for_target(target: CaptureTarget, size_multiplier: u32) -> Self {
        let source: Box<dyn Capture + Send> = match target {
            CaptureTarget::Monitor(Some(id)) => Box::new(ScreenCapture::with_monitor(id)),
            CaptureTarget::Monitor(None) => Box::new(ScreenCapture::new()),
            CaptureTarget::Window(id) => Box::new(WindowCapture::new(id)),
        };
        Self::new(source, size_multiplier)
    }

    /// Joins a writer that hung up and keeps its error for `flush`.
    fn retire_writer(&mut self) -> RecorderError {
        if let Some(writer) = self.writer.take() {
            match writer.finish() {
                Err(err) => self.write_error = Some(err),
                Ok(_) => {
                    self.write_error = Some(RecorderError::capture("PNG writer stopped"));
                }
            }
        }
        self.refused()
    }

    fn refused(&self) -> RecorderError {
        match &self.write_error {
            Some(err) => RecorderError::capture(format!("Frame writer failed: {err}")),
            None => RecorderError::capture("Frame writer failed"),
        }
    }
}

impl FrameCapture for ScreenFrameCapture {
    fn capture_frame(&mut self, path: &Path) -> RecorderResult<()> {
        if self.write_error.is_some() {
            return Err(self.refused());
        }
        if self.writer.as_ref().is_some_and(|w| w.has_failed()) {
            return Err(self.retire_writer());
        }

        let image = self
            .source
            .capture()
            .and_then(|img| apply_size_multiplier(img, self.size_multiplier))
            .map_err(|e| RecorderError::capture(e.to_string()))?;

        let writer = self
            .writer
            .get_or_insert_with(|| PngWriter::spawn(WRITER_QUEUE_LEN));
        if writer.submit(path.to_path_buf(), image).is_err() {
            return Err(self.retire_writer());
        }
        Ok(())
    }

    fn flush(&mut self) -> RecorderResult<()> {
        let result = match self.writer.take() {
            Some(writer) => writer.finish().map(|written| {
                tracing::debug!(written, "Flushed frame writer");
            }),
            None => Ok(()),
        };
        match self.write_error.take() {
            Some(err) => Err(err),
            None => result,
        }
    }
}
