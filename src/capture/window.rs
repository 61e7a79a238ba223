use anyhow::{anyhow, Result};
use image::RgbaImage;
use xcap::Window;

use super::{check_limits, Capture};

pub struct WindowCapture {
    window_id: u32,
}

impl WindowCapture {
    pub fn new(window_id: u32) -> Self {
        Self { window_id }
    }

    fn find_window(&self) -> Result<Window> {
        let windows = Window::all()?;
        windows
            .into_iter()
            .find(|w| w.id() == self.window_id)
            .ok_or_else(|| anyhow!("Window {} not found", self.window_id))
    }
}

impl Capture for WindowCapture {
    fn capture(&self) -> Result<RgbaImage> {
        let window = self.find_window()?;
        if window.is_minimized() {
            return Err(anyhow!("Window {} is minimized", self.window_id));
        }
        let img = window.capture_image()?;
        check_limits(&img)?;
        Ok(img)
    }
}
