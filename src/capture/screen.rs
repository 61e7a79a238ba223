use anyhow::{anyhow, Result};
use image::RgbaImage;
use xcap::Monitor;

use super::{check_limits, Capture};

pub struct ScreenCapture {
    monitor_id: Option<u32>,
}

impl ScreenCapture {
    pub fn new() -> Self {
        Self { monitor_id: None }
    }

    pub fn with_monitor(monitor_id: u32) -> Self {
        Self {
            monitor_id: Some(monitor_id),
        }
    }

    fn find_monitor(&self) -> Result<Monitor> {
        let monitors = Monitor::all()?;

        match self.monitor_id {
            Some(id) => monitors
                .into_iter()
                .find(|m| m.id() == id)
                .ok_or_else(|| anyhow!("Monitor {} not found", id)),
            None => {
                let index = monitors.iter().position(|m| m.is_primary()).unwrap_or(0);
                monitors
                    .into_iter()
                    .nth(index)
                    .ok_or_else(|| anyhow!("No monitors found"))
            }
        }
    }
}

impl Default for ScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture for ScreenCapture {
    fn capture(&self) -> Result<RgbaImage> {
        let monitor = self.find_monitor()?;
        let img = monitor.capture_image()?;
        check_limits(&img)?;
        Ok(img)
    }
}
