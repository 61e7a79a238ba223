use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::encoder::EncodeJob;

const SESSION_DIR_FORMAT: &str = "%m-%d-%Y@%H-%M-%S";

/// Paths of one recording: `<dir>/<prefix><n>.png` frames and `<dir>/<video>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    directory: PathBuf,
    frame_prefix: String,
    video_name: String,
}

impl Session {
    /// A fresh session under `output.directory`, named after `started`.
    pub fn new(output: &OutputConfig, started: DateTime<Local>) -> Self {
        let name = started.format(SESSION_DIR_FORMAT).to_string();
        Self::open(output.directory.join(name), output)
    }

    /// An existing session directory, e.g. one recorded earlier.
    pub fn open(directory: impl Into<PathBuf>, output: &OutputConfig) -> Self {
        Self {
            directory: directory.into(),
            frame_prefix: output.frame_prefix.clone(),
            video_name: output.video_name.clone(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<dir>/<prefix>`; frame files append the index and `.png`.
    pub fn capture_prefix(&self) -> PathBuf {
        self.directory.join(&self.frame_prefix)
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut path = self.capture_prefix().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.with_suffix(&format!("{index}.png"))
    }

    pub fn input_pattern(&self) -> PathBuf {
        self.with_suffix("%d.png")
    }

    pub fn video_path(&self) -> PathBuf {
        self.directory.join(&self.video_name)
    }

    /// Number of consecutive frames on disk starting at index 0.
    pub fn count_frames(&self) -> u64 {
        let mut count = 0;
        while self.frame_path(count).is_file() {
            count += 1;
        }
        count
    }

    pub fn encode_job(&self, frame_rate: u32) -> EncodeJob {
        EncodeJob {
            frame_rate,
            input_pattern: self.input_pattern(),
            output: self.video_path(),
        }
    }
}
