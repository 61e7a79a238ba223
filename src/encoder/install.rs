use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{EncoderConfig, FfmpegInstall};
use crate::error::{RecorderError, RecorderResult};

/// Program name looked up on PATH for the global installation.
pub const GLOBAL_PROGRAM: &str = "ffmpeg";

/// Runs `<program> -version` and reports whether it exited cleanly.
pub fn probe(program: impl AsRef<OsStr>) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn is_global_installed() -> bool {
    probe(GLOBAL_PROGRAM)
}

pub fn is_local_installed(path: &Path) -> bool {
    path.is_file()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Installations {
    pub global: bool,
    pub local: bool,
}

impl Installations {
    pub fn detect(config: &EncoderConfig) -> Self {
        let found = Self {
            global: is_global_installed(),
            local: is_local_installed(&config.local_path),
        };
        tracing::debug!(global = found.global, local = found.local, "Detected ffmpeg installations");
        found
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            global: config.global_found,
            local: config.local_found,
        }
    }

    pub fn found(&self, install: FfmpegInstall) -> bool {
        match install {
            FfmpegInstall::Global => self.global,
            FfmpegInstall::Local => self.local,
        }
    }

    /// Stores the detection result in the settings' found flags.
    pub fn apply(&self, config: &mut EncoderConfig) {
        config.global_found = self.global;
        config.local_found = self.local;
    }

    /// Note for the user when the unselected installation also exists.
    pub fn hint(&self, selected: FfmpegInstall) -> Option<String> {
        let other = selected.other();
        self.found(other).then(|| {
            format!(
                "A {} ffmpeg installation was found, consider using only one to save disk space",
                other.display_name()
            )
        })
    }
}

fn program_for(install: FfmpegInstall, config: &EncoderConfig) -> PathBuf {
    match install {
        FfmpegInstall::Global => PathBuf::from(GLOBAL_PROGRAM),
        FfmpegInstall::Local => config.local_path.clone(),
    }
}

/// Picks the executable for the selected installation, failing when it is
/// missing.
pub fn resolve(config: &EncoderConfig, found: Installations) -> RecorderResult<PathBuf> {
    let selected = config.install;
    if found.found(selected) {
        return Ok(program_for(selected, config));
    }

    let mut message = match selected {
        FfmpegInstall::Global => {
            "No ffmpeg found in PATH, install ffmpeg and add it to PATH".to_string()
        }
        FfmpegInstall::Local => format!(
            "No local ffmpeg installation found at {}",
            config.local_path.display()
        ),
    };
    if found.found(selected.other()) {
        message.push_str(&format!(
            "; a {} installation is available",
            selected.other().display_name()
        ));
    }
    Err(RecorderError::configuration(message))
}
