mod install;

pub use install::{is_global_installed, is_local_installed, probe, resolve, Installations};

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::EncoderConfig;
use crate::error::{RecorderError, RecorderResult};

const STDERR_TAIL_LINES: usize = 20;

/// One PNG-sequence-to-video conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    pub frame_rate: u32,
    /// printf-style input such as `.../frame_%d.png`.
    pub input_pattern: PathBuf,
    pub output: PathBuf,
}

impl EncodeJob {
    /// `-y -r <rate> -i <pattern> -vcodec libx264 -crf 0 <output>`
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-r".into(),
            self.frame_rate.to_string().into(),
            "-i".into(),
            self.input_pattern.clone().into_os_string(),
            "-vcodec".into(),
            "libx264".into(),
            "-crf".into(),
            "0".into(),
            self.output.clone().into_os_string(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStatus {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl EncodeStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait Encoder {
    /// Runs the job to completion.
    fn encode(&self, job: &EncodeJob) -> RecorderResult<EncodeStatus>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Detects installations and uses the one selected in `config`.
    pub fn from_config(config: &EncoderConfig) -> RecorderResult<Self> {
        let found = Installations::detect(config);
        let program = resolve(config, found)?;
        tracing::info!(program = %program.display(), install = config.install.display_name(), "Using ffmpeg");
        Ok(Self::new(program))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl Encoder for FfmpegEncoder {
    fn encode(&self, job: &EncodeJob) -> RecorderResult<EncodeStatus> {
        let args = job.args();
        tracing::debug!(program = %self.program.display(), ?args, "Running ffmpeg");

        let start = std::time::Instant::now();
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RecorderError::configuration(format!(
                    "ffmpeg executable not found: {}",
                    self.program.display()
                )),
                io::ErrorKind::PermissionDenied => RecorderError::configuration(format!(
                    "ffmpeg at {} cannot be executed: {}",
                    self.program.display(),
                    e
                )),
                _ => RecorderError::Io(e),
            })?;

        let status = EncodeStatus {
            code: output.status.code(),
        };
        if status.success() {
            tracing::info!(
                output = %job.output.display(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "ffmpeg finished"
            );
        } else {
            tracing::warn!(
                code = ?status.code,
                stderr = %stderr_tail(&output.stderr),
                "ffmpeg exited with failure"
            );
        }
        Ok(status)
    }
}
