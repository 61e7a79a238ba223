use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_FRAME_RATE: u32 = 1;
pub const MAX_FRAME_RATE: u32 = 240;
pub const MIN_SIZE_MULTIPLIER: u32 = 1;
pub const MAX_SIZE_MULTIPLIER: u32 = 4;
const MAX_NAME_LEN: usize = 128;

const DEFAULT_FRAME_PREFIX: &str = "frame_";
const DEFAULT_VIDEO_NAME: &str = "sequence_.mkv";
const DEFAULT_FRAME_RATE: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Parent of every timestamped session directory.
    pub directory: PathBuf,
    /// Image sequence file name; frames are written as `<prefix><n>.png`.
    pub frame_prefix: String,
    pub video_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub frame_rate: u32,
    /// Integer scale applied to every captured frame.
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: u32,
}

fn default_size_multiplier() -> u32 {
    MIN_SIZE_MULTIPLIER
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FfmpegInstall {
    #[default]
    Global,
    Local,
}

impl FfmpegInstall {
    pub fn display_name(&self) -> &'static str {
        match self {
            FfmpegInstall::Global => "global",
            FfmpegInstall::Local => "local",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            FfmpegInstall::Global => FfmpegInstall::Local,
            FfmpegInstall::Local => FfmpegInstall::Global,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub install: FfmpegInstall,
    /// Whether `ffmpeg` answered on PATH at the last check.
    pub global_found: bool,
    /// Whether `local_path` existed at the last check.
    pub local_found: bool,
    pub local_path: PathBuf,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            install: FfmpegInstall::Global,
            global_found: false,
            local_found: false,
            local_path: default_local_ffmpeg(),
        }
    }
}

fn default_local_ffmpeg() -> PathBuf {
    let exe = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    let base = ProjectDirs::from("com", "lossless-recorder", "lossless-recorder")
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("ffmpeg").join("bin").join(exe)
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.capture.frame_rate < MIN_FRAME_RATE || self.capture.frame_rate > MAX_FRAME_RATE {
            return Err(anyhow!(
                "frame_rate must be between {} and {}",
                MIN_FRAME_RATE,
                MAX_FRAME_RATE
            ));
        }
        if self.capture.size_multiplier < MIN_SIZE_MULTIPLIER
            || self.capture.size_multiplier > MAX_SIZE_MULTIPLIER
        {
            return Err(anyhow!(
                "size_multiplier must be between {} and {}",
                MIN_SIZE_MULTIPLIER,
                MAX_SIZE_MULTIPLIER
            ));
        }
        if self.output.directory.as_os_str().is_empty() {
            return Err(anyhow!("output directory path is empty"));
        }
        if !is_plain_file_name(&self.output.frame_prefix) {
            return Err(anyhow!("frame_prefix must be a plain file name"));
        }
        // ffmpeg would read a `%` in the prefix as part of the input pattern.
        if self.output.frame_prefix.contains('%') {
            return Err(anyhow!("frame_prefix must not contain '%'"));
        }
        if !is_plain_file_name(&self.output.video_name) {
            return Err(anyhow!("video_name must be a plain file name"));
        }
        Ok(())
    }

    fn sanitize(&mut self) {
        self.capture.frame_rate = self.capture.frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        self.capture.size_multiplier = self
            .capture
            .size_multiplier
            .clamp(MIN_SIZE_MULTIPLIER, MAX_SIZE_MULTIPLIER);

        if !is_plain_file_name(&self.output.frame_prefix) || self.output.frame_prefix.contains('%') {
            self.output.frame_prefix = DEFAULT_FRAME_PREFIX.to_string();
        }
        if !is_plain_file_name(&self.output.video_name) {
            self.output.video_name = DEFAULT_VIDEO_NAME.to_string();
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let videos_dir = directories::UserDirs::new()
            .and_then(|d| d.video_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            output: OutputConfig {
                directory: videos_dir.join("lossless-recorder"),
                frame_prefix: DEFAULT_FRAME_PREFIX.to_string(),
                video_name: DEFAULT_VIDEO_NAME.to_string(),
            },
            capture: CaptureConfig {
                frame_rate: DEFAULT_FRAME_RATE,
                size_multiplier: MIN_SIZE_MULTIPLIER,
            },
            encoder: EncoderConfig::default(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "lossless-recorder", "lossless-recorder")
            .map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.sanitize();
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("No config directory available"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}
