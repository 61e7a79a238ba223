//! Record a capture source as a numbered PNG sequence and splice it into a
//! lossless video with ffmpeg.
//!
//! The [`Recorder`] is driven by its host: call [`Recorder::tick`] once per
//! host frame with the elapsed time and it captures at the configured frame
//! rate. [`Recorder::stop`] hands the sequence to the [`Encoder`].

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod recording;

pub use capture::{CaptureTarget, FrameCapture, ScreenFrameCapture};
pub use config::{Config, FfmpegInstall};
pub use encoder::{EncodeJob, EncodeStatus, Encoder, FfmpegEncoder, Installations};
pub use error::{RecorderError, RecorderResult};
pub use recording::{FramePacer, Recorder, RecordingState, Session, StopReport};
