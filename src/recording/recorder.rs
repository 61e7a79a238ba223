use chrono::{DateTime, Local};
use std::fs;
use std::path::PathBuf;

use crate::capture::FrameCapture;
use crate::config::Config;
use crate::encoder::{EncodeStatus, Encoder};
use crate::error::{RecorderError, RecorderResult};

use super::{FramePacer, RecordingState, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// Frames in the spliced sequence.
    pub frames: u64,
    /// Frames captured but lost to a failed write. Only the gap-free prefix
    /// before the first missing file is encoded.
    pub dropped: u64,
    pub video: PathBuf,
    pub status: EncodeStatus,
}

/// Drives one recording at a time: paces captures from host ticks and hands
/// the finished image sequence to the encoder.
pub struct Recorder<C, E> {
    config: Config,
    state: RecordingState,
    frame: u64,
    pacer: FramePacer,
    session: Option<Session>,
    capture: C,
    encoder: E,
}

impl<C: FrameCapture, E: Encoder> Recorder<C, E> {
    pub fn new(config: Config, capture: C, encoder: E) -> Self {
        let pacer = FramePacer::new(config.capture.frame_rate);
        Self {
            config,
            state: RecordingState::Stopped,
            frame: 0,
            pacer,
            session: None,
            capture,
            encoder,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Frames captured in the current session.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// The active session, or the last one once stopped.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn capture(&self) -> &C {
        &self.capture
    }

    #[cfg(test)]
    pub(crate) fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn start(&mut self) -> RecorderResult<&Session> {
        self.start_at(Local::now())
    }

    pub fn start_at(&mut self, now: DateTime<Local>) -> RecorderResult<&Session> {
        if self.state != RecordingState::Stopped {
            return Err(RecorderError::invalid_state("start", self.state));
        }
        self.config
            .validate()
            .map_err(|e| RecorderError::configuration(e.to_string()))?;

        let session = Session::new(&self.config.output, now);
        fs::create_dir_all(session.directory()).map_err(|e| {
            RecorderError::configuration(format!(
                "Cannot create output directory {}: {}",
                session.directory().display(),
                e
            ))
        })?;

        self.pacer = FramePacer::new(self.config.capture.frame_rate);
        self.frame = 0;
        self.state = RecordingState::Recording;
        tracing::info!(
            directory = %session.directory().display(),
            frame_rate = self.config.capture.frame_rate,
            "Recording started"
        );
        Ok(&*self.session.insert(session))
    }

    /// Feeds `delta` seconds of host time. Returns the index of the frame
    /// captured on this tick, if any.
    pub fn tick(&mut self, delta: f64) -> RecorderResult<Option<u64>> {
        if self.state != RecordingState::Recording {
            return Ok(None);
        }
        if !self.pacer.advance(delta) {
            return Ok(None);
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(None);
        };

        let index = self.frame;
        let path = session.frame_path(index);
        if let Err(err) = self.capture.capture_frame(&path) {
            tracing::warn!(frame = index, error = %err, "Frame capture failed");
            return Err(err);
        }
        tracing::trace!(frame = index, path = %path.display(), "Captured frame");

        self.frame += 1;
        self.pacer.reset();
        Ok(Some(index))
    }

    /// Ends the session and blocks while the encoder assembles the video.
    ///
    /// The recorder is back in `Stopped` whether or not the encoder succeeded.
    /// If frames were lost on the way to disk, the sequence up to the first
    /// missing file is still encoded and the report counts the rest as dropped.
    pub fn stop(&mut self) -> RecorderResult<StopReport> {
        if self.state != RecordingState::Recording {
            return Err(RecorderError::invalid_state("stop", self.state));
        }
        let session = self.session.clone().ok_or(RecorderError::NoSession)?;

        self.state = RecordingState::Stopping;
        let captured = self.frame;
        tracing::info!(frames = captured, "Stopping recording");

        let frames = match self.capture.flush() {
            Ok(()) => captured,
            Err(err) => {
                let written = session.count_frames().min(captured);
                tracing::warn!(
                    error = %err,
                    written,
                    dropped = captured - written,
                    "Not every frame reached disk, splicing the frames before the gap"
                );
                written
            }
        };
        let result = self
            .encoder
            .encode(&session.encode_job(self.config.capture.frame_rate));

        self.state = RecordingState::Stopped;
        self.frame = 0;
        self.pacer.reset();

        let status = result?;
        Ok(StopReport {
            frames,
            dropped: captured - frames,
            video: session.video_path(),
            status,
        })
    }

    /// Re-encodes the last session's image sequence.
    pub fn splice(&mut self) -> RecorderResult<EncodeStatus> {
        if self.state != RecordingState::Stopped {
            return Err(RecorderError::invalid_state("splice", self.state));
        }
        let session = self.session.as_ref().ok_or(RecorderError::NoSession)?;
        tracing::info!(directory = %session.directory().display(), "Splicing image sequence");
        self.encoder
            .encode(&session.encode_job(self.config.capture.frame_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeJob;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::path::Path;

    #[derive(Default)]
    struct FakeCapture {
        frames: Vec<PathBuf>,
        flushes: usize,
        fail: bool,
    }

    impl FrameCapture for FakeCapture {
        fn capture_frame(&mut self, path: &Path) -> RecorderResult<()> {
            if self.fail {
                return Err(RecorderError::capture("no display"));
            }
            self.frames.push(path.to_path_buf());
            Ok(())
        }

        fn flush(&mut self) -> RecorderResult<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    struct FakeEncoder {
        code: Option<i32>,
        missing: bool,
        jobs: RefCell<Vec<EncodeJob>>,
    }

    impl FakeEncoder {
        fn exiting(code: i32) -> Self {
            Self {
                code: Some(code),
                missing: false,
                jobs: RefCell::new(Vec::new()),
            }
        }

        fn missing() -> Self {
            Self {
                code: None,
                missing: true,
                jobs: RefCell::new(Vec::new()),
            }
        }
    }

    impl Encoder for FakeEncoder {
        fn encode(&self, job: &EncodeJob) -> RecorderResult<EncodeStatus> {
            self.jobs.borrow_mut().push(job.clone());
            if self.missing {
                return Err(RecorderError::configuration("ffmpeg executable not found"));
            }
            Ok(EncodeStatus { code: self.code })
        }
    }

    fn config(dir: &Path, frame_rate: u32) -> Config {
        let mut config = Config::default();
        config.output.directory = dir.to_path_buf();
        config.capture.frame_rate = frame_rate;
        config
    }

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn recorder(dir: &Path, frame_rate: u32) -> Recorder<FakeCapture, FakeEncoder> {
        Recorder::new(
            config(dir, frame_rate),
            FakeCapture::default(),
            FakeEncoder::exiting(0),
        )
    }

    #[test]
    fn test_start_creates_session_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        assert_eq!(recorder.state(), RecordingState::Stopped);

        let session_dir = recorder.start_at(started()).unwrap().directory().to_path_buf();
        assert_eq!(session_dir, dir.path().join("01-02-2024@03-04-05"));
        assert!(session_dir.is_dir());
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert_eq!(recorder.frame_count(), 0);
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        recorder.start_at(started()).unwrap();
        let err = recorder.start_at(started()).unwrap_err();
        assert!(matches!(
            err,
            RecorderError::InvalidState {
                action: "start",
                state: RecordingState::Recording
            }
        ));
    }

    #[test]
    fn test_start_fails_when_directory_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let mut recorder = recorder(&blocker, 30);
        let err = recorder.start_at(started()).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(recorder.state(), RecordingState::Stopped);
    }

    #[test]
    fn test_tick_paces_and_names_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        recorder.start_at(started()).unwrap();

        let captured: Vec<Option<u64>> = (0..8)
            .map(|_| recorder.tick(1.0 / 60.0).unwrap())
            .collect();
        assert_eq!(
            captured,
            [None, Some(0), None, Some(1), None, Some(2), None, Some(3)]
        );
        assert_eq!(recorder.frame_count(), 4);

        let session_dir = dir.path().join("01-02-2024@03-04-05");
        let expected: Vec<PathBuf> = (0..4)
            .map(|i| session_dir.join(format!("frame_{i}.png")))
            .collect();
        assert_eq!(recorder.capture().frames, expected);
    }

    #[test]
    fn test_tick_ignored_unless_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        assert_eq!(recorder.tick(1.0).unwrap(), None);
        assert_eq!(recorder.frame_count(), 0);
        assert!(recorder.capture().frames.is_empty());
    }

    #[test]
    fn test_failed_capture_keeps_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 10);
        recorder.start_at(started()).unwrap();
        assert_eq!(recorder.tick(0.1).unwrap(), Some(0));

        recorder.capture.fail = true;
        assert!(recorder.tick(0.1).is_err());
        assert_eq!(recorder.frame_count(), 1);

        recorder.capture.fail = false;
        assert_eq!(recorder.tick(0.0).unwrap(), Some(1));
        let names: Vec<String> = recorder
            .capture()
            .frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame_0.png", "frame_1.png"]);
    }

    #[test]
    fn test_stop_runs_encoder_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        recorder.start_at(started()).unwrap();
        for _ in 0..3 {
            recorder.tick(1.0 / 30.0).unwrap();
        }

        let report = recorder.stop().unwrap();
        let session_dir = dir.path().join("01-02-2024@03-04-05");
        assert_eq!(report.frames, 3);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.video, session_dir.join("sequence_.mkv"));
        assert!(report.status.success());
        assert_eq!(recorder.state(), RecordingState::Stopped);
        assert_eq!(recorder.frame_count(), 0);
        assert_eq!(recorder.capture().flushes, 1);

        let jobs = recorder.encoder().jobs.borrow();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].frame_rate, 30);
        assert_eq!(jobs[0].input_pattern, session_dir.join("frame_%d.png"));
    }

    #[test]
    fn test_stop_from_stopped_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        let err = recorder.stop().unwrap_err();
        assert!(matches!(
            err,
            RecorderError::InvalidState {
                action: "stop",
                state: RecordingState::Stopped
            }
        ));
        assert!(recorder.encoder().jobs.borrow().is_empty());
    }

    #[test]
    fn test_encoder_failure_still_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(
            config(dir.path(), 30),
            FakeCapture::default(),
            FakeEncoder::exiting(1),
        );
        recorder.start_at(started()).unwrap();
        recorder.tick(1.0).unwrap();

        let report = recorder.stop().unwrap();
        assert!(!report.status.success());
        assert_eq!(report.status.code, Some(1));
        assert_eq!(recorder.state(), RecordingState::Stopped);
    }

    #[test]
    fn test_missing_encoder_surfaces_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new(
            config(dir.path(), 30),
            FakeCapture::default(),
            FakeEncoder::missing(),
        );
        recorder.start_at(started()).unwrap();

        let err = recorder.stop().unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(recorder.state(), RecordingState::Stopped);
    }

    #[test]
    fn test_restart_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        recorder.start_at(started()).unwrap();
        recorder.tick(1.0).unwrap();
        recorder.tick(1.0).unwrap();
        recorder.stop().unwrap();

        let later = Local.with_ymd_and_hms(2024, 1, 2, 3, 5, 0).unwrap();
        recorder.start_at(later).unwrap();
        assert_eq!(recorder.frame_count(), 0);
        assert_eq!(recorder.tick(1.0).unwrap(), Some(0));
        assert!(recorder.capture().frames[2].ends_with("01-02-2024@03-05-00/frame_0.png"));
    }

    #[test]
    fn test_splice() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = recorder(dir.path(), 30);
        assert!(matches!(recorder.splice(), Err(RecorderError::NoSession)));

        recorder.start_at(started()).unwrap();
        assert!(matches!(
            recorder.splice(),
            Err(RecorderError::InvalidState { action: "splice", .. })
        ));
        recorder.stop().unwrap();

        assert!(recorder.splice().unwrap().success());
        let jobs = recorder.encoder().jobs.borrow();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0], jobs[1]);
    }

    struct Gray;

    impl crate::capture::Capture for Gray {
        fn capture(&self) -> anyhow::Result<image::RgbaImage> {
            Ok(image::RgbaImage::from_pixel(2, 2, image::Rgba([128, 128, 128, 255])))
        }
    }

    #[test]
    fn test_unwritable_frame_is_not_counted_or_spliced_past() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("01-02-2024@03-04-05");
        fs::create_dir_all(&session_dir).unwrap();
        // A directory where the second frame should go makes its write fail.
        fs::create_dir(session_dir.join("frame_1.png")).unwrap();

        let capture = crate::capture::ScreenFrameCapture::new(Box::new(Gray), 1);
        let mut recorder = Recorder::new(config(dir.path(), 10), capture, FakeEncoder::exiting(0));
        recorder.start_at(started()).unwrap();

        let mut ok = 0u64;
        for _ in 0..6 {
            if recorder.tick(0.1).is_ok() {
                ok += 1;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(recorder.frame_count(), ok);
        assert!(ok >= 2);

        let report = recorder.stop().unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(report.dropped, ok - 1);
        assert!(session_dir.join("frame_0.png").is_file());
        for i in 2..6 {
            assert!(!session_dir.join(format!("frame_{i}.png")).exists());
        }
        assert_eq!(recorder.state(), RecordingState::Stopped);
        assert_eq!(recorder.encoder().jobs.borrow().len(), 1);
    }
}
