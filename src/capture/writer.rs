use image::{ImageFormat, RgbaImage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{RecorderError, RecorderResult};

struct PendingFrame {
    path: PathBuf,
    image: RgbaImage,
}

/// Encodes frames to PNG on a dedicated thread.
///
/// The queue is bounded so a slow disk throttles capture instead of piling
/// frames up in memory. The thread exits on the first failed write and raises
/// the `failed` flag so callers can stop queueing frames behind the gap.
pub struct PngWriter {
    tx: Option<SyncSender<PendingFrame>>,
    handle: Option<JoinHandle<RecorderResult<usize>>>,
    failed: Arc<AtomicBool>,
}

impl PngWriter {
    pub fn spawn(queue_len: usize) -> Self {
        let (tx, rx) = sync_channel::<PendingFrame>(queue_len.max(1));
        let failed = Arc::new(AtomicBool::new(false));
        let thread_failed = Arc::clone(&failed);

        let handle = thread::spawn(move || -> RecorderResult<usize> {
            let mut written = 0usize;
            for frame in rx {
                if let Err(source) = frame.image.save_with_format(&frame.path, ImageFormat::Png) {
                    thread_failed.store(true, Ordering::Release);
                    return Err(RecorderError::Write {
                        path: frame.path,
                        source,
                    });
                }
                written += 1;
            }
            Ok(written)
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
            failed,
        }
    }

    /// True once a write has failed; nothing queued after it reaches disk.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn submit(&mut self, path: PathBuf, image: RgbaImage) -> RecorderResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RecorderError::capture("PNG writer already finished"))?;
        tx.send(PendingFrame { path, image })
            .map_err(|_| RecorderError::capture("PNG writer stopped"))
    }

    /// Closes the queue and waits for the thread. Returns the number of frames
    /// written.
    pub fn finish(mut self) -> RecorderResult<usize> {
        self.tx.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RecorderError::capture("PNG writer panicked"))?,
            None => Ok(0),
        }
    }
}

impl Drop for PngWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
