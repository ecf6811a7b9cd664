//! # Debug Audio Capture
//!
//! Optional per-call recording of the caller's raw audio, for listening to what
//! the recognizer actually received. Each call writes its own files, named by
//! session id, so concurrent calls never interleave:
//!
//! - `<dir>/<session_id>-inbound.raw`: headerless mu-law as it arrived
//! - `<dir>/<session_id>-inbound.wav`: the same bytes behind a WAV header,
//!   written when the call ends, playable with any audio tool
//!
//! ## Real-time Safety:
//! The media path only ever calls `try_send` on a bounded queue. A slow disk
//! drops capture frames (and logs it); it never delays recognition.

use crate::audio::container::wav_header;
use crate::audio::frame::{AudioFrame, AudioParams};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where and how much to capture.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub dir: PathBuf,
    pub queue_capacity: usize,
}

/// Handle held by a call session while capture is running.
pub struct DebugCapture {
    tx: mpsc::Sender<Vec<u8>>,
    writer: JoinHandle<()>,
    dropped: u64,
}

impl DebugCapture {
    /// Start the writer task for one session.
    pub fn start(settings: &CaptureSettings, session_id: &str) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let raw_path = settings.dir.join(format!("{}-inbound.raw", session_id));
        let wav_path = settings.dir.join(format!("{}-inbound.wav", session_id));
        let session_id = session_id.to_string();

        let writer = tokio::spawn(async move {
            if let Err(err) = write_capture(rx, &raw_path, &wav_path).await {
                warn!(session_id = %session_id, error = %err, "Debug capture failed");
            } else {
                info!(session_id = %session_id, path = %wav_path.display(), "Debug capture saved");
            }
        });

        Self {
            tx,
            writer,
            dropped: 0,
        }
    }

    /// Queue a copy of an inbound frame. Never waits.
    pub fn record(&mut self, frame: &AudioFrame) {
        if self.tx.try_send(frame.as_bytes().to_vec()).is_err() {
            self.dropped += 1;
            debug!(dropped = self.dropped, "Debug capture queue full, frame skipped");
        }
    }

    /// Stop accepting frames; the writer drains the queue and finalizes the files.
    ///
    /// The returned handle completes once both files are on disk.
    pub fn finish(self) -> JoinHandle<()> {
        drop(self.tx);
        self.writer
    }
}

async fn write_capture(
    mut rx: mpsc::Receiver<Vec<u8>>,
    raw_path: &Path,
    wav_path: &Path,
) -> std::io::Result<()> {
    if let Some(dir) = raw_path.parent() {
        fs::create_dir_all(dir).await?;
    }

    let mut raw = OpenOptions::new()
        .create(true)
        .append(true)
        .open(raw_path)
        .await?;
    while let Some(chunk) = rx.recv().await {
        raw.write_all(&chunk).await?;
    }
    raw.flush().await?;
    drop(raw);

    let samples = fs::read(raw_path).await?;
    let mut wav = File::create(wav_path).await?;
    wav.write_all(&wav_header(&AudioParams::TELEPHONY, samples.len() as u32))
        .await?;
    wav.write_all(&samples).await?;
    wav.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::container::parse_wav;

    #[tokio::test]
    async fn test_capture_writes_raw_and_wav() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CaptureSettings {
            dir: dir.path().to_path_buf(),
            queue_capacity: 16,
        };

        let mut capture = DebugCapture::start(&settings, "call-1");
        capture.record(&AudioFrame::new(vec![1, 2, 3]));
        capture.record(&AudioFrame::new(vec![4, 5]));
        capture.finish().await.unwrap();

        let raw = std::fs::read(dir.path().join("call-1-inbound.raw")).unwrap();
        assert_eq!(raw, vec![1, 2, 3, 4, 5]);

        let wav = std::fs::read(dir.path().join("call-1-inbound.wav")).unwrap();
        let layout = parse_wav(&wav).unwrap();
        assert_eq!(layout.data_offset, 44);
        assert_eq!(&wav[44..], &[1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_sessions_write_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CaptureSettings {
            dir: dir.path().to_path_buf(),
            queue_capacity: 16,
        };

        let mut first = DebugCapture::start(&settings, "a");
        let mut second = DebugCapture::start(&settings, "b");
        first.record(&AudioFrame::new(vec![0xAA]));
        second.record(&AudioFrame::new(vec![0xBB]));
        first.finish().await.unwrap();
        second.finish().await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("a-inbound.raw")).unwrap(), vec![0xAA]);
        assert_eq!(std::fs::read(dir.path().join("b-inbound.raw")).unwrap(), vec![0xBB]);
    }
}
