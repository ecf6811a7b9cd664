//! # Streaming Recognition
//!
//! A call's audio is transcribed by one continuous upstream session, opened with
//! the telephony audio parameters and kept for the whole call.
//!
//! ## Pieces:
//! - **RecognitionProvider**: opens an upstream session for fixed `AudioParams`
//! - **RecognitionStream**: the write side (`write` frames in order, `close` once)
//! - **RecognitionEvent**: raw upstream results and errors on an mpsc channel
//! - **TranscriptStream**: the read side as a lazy, finite `Stream` of
//!   `TranscriptEvent`s. It ends when the upstream ends and, after yielding a
//!   terminal error, never yields again.

pub mod streaming;

use crate::audio::frame::{AudioFrame, AudioParams};
use crate::error::PipelineError;
use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub use streaming::StreamingRecognizer;

/// What the upstream reported.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// A (possibly interim) transcript
    Result { text: String, is_final: bool },
    /// Terminal upstream error
    Failed(PipelineError),
}

/// One transcript as seen by the call session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEvent {
    pub session_id: String,
    /// Position among all results of this session, starting at 1
    pub seq: u64,
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    /// Whether this result should start a turn.
    pub fn is_actionable(&self) -> bool {
        self.is_final && !self.text.trim().is_empty()
    }
}

/// Write side of an upstream recognition session.
#[async_trait]
pub trait RecognitionStream: Send {
    /// Forward one frame. Called strictly in arrival order by a single task.
    async fn write(&mut self, frame: AudioFrame) -> Result<(), PipelineError>;

    /// Flush and finalize the upstream session.
    async fn close(&mut self) -> Result<(), PipelineError>;
}

/// An opened upstream session: the writer plus its event channel.
pub struct RecognitionSession {
    pub writer: Box<dyn RecognitionStream>,
    pub events: mpsc::Receiver<RecognitionEvent>,
}

/// Opens recognition sessions bound to one audio format.
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    async fn open(&self, params: AudioParams) -> Result<RecognitionSession, PipelineError>;
}

/// Numbered, session-tagged view of an upstream event channel.
///
/// ## Rust Concepts:
/// - **Stream**: the async counterpart of `Iterator`; consumers call
///   `StreamExt::next().await`
/// - **Unpin**: every field is `Unpin`, so `poll_next` can use `Pin::new`
///   on the inner stream without unsafe projection
pub struct TranscriptStream {
    inner: ReceiverStream<RecognitionEvent>,
    session_id: String,
    next_seq: u64,
    finished: bool,
}

impl TranscriptStream {
    pub fn new(events: mpsc::Receiver<RecognitionEvent>, session_id: impl Into<String>) -> Self {
        Self {
            inner: ReceiverStream::new(events),
            session_id: session_id.into(),
            next_seq: 1,
            finished: false,
        }
    }
}

impl Stream for TranscriptStream {
    type Item = Result<TranscriptEvent, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(RecognitionEvent::Result { text, is_final }) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                Poll::Ready(Some(Ok(TranscriptEvent {
                    session_id: self.session_id.clone(),
                    seq,
                    text,
                    is_final,
                })))
            }
            Some(RecognitionEvent::Failed(err)) => {
                // Terminal: stop the producer and end the stream after this item.
                self.finished = true;
                self.inner.close();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                self.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_transcript_stream_numbers_results() {
        let (tx, rx) = mpsc::channel(8);
        let mut stream = TranscriptStream::new(rx, "s1");

        tx.send(RecognitionEvent::Result {
            text: "what are".into(),
            is_final: false,
        })
        .await
        .unwrap();
        tx.send(RecognitionEvent::Result {
            text: "what are your hours".into(),
            is_final: true,
        })
        .await
        .unwrap();
        drop(tx);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.seq, 1);
        assert!(!first.is_actionable());

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.seq, 2);
        assert_eq!(second.session_id, "s1");
        assert!(second.is_actionable());

        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_transcript_stream_ends_after_error() {
        let (tx, rx) = mpsc::channel(8);
        let mut stream = TranscriptStream::new(rx, "s1");

        tx.send(RecognitionEvent::Failed(PipelineError::RecognitionFailure(
            "socket reset".into(),
        )))
        .await
        .unwrap();

        assert!(matches!(
            stream.next().await,
            Some(Err(PipelineError::RecognitionFailure(_)))
        ));
        assert!(stream.next().await.is_none());

        // The producer side observes the closed channel.
        assert!(tx
            .send(RecognitionEvent::Result {
                text: "late".into(),
                is_final: true
            })
            .await
            .is_err());
    }

    #[test]
    fn test_blank_final_is_not_actionable() {
        let event = TranscriptEvent {
            session_id: "s".into(),
            seq: 1,
            text: "   ".into(),
            is_final: true,
        };
        assert!(!event.is_actionable());
    }
}
