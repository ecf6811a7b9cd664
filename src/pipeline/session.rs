//! # Call Session
//!
//! One `CallSession` per media connection. Opening it starts a recognition
//! stream and three tasks that live exactly as long as the call:
//!
//! ```text
//! on_inbound_frame ─► [bounded queue] ─► pump ─► RecognitionStream::write
//!                                                         │
//!     TranscriptStream ◄───────── upstream results ◄──────┘
//!            │
//!        forwarder ─► TranscriptSlot ─► orchestrator ─► AudioSink
//! ```
//!
//! ## Ordering:
//! The socket handler pushes frames into one FIFO queue and a single pump task
//! writes them upstream, so frames reach recognition in arrival order.
//!
//! ## Teardown:
//! `close` flips a watch flag with `send_replace`, which reports the previous
//! value. Only the caller that saw `false` releases resources, so an explicit
//! hang-up racing a transport error still tears down once. Dropping the queue
//! sender lets the pump drain what is queued and then close the recognition
//! stream exactly once. The drain is bounded: if upstream writes stall past
//! `CLOSE_FLUSH_WINDOW`, the pending write and the rest of the queue are dropped
//! and the stream is closed anyway.

use crate::audio::capture::DebugCapture;
use crate::audio::frame::{AudioFrame, AudioParams};
use crate::error::PipelineError;
use crate::pipeline::orchestrator::{TurnOrchestrator, TurnState};
use crate::pipeline::slot::TranscriptSlot;
use crate::pipeline::sink::AudioSink;
use crate::pipeline::PipelineServices;
use crate::recognition::{RecognitionSession, RecognitionStream, TranscriptStream};
use crate::state::SharedMetrics;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// How long queued frames may keep flowing upstream once the session closes.
const CLOSE_FLUSH_WINDOW: Duration = Duration::from_millis(250);

/// State shared by the session handle and its tasks.
pub(crate) struct SessionCore {
    id: String,
    closed: watch::Sender<bool>,
    frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    slot: Arc<TranscriptSlot>,
    capture: Mutex<Option<DebugCapture>>,
    capture_writer: Mutex<Option<JoinHandle<()>>>,
    sink: Arc<dyn AudioSink>,
    metrics: SharedMetrics,
}

impl SessionCore {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Release the session's resources. Returns `false` if already closed.
    pub(crate) fn close(&self, reason: &str) -> bool {
        if self.closed.send_replace(true) {
            return false;
        }

        drop(lock(&self.frames).take());
        self.slot.close();
        if let Some(capture) = lock(&self.capture).take() {
            *lock(&self.capture_writer) = Some(capture.finish());
        }

        info!(session_id = %self.id, reason, "Call session closed");
        true
    }

    /// Close because of a pipeline error and drop the telephony connection.
    pub(crate) fn fail(&self, err: PipelineError) {
        if self.close(err.kind()) {
            if matches!(err, PipelineError::RecognitionFailure(_)) {
                self.metrics.record(|m| m.recognition_failures += 1);
            }
            error!(session_id = %self.id, kind = err.kind(), error = %err, "Call ended by pipeline error");
            self.sink.hang_up();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one live call.
pub struct CallSession {
    core: Arc<SessionCore>,
    state: watch::Receiver<TurnState>,
    tasks: Vec<JoinHandle<()>>,
}

impl CallSession {
    /// Open the recognition stream and start the session's tasks.
    ///
    /// Fails with `RecognitionFailure` if the upstream cannot be opened; nothing
    /// is left running in that case.
    pub async fn open(
        services: &PipelineServices,
        sink: Arc<dyn AudioSink>,
    ) -> Result<Self, PipelineError> {
        let id = Uuid::new_v4().to_string();
        let RecognitionSession { writer, events } =
            services.recognizer.open(AudioParams::TELEPHONY).await?;

        let (frames_tx, frames_rx) = mpsc::channel(services.frame_queue_capacity.max(1));
        let (closed_tx, _) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(TurnState::Idle);
        let slot = Arc::new(TranscriptSlot::new());
        let capture = services
            .capture
            .as_ref()
            .map(|settings| DebugCapture::start(settings, &id));

        let core = Arc::new(SessionCore {
            id: id.clone(),
            closed: closed_tx,
            frames: Mutex::new(Some(frames_tx)),
            slot: slot.clone(),
            capture: Mutex::new(capture),
            capture_writer: Mutex::new(None),
            sink: sink.clone(),
            metrics: services.metrics.clone(),
        });

        let orchestrator = TurnOrchestrator::new(
            core.clone(),
            services.generator.clone(),
            services.synthesizer.clone(),
            services.transcoder,
            services.turns.clone(),
            sink,
            state_tx,
            services.metrics.clone(),
        );

        let tasks = vec![
            tokio::spawn(pump_frames(writer, frames_rx, core.clone())),
            tokio::spawn(forward_transcripts(
                TranscriptStream::new(events, id.clone()),
                core.clone(),
            )),
            tokio::spawn(orchestrator.run(slot)),
        ];

        info!(session_id = %id, "Call session opened");
        Ok(Self {
            core,
            state: state_rx,
            tasks,
        })
    }

    pub fn id(&self) -> &str {
        self.core.id()
    }

    pub fn is_open(&self) -> bool {
        !self.core.is_closed()
    }

    pub fn turn_state(&self) -> TurnState {
        *self.state.borrow()
    }

    /// Queue one inbound frame for recognition. Never waits.
    ///
    /// A full queue drops the frame and counts it; a closed session is a
    /// `TransportError`.
    pub fn on_inbound_frame(&self, frame: AudioFrame) -> Result<(), PipelineError> {
        let frames = lock(&self.core.frames);
        let Some(tx) = frames.as_ref() else {
            return Err(PipelineError::TransportError(
                "frame received after session close".to_string(),
            ));
        };

        if frame.is_suspiciously_small() {
            debug!(
                session_id = %self.core.id,
                bytes = frame.len(),
                ms = frame.duration_ms(),
                "Small audio frame received"
            );
        }
        if let Some(capture) = lock(&self.core.capture).as_mut() {
            capture.record(&frame);
        }

        let metrics = &self.core.metrics;
        match tx.try_send(frame) {
            Ok(()) => {
                metrics.record(|m| m.frames_received += 1);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session_id = %self.core.id, "Recognition queue full, frame dropped");
                metrics.record(|m| {
                    m.frames_received += 1;
                    m.frames_dropped += 1;
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PipelineError::TransportError(
                "recognition writer has stopped".to_string(),
            )),
        }
    }

    /// Idempotent teardown. Returns `true` only for the call that closed it.
    pub fn close(&self, reason: &str) -> bool {
        self.core.close(reason)
    }

    /// Wait until every task of the session has finished.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(session_id = %self.core.id, error = %e, "Session task panicked");
            }
        }
        let capture_writer = lock(&self.core.capture_writer).take();
        if let Some(writer) = capture_writer {
            let _ = writer.await;
        }
    }
}

async fn pump_frames(
    mut writer: Box<dyn RecognitionStream>,
    mut frames: mpsc::Receiver<AudioFrame>,
    core: Arc<SessionCore>,
) {
    let mut closed = core.closed.subscribe();
    let flush_deadline = async {
        let _ = closed.wait_for(|closed| *closed).await;
        tokio::time::sleep(CLOSE_FLUSH_WINDOW).await;
    };
    tokio::pin!(flush_deadline);

    loop {
        let frame = tokio::select! {
            frame = frames.recv() => frame,
            _ = &mut flush_deadline => {
                warn!(session_id = %core.id, "Recognition write stalled after close, abandoning queued audio");
                break;
            }
        };
        let Some(frame) = frame else { break };

        tokio::select! {
            result = writer.write(frame) => {
                if let Err(err) = result {
                    core.fail(err);
                    break;
                }
            }
            _ = &mut flush_deadline => {
                warn!(session_id = %core.id, "Recognition write stalled after close, abandoning queued audio");
                break;
            }
        }
    }
    drop(frames);

    if let Err(err) = writer.close().await {
        debug!(session_id = %core.id, error = %err, "Recognition stream close reported an error");
    }
    core.metrics.record(|m| m.recognition_teardowns += 1);
    debug!(session_id = %core.id, "Recognition stream finalized");
}

async fn forward_transcripts(mut transcripts: TranscriptStream, core: Arc<SessionCore>) {
    let mut closed = core.closed.subscribe();

    loop {
        let next = tokio::select! {
            next = transcripts.next() => next,
            _ = closed.wait_for(|closed| *closed) => break,
        };

        match next {
            Some(Ok(event)) if event.is_final => {
                core.metrics.record(|m| m.transcripts_final += 1);
                if !event.is_actionable() {
                    trace!(session_id = %core.id, seq = event.seq, "Blank final transcript ignored");
                    continue;
                }
                debug!(session_id = %core.id, seq = event.seq, text = %event.text, "Final transcript");
                if let Some(superseded) = core.slot.offer(event) {
                    debug!(session_id = %core.id, seq = superseded.seq, "Held transcript superseded");
                    core.metrics.record(|m| m.transcripts_superseded += 1);
                }
            }
            Some(Ok(event)) => {
                trace!(session_id = %core.id, seq = event.seq, "Interim transcript suppressed");
                core.metrics.record(|m| m.transcripts_interim += 1);
            }
            Some(Err(err)) => {
                core.fail(err);
                break;
            }
            None => {
                if !core.is_closed() {
                    core.fail(PipelineError::RecognitionFailure(
                        "recognition stream ended unexpectedly".to_string(),
                    ));
                }
                break;
            }
        }
    }
}
