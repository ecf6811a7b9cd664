//! # Turn Orchestrator
//!
//! Drives one call's conversation: each held final transcript becomes one turn
//! of generate → synthesize → transcode → send, strictly one turn at a time.
//!
//! ## State Machine:
//! ```text
//! Idle ──► Listening ──► Generating ──► Synthesizing ──► Sending
//!              ▲                              │              │
//!              └──────── abort ───────────────┘              │
//!              └──────────────────── done / abort ───────────┘
//! ```
//! Any state falls back to `Idle` when the session ends.
//!
//! ## Failure policy per step:
//! - generation fails: the configured fallback reply is spoken instead
//! - synthesis fails: the turn is aborted, nothing is sent
//! - the container layout is wrong: the turn is aborted and logged at error level
//! - the transport refuses the send: the whole session is closed
//!
//! Late results are never acted on: the session's liveness is checked after
//! every external call, and a turn that finishes after close is discarded.

use crate::audio::Transcoder;
use crate::error::PipelineError;
use crate::generation::TextGenerator;
use crate::pipeline::session::SessionCore;
use crate::pipeline::slot::TranscriptSlot;
use crate::pipeline::sink::AudioSink;
use crate::recognition::TranscriptEvent;
use crate::state::SharedMetrics;
use crate::synthesis::{SpeechSynthesizer, VoiceConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Where a session's orchestrator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnState {
    Idle,
    Listening,
    Generating,
    Synthesizing,
    Sending,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Idle => "idle",
            TurnState::Listening => "listening",
            TurnState::Generating => "generating",
            TurnState::Synthesizing => "synthesizing",
            TurnState::Sending => "sending",
        }
    }

    /// Edges of the state machine. Everything else is a bug.
    pub fn can_advance_to(&self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (*self, next),
            (_, Idle)
                | (Idle, Listening)
                | (Listening, Generating)
                | (Generating, Synthesizing)
                | (Synthesizing, Sending)
                | (Synthesizing, Listening)
                | (Sending, Listening)
        )
    }
}

/// Fixed per-process inputs of every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub fallback_reply: String,
    pub voice: VoiceConfig,
}

/// One cycle of caller speech → reply audio.
#[derive(Debug, Clone)]
pub struct Turn {
    /// 1-based position among this session's turns
    pub number: u64,
    /// Transcript sequence number that started the turn
    pub transcript_seq: u64,
    pub transcript: String,
    pub reply: Option<String>,
    pub used_fallback: bool,
}

impl Turn {
    fn new(number: u64, event: &TranscriptEvent) -> Self {
        Self {
            number,
            transcript_seq: event.seq,
            transcript: event.text.trim().to_string(),
            reply: None,
            used_fallback: false,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Audio was handed to the transport
    Completed { bytes: usize },
    /// A step failed; nothing was sent
    Aborted(PipelineError),
    /// The session closed while the turn was in flight
    Discarded,
}

/// Sequential turn runner owned by a single task per session.
pub struct TurnOrchestrator {
    core: Arc<SessionCore>,
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transcoder: Transcoder,
    settings: Arc<TurnSettings>,
    sink: Arc<dyn AudioSink>,
    state: watch::Sender<TurnState>,
    metrics: SharedMetrics,
    turns: u64,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        core: Arc<SessionCore>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcoder: Transcoder,
        settings: Arc<TurnSettings>,
        sink: Arc<dyn AudioSink>,
        state: watch::Sender<TurnState>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            core,
            generator,
            synthesizer,
            transcoder,
            settings,
            sink,
            state,
            metrics,
            turns: 0,
        }
    }

    /// Run turns until the slot closes.
    pub async fn run(mut self, slot: Arc<TranscriptSlot>) {
        self.advance(TurnState::Listening);

        while let Some(event) = slot.take().await {
            if self.core.is_closed() {
                break;
            }

            let outcome = self.run_turn(&event).await;
            self.record(&outcome);

            match outcome {
                TurnOutcome::Discarded => break,
                TurnOutcome::Aborted(err) if !err.is_turn_scoped() => {
                    self.core.fail(err);
                    break;
                }
                _ => self.advance(TurnState::Listening),
            }
        }

        self.advance(TurnState::Idle);
        debug!(session_id = %self.core.id(), turns = self.turns, "Orchestrator stopped");
    }

    async fn run_turn(&mut self, event: &TranscriptEvent) -> TurnOutcome {
        self.turns += 1;
        let mut turn = Turn::new(self.turns, event);
        let session_id = self.core.id().to_string();
        info!(
            session_id = %session_id,
            turn = turn.number,
            transcript_seq = turn.transcript_seq,
            transcript = %turn.transcript,
            "Turn started"
        );

        self.advance(TurnState::Generating);
        let reply = match self
            .generator
            .generate(&self.settings.system_prompt, &turn.transcript)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                warn!(session_id = %session_id, turn = turn.number, error = %err, "Generation failed, using fallback reply");
                turn.used_fallback = true;
                self.metrics.record(|m| m.generation_fallbacks += 1);
                self.settings.fallback_reply.clone()
            }
        };
        if self.core.is_closed() {
            return TurnOutcome::Discarded;
        }
        let reply = turn.reply.insert(reply);
        debug!(session_id = %session_id, turn = turn.number, fallback = turn.used_fallback, reply = %reply, "Reply ready");

        self.advance(TurnState::Synthesizing);
        let audio = match self.synthesizer.synthesize(reply, &self.settings.voice).await {
            Ok(audio) => audio,
            Err(err) => return TurnOutcome::Aborted(err),
        };
        if self.core.is_closed() {
            return TurnOutcome::Discarded;
        }

        self.advance(TurnState::Sending);
        let payload = match self.transcoder.transcode(&audio) {
            Ok(payload) => payload,
            Err(err) => return TurnOutcome::Aborted(err),
        };
        if self.core.is_closed() {
            return TurnOutcome::Discarded;
        }

        let bytes = payload.len();
        match self.sink.send_audio(payload).await {
            Ok(()) => TurnOutcome::Completed { bytes },
            Err(err) => TurnOutcome::Aborted(err),
        }
    }

    fn record(&self, outcome: &TurnOutcome) {
        let session_id = self.core.id();
        let turn = self.turns;
        match outcome {
            TurnOutcome::Completed { bytes } => {
                info!(session_id = %session_id, turn, bytes, "Turn audio sent");
                let bytes = *bytes as u64;
                self.metrics.record(|m| {
                    m.turns_completed += 1;
                    m.outbound_bytes += bytes;
                });
            }
            TurnOutcome::Aborted(err @ PipelineError::FormatInvariantViolation(_)) => {
                error!(
                    session_id = %session_id,
                    turn,
                    kind = err.kind(),
                    error = %err,
                    "Synthesized audio does not match the transport format; check synthesis.header_len"
                );
                self.metrics.record(|m| {
                    m.turns_aborted += 1;
                    m.format_violations += 1;
                });
            }
            TurnOutcome::Aborted(err) => {
                warn!(session_id = %session_id, turn, kind = err.kind(), error = %err, "Turn aborted");
                self.metrics.record(|m| m.turns_aborted += 1);
            }
            TurnOutcome::Discarded => {
                info!(session_id = %session_id, turn, "Session closed mid-turn, result discarded");
                self.metrics.record(|m| m.turns_discarded += 1);
            }
        }
    }

    fn advance(&self, next: TurnState) {
        let current = *self.state.borrow();
        debug_assert!(
            current.can_advance_to(next),
            "illegal turn transition {:?} -> {:?}",
            current,
            next
        );
        if current != next {
            debug!(session_id = %self.core.id(), from = current.as_str(), to = next.as_str(), "Turn state");
        }
        self.state.send_replace(next);
    }
}
