//! # Per-Call Pipeline
//!
//! Everything that happens inside one live call: the session that owns the
//! media connection's recognition stream, the latest-wins transcript slot, and
//! the orchestrator that turns transcripts into reply audio.
//!
//! ## Rust Concepts:
//! - **Trait objects at the seams**: recognition, generation, synthesis and
//!   the outbound sink are `Arc<dyn Trait>`, so tests run whole calls against
//!   in-memory fakes
//! - **Clone is cheap**: `PipelineServices` is a bundle of `Arc`s handed to every
//!   new session

pub mod orchestrator;
pub mod session;
pub mod sink;
pub mod slot;

#[cfg(test)]
pub(crate) mod testing;

use crate::audio::capture::CaptureSettings;
use crate::audio::{AudioParams, Transcoder};
use crate::config::AppConfig;
use crate::generation::{ChatCompletionsClient, TextGenerator};
use crate::recognition::{RecognitionProvider, StreamingRecognizer};
use crate::state::SharedMetrics;
use crate::synthesis::{CloudTtsClient, SpeechSynthesizer, VoiceConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub use orchestrator::TurnSettings;
pub use session::CallSession;
pub use sink::AudioSink;

/// The shared clients and settings every call session is built from.
#[derive(Clone)]
pub struct PipelineServices {
    pub recognizer: Arc<dyn RecognitionProvider>,
    pub generator: Arc<dyn TextGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub transcoder: Transcoder,
    pub turns: Arc<TurnSettings>,
    pub frame_queue_capacity: usize,
    /// `Some` when raw inbound audio should be written to disk
    pub capture: Option<CaptureSettings>,
    pub metrics: SharedMetrics,
}

impl PipelineServices {
    /// Build the real HTTP/WebSocket clients from configuration.
    pub fn from_config(config: &AppConfig, metrics: SharedMetrics) -> anyhow::Result<Self> {
        let capture = config.debug.capture_audio.then(|| CaptureSettings {
            dir: PathBuf::from(&config.debug.capture_dir),
            queue_capacity: config.debug.capture_queue_capacity,
        });

        Ok(Self {
            recognizer: Arc::new(StreamingRecognizer::new(&config.recognition)),
            generator: Arc::new(ChatCompletionsClient::new(&config.generation)?),
            synthesizer: Arc::new(CloudTtsClient::new(&config.synthesis)?),
            transcoder: Transcoder::new(config.synthesis.header_len, AudioParams::TELEPHONY),
            turns: Arc::new(TurnSettings {
                system_prompt: config.generation.system_prompt.clone(),
                fallback_reply: config.generation.fallback_reply.clone(),
                voice: VoiceConfig::from_config(&config.synthesis),
            }),
            frame_queue_capacity: config.bridge.frame_queue_capacity,
            capture,
            metrics,
        })
    }
}
