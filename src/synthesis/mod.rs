//! # Speech Synthesis
//!
//! Reply text in, container-framed audio out. The adapter contract:
//! - non-blank input yields audio with a non-empty sample payload, or
//! - a `SynthesisFailure` (or `FormatInvariantViolation` when the service
//!   returned something that is not a recognizable container)
//!
//! The audio stays in memory and belongs to the turn that requested it; nothing
//! is written to a shared output path.

pub mod google;

use crate::audio::container::parse_wav;
use crate::audio::frame::{AudioEncoding, AudioParams};
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::Serialize;

pub use google::CloudTtsClient;

/// Static voice selection, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceConfig {
    /// BCP-47 language code, e.g. `en-US`
    pub language_code: String,
    /// Provider voice name; `None` lets the provider choose
    pub voice_name: Option<String>,
    /// `NEUTRAL`, `FEMALE` or `MALE`
    pub ssml_gender: String,
}

impl VoiceConfig {
    pub fn from_config(config: &crate::config::SynthesisConfig) -> Self {
        let voice_name = config.voice_name.trim();
        Self {
            language_code: config.language_code.clone(),
            voice_name: if voice_name.is_empty() {
                None
            } else {
                Some(voice_name.to_string())
            },
            ssml_gender: config.ssml_gender.clone(),
        }
    }
}

/// Container-framed audio as returned by synthesis.
///
/// ## Layout:
/// `bytes[..header_len]` is the container header, `bytes[header_len..]` the raw
/// samples in `params` format.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    bytes: Vec<u8>,
    header_len: usize,
    params: AudioParams,
}

impl SynthesizedAudio {
    pub fn new(bytes: Vec<u8>, header_len: usize, params: AudioParams) -> Self {
        Self {
            bytes,
            header_len,
            params,
        }
    }

    /// Read header length and sample format from a WAV buffer.
    ///
    /// Chunks after `data` (`LIST` metadata, padding) are cut off so they never
    /// reach the caller as audio.
    pub fn from_wav(mut bytes: Vec<u8>) -> Result<Self, PipelineError> {
        let layout = parse_wav(&bytes)?;
        let params = AudioParams {
            encoding: AudioEncoding::Mulaw,
            sample_rate: layout.sample_rate,
            channels: layout.channels,
        };
        if !layout.matches(&params) {
            return Err(PipelineError::FormatInvariantViolation(format!(
                "unsupported WAV sample format (tag {}, {} bits)",
                layout.format_tag, layout.bits_per_sample
            )));
        }

        bytes.truncate(layout.data_offset + layout.data_len);
        Ok(Self::new(bytes, layout.data_offset, params))
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn params(&self) -> AudioParams {
        self.params
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of sample bytes after the header.
    pub fn payload_len(&self) -> usize {
        self.bytes.len().saturating_sub(self.header_len)
    }
}

/// A text-to-speech backend.
///
/// ## Rust Concepts:
/// - **async_trait**: lets the orchestrator hold `Arc<dyn SpeechSynthesizer>`
///   and swap the real client for a fake in tests
/// - **Send + Sync**: one client is shared by every call
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<SynthesizedAudio, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::container::wrap_wav;
    use crate::config::AppConfig;

    #[test]
    fn test_from_wav_reads_layout() {
        let audio = SynthesizedAudio::from_wav(wrap_wav(&AudioParams::TELEPHONY, &[9; 16])).unwrap();
        assert_eq!(audio.header_len(), 44);
        assert_eq!(audio.payload_len(), 16);
        assert_eq!(audio.params(), AudioParams::TELEPHONY);
    }

    #[test]
    fn test_from_wav_rejects_pcm() {
        // 16-bit linear PCM header, as a LINEAR16 request would return
        let mut bytes = wrap_wav(&AudioParams::TELEPHONY, &[0; 8]);
        bytes[20] = 1;
        bytes[34] = 16;
        let err = SynthesizedAudio::from_wav(bytes).unwrap_err();
        assert!(matches!(err, PipelineError::FormatInvariantViolation(_)));
    }

    #[test]
    fn test_voice_config_from_config() {
        let mut config = AppConfig::default().synthesis;
        assert_eq!(VoiceConfig::from_config(&config).voice_name, None);

        config.voice_name = "en-US-Standard-C".to_string();
        let voice = VoiceConfig::from_config(&config);
        assert_eq!(voice.voice_name.as_deref(), Some("en-US-Standard-C"));
        assert_eq!(voice.language_code, "en-US");
    }
}
