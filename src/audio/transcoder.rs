//! # Audio Transcoder
//!
//! Turns synthesized container audio into the raw payload the telephony
//! transport plays. Synthesis is asked for the telephony format up front, so
//! "transcoding" is only the removal of a fixed-size header. The header size is
//! a deployment contract: if the service ever returns a different layout, the
//! turn fails loudly instead of playing a header as noise or clipping audio.

use crate::audio::frame::AudioParams;
use crate::error::PipelineError;
use crate::synthesis::SynthesizedAudio;

/// Strips the configured container header from synthesized audio.
///
/// ## Rust Concepts:
/// - **Copy**: the transcoder is two small fields, so every session gets its own
///   copy without any sharing
#[derive(Debug, Clone, Copy)]
pub struct Transcoder {
    header_len: usize,
    target: AudioParams,
}

impl Transcoder {
    pub fn new(header_len: usize, target: AudioParams) -> Self {
        Self { header_len, target }
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Return the raw codec payload of `audio`.
    ///
    /// ## Errors (`FormatInvariantViolation`):
    /// - the container header is not exactly the configured length
    /// - the samples are not in the telephony format
    /// - there is nothing after the header
    pub fn transcode(&self, audio: &SynthesizedAudio) -> Result<Vec<u8>, PipelineError> {
        if audio.header_len() != self.header_len {
            return Err(PipelineError::FormatInvariantViolation(format!(
                "container header is {} bytes, expected {}",
                audio.header_len(),
                self.header_len
            )));
        }

        if audio.params() != self.target {
            return Err(PipelineError::FormatInvariantViolation(format!(
                "synthesized audio is {:?} at {} Hz x{}, transport expects {:?} at {} Hz x{}",
                audio.params().encoding,
                audio.params().sample_rate,
                audio.params().channels,
                self.target.encoding,
                self.target.sample_rate,
                self.target.channels
            )));
        }

        let bytes = audio.as_bytes();
        if bytes.len() <= self.header_len {
            return Err(PipelineError::FormatInvariantViolation(format!(
                "container holds {} bytes, nothing after the {}-byte header",
                bytes.len(),
                self.header_len
            )));
        }

        Ok(bytes[self.header_len..].to_vec())
    }
}
