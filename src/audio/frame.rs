//! # Telephony Audio Frames
//!
//! The telephony stream carries headerless mu-law audio at 8 kHz, mono. Every
//! binary WebSocket message is one fragment of that stream, of whatever length
//! the provider chose to send.

use serde::Serialize;

/// Frames below this size usually mean the caller's line is silent.
pub const SMALL_FRAME_BYTES: usize = 100;

/// Sample encodings understood by the bridge.
///
/// Only mu-law travels over the telephony link; the enum exists so the
/// recognition binding and the container check name the encoding explicitly
/// instead of passing bare strings around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Mulaw,
}

impl AudioEncoding {
    /// Name used in recognition query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mulaw => "mulaw",
        }
    }

    /// `wFormatTag` value of this encoding inside a WAV `fmt ` chunk.
    pub fn wav_format_tag(&self) -> u16 {
        match self {
            AudioEncoding::Mulaw => 7,
        }
    }

    /// Bits per stored sample.
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            AudioEncoding::Mulaw => 8,
        }
    }
}

/// Encoding, sample rate and channel count of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioParams {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioParams {
    /// The one format the telephony link speaks in both directions.
    pub const TELEPHONY: AudioParams = AudioParams {
        encoding: AudioEncoding::Mulaw,
        sample_rate: 8000,
        channels: 1,
    };

    /// Bytes of audio per second of signal.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * u32::from(self.channels) * u32::from(self.encoding.bits_per_sample())
            / 8
    }
}

/// One inbound fragment of caller audio.
///
/// ## Ownership:
/// The frame owns its bytes so it can move through the session's forwarding
/// queue into the recognition writer without copying again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of this frame at telephony rate.
    pub fn duration_ms(&self) -> u64 {
        self.data.len() as u64 * 1000 / u64::from(AudioParams::TELEPHONY.bytes_per_second())
    }

    pub fn is_suspiciously_small(&self) -> bool {
        self.data.len() < SMALL_FRAME_BYTES
    }
}
