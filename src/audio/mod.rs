//! # Audio Module
//!
//! Everything the bridge knows about audio bytes:
//!
//! - **frame**: inbound telephony fragments and the fixed telephony format
//! - **container**: WAV/RIFF header layout (parse and build)
//! - **transcoder**: synthesized container audio → raw telephony payload
//! - **capture**: optional per-call recording of inbound audio
//!
//! ## Audio Format:
//! - **Encoding**: mu-law (G.711), 8 bits per sample
//! - **Sample Rate**: 8 kHz
//! - **Channels**: mono, caller track only
//!
//! No resampling happens anywhere: synthesis is asked for this exact format.

pub mod capture;
pub mod container;
pub mod frame;
pub mod transcoder;

pub use frame::{AudioFrame, AudioParams};
pub use transcoder::Transcoder;
