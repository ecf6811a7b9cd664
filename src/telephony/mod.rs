//! # Telephony Provider Glue
//!
//! The thin edges around the call pipeline:
//! - `twiml`: call-setup markup that greets the caller and connects the media stream
//! - `twilio`: REST client for placing outbound calls
//! - `media`: the provider's JSON event envelope, for streams that wrap audio in text frames

pub mod media;
pub mod twilio;
pub mod twiml;

pub use media::MediaEvent;
pub use twilio::TwilioClient;
