//! The provider's JSON media-stream envelope.
//!
//! Some stream configurations deliver audio as text frames instead of raw binary:
//!
//! ```json
//! {"event":"media","streamSid":"MZ…","media":{"track":"inbound","payload":"<base64 mu-law>"}}
//! ```
//!
//! `connected`, `start`, `mark` and `stop` events carry call metadata around the
//! audio.

use crate::audio::AudioFrame;
use base64::Engine;
use serde::Deserialize;

/// One text frame from the media stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StreamStart>,
    },
    Media {
        media: MediaChunk,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkLabel>,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
    /// Anything this bridge does not act on
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaChunk {
    #[serde(default)]
    pub track: Option<String>,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarkLabel {
    pub name: String,
}

impl MediaEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl MediaChunk {
    /// Whether this chunk is the caller's audio (the only track this bridge consumes).
    pub fn is_inbound(&self) -> bool {
        self.track.as_deref().map_or(true, |track| track == "inbound")
    }

    pub fn decode(&self) -> Result<AudioFrame, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.payload.as_bytes())
            .map(AudioFrame::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_event_decodes_payload() {
        let event = MediaEvent::parse(
            r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"2","timestamp":"40","payload":"AQID"},"streamSid":"MZ1"}"#,
        )
        .unwrap();

        let MediaEvent::Media { media } = event else {
            panic!("expected media event");
        };
        assert!(media.is_inbound());
        assert_eq!(media.decode().unwrap().as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_start_and_stop_events() {
        let start = MediaEvent::parse(
            r#"{"event":"start","streamSid":"MZ1","start":{"callSid":"CA9","tracks":["inbound"],"mediaFormat":{"encoding":"audio/x-mulaw","sampleRate":8000,"channels":1}}}"#,
        )
        .unwrap();
        match start {
            MediaEvent::Start { stream_sid, start } => {
                assert_eq!(stream_sid.as_deref(), Some("MZ1"));
                assert_eq!(start.unwrap().call_sid.as_deref(), Some("CA9"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let stop = MediaEvent::parse(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA9"}}"#)
            .unwrap();
        assert!(matches!(stop, MediaEvent::Stop { .. }));
    }

    #[test]
    fn test_unknown_event_and_outbound_track() {
        assert_eq!(
            MediaEvent::parse(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap(),
            MediaEvent::Unknown
        );

        let chunk = MediaChunk {
            track: Some("outbound".to_string()),
            payload: String::new(),
        };
        assert!(!chunk.is_inbound());
        assert!(MediaEvent::parse("not json").is_err());
    }
}
