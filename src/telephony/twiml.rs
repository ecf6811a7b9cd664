//! Call-setup markup.
//!
//! ## Example output:
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?><Response><Say>Hello!</Say>
//! <Pause length="5"/><Connect><Stream url="wss://bridge.example.com/ws"
//! track="inbound_track"/></Connect></Response>
//! ```

use std::borrow::Cow;
use std::fmt::Write;

/// Which leg of the call the provider streams to us.
pub const INBOUND_TRACK: &str = "inbound_track";

#[derive(Debug, Clone, PartialEq)]
enum Verb {
    Say(String),
    Pause(u32),
    ConnectStream { url: String, track: String },
}

/// Builder for a `<Response>` document.
///
/// ## Rust Concepts:
/// - **Consuming builder**: each method takes `self` and returns it, so a
///   response reads as one chained expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say(text.into()));
        self
    }

    pub fn pause(mut self, seconds: u32) -> Self {
        self.verbs.push(Verb::Pause(seconds));
        self
    }

    /// Hand the call's audio to a WebSocket stream.
    pub fn connect_stream(mut self, url: impl Into<String>, track: impl Into<String>) -> Self {
        self.verbs.push(Verb::ConnectStream {
            url: url.into(),
            track: track.into(),
        });
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            // Writing into a String cannot fail.
            let _ = match verb {
                Verb::Say(text) => write!(xml, "<Say>{}</Say>", escape_xml(text)),
                Verb::Pause(seconds) => write!(xml, r#"<Pause length="{}"/>"#, seconds),
                Verb::ConnectStream { url, track } => write!(
                    xml,
                    r#"<Connect><Stream url="{}" track="{}"/></Connect>"#,
                    escape_xml(url),
                    escape_xml(track)
                ),
            };
        }
        xml.push_str("</Response>");
        xml
    }
}

/// `wss://` URL of the media stream endpoint on `host`.
pub fn stream_url(host: &str, path: &str) -> String {
    format!("wss://{}{}", host.trim_end_matches('/'), path)
}

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
