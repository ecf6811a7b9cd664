//! # Configuration Management
//!
//! Loads the bridge configuration from multiple sources:
//! - built-in defaults (the `Default` impl below)
//! - an optional `config.toml` next to the binary
//! - environment variables prefixed with `APP_` (sections separated by `__`,
//!   e.g. `APP_SYNTHESIS__HEADER_LEN=44`)
//! - the plain variable names the telephony and AI providers document
//!   (`TWILIO_ACCOUNT_SID`, `OPENAI_API_KEY`, ...), which win over everything else
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: the whole tree derives `Serialize`/`Deserialize` so the `config`
//!   crate can round-trip it
//! - **impl blocks**: loading and validation live next to the data they check

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
///
/// ## Why separate config structs:
/// Each external collaborator (telephony, recognition, generation, synthesis)
/// gets its own section so credentials and endpoints stay grouped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub recognition: RecognitionConfig,
    pub generation: GenerationConfig,
    pub synthesis: SynthesisConfig,
    pub bridge: BridgeConfig,
    pub debug: DebugConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Publicly reachable base URL (e.g. `https://bridge.example.com`).
    /// Used to build the stream URL and the call-setup webhook URL.
    pub public_url: String,
}

/// Telephony provider REST credentials and call-setup markup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    pub api_base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    /// Caller id used for outbound calls
    pub from_number: String,
    /// Default destination for `POST /call-user`
    pub to_number: String,
    /// Announcement spoken before the media stream connects
    pub greeting: String,
    /// Pause after the greeting so the call is not hung up early
    pub pause_seconds: u32,
    /// Path of the media stream WebSocket endpoint
    pub stream_path: String,
}

/// Streaming speech-to-text upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// WebSocket endpoint of the live transcription service
    pub url: String,
    pub api_key: String,
    pub language: String,
    pub model: String,
    pub punctuate: bool,
}

/// Chat-completions backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
    /// Spoken instead of a generated reply when the backend fails
    pub fallback_reply: String,
    pub request_timeout_secs: u64,
}

/// Text-to-speech backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub base_url: String,
    pub api_key: String,
    pub language_code: String,
    /// Optional named voice; the service picks one from language + gender when empty
    pub voice_name: String,
    pub ssml_gender: String,
    /// Size of the container header stripped before audio goes to the caller
    pub header_len: usize,
    pub request_timeout_secs: u64,
}

/// Per-call bridge limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Inbound frames waiting for the recognition writer
    pub frame_queue_capacity: usize,
    /// Close a media socket that has been silent this long
    pub idle_timeout_secs: u64,
    /// Hard cap on a single call
    pub max_call_duration_secs: u64,
    pub max_concurrent_calls: usize,
}

/// Raw-audio debug capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    pub capture_audio: bool,
    pub capture_dir: String,
    pub capture_queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                public_url: String::new(),
            },
            telephony: TelephonyConfig {
                api_base_url: "https://api.twilio.com".to_string(),
                account_sid: String::new(),
                auth_token: String::new(),
                from_number: String::new(),
                to_number: String::new(),
                greeting: "Hello! Welcome to Biltmore Hair Restoration. How can I assist you today?"
                    .to_string(),
                pause_seconds: 5,
                stream_path: "/ws".to_string(),
            },
            recognition: RecognitionConfig {
                url: "wss://api.deepgram.com/v1/listen".to_string(),
                api_key: String::new(),
                language: "en-US".to_string(),
                model: "nova-2-phonecall".to_string(),
                punctuate: true,
            },
            generation: GenerationConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4o".to_string(),
                temperature: 0.7,
                system_prompt: "You are an AI assistant for Biltmore Hair Restoration. \
                    Answer customer questions about hair transplant procedures and services."
                    .to_string(),
                fallback_reply: "I'm sorry, I couldn't process that request.".to_string(),
                request_timeout_secs: 30,
            },
            synthesis: SynthesisConfig {
                base_url: "https://texttospeech.googleapis.com/v1".to_string(),
                api_key: String::new(),
                language_code: "en-US".to_string(),
                voice_name: String::new(),
                ssml_gender: "NEUTRAL".to_string(),
                header_len: 44,
                request_timeout_secs: 30,
            },
            bridge: BridgeConfig {
                frame_queue_capacity: 512,
                idle_timeout_secs: 60,
                max_call_duration_secs: 3600,
                max_concurrent_calls: 50,
            },
            debug: DebugConfig {
                capture_audio: false,
                capture_dir: "captures".to_string(),
                capture_queue_capacity: 256,
            },
        }
    }
}

/// Plain environment variables and the config keys they override.
///
/// These are the names the providers' own documentation uses, so a `.env` file
/// written for the provider dashboards works unchanged.
const WELL_KNOWN_ENV: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("SERVER_URL", "server.public_url"),
    ("TWILIO_ACCOUNT_SID", "telephony.account_sid"),
    ("TWILIO_AUTH_TOKEN", "telephony.auth_token"),
    ("TWILIO_PHONE_NUMBER", "telephony.from_number"),
    ("RECEIVER_PHONE_NUMBER", "telephony.to_number"),
    ("DEEPGRAM_API_KEY", "recognition.api_key"),
    ("OPENAI_API_KEY", "generation.api_key"),
    ("GOOGLE_TTS_API_KEY", "synthesis.api_key"),
];

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Rust Concepts:
    /// - **Builder pattern**: sources are chained, later ones override earlier ones
    /// - **?**: any malformed source aborts startup with a descriptive error
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (var, key) in WELL_KNOWN_ENV {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(*key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations the bridge cannot run with.
    ///
    /// Missing API keys are not errors here: the server still answers health
    /// checks and webhooks, and `missing_credentials` reports them at startup.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !self.telephony.stream_path.starts_with('/') {
            return Err(anyhow::anyhow!("Stream path must start with '/'"));
        }

        if self.synthesis.header_len == 0 {
            return Err(anyhow::anyhow!("Synthesis header length must be greater than 0"));
        }

        if self.bridge.frame_queue_capacity == 0 {
            return Err(anyhow::anyhow!("Frame queue capacity must be greater than 0"));
        }

        if self.bridge.max_concurrent_calls == 0 {
            return Err(anyhow::anyhow!("Max concurrent calls must be greater than 0"));
        }

        if self.bridge.idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Idle timeout must be greater than 0"));
        }

        if self.bridge.max_call_duration_secs < self.bridge.idle_timeout_secs {
            return Err(anyhow::anyhow!(
                "Max call duration ({}s) cannot be shorter than the idle timeout ({}s)",
                self.bridge.max_call_duration_secs,
                self.bridge.idle_timeout_secs
            ));
        }

        if self.debug.capture_audio && self.debug.capture_queue_capacity == 0 {
            return Err(anyhow::anyhow!("Capture queue capacity must be greater than 0"));
        }

        Ok(())
    }

    /// Names of the credentials that are still empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.recognition.api_key.is_empty() {
            missing.push("recognition.api_key");
        }
        if self.generation.api_key.is_empty() {
            missing.push("generation.api_key");
        }
        if self.synthesis.api_key.is_empty() {
            missing.push("synthesis.api_key");
        }
        if self.telephony.account_sid.is_empty() || self.telephony.auth_token.is_empty() {
            missing.push("telephony.account_sid/auth_token");
        }
        missing
    }

    /// Host part of `server.public_url`, without scheme or trailing slash.
    pub fn public_host(&self) -> Option<String> {
        let url = self.server.public_url.trim();
        if url.is_empty() {
            return None;
        }
        let host = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url)
            .trim_end_matches('/');
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.synthesis.header_len, 44);
        assert_eq!(config.telephony.stream_path, "/ws");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.synthesis.header_len = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bridge.max_call_duration_secs = 10;
        config.bridge.idle_timeout_secs = 30;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telephony.stream_path = "ws".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_public_host() {
        let mut config = AppConfig::default();
        assert_eq!(config.public_host(), None);

        config.server.public_url = "https://bridge.example.com/".to_string();
        assert_eq!(config.public_host().as_deref(), Some("bridge.example.com"));

        config.server.public_url = "http://localhost:3000".to_string();
        assert_eq!(config.public_host().as_deref(), Some("localhost:3000"));
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = AppConfig::default();
        assert_eq!(config.missing_credentials().len(), 4);

        config.generation.api_key = "sk-test".to_string();
        config.synthesis.api_key = "tts-test".to_string();
        let missing = config.missing_credentials();
        assert!(missing.contains(&"recognition.api_key"));
        assert!(!missing.contains(&"generation.api_key"));
    }
}
