//! Google Cloud Text-to-Speech REST client.
//!
//! Requests mu-law at 8 kHz so the returned WAV already carries telephony
//! samples and only its header has to be removed.

use crate::audio::frame::AudioParams;
use crate::config::SynthesisConfig;
use crate::error::PipelineError;
use crate::synthesis::{SpeechSynthesizer, SynthesizedAudio, VoiceConfig};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    ssml_gender: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    sample_rate_hertz: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

/// Text-to-speech client for the `text:synthesize` endpoint.
#[derive(Debug, Clone)]
pub struct CloudTtsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CloudTtsClient {
    pub fn new(config: &SynthesisConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for CloudTtsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<SynthesizedAudio, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::SynthesisFailure(
                "refusing to synthesize blank text".to_string(),
            ));
        }

        let request = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &voice.language_code,
                name: voice.voice_name.as_deref(),
                ssml_gender: &voice.ssml_gender,
            },
            audio_config: AudioConfig {
                audio_encoding: "MULAW",
                sample_rate_hertz: AudioParams::TELEPHONY.sample_rate,
            },
        };

        let url = format!("{}/text:synthesize", self.base_url);
        debug!(chars = text.len(), "Requesting speech synthesis");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::SynthesisFailure(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Speech synthesis API error");
            return Err(PipelineError::SynthesisFailure(format!("{}: {}", status, body)));
        }

        let parsed: SynthesizeResponse = response.json().await.map_err(|e| {
            PipelineError::SynthesisFailure(format!("undecodable response: {}", e))
        })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content.as_bytes())
            .map_err(|e| PipelineError::SynthesisFailure(format!("invalid audioContent: {}", e)))?;

        if bytes.is_empty() {
            return Err(PipelineError::SynthesisFailure(
                "service returned no audio".to_string(),
            ));
        }

        let audio = SynthesizedAudio::from_wav(bytes)?;
        if audio.payload_len() == 0 {
            return Err(PipelineError::SynthesisFailure(
                "service returned a container without samples".to_string(),
            ));
        }

        debug!(
            header_len = audio.header_len(),
            payload_len = audio.payload_len(),
            "Speech synthesized"
        );
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::container::wrap_wav;
    use crate::config::AppConfig;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CloudTtsClient {
        let mut config = AppConfig::default().synthesis;
        config.base_url = server.uri();
        config.api_key = "tts-key".to_string();
        CloudTtsClient::new(&config).unwrap()
    }

    fn voice() -> VoiceConfig {
        VoiceConfig::from_config(&AppConfig::default().synthesis)
    }

    #[tokio::test]
    async fn test_synthesize_decodes_wav() {
        let server = MockServer::start().await;
        let wav = wrap_wav(&AudioParams::TELEPHONY, &[0x55; 400]);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&wav);

        Mock::given(method("POST"))
            .and(path("/text:synthesize"))
            .and(query_param("key", "tts-key"))
            .and(body_partial_json(serde_json::json!({
                "input": {"text": "We are open 9 to 5"},
                "voice": {"languageCode": "en-US", "ssmlGender": "NEUTRAL"},
                "audioConfig": {"audioEncoding": "MULAW", "sampleRateHertz": 8000}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "audioContent": encoded })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let audio = client_for(&server)
            .synthesize("We are open 9 to 5", &voice())
            .await
            .unwrap();
        assert_eq!(audio.header_len(), 44);
        assert_eq!(audio.payload_len(), 400);
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server).synthesize("   ", &voice()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisFailure(_)));
    }

    #[tokio::test]
    async fn test_api_error_is_synthesis_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text:synthesize"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = client_for(&server).synthesize("hello", &voice()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisFailure(_)));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_container_without_samples_is_failure() {
        let server = MockServer::start().await;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(wrap_wav(&AudioParams::TELEPHONY, &[]));
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "audioContent": encoded })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).synthesize("hello", &voice()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisFailure(_)));
    }
}
