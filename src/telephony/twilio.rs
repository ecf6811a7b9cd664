//! Twilio REST client for outbound calls.

use crate::config::TelephonyConfig;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    sid: String,
}

/// Twilio API client
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(config: &TelephonyConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `None` unless both account SID and auth token are set.
    pub fn from_config(config: &TelephonyConfig) -> Result<Option<Self>> {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            return Ok(None);
        }
        Self::new(config).map(Some)
    }

    /// Place a call to `to` whose call-setup markup is fetched from `webhook_url`.
    ///
    /// Returns the new call's SID.
    pub async fn place_call(&self, to: &str, webhook_url: &str) -> Result<String> {
        info!(to, webhook_url, "Placing outbound call");

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("Url", webhook_url),
                ("To", to),
                ("From", self.from_number.as_str()),
            ])
            .send()
            .await
            .context("call request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to place call: {} - {}", status, text));
        }

        let created: CreateCallResponse = response
            .json()
            .await
            .context("undecodable call response")?;
        info!(call_sid = %created.sid, "Call initiated");
        Ok(created.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> TelephonyConfig {
        let mut config = AppConfig::default().telephony;
        config.api_base_url = server.uri();
        config.account_sid = "AC123".to_string();
        config.auth_token = "token123".to_string();
        config.from_number = "+15550001111".to_string();
        config
    }

    #[test]
    fn test_unconfigured_client_is_none() {
        let config = AppConfig::default().telephony;
        assert!(TwilioClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_place_call_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Calls.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15552223333"))
            .and(body_string_contains("From=%2B15550001111"))
            .and(body_string_contains(
                "Url=https%3A%2F%2Fbridge.example.com%2Fvoice-response",
            ))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "sid": "CA42" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = TwilioClient::from_config(&config_for(&server))
            .unwrap()
            .unwrap();
        let sid = client
            .place_call("+15552223333", "https://bridge.example.com/voice-response")
            .await
            .unwrap();
        assert_eq!(sid, "CA42");
    }

    #[tokio::test]
    async fn test_place_call_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid To number"))
            .mount(&server)
            .await;

        let client = TwilioClient::new(&config_for(&server)).unwrap();
        let err = client
            .place_call("not-a-number", "https://bridge.example.com/voice-response")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
