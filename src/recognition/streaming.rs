//! Live transcription over a WebSocket.
//!
//! Raw frames go up as binary messages. Results come back as JSON text messages:
//!
//! ```json
//! {"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"..."}]}}
//! ```
//!
//! Closing sends `{"type":"CloseStream"}` so the service finalizes pending audio.

use crate::audio::frame::{AudioFrame, AudioParams};
use crate::config::RecognitionConfig;
use crate::error::PipelineError;
use crate::recognition::{
    RecognitionEvent, RecognitionProvider, RecognitionSession, RecognitionStream,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Results buffered between the socket reader and the session.
const EVENT_QUEUE_CAPACITY: usize = 64;

const CLOSE_STREAM_MESSAGE: &str = r#"{"type":"CloseStream"}"#;

/// Opens one upstream socket per call.
#[derive(Debug, Clone)]
pub struct StreamingRecognizer {
    url: String,
    api_key: String,
    language: String,
    model: String,
    punctuate: bool,
}

impl StreamingRecognizer {
    pub fn new(config: &RecognitionConfig) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            model: config.model.clone(),
            punctuate: config.punctuate,
        }
    }

    /// Endpoint with the audio binding and options in the query string.
    pub fn listen_url(&self, params: &AudioParams) -> Result<Url, PipelineError> {
        let sample_rate = params.sample_rate.to_string();
        let channels = params.channels.to_string();
        let punctuate = self.punctuate.to_string();

        Url::parse_with_params(
            &self.url,
            &[
                ("encoding", params.encoding.as_str()),
                ("sample_rate", sample_rate.as_str()),
                ("channels", channels.as_str()),
                ("language", self.language.as_str()),
                ("model", self.model.as_str()),
                ("punctuate", punctuate.as_str()),
                ("interim_results", "false"),
            ],
        )
        .map_err(|e| PipelineError::RecognitionFailure(format!("invalid recognition url: {}", e)))
    }
}

#[async_trait]
impl RecognitionProvider for StreamingRecognizer {
    async fn open(&self, params: AudioParams) -> Result<RecognitionSession, PipelineError> {
        let url = self.listen_url(&params)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| PipelineError::RecognitionFailure(e.to_string()))?;

        if !self.api_key.is_empty() {
            let token = HeaderValue::from_str(&format!("Token {}", self.api_key))
                .map_err(|e| PipelineError::RecognitionFailure(format!("invalid api key: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, token);
        }

        let (socket, _response) = connect_async(request).await.map_err(|e| {
            PipelineError::RecognitionFailure(format!("failed to connect: {}", e))
        })?;
        info!(model = %self.model, "Recognition stream opened");

        let (sink, stream) = socket.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        tokio::spawn(read_events(stream, events_tx));

        Ok(RecognitionSession {
            writer: Box::new(SocketWriter { sink, closed: false }),
            events: events_rx,
        })
    }
}

struct SocketWriter {
    sink: SplitSink<Socket, Message>,
    closed: bool,
}

#[async_trait]
impl RecognitionStream for SocketWriter {
    async fn write(&mut self, frame: AudioFrame) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::RecognitionFailure(
                "write after close".to_string(),
            ));
        }
        self.sink
            .send(Message::Binary(frame.into_bytes()))
            .await
            .map_err(|e| PipelineError::RecognitionFailure(format!("write failed: {}", e)))
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let finalize = self
            .sink
            .send(Message::Text(CLOSE_STREAM_MESSAGE.to_string()))
            .await;
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Recognition socket already gone");
        }
        finalize.map_err(|e| PipelineError::RecognitionFailure(format!("close failed: {}", e)))
    }
}

/// Forward parsed results until the socket ends, errors, or nobody listens.
async fn read_events(mut stream: SplitStream<Socket>, events: mpsc::Sender<RecognitionEvent>) {
    while let Some(message) = stream.next().await {
        let event = match message {
            Ok(Message::Text(text)) => match parse_event(&text) {
                Some(event) => event,
                None => continue,
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Recognition service closed the stream");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Recognition socket error");
                RecognitionEvent::Failed(PipelineError::RecognitionFailure(e.to_string()))
            }
        };

        let terminal = matches!(event, RecognitionEvent::Failed(_));
        if events.send(event).await.is_err() || terminal {
            break;
        }
    }
}

/// Map one service message to an event. Metadata and speech markers yield `None`.
pub fn parse_event(text: &str) -> Option<RecognitionEvent> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Ignoring non-JSON recognition message");
            return None;
        }
    };

    match value.get("type").and_then(Value::as_str) {
        Some("Results") => {
            let Some(text) = value
                .pointer("/channel/alternatives/0/transcript")
                .and_then(Value::as_str)
            else {
                debug!("Skipping result without alternatives");
                return None;
            };
            let text = text.to_string();
            let is_final = value
                .get("is_final")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(RecognitionEvent::Result { text, is_final })
        }
        Some("Error") => {
            let reason = value
                .get("description")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unspecified upstream error");
            Some(RecognitionEvent::Failed(PipelineError::RecognitionFailure(
                reason.to_string(),
            )))
        }
        _ => None,
    }
}
