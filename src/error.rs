//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **AppError**: failures of the HTTP surface (webhooks, health, config views).
//!   These are converted to JSON responses through actix's `ResponseError` trait.
//! - **PipelineError**: failures inside a live call. They never reach an HTTP
//!   client; the session and the turn orchestrator decide per variant whether the
//!   call, the turn, or nothing at all is affected.
//!
//! ## Call Pipeline Taxonomy:
//! | variant | effect |
//! |---|---|
//! | `TransportError` | the session is closed (idempotently) |
//! | `RecognitionFailure` | the recognition stream ends, and with it the call |
//! | `GenerationFailure` | recovered with the fallback utterance |
//! | `SynthesisFailure` | the current turn is aborted, the call keeps listening |
//! | `FormatInvariantViolation` | the current turn is aborted, logged as misconfiguration |
//!
//! ## Rust Concepts:
//! - **enum with data**: each variant carries a human-readable detail string
//! - **Display / Error traits**: implemented by hand so the messages stay stable
//! - **From trait**: lets `?` convert library errors into `AppError`

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors raised by HTTP handlers.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500
/// - BadRequest → 400
/// - ServiceUnavailable → 503
#[derive(Debug)]
pub enum AppError {
    /// Server-side problem (upstream call failed, unexpected state, ...)
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// The server cannot take the request right now (capacity, missing credentials)
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts `AppError` into a JSON body of the form
/// `{"error": {"type": ..., "message": ..., "timestamp": ...}}`.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ServiceUnavailable(msg) => (
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the caller's fault, hence 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Failures inside a live call pipeline.
///
/// ## Why Clone:
/// Recognition errors are produced on the upstream reader task and handed to the
/// session through a channel; turn outcomes keep a copy for logging and metrics.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The telephony connection is gone or refused an outbound write
    TransportError(String),

    /// The speech-to-text stream failed or could not be opened
    RecognitionFailure(String),

    /// The text generation backend failed (network, auth, quota, bad body)
    GenerationFailure(String),

    /// The speech synthesis service failed or returned no audio
    SynthesisFailure(String),

    /// Synthesized audio does not have the container layout the transport expects
    FormatInvariantViolation(String),
}

impl PipelineError {
    /// Stable machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::TransportError(_) => "transport_error",
            PipelineError::RecognitionFailure(_) => "recognition_failure",
            PipelineError::GenerationFailure(_) => "generation_failure",
            PipelineError::SynthesisFailure(_) => "synthesis_failure",
            PipelineError::FormatInvariantViolation(_) => "format_invariant_violation",
        }
    }

    /// Whether the error only costs the current turn (the call goes on listening).
    pub fn is_turn_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::GenerationFailure(_)
                | PipelineError::SynthesisFailure(_)
                | PipelineError::FormatInvariantViolation(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::TransportError(msg) => write!(f, "Transport error: {}", msg),
            PipelineError::RecognitionFailure(msg) => write!(f, "Recognition failure: {}", msg),
            PipelineError::GenerationFailure(msg) => write!(f, "Generation failure: {}", msg),
            PipelineError::SynthesisFailure(msg) => write!(f, "Synthesis failure: {}", msg),
            PipelineError::FormatInvariantViolation(msg) => {
                write!(f, "Format invariant violation: {}", msg)
            }
        }
    }
}

impl std::error::Error for PipelineError {}
