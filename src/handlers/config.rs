use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Effective configuration with every secret replaced by a `configured` flag.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "public_url": config.server.public_url
            },
            "telephony": {
                "configured": state.twilio.is_some(),
                "from_number": config.telephony.from_number,
                "to_number": config.telephony.to_number,
                "stream_path": config.telephony.stream_path,
                "pause_seconds": config.telephony.pause_seconds
            },
            "recognition": {
                "url": config.recognition.url,
                "model": config.recognition.model,
                "language": config.recognition.language,
                "api_key_configured": !config.recognition.api_key.is_empty()
            },
            "generation": {
                "base_url": config.generation.base_url,
                "model": config.generation.model,
                "temperature": config.generation.temperature,
                "api_key_configured": !config.generation.api_key.is_empty()
            },
            "synthesis": {
                "base_url": config.synthesis.base_url,
                "language_code": config.synthesis.language_code,
                "ssml_gender": config.synthesis.ssml_gender,
                "header_len": config.synthesis.header_len,
                "api_key_configured": !config.synthesis.api_key.is_empty()
            },
            "bridge": config.bridge,
            "debug": config.debug
        }
    })))
}
