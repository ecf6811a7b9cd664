use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

#[derive(Debug, Default, Deserialize)]
pub struct CallRequest {
    /// Destination number; `telephony.to_number` when absent
    pub to: Option<String>,
}

/// Place an outbound call that will be connected to this bridge.
pub async fn call_user(
    state: web::Data<AppState>,
    body: Option<web::Json<CallRequest>>,
) -> Result<HttpResponse, AppError> {
    let Some(twilio) = state.twilio.as_ref() else {
        return Err(AppError::ServiceUnavailable(
            "Telephony credentials are not configured".to_string(),
        ));
    };

    let config = state.get_config();
    let to = body
        .and_then(|body| body.into_inner().to)
        .filter(|to| !to.trim().is_empty())
        .unwrap_or_else(|| config.telephony.to_number.clone());
    if to.is_empty() {
        return Err(AppError::BadRequest("No destination number".to_string()));
    }

    let public_url = config.server.public_url.trim().trim_end_matches('/');
    if public_url.is_empty() {
        return Err(AppError::ServiceUnavailable(
            "server.public_url must be set to place calls".to_string(),
        ));
    }
    let webhook_url = format!("{}/voice-response", public_url);

    match twilio.place_call(&to, &webhook_url).await {
        Ok(call_sid) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "call_sid": call_sid
        }))),
        Err(e) => {
            error!(error = %e, "Error initiating call");
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to place call"
            })))
        }
    }
}
