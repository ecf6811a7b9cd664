use crate::error::AppError;
use crate::state::AppState;
use crate::telephony::twiml::{stream_url, VoiceResponse, INBOUND_TRACK};
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::info;

/// Call-setup webhook: greet the caller, then connect the media stream to this bridge.
///
/// The stream host is the configured public URL, or the `Host` the provider
/// used to reach this webhook when none is configured.
pub async fn voice_response(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let config = state.get_config();
    let host = match config.public_host() {
        Some(host) => host,
        None => req.connection_info().host().to_string(),
    };

    let url = stream_url(&host, &config.telephony.stream_path);
    info!(stream_url = %url, "Incoming call, answering with media stream");

    let markup = VoiceResponse::new()
        .say(config.telephony.greeting.as_str())
        .pause(config.telephony.pause_seconds)
        .connect_stream(url, INBOUND_TRACK)
        .to_xml();

    Ok(HttpResponse::Ok().content_type("text/xml").body(markup))
}
