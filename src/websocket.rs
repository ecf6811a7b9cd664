//! # Media Stream WebSocket
//!
//! The telephony provider connects here once per call and streams the caller's
//! audio. Each connection is one actor owning one `CallSession`.
//!
//! ## Stream Protocol:
//! - **Provider → bridge**: binary messages, each a fragment of headerless
//!   mu-law 8 kHz mono audio. JSON text events (`connected`, `start`, `media`,
//!   `mark`, `stop`) are also understood; `media` payloads join the same
//!   ordered audio path.
//! - **Bridge → provider**: one binary message per completed turn, carrying the
//!   whole reply in the same codec, without a header.
//!
//! ## Actor Model:
//! Actix delivers this connection's frames to the actor one at a time, in the
//! order they arrived. While the session is still opening, `ctx.wait` holds back
//! every incoming frame, so nothing is lost or reordered before the recognition
//! stream exists.
//!
//! ## Lifetime:
//! The actor stops on a close frame, a `stop` event, a protocol error, the idle
//! timeout, the call-duration cap, or a hang-up requested by the pipeline.
//! `stopped` closes the session (idempotently) and releases the call slot.

use crate::audio::AudioFrame;
use crate::error::{AppError, PipelineError};
use crate::pipeline::{AudioSink, CallSession, PipelineServices};
use crate::state::{AppState, SharedMetrics};
use crate::telephony::MediaEvent;

use actix::prelude::*;
use actix::WeakAddr;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the idle timer looks at the last activity (never longer than the timeout).
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Ask the actor to write one outbound audio message.
#[derive(Message)]
#[rtype(result = "Result<(), PipelineError>")]
struct SendAudio(Vec<u8>);

/// Ask the actor to drop the connection.
#[derive(Message)]
#[rtype(result = "()")]
struct HangUp;

/// The pipeline's view of this socket.
///
/// ## Rust Concepts:
/// - **WeakAddr**: the session's tasks must not keep a finished connection's
///   actor alive, so they hold a weak address and treat a dead actor as a
///   `TransportError`
struct ActorSink {
    addr: WeakAddr<MediaStreamSocket>,
}

#[async_trait]
impl AudioSink for ActorSink {
    async fn send_audio(&self, payload: Vec<u8>) -> Result<(), PipelineError> {
        let addr = self.addr.upgrade().ok_or_else(|| {
            PipelineError::TransportError("media socket is gone".to_string())
        })?;
        addr.send(SendAudio(payload))
            .await
            .map_err(|e| PipelineError::TransportError(e.to_string()))?
    }

    fn hang_up(&self) {
        if let Some(addr) = self.addr.upgrade() {
            addr.do_send(HangUp);
        }
    }
}

/// WebSocket actor for one call's media stream.
pub struct MediaStreamSocket {
    services: PipelineServices,
    metrics: SharedMetrics,

    /// `None` until the recognition stream is open, and again after stop
    session: Option<CallSession>,

    /// Provider stream id from the `start` event, for log correlation
    stream_sid: Option<String>,

    idle_timeout: Duration,
    max_call_duration: Duration,
    last_activity: Instant,
}

impl MediaStreamSocket {
    pub fn new(state: &AppState) -> Self {
        let bridge = &state.get_config().bridge;
        Self {
            services: state.services.clone(),
            metrics: state.metrics.clone(),
            session: None,
            stream_sid: None,
            idle_timeout: Duration::from_secs(bridge.idle_timeout_secs),
            max_call_duration: Duration::from_secs(bridge.max_call_duration_secs),
            last_activity: Instant::now(),
        }
    }

    fn session_id(&self) -> &str {
        self.session.as_ref().map_or("-", |session| session.id())
    }

    fn forward(&mut self, frame: AudioFrame, ctx: &mut ws::WebsocketContext<Self>) {
        self.last_activity = Instant::now();
        let Some(session) = self.session.as_ref() else {
            debug!(bytes = frame.len(), "Audio before session open, dropped");
            return;
        };

        if let Err(err) = session.on_inbound_frame(frame) {
            warn!(session_id = %session.id(), error = %err, "Inbound audio rejected, closing");
            ctx.stop();
        }
    }

    fn handle_event(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let event = match MediaEvent::parse(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(session_id = %self.session_id(), error = %err, "Unparseable text frame ignored");
                return;
            }
        };

        match event {
            MediaEvent::Media { media } => {
                if !media.is_inbound() {
                    return;
                }
                match media.decode() {
                    Ok(frame) => self.forward(frame, ctx),
                    Err(err) => {
                        warn!(session_id = %self.session_id(), error = %err, "Invalid media payload")
                    }
                }
            }
            MediaEvent::Start { stream_sid, start } => {
                let call_sid = start.and_then(|start| start.call_sid);
                info!(
                    session_id = %self.session_id(),
                    stream_sid = ?stream_sid,
                    call_sid = ?call_sid,
                    "Media stream started"
                );
                self.stream_sid = stream_sid;
                self.last_activity = Instant::now();
            }
            MediaEvent::Stop { .. } => {
                info!(session_id = %self.session_id(), stream_sid = ?self.stream_sid, "Media stream stopped by provider");
                if let Some(session) = &self.session {
                    session.close("stop event");
                }
                ctx.stop();
            }
            MediaEvent::Connected { protocol } => {
                debug!(protocol = ?protocol, "Media stream connected");
            }
            MediaEvent::Mark { mark } => {
                debug!(mark = ?mark.map(|m| m.name), "Media stream mark");
            }
            MediaEvent::Unknown => {
                debug!("Unhandled media stream event");
            }
        }
    }
}

impl Actor for MediaStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Media stream connection started");

        let services = self.services.clone();
        let sink = Arc::new(ActorSink {
            addr: ctx.address().downgrade(),
        });
        ctx.wait(
            async move { CallSession::open(&services, sink).await }
                .into_actor(self)
                .map(|result, act, ctx| match result {
                    Ok(session) => {
                        info!(session_id = %session.id(), "Bridging call audio");
                        act.session = Some(session);
                    }
                    Err(err) => {
                        error!(kind = err.kind(), error = %err, "Could not start call session");
                        ctx.stop();
                    }
                }),
        );

        ctx.run_interval(IDLE_CHECK_INTERVAL.min(self.idle_timeout), |act, ctx| {
            if act.last_activity.elapsed() > act.idle_timeout {
                warn!(session_id = %act.session_id(), "No inbound audio, closing media stream");
                ctx.stop();
            }
        });

        ctx.run_later(self.max_call_duration, |act, ctx| {
            warn!(session_id = %act.session_id(), "Maximum call duration reached");
            ctx.stop();
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(session) = self.session.take() {
            debug!(session_id = %session.id(), turn_state = session.turn_state().as_str(), "Closing call session");
            session.close("media socket closed");
            tokio::spawn(session.join());
        }
        self.metrics.end_call();
        info!("Media stream connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.forward(AudioFrame::new(data.to_vec()), ctx);
            }
            Ok(ws::Message::Text(text)) => {
                self.handle_event(&text, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_activity = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_activity = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id(), reason = ?reason, "Media stream closed by provider");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id(), error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<SendAudio> for MediaStreamSocket {
    type Result = Result<(), PipelineError>;

    fn handle(&mut self, msg: SendAudio, ctx: &mut Self::Context) -> Self::Result {
        if ctx.state() != ActorState::Running {
            return Err(PipelineError::TransportError(
                "media socket is closing".to_string(),
            ));
        }
        debug!(session_id = %self.session_id(), bytes = msg.0.len(), "Writing reply audio");
        ctx.binary(msg.0);
        Ok(())
    }
}

impl Handler<HangUp> for MediaStreamSocket {
    type Result = ();

    fn handle(&mut self, _msg: HangUp, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id(), "Hanging up media stream");
        ctx.close(Some(ws::CloseCode::Normal.into()));
        ctx.stop();
    }
}

fn is_websocket_upgrade(req: &HttpRequest) -> bool {
    req.headers()
        .get("upgrade")
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.eq_ignore_ascii_case("websocket"))
}

/// Media stream endpoint.
///
/// ## HTTP to WebSocket Upgrade:
/// A plain GET answers with a liveness string, which is handy when checking a
/// tunnel from a browser. Upgrades take a call slot first and are refused with
/// 503 once `bridge.max_concurrent_calls` calls are active.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if !is_websocket_upgrade(&req) {
        return Ok(HttpResponse::Ok()
            .content_type("text/plain")
            .body("WebSocket is running"));
    }

    let limit = state.get_config().bridge.max_concurrent_calls;
    if !state.metrics.try_begin_call(limit) {
        warn!(limit, "Call limit reached, refusing media stream");
        return Err(AppError::ServiceUnavailable(
            "Too many concurrent calls".to_string(),
        ));
    }

    info!(peer = ?req.connection_info().peer_addr(), "New media stream connection");
    ws::start(MediaStreamSocket::new(&state), &req, stream).map_err(|e| {
        state.metrics.end_call();
        AppError::BadRequest(format!("WebSocket handshake failed: {}", e))
    })
}
