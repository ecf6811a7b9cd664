//! Outbound side of a call, as seen by the pipeline.

use crate::error::PipelineError;
use async_trait::async_trait;

/// Where a call's synthesized audio goes.
///
/// The media socket implements this by forwarding to its actor; tests collect
/// the payloads instead.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Send one complete, headerless payload as a single binary message.
    ///
    /// Resolves once the transport has accepted the message. Fails with
    /// `TransportError` when the connection is gone.
    async fn send_audio(&self, payload: Vec<u8>) -> Result<(), PipelineError>;

    /// Ask the transport to drop the connection. Safe to call more than once.
    fn hang_up(&self);
}
