//! Outbound dispatch seams
//!
//! The device-adapter and notification layers are external collaborators;
//! chains reach them only through [`CommandSink`]. The executor applies its
//! per-step timeout around these calls, so implementations may block for as
//! long as their transport needs.

use async_trait::async_trait;
use aura_core::DeviceId;
use thiserror::Error;

/// Dispatch errors surfaced by the adapter layer.
///
/// These are recorded into the execution record of the step that observed
/// them; they never propagate to the event loop.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("notification failed: {0}")]
    NotifyFailed(String),
}

/// Outbound surface implemented by the excluded adapter layer.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Send a command to a device and wait for its acknowledgment.
    async fn send_command(
        &self,
        target: &DeviceId,
        command: &str,
        params: &serde_json::Value,
    ) -> Result<(), SinkError>;

    /// Dispatch a notification on the given channels.
    async fn notify(&self, message: &str, channels: &[String]) -> Result<(), SinkError>;
}
