use muster_core::{EntityId, MessageAuthor, PlatformError, StoreError};
use thiserror::Error;

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// One identity's failed attempt at a gateway operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub identity: MessageAuthor,
    pub error: PlatformError,
}

/// Raised when every identity failed to perform an edit or fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{operation} of message {message_id} in channel {channel_id} failed{}",
    render_attempts(.attempts)
)]
pub struct DeliveryError {
    pub operation: &'static str,
    pub channel_id: String,
    pub message_id: String,
    pub attempts: Vec<DeliveryAttempt>,
}

fn render_attempts(attempts: &[DeliveryAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("; {}: {}", attempt.identity.as_str(), attempt.error))
        .collect()
}

#[derive(Debug, Error)]
/// Errors raised by the reconciliation engine.
pub enum ReconcileError {
    #[error("no registered message variant recognizes message {message_id} in channel {channel_id}")]
    Unrecognized {
        channel_id: String,
        message_id: String,
    },
    #[error("{variant} cannot classify message {message_id}: {reason}")]
    NotClassifiable {
        variant: &'static str,
        message_id: String,
        reason: String,
    },
    #[error("{variant} failed to render message {message_id}: {reason}")]
    RenderFailed {
        variant: &'static str,
        message_id: String,
        reason: String,
    },
    #[error("event #{0} no longer exists")]
    EntityNotFound(EntityId),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl ReconcileError {
    /// True for failures raised while re-deriving a message's content.
    pub fn is_render_failure(&self) -> bool {
        matches!(
            self,
            Self::RenderFailed { .. } | Self::NotClassifiable { .. } | Self::EntityNotFound(_)
        )
    }
}
