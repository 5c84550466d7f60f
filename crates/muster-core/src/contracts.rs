//! Narrow contracts for the persistence layer and the remote chat platform.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{Entity, EntityId, EntityKey, EventRecord, PreparationRequest};
use crate::message::{
    DeliveryIdentity, Interaction, MessagePayload, RenderedMessage, WebhookCredential,
};

/// Platform error code reported when an interaction token is no longer valid.
pub const UNKNOWN_INTERACTION_CODE: u64 = 10062;
/// Platform error code reported when a message id does not resolve.
pub const UNKNOWN_MESSAGE_CODE: u64 = 10008;

/// Result type for entity store reads.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
/// Errors returned by [`EntityStore`] implementations.
pub enum StoreError {
    #[error("entity store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid persisted value for '{field}': {value}")]
    Corrupt { field: &'static str, value: String },
}

/// Read-only view of authoritative state.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_entity(&self, key: EntityKey) -> StoreResult<Option<Entity>>;
    async fn find_event(&self, id: EntityId) -> StoreResult<Option<EventRecord>>;
    /// Events whose start lies in `[start_unix, end_unix)`, ordered by start then id.
    async fn events_between(&self, start_unix: i64, end_unix: i64)
        -> StoreResult<Vec<EventRecord>>;
    async fn preparation_requests(&self, event_id: EntityId)
        -> StoreResult<Vec<PreparationRequest>>;
    async fn open_preparation_requests(&self) -> StoreResult<Vec<PreparationRequest>>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
/// Errors returned by [`ChatPlatform`] implementations.
pub enum PlatformError {
    #[error("platform api returned status {status} (code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<u64>,
        message: String,
    },
    #[error("platform transport error: {0}")]
    Transport(String),
    #[error("failed to decode platform response: {0}")]
    Decode(String),
    #[error("missing platform credential: {0}")]
    MissingCredential(String),
}

impl PlatformError {
    pub fn api(status: u16, code: Option<u64>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unknown_interaction() -> Self {
        Self::api(404, Some(UNKNOWN_INTERACTION_CODE), "Unknown interaction")
    }

    pub fn unknown_message() -> Self {
        Self::api(404, Some(UNKNOWN_MESSAGE_CODE), "Unknown Message")
    }

    /// True only for the platform's expired-interaction signal.
    pub fn is_unknown_interaction(&self) -> bool {
        matches!(self, Self::Api { code: Some(code), .. } if *code == UNKNOWN_INTERACTION_CODE)
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Decode(_) | Self::MissingCredential(_) => false,
        }
    }
}

/// Remote chat-message store addressed by channel and message identifiers.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn fetch_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
    ) -> Result<RenderedMessage, PlatformError>;

    async fn edit_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError>;

    async fn send_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError>;

    /// Most recent messages first, at most `limit` of them.
    async fn list_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<RenderedMessage>, PlatformError>;

    /// Reuses a webhook named `name` in the channel or creates exactly one.
    async fn fetch_or_create_channel_webhook(
        &self,
        channel_id: &str,
        name: &str,
    ) -> Result<WebhookCredential, PlatformError>;

    async fn edit_interaction_reply(
        &self,
        interaction: &Interaction,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError>;

    async fn delete_interaction_reply(&self, interaction: &Interaction)
        -> Result<(), PlatformError>;
}
