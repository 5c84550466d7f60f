//! Single edit/fetch calls with ordered fallback between delivery identities.
//!
//! Messages authored by the bot can only be edited by the bot, and messages
//! posted through a channel webhook only by that webhook. The gateway tries the
//! identity that most likely owns the message first and falls back to the other
//! one, reporting both failures when neither succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use muster_core::{
    ChatPlatform, DeliveryIdentity, MessageAuthor, MessagePayload, PlatformError,
    RenderedMessage, WebhookCredential,
};
use tokio::sync::Mutex;

use crate::error::{DeliveryAttempt, DeliveryError};

#[derive(Debug, Clone, Copy)]
enum GatewayOperation<'a> {
    Edit(&'a MessagePayload),
    Fetch,
}

impl GatewayOperation<'_> {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Edit(_) => "edit",
            Self::Fetch => "fetch",
        }
    }
}

/// Identity order for one call; the likely owner goes first.
fn attempt_order(prefer_webhook: bool) -> [MessageAuthor; 2] {
    if prefer_webhook {
        [MessageAuthor::Webhook, MessageAuthor::Bot]
    } else {
        [MessageAuthor::Bot, MessageAuthor::Webhook]
    }
}

/// Dual-identity edit/fetch front for the remote message store.
pub struct EditFetchGateway {
    platform: Arc<dyn ChatPlatform>,
    webhook_name: String,
    webhooks: Mutex<HashMap<String, WebhookCredential>>,
}

impl EditFetchGateway {
    pub fn new(platform: Arc<dyn ChatPlatform>, webhook_name: impl Into<String>) -> Self {
        Self {
            platform,
            webhook_name: webhook_name.into(),
            webhooks: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Edits a message, trying the webhook identity first when `prefer_webhook`.
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
        prefer_webhook: bool,
    ) -> Result<RenderedMessage, DeliveryError> {
        self.run(
            GatewayOperation::Edit(payload),
            channel_id,
            message_id,
            prefer_webhook,
        )
        .await
    }

    pub async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
        prefer_webhook: bool,
    ) -> Result<RenderedMessage, DeliveryError> {
        self.run(GatewayOperation::Fetch, channel_id, message_id, prefer_webhook)
            .await
    }

    /// Re-reads a message through the identity that authored it.
    pub async fn refetch(&self, message: &RenderedMessage) -> Result<RenderedMessage, DeliveryError> {
        self.fetch_message(&message.channel_id, &message.id, message.is_webhook_owned())
            .await
    }

    /// Re-renders a message in place using its recorded authorship.
    pub async fn apply(
        &self,
        message: &RenderedMessage,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, DeliveryError> {
        self.edit_message(
            &message.channel_id,
            &message.id,
            payload,
            message.is_webhook_owned(),
        )
        .await
    }

    /// Posts a new view through the bot identity.
    pub async fn send_message(
        &self,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        self.platform
            .send_message(&DeliveryIdentity::Bot, channel_id, payload)
            .await
    }

    async fn run(
        &self,
        operation: GatewayOperation<'_>,
        channel_id: &str,
        message_id: &str,
        prefer_webhook: bool,
    ) -> Result<RenderedMessage, DeliveryError> {
        let mut attempts = Vec::with_capacity(2);
        for author in attempt_order(prefer_webhook) {
            let result = match self.identity(author, channel_id).await {
                Ok(identity) => {
                    self.dispatch(&identity, operation, channel_id, message_id)
                        .await
                }
                Err(error) => Err(error),
            };
            match result {
                Ok(message) => {
                    if !attempts.is_empty() {
                        tracing::debug!(
                            operation = operation.as_str(),
                            channel_id,
                            message_id,
                            identity = author.as_str(),
                            "gateway fallback identity succeeded"
                        );
                    }
                    return Ok(message);
                }
                Err(error) => {
                    tracing::debug!(
                        operation = operation.as_str(),
                        channel_id,
                        message_id,
                        identity = author.as_str(),
                        %error,
                        "gateway identity attempt failed"
                    );
                    attempts.push(DeliveryAttempt {
                        identity: author,
                        error,
                    });
                }
            }
        }
        Err(DeliveryError {
            operation: operation.as_str(),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            attempts,
        })
    }

    async fn dispatch(
        &self,
        identity: &DeliveryIdentity,
        operation: GatewayOperation<'_>,
        channel_id: &str,
        message_id: &str,
    ) -> Result<RenderedMessage, PlatformError> {
        match operation {
            GatewayOperation::Edit(payload) => {
                self.platform
                    .edit_message(identity, channel_id, message_id, payload)
                    .await
            }
            GatewayOperation::Fetch => {
                self.platform
                    .fetch_message(identity, channel_id, message_id)
                    .await
            }
        }
    }

    async fn identity(
        &self,
        author: MessageAuthor,
        channel_id: &str,
    ) -> Result<DeliveryIdentity, PlatformError> {
        match author {
            MessageAuthor::Bot => Ok(DeliveryIdentity::Bot),
            MessageAuthor::Webhook => self
                .webhook_credential(channel_id)
                .await
                .map(DeliveryIdentity::Webhook),
        }
    }

    /// Returns the channel's webhook credential, resolving it at most once.
    pub async fn webhook_credential(
        &self,
        channel_id: &str,
    ) -> Result<WebhookCredential, PlatformError> {
        let mut webhooks = self.webhooks.lock().await;
        if let Some(existing) = webhooks.get(channel_id) {
            return Ok(existing.clone());
        }
        let credential = self
            .platform
            .fetch_or_create_channel_webhook(channel_id, &self.webhook_name)
            .await?;
        webhooks.insert(channel_id.to_string(), credential.clone());
        Ok(credential)
    }
}
