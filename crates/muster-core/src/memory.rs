//! In-memory collaborators for tests and local experimentation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

use async_trait::async_trait;

use crate::contracts::{ChatPlatform, EntityStore, PlatformError, StoreError, StoreResult};
use crate::entities::{Entity, EntityId, EntityKey, EntityKind, EventRecord, PreparationRequest};
use crate::message::{
    DeliveryIdentity, Interaction, MessageAuthor, MessagePayload, RenderedMessage,
    WebhookCredential,
};
use crate::sync::{lock_unpoisoned, read_unpoisoned, write_unpoisoned};

/// Platform error code for editing a message authored by another identity.
const CANNOT_EDIT_FOREIGN_MESSAGE_CODE: u64 = 50005;

#[derive(Debug, Default)]
struct StoreInner {
    events: BTreeMap<EntityId, EventRecord>,
    preparations: BTreeMap<EntityId, PreparationRequest>,
    failure: Option<StoreError>,
}

/// Map-backed [`EntityStore`].
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_event(&self, event: EventRecord) {
        write_unpoisoned(&self.inner).events.insert(event.id, event);
    }

    pub fn upsert_preparation(&self, request: PreparationRequest) {
        write_unpoisoned(&self.inner)
            .preparations
            .insert(request.id, request);
    }

    pub fn remove_event(&self, id: EntityId) -> Option<EventRecord> {
        let mut inner = write_unpoisoned(&self.inner);
        inner.preparations.retain(|_, request| request.event_id != id);
        inner.events.remove(&id)
    }

    /// Makes every subsequent read fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<StoreError>) {
        write_unpoisoned(&self.inner).failure = error;
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreInner>> {
        let inner = read_unpoisoned(&self.inner);
        if let Some(error) = inner.failure.clone() {
            return Err(error);
        }
        Ok(inner)
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn find_entity(&self, key: EntityKey) -> StoreResult<Option<Entity>> {
        let inner = self.read()?;
        Ok(match key.kind {
            EntityKind::Event => inner.events.get(&key.id).cloned().map(Entity::Event),
            EntityKind::Preparation => inner
                .preparations
                .get(&key.id)
                .cloned()
                .map(Entity::Preparation),
        })
    }

    async fn find_event(&self, id: EntityId) -> StoreResult<Option<EventRecord>> {
        Ok(self.read()?.events.get(&id).cloned())
    }

    async fn events_between(
        &self,
        start_unix: i64,
        end_unix: i64,
    ) -> StoreResult<Vec<EventRecord>> {
        let inner = self.read()?;
        let mut events = inner
            .events
            .values()
            .filter(|event| event.start_unix >= start_unix && event.start_unix < end_unix)
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by_key(|event| (event.start_unix, event.id));
        Ok(events)
    }

    async fn preparation_requests(
        &self,
        event_id: EntityId,
    ) -> StoreResult<Vec<PreparationRequest>> {
        Ok(self
            .read()?
            .preparations
            .values()
            .filter(|request| request.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn open_preparation_requests(&self) -> StoreResult<Vec<PreparationRequest>> {
        Ok(self
            .read()?
            .preparations
            .values()
            .filter(|request| !request.prepared)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One call observed by [`InMemoryChatPlatform`].
pub enum PlatformCall {
    FetchMessage {
        identity: MessageAuthor,
        channel_id: String,
        message_id: String,
    },
    EditMessage {
        identity: MessageAuthor,
        channel_id: String,
        message_id: String,
    },
    SendMessage {
        identity: MessageAuthor,
        channel_id: String,
    },
    ListRecentMessages {
        channel_id: String,
        limit: usize,
    },
    FetchOrCreateWebhook {
        channel_id: String,
    },
    EditInteractionReply {
        interaction_id: String,
    },
    DeleteInteractionReply {
        interaction_id: String,
    },
}

impl PlatformCall {
    /// Identity used by a message call, when the call is identity-scoped.
    pub fn identity(&self) -> Option<MessageAuthor> {
        match self {
            Self::FetchMessage { identity, .. }
            | Self::EditMessage { identity, .. }
            | Self::SendMessage { identity, .. } => Some(*identity),
            Self::FetchOrCreateWebhook { .. } => Some(MessageAuthor::Webhook),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PlatformInner {
    channels: BTreeMap<String, Vec<RenderedMessage>>,
    webhooks: BTreeMap<(String, String), WebhookCredential>,
    webhooks_created: usize,
    interaction_replies: BTreeMap<String, RenderedMessage>,
    expired_interactions: BTreeSet<String>,
    failing_edits: BTreeSet<String>,
    failing_identities: BTreeSet<MessageAuthor>,
    failing_listings: BTreeSet<String>,
    calls: Vec<PlatformCall>,
    next_id: u64,
}

impl PlatformInner {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id = self.next_id.saturating_add(1);
        format!("{prefix}-{}", self.next_id)
    }

    fn check_identity(&self, identity: MessageAuthor) -> Result<(), PlatformError> {
        if self.failing_identities.contains(&identity) {
            return Err(PlatformError::Transport(format!(
                "{} identity unreachable",
                identity.as_str()
            )));
        }
        Ok(())
    }

    fn message_mut(&mut self, channel_id: &str, message_id: &str) -> Option<&mut RenderedMessage> {
        self.channels
            .get_mut(channel_id)?
            .iter_mut()
            .find(|message| message.id == message_id)
    }
}

/// Channel-history backed [`ChatPlatform`] that records every call.
///
/// Ownership rules mirror the real platform: an edit only succeeds through the
/// identity that authored the message, and a webhook can only read its own
/// messages.
#[derive(Debug, Default)]
pub struct InMemoryChatPlatform {
    inner: Mutex<PlatformInner>,
}

impl InMemoryChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to its channel, assigning an id when empty.
    pub fn insert_message(&self, mut message: RenderedMessage) -> RenderedMessage {
        let mut inner = lock_unpoisoned(&self.inner);
        if message.id.trim().is_empty() {
            message.id = inner.allocate_id("msg");
        }
        inner
            .channels
            .entry(message.channel_id.clone())
            .or_default()
            .push(message.clone());
        message
    }

    pub fn message(&self, channel_id: &str, message_id: &str) -> Option<RenderedMessage> {
        lock_unpoisoned(&self.inner)
            .channels
            .get(channel_id)?
            .iter()
            .find(|message| message.id == message_id)
            .cloned()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        lock_unpoisoned(&self.inner).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock_unpoisoned(&self.inner).calls.clear();
    }

    pub fn edit_calls(&self) -> Vec<PlatformCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, PlatformCall::EditMessage { .. }))
            .collect()
    }

    pub fn webhooks_created(&self) -> usize {
        lock_unpoisoned(&self.inner).webhooks_created
    }

    /// Makes every edit of `message_id` fail with a server error.
    pub fn fail_edits_of(&self, message_id: &str) {
        lock_unpoisoned(&self.inner)
            .failing_edits
            .insert(message_id.to_string());
    }

    /// Makes every identity-scoped call through `identity` fail.
    pub fn fail_identity(&self, identity: MessageAuthor) {
        lock_unpoisoned(&self.inner)
            .failing_identities
            .insert(identity);
    }

    pub fn fail_listing_of(&self, channel_id: &str) {
        lock_unpoisoned(&self.inner)
            .failing_listings
            .insert(channel_id.to_string());
    }

    /// Simulates the interaction token reaching its expiry.
    pub fn expire_interaction(&self, interaction: &Interaction) {
        lock_unpoisoned(&self.inner)
            .expired_interactions
            .insert(interaction.id.clone());
    }

    /// Current reply shown for an interaction, if it has one.
    pub fn interaction_reply(&self, interaction: &Interaction) -> Option<RenderedMessage> {
        lock_unpoisoned(&self.inner)
            .interaction_replies
            .get(&interaction.id)
            .cloned()
    }
}

#[async_trait]
impl ChatPlatform for InMemoryChatPlatform {
    async fn fetch_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
    ) -> Result<RenderedMessage, PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::FetchMessage {
            identity: identity.author(),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        });
        inner.check_identity(identity.author())?;
        let message = inner
            .message_mut(channel_id, message_id)
            .map(|message| message.clone())
            .ok_or_else(PlatformError::unknown_message)?;
        if identity.author() == MessageAuthor::Webhook && message.author != MessageAuthor::Webhook {
            return Err(PlatformError::unknown_message());
        }
        Ok(message)
    }

    async fn edit_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        message_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::EditMessage {
            identity: identity.author(),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        });
        inner.check_identity(identity.author())?;
        if inner.failing_edits.contains(message_id) {
            return Err(PlatformError::api(500, None, "injected edit failure"));
        }
        let message = inner
            .message_mut(channel_id, message_id)
            .ok_or_else(PlatformError::unknown_message)?;
        if message.author != identity.author() {
            return Err(PlatformError::api(
                403,
                Some(CANNOT_EDIT_FOREIGN_MESSAGE_CODE),
                "Cannot edit a message authored by another user",
            ));
        }
        *message = message.with_payload(payload);
        Ok(message.clone())
    }

    async fn send_message(
        &self,
        identity: &DeliveryIdentity,
        channel_id: &str,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::SendMessage {
            identity: identity.author(),
            channel_id: channel_id.to_string(),
        });
        inner.check_identity(identity.author())?;
        let id = inner.allocate_id("msg");
        let message = RenderedMessage {
            id,
            channel_id: channel_id.to_string(),
            author: identity.author(),
            ..RenderedMessage::default()
        }
        .with_payload(payload);
        inner
            .channels
            .entry(channel_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> Result<Vec<RenderedMessage>, PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::ListRecentMessages {
            channel_id: channel_id.to_string(),
            limit,
        });
        if inner.failing_listings.contains(channel_id) {
            return Err(PlatformError::api(403, Some(50001), "Missing Access"));
        }
        Ok(inner
            .channels
            .get(channel_id)
            .map(|messages| messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_or_create_channel_webhook(
        &self,
        channel_id: &str,
        name: &str,
    ) -> Result<WebhookCredential, PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::FetchOrCreateWebhook {
            channel_id: channel_id.to_string(),
        });
        inner.check_identity(MessageAuthor::Webhook)?;
        let key = (channel_id.to_string(), name.to_string());
        if let Some(existing) = inner.webhooks.get(&key) {
            return Ok(existing.clone());
        }
        let id = inner.allocate_id("webhook");
        let credential = WebhookCredential {
            token: format!("{id}-token"),
            id,
            channel_id: channel_id.to_string(),
        };
        inner.webhooks.insert(key, credential.clone());
        inner.webhooks_created = inner.webhooks_created.saturating_add(1);
        Ok(credential)
    }

    async fn edit_interaction_reply(
        &self,
        interaction: &Interaction,
        payload: &MessagePayload,
    ) -> Result<RenderedMessage, PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::EditInteractionReply {
            interaction_id: interaction.id.clone(),
        });
        if inner.expired_interactions.contains(&interaction.id) {
            return Err(PlatformError::unknown_interaction());
        }
        let next_id = match inner.interaction_replies.get(&interaction.id) {
            Some(existing) => existing.id.clone(),
            None => inner.allocate_id("reply"),
        };
        let reply = RenderedMessage {
            id: next_id,
            channel_id: format!("interaction-{}", interaction.id),
            author: MessageAuthor::Bot,
            ..RenderedMessage::default()
        }
        .with_payload(payload);
        inner
            .interaction_replies
            .insert(interaction.id.clone(), reply.clone());
        Ok(reply)
    }

    async fn delete_interaction_reply(
        &self,
        interaction: &Interaction,
    ) -> Result<(), PlatformError> {
        let mut inner = lock_unpoisoned(&self.inner);
        inner.calls.push(PlatformCall::DeleteInteractionReply {
            interaction_id: interaction.id.clone(),
        });
        if inner.expired_interactions.contains(&interaction.id) {
            return Err(PlatformError::unknown_interaction());
        }
        inner.interaction_replies.remove(&interaction.id);
        Ok(())
    }
}
