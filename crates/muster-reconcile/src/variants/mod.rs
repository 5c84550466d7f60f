//! Message variants: one strategy per kind of rendered view.
//!
//! A variant recognizes its own messages from a stable textual fingerprint,
//! re-derives their full content from authoritative state, and finds the live
//! messages that display a given entity.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use muster_core::{
    ChatPlatform, Clock, Entity, EntityId, EntityStore, MessagePayload, RenderedMessage,
};
use regex::Regex;

use crate::error::{ReconcileError, ReconcileResult};

mod calendar;
mod event_info;
mod preparation_status;
mod weekly_schedule;

pub use calendar::{CalendarVariant, CALENDAR_EMBED_TITLE, CALENDAR_HEADER};
pub use event_info::EventInfoVariant;
pub use preparation_status::{PreparationStatusVariant, PREPARATION_HEADER};
pub use weekly_schedule::{weekly_schedule_header, WeeklyScheduleVariant};

/// Longest text content the platform accepts in one message.
pub(crate) const MAX_CONTENT_CHARS: usize = 2000;

/// Caller-supplied hints for a single regeneration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateContext {
    /// Forces the message to render this event instead of its embedded link.
    pub event_id: Option<EntityId>,
}

impl UpdateContext {
    pub fn for_event(event_id: EntityId) -> Self {
        Self {
            event_id: Some(event_id),
        }
    }
}

/// Strategy contract for one kind of rendered message.
#[async_trait]
pub trait MessageVariant: Send + Sync {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Cheap fingerprint test; performs no I/O.
    fn can_classify(&self, message: &RenderedMessage) -> bool;

    /// Re-derives the message's full content from current state.
    async fn regenerate(
        &self,
        message: &RenderedMessage,
        context: Option<&UpdateContext>,
    ) -> ReconcileResult<MessagePayload>;

    /// Live messages of this kind that display `entity`.
    async fn related_messages(&self, entity: &Entity) -> ReconcileResult<Vec<RenderedMessage>>;
}

/// Collaborators shared by every variant.
#[derive(Clone)]
pub struct ViewSources {
    pub store: Arc<dyn EntityStore>,
    pub platform: Arc<dyn ChatPlatform>,
    pub clock: Arc<dyn Clock>,
    pub history_scan_limit: usize,
}

impl ViewSources {
    /// Scans recent history of `channels`, keeping messages accepted by `keep`.
    pub(crate) async fn scan<F>(
        &self,
        channels: &[String],
        mut keep: F,
    ) -> ReconcileResult<Vec<RenderedMessage>>
    where
        F: FnMut(&RenderedMessage) -> bool + Send,
    {
        let mut matches = Vec::new();
        for channel_id in channels {
            let recent = self
                .platform
                .list_recent_messages(channel_id, self.history_scan_limit)
                .await?;
            matches.extend(recent.into_iter().filter(|message| keep(message)));
        }
        Ok(matches)
    }
}

/// `<t:…>` token the client renders in the reader's own timezone.
pub(crate) fn timestamp_token(unix: i64, style: char) -> String {
    format!("<t:{unix}:{style}>")
}

/// Inline code tag that links a rendered line back to an event.
pub(crate) fn event_tag(id: EntityId) -> String {
    format!("`#{id}`")
}

/// Event ids tagged anywhere in `text`.
pub(crate) fn tagged_event_ids(text: &str) -> BTreeSet<EntityId> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"`#(\d+)`").expect("event tag pattern"));
    tag.captures_iter(text)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<EntityId>().ok())
        .collect()
}

pub(crate) fn truncate_content(content: String) -> String {
    if content.chars().count() <= MAX_CONTENT_CHARS {
        return content;
    }
    let mut truncated = content
        .chars()
        .take(MAX_CONTENT_CHARS.saturating_sub(1))
        .collect::<String>();
    truncated.push('…');
    truncated
}

pub(crate) fn not_classifiable(
    variant: &'static str,
    message: &RenderedMessage,
    reason: impl Into<String>,
) -> ReconcileError {
    ReconcileError::NotClassifiable {
        variant,
        message_id: message.id.clone(),
        reason: reason.into(),
    }
}

pub(crate) fn render_failed(
    variant: &'static str,
    message: &RenderedMessage,
    reason: impl Into<String>,
) -> ReconcileError {
    ReconcileError::RenderFailed {
        variant,
        message_id: message.id.clone(),
        reason: reason.into(),
    }
}
