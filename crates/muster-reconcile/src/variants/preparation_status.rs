use std::collections::BTreeMap;

use async_trait::async_trait;
use muster_core::{
    Button, ButtonStyle, Entity, EntityId, EventRecord, MessagePayload, PreparationRequest,
    RenderedMessage,
};

use super::{
    event_tag, tagged_event_ids, timestamp_token, truncate_content, MessageVariant,
    UpdateContext, ViewSources,
};
use crate::error::ReconcileResult;

const VARIANT_NAME: &str = "preparation_status";
const REFRESH_BUTTON_ID: &str = "prep:refresh";

pub const PREPARATION_HEADER: &str = "**Preparation status**";

/// Roster of upcoming events that still wait on preparation tasks.
pub struct PreparationStatusVariant {
    sources: ViewSources,
    channels: Vec<String>,
}

impl PreparationStatusVariant {
    pub fn new(sources: ViewSources, channels: Vec<String>) -> Self {
        Self { sources, channels }
    }

    /// Renders `roster`, expected in start order.
    pub fn render(roster: &[(EventRecord, Vec<PreparationRequest>)]) -> MessagePayload {
        let mut content = PREPARATION_HEADER.to_string();
        if roster.is_empty() {
            content.push_str("\nAll upcoming events are prepared.");
        }
        for (event, requests) in roster {
            let waiting_on = requests
                .iter()
                .map(|request| format!("{} ({})", request.task, request.assignee))
                .collect::<Vec<_>>()
                .join(", ");
            content.push_str(&format!(
                "\n{} **{}** {}\n  waiting on: {}",
                event_tag(event.id),
                event.name,
                timestamp_token(event.start_unix, 'R'),
                waiting_on
            ));
        }
        MessagePayload {
            content: truncate_content(content),
            embeds: Vec::new(),
            components: vec![Button::new(
                REFRESH_BUTTON_ID,
                "Refresh",
                ButtonStyle::Primary,
            )],
        }
    }

    async fn roster(&self) -> ReconcileResult<Vec<(EventRecord, Vec<PreparationRequest>)>> {
        let now = self.sources.clock.now_unix();
        let mut grouped: BTreeMap<EntityId, Vec<PreparationRequest>> = BTreeMap::new();
        for request in self.sources.store.open_preparation_requests().await? {
            grouped.entry(request.event_id).or_default().push(request);
        }

        let mut roster = Vec::with_capacity(grouped.len());
        for (event_id, mut requests) in grouped {
            let Some(event) = self.sources.store.find_event(event_id).await? else {
                tracing::debug!(event_id, "skipping open requests of a missing event");
                continue;
            };
            if event.start_unix < now {
                continue;
            }
            requests.sort_by_key(|request| request.id);
            roster.push((event, requests));
        }
        roster.sort_by_key(|(event, _)| (event.start_unix, event.id));
        Ok(roster)
    }
}

#[async_trait]
impl MessageVariant for PreparationStatusVariant {
    fn name(&self) -> &'static str {
        VARIANT_NAME
    }

    fn can_classify(&self, message: &RenderedMessage) -> bool {
        message.header_line() == PREPARATION_HEADER
    }

    async fn regenerate(
        &self,
        _message: &RenderedMessage,
        _context: Option<&UpdateContext>,
    ) -> ReconcileResult<MessagePayload> {
        Ok(Self::render(&self.roster().await?))
    }

    async fn related_messages(&self, entity: &Entity) -> ReconcileResult<Vec<RenderedMessage>> {
        let event_id = entity.event_id();
        let mut has_open_requests =
            matches!(entity, Entity::Preparation(request) if !request.prepared);
        if !has_open_requests {
            has_open_requests = self
                .sources
                .store
                .preparation_requests(event_id)
                .await?
                .iter()
                .any(|request| !request.prepared);
        }
        self.sources
            .scan(&self.channels, |message| {
                self.can_classify(message)
                    && (has_open_requests || tagged_event_ids(&message.content).contains(&event_id))
            })
            .await
    }
}
