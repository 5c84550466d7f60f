use async_trait::async_trait;
use muster_core::{Embed, Entity, EventRecord, MessagePayload, RenderedMessage};

use super::{
    event_tag, tagged_event_ids, timestamp_token, MessageVariant, UpdateContext, ViewSources,
};
use crate::error::ReconcileResult;

const VARIANT_NAME: &str = "calendar";
const SECONDS_PER_DAY: i64 = 86_400;
const MAX_CALENDAR_LINES: usize = 25;

pub const CALENDAR_HEADER: &str = "**Upcoming events**";
pub const CALENDAR_EMBED_TITLE: &str = "Event calendar";

/// Rolling list of events starting within the configured window.
pub struct CalendarVariant {
    sources: ViewSources,
    channels: Vec<String>,
    window_days: u32,
}

impl CalendarVariant {
    pub fn new(sources: ViewSources, channels: Vec<String>, window_days: u32) -> Self {
        Self {
            sources,
            channels,
            window_days: window_days.max(1),
        }
    }

    fn window(&self) -> (i64, i64) {
        let start = self.sources.clock.now_unix();
        (start, start + i64::from(self.window_days) * SECONDS_PER_DAY)
    }

    pub fn render(events: &[EventRecord], window_days: u32) -> MessagePayload {
        let description = if events.is_empty() {
            "No events scheduled.".to_string()
        } else {
            events
                .iter()
                .take(MAX_CALENDAR_LINES)
                .map(|event| {
                    format!(
                        "{} {} [{}]({})",
                        event_tag(event.id),
                        timestamp_token(event.start_unix, 'f'),
                        event.name,
                        event.scheduled_event_url()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let mut embed = Embed {
            title: Some(CALENDAR_EMBED_TITLE.to_string()),
            description: Some(description),
            ..Embed::default()
        };
        if events.len() > MAX_CALENDAR_LINES {
            embed.footer = Some(format!(
                "{} more not shown",
                events.len() - MAX_CALENDAR_LINES
            ));
        }
        MessagePayload {
            content: format!("{CALENDAR_HEADER}\nShowing the next {window_days} days."),
            embeds: vec![embed],
            components: Vec::new(),
        }
    }
}

#[async_trait]
impl MessageVariant for CalendarVariant {
    fn name(&self) -> &'static str {
        VARIANT_NAME
    }

    fn can_classify(&self, message: &RenderedMessage) -> bool {
        message.header_line() == CALENDAR_HEADER
            && message
                .embeds
                .first()
                .and_then(|embed| embed.title.as_deref())
                == Some(CALENDAR_EMBED_TITLE)
    }

    async fn regenerate(
        &self,
        _message: &RenderedMessage,
        _context: Option<&UpdateContext>,
    ) -> ReconcileResult<MessagePayload> {
        let (start, end) = self.window();
        let events = self.sources.store.events_between(start, end).await?;
        Ok(Self::render(&events, self.window_days))
    }

    async fn related_messages(&self, entity: &Entity) -> ReconcileResult<Vec<RenderedMessage>> {
        let Entity::Event(event) = entity else {
            return Ok(Vec::new());
        };
        let (start, end) = self.window();
        let in_window = event.start_unix >= start && event.start_unix < end;
        self.sources
            .scan(&self.channels, |message| {
                if !self.can_classify(message) {
                    return false;
                }
                in_window
                    || message.embeds.first().is_some_and(|embed| {
                        tagged_event_ids(embed.description.as_deref().unwrap_or_default())
                            .contains(&event.id)
                    })
            })
            .await
    }
}
