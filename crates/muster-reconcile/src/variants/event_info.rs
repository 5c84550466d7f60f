use std::sync::OnceLock;

use async_trait::async_trait;
use muster_core::{
    Button, ButtonStyle, Embed, EmbedField, Entity, EntityId, EventRecord, MessagePayload,
    PreparationRequest, RenderedMessage,
};
use regex::Regex;

use super::{not_classifiable, timestamp_token, MessageVariant, UpdateContext, ViewSources};
use crate::error::{ReconcileError, ReconcileResult};

const VARIANT_NAME: &str = "event_info";
const FOOTER_PREFIX: &str = "event #";
/// Platform limit for a single embed field value.
const EMBED_FIELD_MAX_CHARS: usize = 1024;

fn scheduled_event_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https://discord\.com/events/\d+/\d+$").expect("scheduled event url pattern")
    })
}

fn footer_event_id(embed: &Embed) -> Option<EntityId> {
    embed
        .footer
        .as_deref()?
        .trim()
        .strip_prefix(FOOTER_PREFIX)?
        .trim()
        .parse()
        .ok()
}

/// Single-event announcement embed linking to the platform scheduled event.
pub struct EventInfoVariant {
    sources: ViewSources,
    channels: Vec<String>,
}

impl EventInfoVariant {
    pub fn new(sources: ViewSources, channels: Vec<String>) -> Self {
        Self { sources, channels }
    }

    /// Builds the announcement for `event`; also used to post new announcements.
    pub fn render(event: &EventRecord, preparations: &[PreparationRequest]) -> MessagePayload {
        let mut fields = vec![EmbedField::new(
            "Starts",
            format!(
                "{} ({})",
                timestamp_token(event.start_unix, 'F'),
                timestamp_token(event.start_unix, 'R')
            ),
            true,
        )];
        if let Some(end_unix) = event.end_unix {
            fields.push(EmbedField::new("Ends", timestamp_token(end_unix, 't'), true));
        }
        if let Some(location) = event
            .location
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            fields.push(EmbedField::new("Location", location, true));
        }
        fields.push(EmbedField::new(
            "Preparation",
            preparation_summary(preparations),
            false,
        ));

        let description = event.description.trim();
        MessagePayload {
            content: String::new(),
            embeds: vec![Embed {
                title: Some(event.name.clone()),
                description: (!description.is_empty()).then(|| description.to_string()),
                url: Some(event.scheduled_event_url()),
                fields,
                footer: Some(format!("{FOOTER_PREFIX}{}", event.id)),
            }],
            components: vec![
                Button::new(
                    format!("event:{}:signup", event.id),
                    "Sign up",
                    ButtonStyle::Success,
                ),
                Button::new(
                    format!("event:{}:withdraw", event.id),
                    "Withdraw",
                    ButtonStyle::Secondary,
                ),
            ],
        }
    }
}

fn preparation_summary(preparations: &[PreparationRequest]) -> String {
    if preparations.is_empty() {
        return "No preparation needed".to_string();
    }
    let ready = preparations.iter().filter(|request| request.prepared).count();
    let mut summary = format!("{ready}/{} tasks ready", preparations.len());
    let open = preparations
        .iter()
        .filter(|request| !request.prepared)
        .collect::<Vec<_>>();
    // Room for the widest possible "+N more" tail stays reserved.
    let tail_reserve = format!("\n+{} more", open.len()).chars().count();
    let mut used = summary.chars().count();
    for (index, request) in open.iter().enumerate() {
        let line = format!("\n• {} ({})", request.task, request.assignee);
        let line_chars = line.chars().count();
        let is_last = index + 1 == open.len();
        let budget = if is_last {
            EMBED_FIELD_MAX_CHARS
        } else {
            EMBED_FIELD_MAX_CHARS - tail_reserve
        };
        if used + line_chars > budget {
            summary.push_str(&format!("\n+{} more", open.len() - index));
            break;
        }
        summary.push_str(&line);
        used += line_chars;
    }
    summary
}

#[async_trait]
impl MessageVariant for EventInfoVariant {
    fn name(&self) -> &'static str {
        VARIANT_NAME
    }

    fn can_classify(&self, message: &RenderedMessage) -> bool {
        if !message.content.trim().is_empty() || message.embeds.len() != 1 {
            return false;
        }
        message.embeds[0]
            .url
            .as_deref()
            .is_some_and(|url| scheduled_event_url_pattern().is_match(url.trim()))
    }

    async fn regenerate(
        &self,
        message: &RenderedMessage,
        context: Option<&UpdateContext>,
    ) -> ReconcileResult<MessagePayload> {
        let event_id = match context.and_then(|context| context.event_id) {
            Some(event_id) => event_id,
            None => message
                .embeds
                .first()
                .and_then(footer_event_id)
                .ok_or_else(|| {
                    not_classifiable(VARIANT_NAME, message, "embed footer has no event id")
                })?,
        };
        let event = self
            .sources
            .store
            .find_event(event_id)
            .await?
            .ok_or(ReconcileError::EntityNotFound(event_id))?;
        let preparations = self.sources.store.preparation_requests(event_id).await?;
        Ok(Self::render(&event, &preparations))
    }

    async fn related_messages(&self, entity: &Entity) -> ReconcileResult<Vec<RenderedMessage>> {
        let event_id = entity.event_id();
        self.sources
            .scan(&self.channels, |message| {
                self.can_classify(message)
                    && message.embeds.first().and_then(footer_event_id) == Some(event_id)
            })
            .await
    }
}
