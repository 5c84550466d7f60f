use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use muster_core::{Entity, EventRecord, MessagePayload, RenderedMessage};
use regex::Regex;

use super::{
    event_tag, not_classifiable, render_failed, tagged_event_ids, timestamp_token,
    truncate_content, MessageVariant, UpdateContext, ViewSources,
};
use crate::error::ReconcileResult;

const VARIANT_NAME: &str = "weekly_schedule";
const DATE_FORMAT: &str = "%Y-%m-%d";

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^__\*\*Week of (\d{4}-\d{2}-\d{2}) → (\d{4}-\d{2}-\d{2})\*\*__$")
            .expect("weekly schedule header pattern")
    })
}

/// Header line carrying the schedule's date range.
pub fn weekly_schedule_header(first_day: NaiveDate, last_day: NaiveDate) -> String {
    format!(
        "__**Week of {} → {}**__",
        first_day.format(DATE_FORMAT),
        last_day.format(DATE_FORMAT)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DateRange {
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl DateRange {
    /// Half-open unix-second bounds covering every day of the range in UTC.
    fn unix_bounds(self) -> Option<(i64, i64)> {
        let start = self.first_day.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
        let end = self
            .last_day
            .checked_add_days(Days::new(1))?
            .and_hms_opt(0, 0, 0)?
            .and_utc()
            .timestamp();
        Some((start, end))
    }
}

fn parse_header(message: &RenderedMessage) -> Result<DateRange, String> {
    let captures = header_pattern()
        .captures(message.header_line())
        .ok_or_else(|| "missing week header".to_string())?;
    let parse = |index: usize| {
        let raw = captures.get(index).map(|value| value.as_str()).unwrap_or_default();
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|error| format!("invalid date '{raw}': {error}"))
    };
    let range = DateRange {
        first_day: parse(1)?,
        last_day: parse(2)?,
    };
    if range.last_day < range.first_day {
        return Err(format!(
            "week ends before it starts ({} → {})",
            range.first_day, range.last_day
        ));
    }
    Ok(range)
}

/// Detailed per-day schedule for one fixed date range.
pub struct WeeklyScheduleVariant {
    sources: ViewSources,
    channels: Vec<String>,
}

impl WeeklyScheduleVariant {
    pub fn new(sources: ViewSources, channels: Vec<String>) -> Self {
        Self { sources, channels }
    }

    pub fn render(first_day: NaiveDate, last_day: NaiveDate, events: &[EventRecord]) -> MessagePayload {
        let mut content = weekly_schedule_header(first_day, last_day);
        if events.is_empty() {
            content.push_str("\n\nNothing scheduled this week.");
            return MessagePayload::text(content);
        }

        let mut days: BTreeMap<NaiveDate, Vec<&EventRecord>> = BTreeMap::new();
        for event in events {
            if let Some(start) = DateTime::from_timestamp(event.start_unix, 0) {
                days.entry(start.date_naive()).or_default().push(event);
            }
        }
        for (day, day_events) in days {
            content.push_str(&format!("\n\n**{}**", day.format("%A %-d %B")));
            for event in day_events {
                content.push_str(&format!(
                    "\n{} {} **{}**",
                    event_tag(event.id),
                    timestamp_token(event.start_unix, 't'),
                    event.name
                ));
                if let Some(location) = event
                    .location
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                {
                    content.push_str(&format!(" · {location}"));
                }
                if let Some(summary) = event
                    .description
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                {
                    content.push_str(&format!("\n> {summary}"));
                }
            }
        }
        MessagePayload::text(truncate_content(content))
    }
}

#[async_trait]
impl MessageVariant for WeeklyScheduleVariant {
    fn name(&self) -> &'static str {
        VARIANT_NAME
    }

    fn can_classify(&self, message: &RenderedMessage) -> bool {
        header_pattern().is_match(message.header_line())
    }

    async fn regenerate(
        &self,
        message: &RenderedMessage,
        _context: Option<&UpdateContext>,
    ) -> ReconcileResult<MessagePayload> {
        let range =
            parse_header(message).map_err(|reason| not_classifiable(VARIANT_NAME, message, reason))?;
        let (start, end) = range
            .unix_bounds()
            .ok_or_else(|| render_failed(VARIANT_NAME, message, "date range out of bounds"))?;
        let events = self.sources.store.events_between(start, end).await?;
        Ok(Self::render(range.first_day, range.last_day, &events))
    }

    async fn related_messages(&self, entity: &Entity) -> ReconcileResult<Vec<RenderedMessage>> {
        let Entity::Event(event) = entity else {
            return Ok(Vec::new());
        };
        self.sources
            .scan(&self.channels, |message| {
                if !self.can_classify(message) {
                    return false;
                }
                let covers_start = parse_header(message)
                    .ok()
                    .and_then(DateRange::unix_bounds)
                    .is_some_and(|(start, end)| event.start_unix >= start && event.start_unix < end);
                covers_start || tagged_event_ids(&message.content).contains(&event.id)
            })
            .await
    }
}
