//! Persisted records that rendered messages visually represent.

use serde::{Deserialize, Serialize};

/// Integer identity of a persisted record.
pub type EntityId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
/// Enumerates the record tables an [`EntityKey`] can point into.
pub enum EntityKind {
    Event,
    Preparation,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Preparation => "preparation",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Table-qualified identity of one persisted record.
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn event(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Event,
            id,
        }
    }

    pub fn preparation(id: EntityId) -> Self {
        Self {
            kind: EntityKind::Preparation,
            id,
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// A community event mirrored by a platform scheduled event.
pub struct EventRecord {
    pub id: EntityId,
    pub guild_id: String,
    pub scheduled_event_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub start_unix: i64,
    #[serde(default)]
    pub end_unix: Option<i64>,
}

impl EventRecord {
    /// Link back to the platform's scheduled-event resource.
    pub fn scheduled_event_url(&self) -> String {
        format!(
            "https://discord.com/events/{}/{}",
            self.guild_id.trim(),
            self.scheduled_event_id.trim()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One preparation task that must be done before an event can run.
pub struct PreparationRequest {
    pub id: EntityId,
    pub event_id: EntityId,
    pub task: String,
    pub assignee: String,
    #[serde(default)]
    pub prepared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Any record the reconciliation engine can be asked to re-render.
pub enum Entity {
    Event(EventRecord),
    Preparation(PreparationRequest),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Event(event) => EntityKey::event(event.id),
            Self::Preparation(request) => EntityKey::preparation(request.id),
        }
    }

    /// Returns the event this record is displayed under.
    pub fn event_id(&self) -> EntityId {
        match self {
            Self::Event(event) => event.id,
            Self::Preparation(request) => request.event_id,
        }
    }
}

impl From<EventRecord> for Entity {
    fn from(value: EventRecord) -> Self {
        Self::Event(value)
    }
}

impl From<PreparationRequest> for Entity {
    fn from(value: PreparationRequest) -> Self {
        Self::Preparation(value)
    }
}
