//! Shared domain records and collaborator contracts for Muster crates.
//!
//! Provides the persisted entity records, the rendered chat-message model, the
//! `EntityStore` and `ChatPlatform` contracts consumed by the reconciliation
//! engine, clock helpers, and in-memory implementations of both contracts.

pub mod contracts;
pub mod entities;
pub mod memory;
pub mod message;
pub mod sync;
pub mod time_utils;

pub use contracts::{
    ChatPlatform, EntityStore, PlatformError, StoreError, StoreResult, UNKNOWN_INTERACTION_CODE,
    UNKNOWN_MESSAGE_CODE,
};
pub use entities::{Entity, EntityId, EntityKey, EntityKind, EventRecord, PreparationRequest};
pub use memory::{InMemoryChatPlatform, InMemoryEntityStore, PlatformCall};
pub use message::{
    Button, ButtonStyle, DeliveryIdentity, Embed, EmbedField, Interaction, MessageAuthor,
    MessagePayload, RenderedMessage, WebhookCredential,
};
pub use sync::lock_unpoisoned;
pub use time_utils::{current_unix_timestamp, Clock, FixedClock, SystemClock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_tracks_unix_timestamp() {
        let before = current_unix_timestamp();
        let observed = SystemClock.now_unix();
        let after = current_unix_timestamp();
        assert!(observed >= before as i64);
        assert!(observed <= after as i64);
    }

    #[test]
    fn fixed_clock_advances_only_when_told() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_unix(), 1_000);
        clock.advance(60);
        assert_eq!(clock.now_unix(), 1_060);
        clock.set(5);
        assert_eq!(clock.now_unix(), 5);
    }

    #[test]
    fn entity_keys_separate_tables_with_equal_ids() {
        assert_ne!(EntityKey::event(42), EntityKey::preparation(42));
        assert_eq!(EntityKey::event(42).to_string(), "event#42");
    }
}
