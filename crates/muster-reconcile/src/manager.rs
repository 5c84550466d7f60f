//! Dispatches updates to the variant that owns each rendered message.

use std::sync::Arc;

use async_trait::async_trait;
use muster_core::{Entity, RenderedMessage};

use crate::error::{ReconcileError, ReconcileResult};
use crate::gateway::EditFetchGateway;
use crate::variants::{MessageVariant, UpdateContext};

/// One message (or one variant's related-message lookup) that failed to update.
#[derive(Debug)]
pub struct UpdateFailure {
    pub variant: &'static str,
    /// `None` when the variant's related-message lookup itself failed.
    pub message_id: Option<String>,
    pub error: ReconcileError,
}

/// Outcome of a best-effort fan-out over every message showing an entity.
#[derive(Debug, Default)]
pub struct RelatedUpdateReport {
    pub updated: Vec<RenderedMessage>,
    pub failures: Vec<UpdateFailure>,
}

impl RelatedUpdateReport {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Target of scheduled batches; implemented by [`ReconciliationManager`].
#[async_trait]
pub trait RelatedUpdater: Send + Sync {
    async fn update_related_messages(&self, entity: &Entity) -> RelatedUpdateReport;
}

/// Ordered registry of message variants; the first variant that classifies a
/// message owns it.
pub struct ReconciliationManager {
    variants: Vec<Arc<dyn MessageVariant>>,
    gateway: Arc<EditFetchGateway>,
}

impl ReconciliationManager {
    pub fn new(gateway: Arc<EditFetchGateway>) -> Self {
        Self {
            variants: Vec::new(),
            gateway,
        }
    }

    /// Appends a variant; classification checks variants in registration order.
    pub fn register(&mut self, variant: Arc<dyn MessageVariant>) -> &mut Self {
        self.variants.push(variant);
        self
    }

    pub fn with_variant(mut self, variant: Arc<dyn MessageVariant>) -> Self {
        self.register(variant);
        self
    }

    pub fn variant_names(&self) -> Vec<&'static str> {
        self.variants.iter().map(|variant| variant.name()).collect()
    }

    pub fn gateway(&self) -> &Arc<EditFetchGateway> {
        &self.gateway
    }

    /// Returns the variant that claims `message`, if any.
    pub fn classify(&self, message: &RenderedMessage) -> Option<&Arc<dyn MessageVariant>> {
        self.variants
            .iter()
            .find(|variant| variant.can_classify(message))
    }

    /// Regenerates one message through its owning variant and edits it in place.
    #[tracing::instrument(
        name = "muster_reconcile.manager.update_message",
        skip(self, message, context),
        fields(channel_id = %message.channel_id, message_id = %message.id)
    )]
    pub async fn update_message(
        &self,
        message: &RenderedMessage,
        context: Option<&UpdateContext>,
    ) -> ReconcileResult<RenderedMessage> {
        let Some(variant) = self.classify(message) else {
            tracing::error!("no message variant recognizes message");
            return Err(ReconcileError::Unrecognized {
                channel_id: message.channel_id.clone(),
                message_id: message.id.clone(),
            });
        };
        let result = self.regenerate_and_apply(variant.as_ref(), message, context).await;
        if let Err(error) = &result {
            tracing::error!(variant = variant.name(), %error, "message update failed");
        }
        result
    }

    async fn regenerate_and_apply(
        &self,
        variant: &dyn MessageVariant,
        message: &RenderedMessage,
        context: Option<&UpdateContext>,
    ) -> ReconcileResult<RenderedMessage> {
        let payload = variant.regenerate(message, context).await?;
        let updated = self.gateway.apply(message, &payload).await?;
        tracing::debug!(
            variant = variant.name(),
            message_id = %updated.id,
            "message regenerated"
        );
        Ok(updated)
    }

    /// Updates every live message showing `entity`, isolating each failure.
    #[tracing::instrument(
        name = "muster_reconcile.manager.update_related_messages",
        skip(self, entity),
        fields(entity = %entity.key())
    )]
    pub async fn update_related_messages(&self, entity: &Entity) -> RelatedUpdateReport {
        let mut report = RelatedUpdateReport::default();
        for variant in &self.variants {
            let related = match variant.related_messages(entity).await {
                Ok(related) => related,
                Err(error) => {
                    tracing::warn!(
                        variant = variant.name(),
                        %error,
                        "related message lookup failed"
                    );
                    report.failures.push(UpdateFailure {
                        variant: variant.name(),
                        message_id: None,
                        error,
                    });
                    continue;
                }
            };
            for message in related {
                match self.regenerate_and_apply(variant.as_ref(), &message, None).await {
                    Ok(updated) => report.updated.push(updated),
                    Err(error) => {
                        tracing::warn!(
                            variant = variant.name(),
                            message_id = %message.id,
                            render_failure = error.is_render_failure(),
                            %error,
                            "related message update failed"
                        );
                        report.failures.push(UpdateFailure {
                            variant: variant.name(),
                            message_id: Some(message.id.clone()),
                            error,
                        });
                    }
                }
            }
        }
        tracing::debug!(
            updated = report.updated.len(),
            failed = report.failures.len(),
            "related message fan-out finished"
        );
        report
    }
}

#[async_trait]
impl RelatedUpdater for ReconciliationManager {
    async fn update_related_messages(&self, entity: &Entity) -> RelatedUpdateReport {
        ReconciliationManager::update_related_messages(self, entity).await
    }
}

#[cfg(test)]
mod tests {
    use muster_core::{
        FixedClock, InMemoryChatPlatform, InMemoryEntityStore, MessageAuthor, MessagePayload,
        PlatformCall,
    };

    use super::*;
    use crate::variants::{
        CalendarVariant, EventInfoVariant, PreparationStatusVariant, ViewSources,
        WeeklyScheduleVariant,
    };

    const NOW: i64 = 1_792_000_000;

    struct Fixture {
        store: Arc<InMemoryEntityStore>,
        platform: Arc<InMemoryChatPlatform>,
        manager: ReconciliationManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryEntityStore::new());
        let platform = Arc::new(InMemoryChatPlatform::new());
        let sources = ViewSources {
            store: store.clone(),
            platform: platform.clone(),
            clock: Arc::new(FixedClock::new(NOW)),
            history_scan_limit: 50,
        };
        let gateway = Arc::new(EditFetchGateway::new(platform.clone(), "muster"));
        let manager = ReconciliationManager::new(gateway)
            .with_variant(Arc::new(EventInfoVariant::new(
                sources.clone(),
                vec!["announce".to_string()],
            )))
            .with_variant(Arc::new(CalendarVariant::new(
                sources.clone(),
                vec!["cal".to_string()],
                14,
            )))
            .with_variant(Arc::new(WeeklyScheduleVariant::new(
                sources.clone(),
                vec!["sched".to_string()],
            )))
            .with_variant(Arc::new(PreparationStatusVariant::new(
                sources,
                vec!["prep".to_string()],
            )));
        Fixture {
            store,
            platform,
            manager,
        }
    }

    fn event(id: i64, name: &str) -> muster_core::EventRecord {
        muster_core::EventRecord {
            id,
            guild_id: "900".to_string(),
            scheduled_event_id: format!("77{id}"),
            name: name.to_string(),
            description: String::new(),
            location: None,
            start_unix: NOW + 3_600,
            end_unix: None,
        }
    }

    fn post(fixture: &Fixture, channel_id: &str, payload: MessagePayload) -> RenderedMessage {
        fixture.platform.insert_message(
            RenderedMessage {
                channel_id: channel_id.to_string(),
                author: MessageAuthor::Bot,
                ..RenderedMessage::default()
            }
            .with_payload(&payload),
        )
    }

    #[test]
    fn unit_variant_names_follow_registration_order() {
        let fixture = fixture();
        assert_eq!(
            fixture.manager.variant_names(),
            vec!["event_info", "calendar", "weekly_schedule", "preparation_status"]
        );
    }

    #[tokio::test]
    async fn functional_update_message_rejects_unrecognized_content() {
        let fixture = fixture();
        let message = post(&fixture, "general", MessagePayload::text("just chatting"));
        let error = fixture
            .manager
            .update_message(&message, None)
            .await
            .expect_err("unrecognized");
        assert!(matches!(error, ReconcileError::Unrecognized { .. }));
        assert!(fixture.platform.edit_calls().is_empty());
    }

    #[tokio::test]
    async fn functional_update_message_edits_once_through_owner() {
        let fixture = fixture();
        let original = event(42, "Raid");
        fixture.store.upsert_event(original.clone());
        let message = post(&fixture, "announce", EventInfoVariant::render(&original, &[]));
        let mut renamed = original;
        renamed.name = "Raid (rescheduled)".to_string();
        fixture.store.upsert_event(renamed);

        let updated = fixture
            .manager
            .update_message(&message, None)
            .await
            .expect("update");
        assert_eq!(updated.embeds[0].title.as_deref(), Some("Raid (rescheduled)"));
        assert_eq!(
            fixture.platform.edit_calls(),
            vec![PlatformCall::EditMessage {
                identity: MessageAuthor::Bot,
                channel_id: "announce".to_string(),
                message_id: message.id.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn functional_related_fan_out_continues_after_lookup_failure() {
        let fixture = fixture();
        let target = event(42, "Raid");
        fixture.store.upsert_event(target.clone());
        post(&fixture, "announce", EventInfoVariant::render(&target, &[]));
        fixture.platform.fail_listing_of("cal");

        let report = fixture
            .manager
            .update_related_messages(&Entity::Event(target))
            .await;
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].variant, "calendar");
        assert!(report.failures[0].message_id.is_none());
    }

    #[tokio::test]
    async fn regression_deleted_entity_is_counted_not_propagated() {
        let fixture = fixture();
        let target = event(42, "Raid");
        post(&fixture, "announce", EventInfoVariant::render(&target, &[]));

        let report = fixture
            .manager
            .update_related_messages(&Entity::Event(target))
            .await;
        assert!(report.updated.is_empty());
        assert_eq!(report.failure_count(), 1);
        assert!(report.failures[0].error.is_render_failure());
    }
}
