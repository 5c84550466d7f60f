//! Process-wide wiring of the gateway, manager and scheduler from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use muster_core::{ChatPlatform, Clock, EntityStore, SystemClock};

use crate::config::ReconcileConfig;
use crate::discord_api_client::DiscordApiClient;
use crate::gateway::EditFetchGateway;
use crate::manager::ReconciliationManager;
use crate::scheduler::UpdateScheduler;
use crate::variants::{
    CalendarVariant, EventInfoVariant, PreparationStatusVariant, ViewSources,
    WeeklyScheduleVariant,
};

/// One instance per process; clone the handles into command handlers.
#[derive(Clone)]
pub struct ReconcileEngine {
    pub gateway: Arc<EditFetchGateway>,
    pub manager: Arc<ReconciliationManager>,
    pub scheduler: UpdateScheduler,
}

impl ReconcileEngine {
    /// Builds the engine with the four standard variants in classification order.
    pub fn from_parts(
        config: &ReconcileConfig,
        store: Arc<dyn EntityStore>,
        platform: Arc<dyn ChatPlatform>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sources = ViewSources {
            store: store.clone(),
            platform: platform.clone(),
            clock,
            history_scan_limit: config.effective_history_scan_limit(),
        };
        let gateway = Arc::new(EditFetchGateway::new(platform, config.webhook_name.clone()));
        let manager = Arc::new(
            ReconciliationManager::new(gateway.clone())
                .with_variant(Arc::new(EventInfoVariant::new(
                    sources.clone(),
                    config.channels.announcements.clone(),
                )))
                .with_variant(Arc::new(CalendarVariant::new(
                    sources.clone(),
                    config.channels.calendar.clone(),
                    config.calendar_window_days,
                )))
                .with_variant(Arc::new(WeeklyScheduleVariant::new(
                    sources.clone(),
                    config.channels.schedule.clone(),
                )))
                .with_variant(Arc::new(PreparationStatusVariant::new(
                    sources,
                    config.channels.preparation.clone(),
                ))),
        );
        let scheduler = UpdateScheduler::new(store, manager.clone(), config.debounce());
        tracing::info!(
            variants = ?manager.variant_names(),
            debounce_ms = config.debounce_ms,
            history_scan_limit = config.effective_history_scan_limit(),
            "reconcile engine ready"
        );
        Self {
            gateway,
            manager,
            scheduler,
        }
    }

    /// Builds the engine against the Discord REST api and the system clock.
    pub fn discord(config: &ReconcileConfig, store: Arc<dyn EntityStore>) -> Result<Self> {
        let client = DiscordApiClient::new(&config.discord)
            .context("failed to build discord platform client")?;
        Ok(Self::from_parts(
            config,
            store,
            Arc::new(client),
            Arc::new(SystemClock),
        ))
    }
}
