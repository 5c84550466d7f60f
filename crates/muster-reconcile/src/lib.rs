//! Message reconciliation and update scheduling for Muster.
//!
//! Keeps announcement, calendar, schedule and preparation messages in sync with
//! the entity store. Message variants recognize and re-render their own views,
//! the reconciliation manager fans entity changes out to every view showing
//! them, the update scheduler debounces bursts of invalidations, and the
//! edit/fetch gateway and reply continuity tracker wrap the remote platform.
//!
//! ```rust
//! use muster_core::RenderedMessage;
//! use muster_reconcile::variants::{CalendarVariant, CALENDAR_HEADER};
//!
//! let payload = CalendarVariant::render(&[], 14);
//! let message = RenderedMessage::default().with_payload(&payload);
//! assert_eq!(message.header_line(), CALENDAR_HEADER);
//! ```

pub mod config;
pub mod discord_api_client;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod manager;
pub mod reply;
pub mod scheduler;
pub mod variants;

pub use config::{load_reconcile_config, ChannelLayout, DiscordApiConfig, ReconcileConfig};
pub use discord_api_client::DiscordApiClient;
pub use engine::ReconcileEngine;
pub use error::{DeliveryAttempt, DeliveryError, ReconcileError, ReconcileResult};
pub use gateway::EditFetchGateway;
pub use logging::init_tracing;
pub use manager::{ReconciliationManager, RelatedUpdateReport, RelatedUpdater, UpdateFailure};
pub use reply::ReplyContinuity;
pub use scheduler::{BatchSummary, SchedulerPhase, SchedulerStats, UpdateScheduler};
pub use variants::{MessageVariant, UpdateContext, ViewSources};
