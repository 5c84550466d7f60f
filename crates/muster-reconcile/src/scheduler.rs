//! Debounced batch coalescing of entity invalidations.
//!
//! Callers enqueue entities far more often than their messages should be
//! rewritten. The scheduler collects distinct entity keys and, once no new key
//! has arrived for the debounce delay, runs one batch that refreshes every
//! related message of each entity exactly once.
//!
//! Phases: `Idle -> Pending -> Running -> Idle`, re-entering `Pending` when work
//! arrives during a run. At most one batch runs at a time. A batch that is
//! cancelled or panics still leaves `Running`, and its unfinished keys return
//! to the pending set.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use muster_core::{lock_unpoisoned, Entity, EntityKey, EntityStore};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::manager::RelatedUpdater;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Pending,
    Running,
}

/// Lifetime counters for one scheduler instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub batches_run: u64,
    pub entities_processed: u64,
    pub entities_failed: u64,
    pub entities_missing: u64,
}

/// Aggregate result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub entities: usize,
    pub messages_updated: usize,
    pub processed: usize,
    pub failed: usize,
    pub missing: usize,
    pub elapsed: Duration,
}

struct SchedulerState {
    phase: SchedulerPhase,
    pending: BTreeSet<EntityKey>,
    last_enqueue: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    stats: SchedulerStats,
}

struct SchedulerInner {
    store: Arc<dyn EntityStore>,
    updater: Arc<dyn RelatedUpdater>,
    debounce: Duration,
    state: Mutex<SchedulerState>,
    idle: Notify,
}

/// Keys of the batch currently `Running`; dropping it ends the run.
struct RunningBatch<'a> {
    scheduler: &'a UpdateScheduler,
    remaining: BTreeSet<EntityKey>,
}

impl Drop for RunningBatch<'_> {
    fn drop(&mut self) {
        let unfinished = std::mem::take(&mut self.remaining);
        self.scheduler.finish_batch(unfinished);
    }
}

/// Cloneable handle to one process-wide update scheduler.
#[derive(Clone)]
pub struct UpdateScheduler {
    inner: Arc<SchedulerInner>,
}

impl UpdateScheduler {
    pub fn new(
        store: Arc<dyn EntityStore>,
        updater: Arc<dyn RelatedUpdater>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                updater,
                debounce,
                state: Mutex::new(SchedulerState {
                    phase: SchedulerPhase::Idle,
                    pending: BTreeSet::new(),
                    last_enqueue: None,
                    timer: None,
                    timer_generation: 0,
                    stats: SchedulerStats::default(),
                }),
                idle: Notify::new(),
            }),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.lock_state().phase
    }

    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.lock_state().stats
    }

    /// Marks `key` stale and restarts the quiet-period timer.
    pub fn enqueue(&self, key: EntityKey) {
        let mut state = self.lock_state();
        let newly_pending = state.pending.insert(key);
        let now = Instant::now();
        state.last_enqueue = Some(now);
        if state.phase == SchedulerPhase::Idle {
            state.phase = SchedulerPhase::Pending;
        }
        self.arm_timer(&mut state, now + self.inner.debounce);
        tracing::debug!(
            entity = %key,
            newly_pending,
            pending = state.pending.len(),
            "entity invalidated"
        );
    }

    pub fn enqueue_entity(&self, entity: &Entity) {
        self.enqueue(entity.key());
    }

    /// Cancels the armed timer and runs a batch right away.
    ///
    /// Waits for an in-flight batch to finish first, so the flushed batch never
    /// overlaps another one.
    #[tracing::instrument(name = "muster_reconcile.scheduler.flush_now", skip(self))]
    pub async fn flush_now(&self) -> BatchSummary {
        let batch = loop {
            let notified = {
                let mut state = self.lock_state();
                cancel_timer(&mut state);
                if state.phase != SchedulerPhase::Running {
                    state.phase = SchedulerPhase::Running;
                    break std::mem::take(&mut state.pending);
                }
                self.inner.idle.notified()
            };
            notified.await;
        };
        let mut running = self.start_batch(batch);
        self.run_batch(&mut running).await
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        lock_unpoisoned(&self.inner.state)
    }

    /// Replaces any armed timer with one firing at `deadline`.
    fn arm_timer(&self, state: &mut SchedulerState, deadline: Instant) {
        cancel_timer(state);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available; pending entities wait for flush_now");
            return;
        };
        let generation = state.timer_generation;
        let scheduler = self.clone();
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            scheduler.on_timer(generation).await;
        }));
    }

    async fn on_timer(self, generation: u64) {
        let batch = {
            let mut state = self.lock_state();
            if state.timer_generation != generation {
                return;
            }
            // Detach: a later abort must not cancel the batch this task runs.
            state.timer = None;
            state.timer_generation = state.timer_generation.wrapping_add(1);
            match state.phase {
                SchedulerPhase::Running => {
                    if let Some(deadline) = state
                        .last_enqueue
                        .map(|last| last + self.inner.debounce)
                        .filter(|deadline| *deadline > Instant::now())
                    {
                        self.arm_timer(&mut state, deadline);
                    }
                    return;
                }
                SchedulerPhase::Idle | SchedulerPhase::Pending => {}
            }
            if state.pending.is_empty() {
                state.phase = SchedulerPhase::Idle;
                return;
            }
            state.phase = SchedulerPhase::Running;
            std::mem::take(&mut state.pending)
        };
        let mut running = self.start_batch(batch);
        self.run_batch(&mut running).await;
    }

    fn start_batch(&self, batch: BTreeSet<EntityKey>) -> RunningBatch<'_> {
        RunningBatch {
            scheduler: self,
            remaining: batch,
        }
    }

    #[tracing::instrument(
        name = "muster_reconcile.scheduler.run_batch",
        skip(self, batch),
        fields(entities = batch.remaining.len())
    )]
    async fn run_batch(&self, batch: &mut RunningBatch<'_>) -> BatchSummary {
        let started = Instant::now();
        let mut summary = BatchSummary {
            entities: batch.remaining.len(),
            ..BatchSummary::default()
        };
        // A key leaves `remaining` only once its refresh completed.
        while let Some(key) = batch.remaining.first().copied() {
            match self.inner.store.find_entity(key).await {
                Ok(Some(entity)) => {
                    let report = self.inner.updater.update_related_messages(&entity).await;
                    summary.messages_updated += report.updated.len();
                    if report.is_clean() {
                        summary.processed += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Ok(None) => {
                    tracing::debug!(entity = %key, "invalidated entity no longer exists");
                    summary.missing += 1;
                }
                Err(error) => {
                    tracing::warn!(entity = %key, %error, "failed to load invalidated entity");
                    summary.failed += 1;
                }
            }
            batch.remaining.remove(&key);
        }
        summary.elapsed = started.elapsed();

        let mut state = self.lock_state();
        state.stats.batches_run = state.stats.batches_run.saturating_add(1);
        state.stats.entities_processed = state
            .stats
            .entities_processed
            .saturating_add(summary.processed as u64);
        state.stats.entities_failed = state
            .stats
            .entities_failed
            .saturating_add(summary.failed as u64);
        state.stats.entities_missing = state
            .stats
            .entities_missing
            .saturating_add(summary.missing as u64);
        drop(state);

        tracing::info!(
            entities = summary.entities,
            processed = summary.processed,
            failed = summary.failed,
            missing = summary.missing,
            messages_updated = summary.messages_updated,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "update batch finished"
        );
        summary
    }

    fn finish_batch(&self, unfinished: BTreeSet<EntityKey>) {
        let mut state = self.lock_state();
        if !unfinished.is_empty() {
            tracing::warn!(
                unfinished = unfinished.len(),
                "update batch interrupted; requeueing unfinished entities"
            );
            state.pending.extend(unfinished);
        }
        if state.pending.is_empty() {
            state.phase = SchedulerPhase::Idle;
        } else {
            state.phase = SchedulerPhase::Pending;
            if state.timer.is_none() {
                let deadline = state
                    .last_enqueue
                    .map(|last| last + self.inner.debounce)
                    .unwrap_or_else(|| Instant::now() + self.inner.debounce);
                self.arm_timer(&mut state, deadline);
            }
        }
        drop(state);
        self.inner.idle.notify_waiters();
    }
}

fn cancel_timer(state: &mut SchedulerState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.timer_generation = state.timer_generation.wrapping_add(1);
}
