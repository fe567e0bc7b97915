//! Queue Consumer
//!
//! Drains the work queue one item at a time. Before every pop both the queue
//! size and the lock flag are re-checked, so disabling the lock stops the
//! worker after the item in progress.

use crate::config::UpcConfig;
use crate::error::ProcessError;
use crate::executor::StepExecutor;
use crate::label::Label;
use crate::models::WorkItem;
use crate::queue::{QueueLock, WorkQueue};
use crate::recipe::{RecipeStep, StepKind};
use crate::runner::{RecipeRunner, RunStatus, StepFailure};
use crate::services::persistence::ItemContext;
use crate::services::{PersistOutcome, Persistence};
use crate::workspace::WorkArea;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-item result, as counted in [`ConsumerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Success path recorded
    Succeeded,
    /// Failure path recorded, item abandoned, or persistence failed
    Failed,
    /// Nothing attempted (bad payload, missing input, no recipe)
    Skipped,
}

/// Counters for one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub dequeued: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ConsumerStats {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} dequeued: {} succeeded, {} failed, {} skipped",
            self.dequeued, self.succeeded, self.failed, self.skipped
        )
    }
}

pub struct QueueConsumer {
    queue: Arc<dyn WorkQueue>,
    lock: Arc<dyn QueueLock>,
    executor: Arc<dyn StepExecutor>,
    persistence: Persistence,
    config: Arc<UpcConfig>,
    queue_name: String,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        lock: Arc<dyn QueueLock>,
        executor: Arc<dyn StepExecutor>,
        persistence: Persistence,
        config: Arc<UpcConfig>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            lock,
            executor,
            persistence,
            config,
            queue_name: queue_name.into(),
        }
    }

    /// Process items until the queue is empty or the lock is disabled
    ///
    /// Only queue/lock service errors end the pass early.
    pub async fn drain(&self) -> upc_common::Result<ConsumerStats> {
        let mut stats = ConsumerStats::default();

        info!(queue = %self.queue_name, "Draining queue");

        while self.should_continue().await? {
            let Some(payload) = self.queue.pop(&self.queue_name).await? else {
                break;
            };
            stats.dequeued += 1;

            let outcome = self.process_payload(&payload).await;
            stats.record(outcome);
        }

        info!(
            queue = %self.queue_name,
            dequeued = stats.dequeued,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "Queue drained: {}",
            stats.display_string()
        );
        Ok(stats)
    }

    async fn should_continue(&self) -> upc_common::Result<bool> {
        if !self.lock.available(&self.queue_name).await? {
            info!(queue = %self.queue_name, "Queue lock disabled, stopping");
            return Ok(false);
        }
        Ok(self.queue.size(&self.queue_name).await? > 0)
    }

    pub async fn process_payload(&self, payload: &str) -> ItemOutcome {
        match WorkItem::from_payload(payload) {
            Ok(item) => self.process_item(&item).await,
            Err(e) => {
                warn!(payload = %payload, error = %e, "Malformed queue item, skipped");
                ItemOutcome::Skipped
            }
        }
    }

    pub async fn process_item(&self, item: &WorkItem) -> ItemOutcome {
        let config = self.config.as_ref();

        if !item.source_path.is_file() {
            warn!(file = %item.source_path.display(), "Source file missing, skipped");
            return ItemOutcome::Skipped;
        }
        let recipe = match config.recipes.resolve(&item.archive) {
            Some(recipe) if !recipe.is_empty() => recipe,
            _ => {
                warn!(archive = %item.archive, file = %item.source_path.display(), "No recipe for archive, skipped");
                return ItemOutcome::Skipped;
            }
        };
        let Some(archive) = config.registry.get(&item.archive) else {
            warn!(archive = %item.archive, file = %item.source_path.display(), "Archive not registered, skipped");
            return ItemOutcome::Skipped;
        };

        let area = match WorkArea::create(&config.bootstrap.workarea, &item.source_path) {
            Ok(area) => area,
            Err(e) => {
                error!(
                    workarea = %config.bootstrap.workarea.display(),
                    error = %e,
                    "Cannot create working directory"
                );
                return ItemOutcome::Failed;
            }
        };

        info!(file = %item.source_path.display(), archive = %item.archive, file_id = item.file_id, "Starting process");

        let runner = RecipeRunner::new(self.executor.as_ref(), archive.bandbin_query.as_deref());
        let run = runner.run(item, recipe, &area).await;

        let ctx = ItemContext {
            item,
            source_url: config
                .bootstrap
                .source_url(&item.source_path.to_string_lossy()),
            area: &area,
        };

        let result = match &run.status {
            RunStatus::Success => match Label::load_lenient(&area.report()) {
                Ok(report) => self.persistence.record_success(config, &ctx, &run, &report).await,
                Err(e) => {
                    let failure = report_failure(recipe, &e.to_string());
                    warn!(
                        file = %item.source_path.display(),
                        step = %failure.step,
                        error = %e,
                        "Report unreadable, recording as failed"
                    );
                    let serial = self.serial_number(&failure, &area).await;
                    self.persistence.record_failure(config, &ctx, &failure, serial).await
                }
            },
            RunStatus::Failed(failure) => {
                let serial = self.serial_number(failure, &area).await;
                self.persistence.record_failure(config, &ctx, failure, serial).await
            }
            RunStatus::Running => {
                error!(file = %item.source_path.display(), "Run ended without an outcome");
                area.finish();
                return ItemOutcome::Failed;
            }
        };

        let outcome = match result {
            Ok(PersistOutcome::Recorded { success: true, .. }) => ItemOutcome::Succeeded,
            Ok(PersistOutcome::Recorded { success: false, .. }) => ItemOutcome::Failed,
            Ok(PersistOutcome::Abandoned { .. }) => ItemOutcome::Failed,
            Err(ProcessError::ReferenceMissing(what)) => {
                warn!(file = %item.source_path.display(), missing = %what, "Reference data missing, item not recorded");
                discard_intermediates(&area);
                ItemOutcome::Failed
            }
            Err(e) => {
                error!(file = %item.source_path.display(), error = %e, "Persistence failed");
                discard_intermediates(&area);
                ItemOutcome::Failed
            }
        };

        area.finish();
        outcome
    }

    /// Toolkit identifier of the partial cube; only meaningful after conversion
    async fn serial_number(&self, failure: &StepFailure, area: &WorkArea) -> Option<String> {
        if failure.kind.is_early_stage() {
            return None;
        }
        match self.executor.serial_number(&area.working_copy()).await {
            Ok(serial) if !serial.trim().is_empty() => Some(serial.trim().to_string()),
            Ok(_) => {
                warn!(file = %area.working_copy().display(), "Empty toolkit identifier");
                None
            }
            Err(e) => {
                warn!(file = %area.working_copy().display(), error = %e, "Cannot read toolkit identifier");
                None
            }
        }
    }
}

/// Intermediates of an item whose outcome could not be recorded
fn discard_intermediates(area: &WorkArea) {
    for path in [
        area.working_copy(),
        area.output(),
        area.odd_output(),
        area.even_output(),
        area.report(),
    ] {
        area.remove_file(&path);
    }
}

/// Failure attributed to the step that should have written the report
fn report_failure(recipe: &[RecipeStep], reason: &str) -> StepFailure {
    let step = recipe
        .iter()
        .rev()
        .find(|s| s.kind == StepKind::Report)
        .or_else(|| recipe.last());

    match step {
        Some(step) => StepFailure {
            step: step.name.clone(),
            kind: step.kind,
            reason: reason.to_string(),
        },
        None => StepFailure {
            step: "caminfo".to_string(),
            kind: StepKind::Report,
            reason: reason.to_string(),
        },
    }
}
