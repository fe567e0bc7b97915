//! Recipe Runner
//!
//! Drives one work item through its recipe. Each step is bound, executed, and
//! its output renamed over the working copy; the loop stops at the first
//! failed step and no later step runs.
//!
//! # State
//! A [`PipelineRun`] starts `Running` and ends either `Success` or
//! `Failed(StepFailure)`; the transition happens in exactly one place per
//! outcome and nothing is retried.

use crate::executor::StepExecutor;
use crate::label::{Label, LabelValue};
use crate::models::WorkItem;
use crate::recipe::{RecipeStep, StepKind};
use crate::workspace::WorkArea;
use std::path::Path;
use tracing::{debug, info, warn};

/// Band lists reported in the working copy's `IsisCube/BandBin` group
#[derive(Debug, Clone, PartialEq)]
pub struct BandInfo {
    /// Filter names (sequence or scalar)
    pub filters: LabelValue,
    /// Center wavelengths (sequence or scalar, possibly with units)
    pub centers: LabelValue,
}

impl BandInfo {
    /// Read the band lists from a cube label
    ///
    /// `None` when the label has no usable BandBin entries.
    pub fn from_label(label: &Label, bandbin_query: &str) -> Option<Self> {
        let filters = label.value_at(&["IsisCube", "BandBin", bandbin_query])?;
        let centers = label.value_at(&["IsisCube", "BandBin", "Center"])?;
        Some(Self {
            filters: filters.clone(),
            centers: centers.clone(),
        })
    }

    /// (filter, center wavelength) rows to store
    ///
    /// One row per filter when the filters are a list, otherwise exactly one
    /// row with the center reduced to a plain number.
    pub fn rows(&self) -> Vec<(String, Option<f64>)> {
        match self.filters.as_sequence() {
            Some(filters) => {
                let centers = self.centers.as_sequence().unwrap_or(&[]);
                filters
                    .iter()
                    .enumerate()
                    .map(|(i, filter)| {
                        (
                            filter.strip_units().to_string(),
                            centers.get(i).and_then(LabelValue::as_f64),
                        )
                    })
                    .collect()
            }
            None => {
                let center = match self.centers.as_sequence() {
                    Some(items) => items.first().and_then(LabelValue::as_f64),
                    None => self.centers.as_f64(),
                };
                vec![(self.filters.strip_units().to_string(), center)]
            }
        }
    }
}

/// Failing step of a run
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: String,
    pub kind: StepKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Running,
    Success,
    Failed(StepFailure),
}

/// Transient state of one item's run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Index of the step being (or last) executed
    pub current_step: usize,
    pub status: RunStatus,
    /// Steps that completed, in order
    pub completed: Vec<String>,
    /// Most recent band lists read after a conversion or merge step
    pub bands: Option<BandInfo>,
}

impl PipelineRun {
    fn start() -> Self {
        Self {
            current_step: 0,
            status: RunStatus::Running,
            completed: Vec::new(),
            bands: None,
        }
    }

    fn fail(&mut self, step: &RecipeStep, reason: impl Into<String>) {
        self.status = RunStatus::Failed(StepFailure {
            step: step.name.clone(),
            kind: step.kind,
            reason: reason.into(),
        });
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        match &self.status {
            RunStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

pub struct RecipeRunner<'a> {
    executor: &'a dyn StepExecutor,
    bandbin_query: Option<&'a str>,
}

impl<'a> RecipeRunner<'a> {
    /// `bandbin_query` names the BandBin key holding filter names for the archive
    pub fn new(executor: &'a dyn StepExecutor, bandbin_query: Option<&'a str>) -> Self {
        Self {
            executor,
            bandbin_query,
        }
    }

    pub async fn run(&self, item: &WorkItem, recipe: &[RecipeStep], area: &WorkArea) -> PipelineRun {
        let mut run = PipelineRun::start();
        let working = area.working_copy();

        for (index, step) in recipe.iter().enumerate() {
            run.current_step = index;
            let invocation = step.bind(&item.source_path, area);

            debug!(
                file = %item.source_path.display(),
                step = %step.name,
                index,
                "Running step"
            );

            if let Err(e) = self.executor.execute(&invocation).await {
                warn!(
                    file = %item.source_path.display(),
                    step = %step.name,
                    error = %e,
                    "Step failed"
                );
                run.fail(step, e.to_string());
                break;
            }

            if let Err(e) = chain(&step.chained_output(area), &working).await {
                warn!(step = %step.name, error = %e, "Failed to rename step output");
                run.fail(step, format!("rename output: {}", e));
                break;
            }

            if step.kind == StepKind::MosaicMerge {
                area.remove_file(&area.even_output());
            }

            if step.kind.caches_bands() {
                match self.read_bands(&working) {
                    Ok(bands) => run.bands = bands,
                    Err(e) => {
                        warn!(step = %step.name, error = %e, "Working copy label unreadable");
                        run.fail(step, format!("read label: {}", e));
                        break;
                    }
                }
            }

            run.completed.push(step.name.clone());
        }

        if run.status == RunStatus::Running {
            run.status = RunStatus::Success;
            info!(
                file = %item.source_path.display(),
                steps = run.completed.len(),
                "Recipe completed"
            );
        }

        run
    }

    fn read_bands(&self, working: &Path) -> Result<Option<BandInfo>, crate::label::LabelError> {
        let label = Label::load(working)?;
        let Some(query) = self.bandbin_query else {
            return Ok(None);
        };

        let bands = BandInfo::from_label(&label, query);
        if bands.is_none() {
            warn!(
                file = %working.display(),
                bandbin_query = %query,
                "BandBin group incomplete, no band metadata cached"
            );
        }
        Ok(bands)
    }
}

/// Rename a step's output over the working copy when the step produced one
async fn chain(output: &Path, working: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(output).await? {
        tokio::fs::rename(output, working).await?;
    }
    Ok(())
}
