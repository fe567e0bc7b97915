//! Recipes and step binding
//!
//! A recipe is the ordered list of toolkit steps for one archive, stored as
//! `<recipe_dir>/<archive>.json`:
//!
//! ```json
//! {"upc": {"recipe": {"mroctx2isis": {}, "spiceinit": {"web": "yes"}, "caminfo": {}}}}
//! ```
//!
//! Document key order is step order. Each step name maps to a [`StepKind`],
//! and the kind fixes how the step's file parameters are bound to the item's
//! working area.

use crate::error::{ProcessError, ProcessResult};
use crate::executor::StepInvocation;
use crate::workspace::WorkArea;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Step variants with distinct parameter binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `*2isis` import: raw source → output
    Conversion,
    /// THEMIS processing: raw source → output, plus odd/even framelet outputs
    ThemisProc,
    /// Framelet merge: even → mosaic onto odd
    MosaicMerge,
    SpiceInit,
    /// Band 1 of the working copy → output
    BandSelect,
    FootprintInit,
    /// Camera info report → report file
    Report,
    /// Anything else: working copy → output
    Generic,
}

impl StepKind {
    pub fn classify(step: &str) -> Self {
        if step.contains("2isis") {
            return StepKind::Conversion;
        }
        match step {
            "thmproc" => StepKind::ThemisProc,
            "handmos" => StepKind::MosaicMerge,
            "spiceinit" => StepKind::SpiceInit,
            "cubeatt" => StepKind::BandSelect,
            "footprintinit" => StepKind::FootprintInit,
            "caminfo" => StepKind::Report,
            _ => StepKind::Generic,
        }
    }

    /// Steps that run before a toolkit identifier exists
    pub fn is_early_stage(self) -> bool {
        matches!(self, StepKind::Conversion | StepKind::ThemisProc)
    }

    /// Steps after which the working copy's BandBin is re-read
    pub fn caches_bands(self) -> bool {
        matches!(self, StepKind::Conversion | StepKind::MosaicMerge)
    }
}

/// One recipe entry
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeStep {
    pub name: String,
    pub kind: StepKind,
    /// Fixed parameters from the recipe document, in document order
    pub template: Vec<(String, String)>,
}

impl RecipeStep {
    pub fn new(name: impl Into<String>, template: Vec<(String, String)>) -> Self {
        let name = name.into();
        Self {
            kind: StepKind::classify(&name),
            name,
            template,
        }
    }

    /// Bind file parameters for this step
    pub fn bind(&self, source: &Path, area: &WorkArea) -> StepInvocation {
        let mut parameters = self.template.clone();
        let working = area.working_copy();

        match self.kind {
            StepKind::Conversion | StepKind::ThemisProc => {
                set(&mut parameters, "from_", source);
                set(&mut parameters, "to", &area.output());
            }
            StepKind::MosaicMerge => {
                set(&mut parameters, "from_", &area.even_output());
                set(&mut parameters, "mosaic", &area.odd_output());
            }
            StepKind::SpiceInit | StepKind::FootprintInit => {
                set(&mut parameters, "from_", &working);
            }
            StepKind::BandSelect => {
                let band = PathBuf::from(format!("{}+1", working.display()));
                set(&mut parameters, "from_", &band);
                set(&mut parameters, "to", &area.output());
            }
            StepKind::Report => {
                set(&mut parameters, "from_", &working);
                set(&mut parameters, "to", &area.report());
            }
            StepKind::Generic => {
                set(&mut parameters, "from_", &working);
                set(&mut parameters, "to", &area.output());
            }
        }

        StepInvocation {
            program: self.name.clone(),
            parameters,
            working_dir: area.dir().to_path_buf(),
        }
    }

    /// File renamed over the working copy after the step succeeds
    pub fn chained_output(&self, area: &WorkArea) -> PathBuf {
        match self.kind {
            StepKind::MosaicMerge => area.odd_output(),
            _ => area.output(),
        }
    }
}

fn set(parameters: &mut Vec<(String, String)>, key: &str, path: &Path) {
    let value = path.display().to_string();
    match parameters.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => parameters.push((key.to_string(), value)),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse one recipe document
pub fn parse_recipe(json: &str) -> ProcessResult<Vec<RecipeStep>> {
    let document: Value = serde_json::from_str(json)?;
    let steps = document
        .get("upc")
        .and_then(|upc| upc.get("recipe"))
        .and_then(Value::as_object)
        .ok_or_else(|| {
            ProcessError::Common(upc_common::Error::Document(
                "recipe document has no upc.recipe object".to_string(),
            ))
        })?;

    Ok(steps
        .iter()
        .map(|(name, params)| {
            let template = params
                .as_object()
                .map(|map: &Map<String, Value>| {
                    map.iter().map(|(k, v)| (k.clone(), render(v))).collect()
                })
                .unwrap_or_default();
            RecipeStep::new(name.clone(), template)
        })
        .collect())
}

/// Recipes for every archive, loaded once
#[derive(Debug, Clone, Default)]
pub struct RecipeStore {
    recipes: HashMap<String, Vec<RecipeStep>>,
}

impl RecipeStore {
    /// Load every `<archive>.json` in `dir`
    ///
    /// Unparseable documents are logged and left out; the archive then has no
    /// recipe and its items are skipped.
    pub fn load_dir(dir: &Path) -> ProcessResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ProcessError::Common(upc_common::Error::Config(format!(
                "Read recipe directory {} failed: {}",
                dir.display(),
                e
            )))
        })?;

        let mut store = Self::default();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(archive) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let json = std::fs::read_to_string(&path)?;
            match parse_recipe(&json) {
                Ok(steps) => {
                    debug!(archive = %archive, steps = steps.len(), "Recipe loaded");
                    store.insert(archive, steps);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable recipe");
                }
            }
        }

        info!(
            dir = %dir.display(),
            recipes = store.recipes.len(),
            "Recipes loaded"
        );
        Ok(store)
    }

    pub fn insert(&mut self, archive: impl Into<String>, steps: Vec<RecipeStep>) {
        self.recipes.insert(archive.into(), steps);
    }

    /// Ordered step list for an archive
    pub fn resolve(&self, archive: &str) -> Option<&[RecipeStep]> {
        self.recipes.get(archive).map(Vec::as_slice)
    }
}
