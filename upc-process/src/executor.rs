//! Step Executor
//!
//! The only component that launches external toolkit programs. Each step is
//! one program run with `key=value` arguments inside the item's working
//! directory; the executor reports success or a typed [`StepError`] and never
//! interprets the files the program writes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

/// Program that prints the toolkit identifier of a cube
pub const SERIAL_NUMBER_PROGRAM: &str = "getsn";

/// External step errors
#[derive(Debug, Error)]
pub enum StepError {
    /// Program binary not found
    #[error("Toolkit program not found: {0}")]
    BinaryNotFound(String),

    /// Program could not be launched or awaited
    #[error("Failed to execute {program}: {reason}")]
    ExecutionFailed { program: String, reason: String },

    /// Program ran and exited unsuccessfully
    #[error("{step} exited with code {code:?}: {stderr}")]
    NonZeroExit {
        step: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// One fully-bound program run
#[derive(Debug, Clone, PartialEq)]
pub struct StepInvocation {
    /// Program name (the recipe step name)
    pub program: String,

    /// Parameters in recipe order
    pub parameters: Vec<(String, String)>,

    /// Directory the program runs in
    pub working_dir: PathBuf,
}

impl StepInvocation {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Command-line arguments, `from_` style keys written without the trailing `_`
    pub fn arguments(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|(key, value)| format!("{}={}", key.trim_end_matches('_'), value))
            .collect()
    }
}

/// Runs external steps
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run one step to completion
    async fn execute(&self, invocation: &StepInvocation) -> Result<(), StepError>;

    /// Toolkit identifier of a (possibly partial) cube
    async fn serial_number(&self, cube: &Path) -> Result<String, StepError>;
}

/// Executor backed by the installed toolkit binaries
pub struct IsisExecutor {
    bin_dir: Option<PathBuf>,
}

impl IsisExecutor {
    /// Binaries are taken from `bin_dir` when given, otherwise from `PATH`
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    fn program_path(&self, program: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(program),
            None => PathBuf::from(program),
        }
    }

    async fn run(
        &self,
        program: &str,
        args: Vec<String>,
        working_dir: Option<PathBuf>,
    ) -> Result<Output, StepError> {
        let binary = self.program_path(program);

        tracing::debug!(
            program = %binary.display(),
            args = ?args,
            "Running toolkit program"
        );

        let output = tokio::task::spawn_blocking(move || {
            let mut command = Command::new(&binary);
            command.args(&args);
            if let Some(dir) = &working_dir {
                command.current_dir(dir);
            }
            command.output()
        })
        .await
        .map_err(|e| StepError::ExecutionFailed {
            program: program.to_string(),
            reason: format!("Task join error: {}", e),
        })?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StepError::BinaryNotFound(program.to_string()),
            _ => StepError::ExecutionFailed {
                program: program.to_string(),
                reason: e.to_string(),
            },
        })?;

        if !output.status.success() {
            return Err(StepError::NonZeroExit {
                step: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl StepExecutor for IsisExecutor {
    async fn execute(&self, invocation: &StepInvocation) -> Result<(), StepError> {
        self.run(
            &invocation.program,
            invocation.arguments(),
            Some(invocation.working_dir.clone()),
        )
        .await?;
        Ok(())
    }

    async fn serial_number(&self, cube: &Path) -> Result<String, StepError> {
        let output = self
            .run(
                SERIAL_NUMBER_PROGRAM,
                vec![format!("from={}", cube.display())],
                cube.parent().map(Path::to_path_buf),
            )
            .await?;

        Ok(String::from_utf8_lossy(&output.stdout).replace(['\n', '\r'], ""))
    }
}
