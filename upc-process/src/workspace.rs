//! Per-item working area
//!
//! Every work item gets its own directory under the configured work area, so
//! concurrent workers never share intermediate file names even when two
//! inputs have the same base name.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkArea {
    dir: PathBuf,
    stem: String,
}

impl WorkArea {
    /// Create `<root>/<stem>-<uuid>` for one source file
    pub fn create(root: &Path, source: &Path) -> io::Result<Self> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "item".to_string());

        let dir = root.join(format!("{}-{}", stem, Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Created working directory");

        Ok(Self { dir, stem })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// The running working copy every step reads from and is renamed onto
    pub fn working_copy(&self) -> PathBuf {
        self.file("UPCinput.cub")
    }

    /// Generic step output
    pub fn output(&self) -> PathBuf {
        self.file("UPCoutput.cub")
    }

    /// Odd-framelet output of the two-output mission step
    pub fn odd_output(&self) -> PathBuf {
        self.file("UPCoutput.raw.odd.cub")
    }

    /// Even-framelet output of the two-output mission step
    pub fn even_output(&self) -> PathBuf {
        self.file("UPCoutput.raw.even.cub")
    }

    /// Report step output
    pub fn report(&self) -> PathBuf {
        self.dir.join(format!("{}_caminfo.pvl", self.stem))
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, suffix))
    }

    /// Remove one intermediate file; absence is not an error
    pub fn remove_file(&self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(file = %path.display(), "Removed intermediate file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove intermediate file"),
        }
    }

    /// Remove the directory if nothing is left in it
    ///
    /// Files kept on purpose (a failed run's report, for instance) keep the
    /// directory alive.
    pub fn finish(self) {
        let empty = std::fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            if let Err(e) = std::fs::remove_dir(&self.dir) {
                warn!(dir = %self.dir.display(), error = %e, "Failed to remove working directory");
            }
        } else {
            debug!(dir = %self.dir.display(), "Working directory kept, not empty");
        }
    }
}
