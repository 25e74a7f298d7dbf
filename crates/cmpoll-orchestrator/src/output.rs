//! ---
//! cmp_section: "04-configuration-orchestration"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Batch polling driver: worker pool, cache application, staged output."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::OrchestratorError;

/// Suffix of the file records are written to before the run completes.
pub const STAGING_SUFFIX: &str = ".ongoing";

/// Result file under construction. Records go to `<final>.ongoing`; only
/// [`StagedOutput::commit`] makes them visible at the final path.
#[derive(Debug)]
pub struct StagedOutput {
    final_path: PathBuf,
    staging_path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl StagedOutput {
    /// Create (truncating) the staging file for `final_path`.
    pub fn create(final_path: &Path) -> Result<Self, OrchestratorError> {
        let staging_path = staging_path_for(final_path);
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| OrchestratorError::Output {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = File::create(&staging_path).map_err(|source| OrchestratorError::Output {
            path: staging_path.clone(),
            source,
        })?;
        debug!(path = %staging_path.display(), "staging output opened");
        Ok(Self {
            final_path: final_path.to_path_buf(),
            staging_path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Append one record followed by a newline.
    pub fn append(&mut self, record: &str) -> Result<(), OrchestratorError> {
        writeln!(self.writer, "{}", record).map_err(|source| self.output_error(source))?;
        self.lines += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Sibling file records are written to until publication.
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Path the staging file is renamed onto.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush, sync and atomically move the staging file onto the final path.
    pub fn commit(self) -> Result<PathBuf, OrchestratorError> {
        let Self {
            final_path,
            staging_path,
            writer,
            ..
        } = self;
        let file = writer
            .into_inner()
            .map_err(|err| OrchestratorError::Output {
                path: staging_path.clone(),
                source: err.into_error(),
            })?;
        file.sync_all().map_err(|source| OrchestratorError::Output {
            path: staging_path.clone(),
            source,
        })?;
        drop(file);
        fs::rename(&staging_path, &final_path).map_err(|source| OrchestratorError::Output {
            path: final_path.clone(),
            source,
        })?;
        debug!(path = %final_path.display(), "output committed");
        Ok(final_path)
    }

    fn output_error(&self, source: std::io::Error) -> OrchestratorError {
        OrchestratorError::Output {
            path: self.staging_path.clone(),
            source,
        }
    }
}

/// `<final>.ongoing`, next to the final file.
pub fn staging_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.file_name().unwrap_or_default().to_os_string();
    name.push(STAGING_SUFFIX);
    final_path.with_file_name(name)
}
