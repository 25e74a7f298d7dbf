//! ---
//! cmp_section: "01-core-functionality"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Modem polling state machine and result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Target list: `business_id;hardware_id;address`, one modem per line.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use tracing::warn;

use crate::identity::ModemIdentity;

#[derive(Debug, thiserror::Error)]
pub enum TargetListError {
    #[error("cannot open target list {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read target list: {0}")]
    Read(#[from] csv::Error),
}

/// Read the target list at `path`.
pub fn read_targets(path: &Path) -> Result<Vec<ModemIdentity>, TargetListError> {
    let file = File::open(path).map_err(|source| TargetListError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets(file)
}

/// Parse target rows. Blank lines and `#` comments are ignored; rows without
/// exactly three fields are skipped with a warning.
pub fn parse_targets<R: Read>(reader: R) -> Result<Vec<ModemIdentity>, TargetListError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut targets = Vec::new();
    for row in reader.records() {
        let row = row?;
        if row.len() != 3 {
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            warn!(line, fields = row.len(), "skipping malformed target row");
            continue;
        }
        targets.push(ModemIdentity::new(&row[0], &row[1], &row[2]));
    }
    Ok(targets)
}
