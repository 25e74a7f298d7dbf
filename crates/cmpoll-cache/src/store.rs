//! ---
//! cmp_section: "03-persistence-logging"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "Usage-delta cache over a SQLite store."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::Result;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS modems (
    hardware_id      TEXT PRIMARY KEY,
    downstream_bytes INTEGER NOT NULL,
    upstream_bytes   INTEGER NOT NULL,
    timestamp        INTEGER NOT NULL,
    boot_marker      INTEGER NOT NULL
)";

/// Open (or create) the store at `path`, creating its parent directory and
/// the `modems` table when missing.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    ensure_schema(&conn)?;
    debug!(path = %path.display(), "usage store opened");
    Ok(conn)
}

/// In-memory store, used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub(crate) fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(SCHEMA, [])?;
    Ok(())
}
