//! ---
//! cmp_section: "05-networking-external-interfaces"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "SNMP session seam, wire transport and table walker."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
//! Table walking over GETBULK.
//!
//! Each roundtrip is rooted at the last identifier returned by the previous
//! one. The walk ends at the first binding that leaves the table subtree or
//! carries an exception value; neither is part of the result.

use cmpoll_logging::{cmp_debug, LogContext};
use serde::Serialize;

use crate::{Oid, Result, SnmpError, SnmpSession, SnmpValue};

/// One row of a walked table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    /// Identifier arcs below the table root.
    pub index: Vec<u32>,
    /// Value held by the row.
    pub value: SnmpValue,
}

impl TableEntry {
    /// Leading index arc; for per-channel tables this is the channel id.
    pub fn channel(&self) -> Option<u32> {
        self.index.first().copied()
    }
}

/// Outcome of a completed walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWalk {
    /// Table the walk was rooted at.
    pub root: Oid,
    /// Rows in agent order.
    pub entries: Vec<TableEntry>,
    /// GETBULK requests issued.
    pub roundtrips: usize,
}

impl TableWalk {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table had no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for TableWalk {
    type Item = TableEntry;
    type IntoIter = std::vec::IntoIter<TableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Walks tables on one session with a fixed repetition hint.
pub struct TableWalker<'a, S: SnmpSession + ?Sized> {
    session: &'a S,
    max_repetitions: u32,
}

impl<'a, S: SnmpSession + ?Sized> TableWalker<'a, S> {
    /// A hint of zero is raised to one.
    pub fn new(session: &'a S, max_repetitions: u32) -> Self {
        Self {
            session,
            max_repetitions: max_repetitions.max(1),
        }
    }

    /// Repetition count sent with every GETBULK.
    pub fn max_repetitions(&self) -> u32 {
        self.max_repetitions
    }

    /// Walk the table rooted at `root`. Any failed roundtrip aborts the walk
    /// and discards rows gathered so far.
    pub async fn walk(&self, root: &Oid, ctx: &LogContext<'_>) -> Result<TableWalk> {
        let mut entries = Vec::new();
        let mut cursor = root.clone();
        let mut roundtrips = 0usize;

        loop {
            let page = self
                .session
                .get_bulk(std::slice::from_ref(&cursor), 0, self.max_repetitions)
                .await?;
            roundtrips += 1;

            let Some(last) = page.last().map(|vb| vb.oid.clone()) else {
                break;
            };

            let mut finished = false;
            for vb in page {
                if vb.value.is_exception() {
                    finished = true;
                    break;
                }
                match vb.oid.suffix_under(root) {
                    Some(index) => entries.push(TableEntry {
                        index: index.to_vec(),
                        value: vb.value,
                    }),
                    None => {
                        finished = true;
                        break;
                    }
                }
            }
            if finished {
                break;
            }
            if last <= cursor {
                return Err(SnmpError::NonIncreasing {
                    root: cursor,
                    last,
                });
            }
            cursor = last;
        }

        cmp_debug!(
            context = ctx,
            "walked {} ({} rows, {} roundtrips, hint {})",
            root,
            entries.len(),
            roundtrips,
            self.max_repetitions
        );
        Ok(TableWalk {
            root: root.clone(),
            entries,
            roundtrips,
        })
    }
}

/// Walk a single table and return its rows.
pub async fn walk_table<S: SnmpSession + ?Sized>(
    session: &S,
    root: &Oid,
    max_repetitions: u32,
    ctx: &LogContext<'_>,
) -> Result<Vec<TableEntry>> {
    TableWalker::new(session, max_repetitions)
        .walk(root, ctx)
        .await
        .map(|walk| walk.entries)
}
