//! Pending-change ledger.
//!
//! Holds the post-image of every node touched by a prepared but not yet
//! applied transaction. Records live in an append-only arena in zxid order;
//! a path index points each path at its newest record. Later prepares read
//! through the index before falling back to the committed tree.
//!
//! Two sides touch the ledger:
//! - the prepare thread appends records and rolls back failed multi-ops
//! - the apply side calls [`PendingLedger::complete_through`] once a
//!   transaction is committed
//!
//! Every operation is a single critical section under one mutex.

use std::collections::{BTreeSet, HashMap, VecDeque};

use arbor_types::{Acl, PrecalculatedDigest, SessionId, Stat, Zxid};
use parking_lot::Mutex;
use tracing::warn;

/// Post-image of one node as of a specific transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Transaction that produced this image ([`Zxid::COMMITTED`] when the
    /// image was read from the committed tree).
    pub zxid: Zxid,
    /// Node path.
    pub path: String,
    /// Metadata, or `None` when the node is deleted by this transaction.
    pub stat: Option<Stat>,
    /// Number of children.
    pub child_count: i32,
    /// Effective ACL.
    pub acl: Vec<Acl>,
    /// Node data.
    pub data: Vec<u8>,
    /// Node and tree digest after this change, when digests are enabled.
    pub digest: Option<PrecalculatedDigest>,
}

impl ChangeRecord {
    /// Live node image.
    pub fn new(
        zxid: Zxid,
        path: impl Into<String>,
        stat: Stat,
        child_count: i32,
        acl: Vec<Acl>,
        data: Vec<u8>,
    ) -> Self {
        Self { zxid, path: path.into(), stat: Some(stat), child_count, acl, data, digest: None }
    }

    /// Deletion marker for `path`.
    pub fn tombstone(zxid: Zxid, path: impl Into<String>) -> Self {
        Self {
            zxid,
            path: path.into(),
            stat: None,
            child_count: 0,
            acl: Vec::new(),
            data: Vec::new(),
            digest: None,
        }
    }

    /// Copy of this image re-stamped with `zxid`, ready to be modified.
    pub fn duplicate(&self, zxid: Zxid) -> Self {
        Self { zxid, ..self.clone() }
    }

    /// Whether this record marks a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.stat.is_none()
    }
}

/// Index entries captured before a multi-op so they can be restored if the
/// batch fails.
#[derive(Debug, Clone, Default)]
pub struct RollbackSet {
    entries: Vec<(String, Option<(u64, Zxid)>)>,
}

impl RollbackSet {
    /// Number of captured paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no paths were captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    records: VecDeque<ChangeRecord>,
    /// Absolute position of `records[0]`.
    base: u64,
    /// Path to absolute position of its newest record.
    index: HashMap<String, u64>,
}

impl LedgerState {
    fn position(&self, abs: u64) -> Option<&ChangeRecord> {
        let rel = abs.checked_sub(self.base)?;
        self.records.get(usize::try_from(rel).ok()?)
    }

    fn next_position(&self) -> u64 {
        self.base + self.records.len() as u64
    }
}

/// Ordered log of pending node images with a per-path index.
#[derive(Debug, Default)]
pub struct PendingLedger {
    state: Mutex<LedgerState>,
}

impl PendingLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record` and points its path at it.
    ///
    /// Records must arrive in non-decreasing zxid order.
    pub fn append(&self, record: ChangeRecord) {
        let mut state = self.state.lock();
        debug_assert!(state.records.back().is_none_or(|last| last.zxid <= record.zxid));
        let abs = state.next_position();
        state.index.insert(record.path.clone(), abs);
        state.records.push_back(record);
    }

    /// Newest pending image of `path`, tombstones included.
    pub fn get(&self, path: &str) -> Option<ChangeRecord> {
        let state = self.state.lock();
        let abs = *state.index.get(path)?;
        state.position(abs).cloned()
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Zxid of the oldest pending record.
    pub fn oldest_zxid(&self) -> Option<Zxid> {
        self.state.lock().records.front().map(|r| r.zxid)
    }

    /// Tree digest carried by the newest pending record.
    pub fn latest_tree_digest(&self) -> Option<u64> {
        let state = self.state.lock();
        state.records.back().and_then(|r| r.digest).map(|d| d.tree_digest)
    }

    /// All pending records, oldest first.
    pub fn records(&self) -> Vec<ChangeRecord> {
        self.state.lock().records.iter().cloned().collect()
    }

    /// Captures the current index entries of `paths`.
    pub fn snapshot<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> RollbackSet {
        let state = self.state.lock();
        let mut entries: Vec<(String, Option<(u64, Zxid)>)> = Vec::new();
        for path in paths {
            if entries.iter().any(|(p, _)| p == path) {
                continue;
            }
            let entry = state
                .index
                .get(path)
                .and_then(|&abs| state.position(abs).map(|record| (abs, record.zxid)));
            entries.push((path.to_string(), entry));
        }
        RollbackSet { entries }
    }

    /// Removes every record appended for `zxid` and restores the index
    /// entries captured in `snapshot`.
    ///
    /// Only the tail can carry `zxid`. Captured entries older than the
    /// current oldest record were completed in the meantime and are not
    /// restored; nothing is restored into an empty ledger. A removed path
    /// the snapshot does not cover is pointed back at its newest remaining
    /// record, so an empty snapshot still leaves a consistent index.
    ///
    /// Returns the number of removed records.
    pub fn rollback(&self, zxid: Zxid, snapshot: RollbackSet) -> usize {
        let mut state = self.state.lock();
        let start = state.records.partition_point(|r| r.zxid < zxid);
        let base = state.base;
        let removed: Vec<ChangeRecord> = state.records.drain(start..).collect();
        for (offset, record) in removed.iter().enumerate() {
            let abs = base + (start + offset) as u64;
            if state.index.get(&record.path) == Some(&abs) {
                state.index.remove(&record.path);
            }
        }

        let Some(oldest) = state.records.front().map(|r| r.zxid) else {
            return removed.len();
        };
        let end = state.next_position();
        for (path, entry) in snapshot.entries {
            if let Some((abs, entry_zxid)) = entry {
                if entry_zxid >= oldest && abs >= state.base && abs < end {
                    state.index.insert(path, abs);
                }
            }
        }
        for record in &removed {
            if state.index.contains_key(&record.path) {
                continue;
            }
            if let Some(rel) = state.records.iter().rposition(|r| r.path == record.path) {
                let abs = state.base + rel as u64;
                state.index.insert(record.path.clone(), abs);
            }
        }
        removed.len()
    }

    /// Drops every record with zxid at or below `zxid` once the apply side
    /// has committed it.
    ///
    /// An index entry is removed only while it still points at the dropped
    /// record. Returns the number of dropped records.
    pub fn complete_through(&self, zxid: Zxid) -> usize {
        let mut state = self.state.lock();
        let mut dropped = 0;
        while state.records.front().is_some_and(|r| r.zxid <= zxid) {
            let abs = state.base;
            let Some(record) = state.records.pop_front() else {
                break;
            };
            state.base += 1;
            if record.zxid < zxid {
                warn!(
                    pending = %record.zxid,
                    committed = %zxid,
                    path = %record.path,
                    "Pending change older than committed transaction"
                );
            }
            if state.index.get(&record.path) == Some(&abs) {
                state.index.remove(&record.path);
            }
            dropped += 1;
        }
        dropped
    }

    /// Reconciles a session's committed ephemerals with pending changes.
    ///
    /// `committed` scans the committed tree and runs with the ledger lock
    /// held, so no transaction can complete between the scan and the walk.
    /// It must not call back into the ledger.
    ///
    /// Walks the ledger oldest first: a deletion of a path drops it, a live
    /// image owned by `session` adds it.
    pub fn ephemerals_for(
        &self,
        session: SessionId,
        committed: impl FnOnce() -> BTreeSet<String>,
    ) -> BTreeSet<String> {
        let state = self.state.lock();
        let mut committed = committed();
        for record in &state.records {
            match &record.stat {
                None => {
                    committed.remove(&record.path);
                },
                Some(stat) if stat.ephemeral_owner == session.value() => {
                    committed.insert(record.path.clone());
                },
                Some(_) => {},
            }
        }
        committed
    }
}
