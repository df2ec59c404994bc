use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::common::{IndexOid, RecordId, TableOid, TxnId};

use super::lock_manager::LockMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Delete,
}

/// Undo record for a table heap mutation.
#[derive(Debug, Clone)]
pub struct TableWriteRecord {
    pub table_oid: TableOid,
    pub rid: RecordId,
    pub op: WriteOp,
}

/// Undo record for an index mutation.
#[derive(Debug, Clone)]
pub struct IndexWriteRecord {
    pub index_oid: IndexOid,
    pub key: Vec<u8>,
    pub rid: RecordId,
    pub op: WriteOp,
}

struct TxnInner {
    state: TransactionState,
    /// Held table locks per mode
    table_locks: HashMap<LockMode, HashSet<TableOid>>,
    /// Held row locks per mode (row locks are S or X only)
    row_locks: HashMap<LockMode, HashMap<TableOid, HashSet<RecordId>>>,
    table_writes: Vec<TableWriteRecord>,
    index_writes: Vec<IndexWriteRecord>,
}

/// A single transaction: id, isolation level, 2PL state, the lock sets the
/// lock manager maintains on its behalf, and the write sets the transaction
/// manager replays backwards on abort.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    inner: Mutex<TxnInner>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            inner: Mutex::new(TxnInner {
                state: TransactionState::Growing,
                table_locks: HashMap::new(),
                row_locks: HashMap::new(),
                table_writes: Vec::new(),
                index_writes: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: TransactionState) {
        self.inner.lock().state = state;
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            TransactionState::Growing | TransactionState::Shrinking
        )
    }

    // ---- lock-set bookkeeping (driven by the lock manager) ----

    pub(crate) fn add_table_lock(&self, mode: LockMode, oid: TableOid) {
        self.inner
            .lock()
            .table_locks
            .entry(mode)
            .or_default()
            .insert(oid);
    }

    pub(crate) fn remove_table_lock(&self, mode: LockMode, oid: TableOid) {
        let mut inner = self.inner.lock();
        if let Some(set) = inner.table_locks.get_mut(&mode) {
            set.remove(&oid);
        }
    }

    pub(crate) fn add_row_lock(&self, mode: LockMode, oid: TableOid, rid: RecordId) {
        self.inner
            .lock()
            .row_locks
            .entry(mode)
            .or_default()
            .entry(oid)
            .or_default()
            .insert(rid);
    }

    pub(crate) fn remove_row_lock(&self, mode: LockMode, oid: TableOid, rid: RecordId) {
        let mut inner = self.inner.lock();
        if let Some(tables) = inner.row_locks.get_mut(&mode) {
            if let Some(rows) = tables.get_mut(&oid) {
                rows.remove(&rid);
            }
        }
    }

    /// Mode of the table lock held on `oid`, if any.
    pub fn table_lock_mode(&self, oid: TableOid) -> Option<LockMode> {
        let inner = self.inner.lock();
        inner
            .table_locks
            .iter()
            .find(|(_, oids)| oids.contains(&oid))
            .map(|(&mode, _)| mode)
    }

    pub fn holds_table_lock(&self, oid: TableOid, mode: LockMode) -> bool {
        let inner = self.inner.lock();
        inner
            .table_locks
            .get(&mode)
            .is_some_and(|oids| oids.contains(&oid))
    }

    pub fn holds_row_lock(&self, oid: TableOid, rid: RecordId, mode: LockMode) -> bool {
        let inner = self.inner.lock();
        inner
            .row_locks
            .get(&mode)
            .and_then(|tables| tables.get(&oid))
            .is_some_and(|rows| rows.contains(&rid))
    }

    /// True while any row lock on `oid` is still held.
    pub fn holds_rows_on_table(&self, oid: TableOid) -> bool {
        let inner = self.inner.lock();
        inner
            .row_locks
            .values()
            .any(|tables| tables.get(&oid).is_some_and(|rows| !rows.is_empty()))
    }

    /// Snapshot of every held lock, rows first, for bulk release.
    pub(crate) fn held_locks(&self) -> (Vec<(LockMode, TableOid, RecordId)>, Vec<(LockMode, TableOid)>) {
        let inner = self.inner.lock();
        let rows = inner
            .row_locks
            .iter()
            .flat_map(|(&mode, tables)| {
                tables.iter().flat_map(move |(&oid, rids)| {
                    rids.iter().map(move |&rid| (mode, oid, rid))
                })
            })
            .collect();
        let tables = inner
            .table_locks
            .iter()
            .flat_map(|(&mode, oids)| oids.iter().map(move |&oid| (mode, oid)))
            .collect();
        (rows, tables)
    }

    // ---- write sets (driven by the executors) ----

    pub fn append_table_write(&self, record: TableWriteRecord) {
        self.inner.lock().table_writes.push(record);
    }

    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.inner.lock().index_writes.push(record);
    }

    /// Drains both write sets for rollback or commit cleanup.
    pub fn take_write_sets(&self) -> (Vec<TableWriteRecord>, Vec<IndexWriteRecord>) {
        let mut inner = self.inner.lock();
        (
            std::mem::take(&mut inner.table_writes),
            std::mem::take(&mut inner.index_writes),
        )
    }
}
