use std::sync::Arc;

use crate::catalog::Catalog;
use crate::common::{RecordId, Result, TableOid};
use crate::concurrency::{can_upgrade, IsolationLevel, LockManager, LockMode, Transaction, TransactionManager};

/// Everything an executor needs: the catalog, the lock and transaction
/// managers, and the transaction on whose behalf it runs.
pub struct ExecutorContext {
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    pub txn: Arc<Transaction>,
}

impl ExecutorContext {
    pub fn new(
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
        txn_manager: Arc<TransactionManager>,
        txn: Arc<Transaction>,
    ) -> Self {
        Self {
            catalog,
            lock_manager,
            txn_manager,
            txn,
        }
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.txn.isolation_level()
    }

    /// Takes `want` on the table unless an equal or stronger lock is
    /// already held; a legal upgrade is taken instead of a fresh lock.
    pub fn ensure_table_lock(&self, oid: TableOid, want: LockMode) -> Result<()> {
        match self.txn.table_lock_mode(oid) {
            None => self.lock_manager.lock_table(&self.txn, want, oid),
            Some(held) if held == want => Ok(()),
            Some(held) if can_upgrade(held, want) => {
                self.lock_manager.lock_table(&self.txn, want, oid)
            }
            Some(_) => Ok(()),
        }
    }

    /// Takes `want` on the row unless an equal or stronger lock is held.
    /// Returns true when this call actually acquired a lock, so scans know
    /// whether an early release is theirs to make.
    pub fn ensure_row_lock(&self, oid: TableOid, rid: RecordId, want: LockMode) -> Result<bool> {
        if self.txn.holds_row_lock(oid, rid, want) {
            return Ok(false);
        }
        if want == LockMode::Shared && self.txn.holds_row_lock(oid, rid, LockMode::Exclusive) {
            return Ok(false);
        }
        self.lock_manager.lock_row(&self.txn, want, oid, rid)?;
        Ok(true)
    }
}
