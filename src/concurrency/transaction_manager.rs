use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::catalog::Catalog;
use crate::common::Result;

use super::lock_manager::LockManager;
use super::transaction::{IsolationLevel, Transaction, TransactionState, WriteOp};

/// Creates transactions and drives their termination: commit releases all
/// locks; abort first replays the write sets backwards, tombstoning
/// inserted tuples, reviving deleted ones, and inverting index entries.
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    lock_manager: Arc<LockManager>,
    catalog: Arc<Catalog>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>, catalog: Arc<Catalog>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(0),
            lock_manager,
            catalog,
        }
    }

    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        Arc::new(Transaction::new(id, isolation_level))
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        // Strict 2PL: everything is released at commit
        self.lock_manager.unlock_all(txn);
        txn.take_write_sets();
        txn.set_state(TransactionState::Committed);
        Ok(())
    }

    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        debug!(txn = txn.id(), "rolling back transaction");
        let (table_writes, index_writes) = txn.take_write_sets();

        for record in table_writes.iter().rev() {
            let table = self.catalog.table(record.table_oid)?;
            match record.op {
                WriteOp::Insert => table.heap.set_deleted(record.rid, true)?,
                WriteOp::Delete => table.heap.set_deleted(record.rid, false)?,
            }
        }

        for record in index_writes.iter().rev() {
            let index = self.catalog.index(record.index_oid)?;
            match record.op {
                WriteOp::Insert => index.tree.remove(&record.key)?,
                WriteOp::Delete => {
                    index.tree.insert(&record.key, record.rid)?;
                }
            }
        }

        self.lock_manager.unlock_all(txn);
        txn.set_state(TransactionState::Aborted);
        Ok(())
    }
}
