use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::concurrency::{IsolationLevel, LockMode};
use crate::storage::TableIterator;
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::executor_context::ExecutorContext;
use crate::execution::plan::SeqScanPlan;

/// Scans the table heap in RID order, skipping tombstoned tuples.
///
/// Locking: IS on the table (IX when the scan feeds a mutation) unless
/// isolation is READ_UNCOMMITTED; S (or X) per emitted row. Rows that
/// fail the filter give their lock straight back; READ_COMMITTED also
/// releases the row lock before the row is emitted.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    plan: SeqScanPlan,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: SeqScanPlan) -> Self {
        Self {
            ctx,
            plan,
            iter: None,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.plan.schema)
    }

    pub fn init(&mut self) -> Result<()> {
        let table = self.ctx.catalog.table(self.plan.table_oid)?;

        if self.ctx.isolation_level() != IsolationLevel::ReadUncommitted {
            let mode = if self.plan.for_update {
                LockMode::IntentionExclusive
            } else {
                LockMode::IntentionShared
            };
            self.ctx.ensure_table_lock(self.plan.table_oid, mode)?;
        }

        self.iter = Some(table.heap.iter()?);
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self.iter.as_mut().expect("init was called");
        let oid = self.plan.table_oid;
        let lock_rows = self.ctx.isolation_level() != IsolationLevel::ReadUncommitted;

        loop {
            let (rid, deleted, bytes) = match iter.next()? {
                Some(entry) => entry,
                None => return Ok(None),
            };
            if deleted {
                continue;
            }

            let mut acquired = false;
            if lock_rows {
                let mode = if self.plan.for_update {
                    LockMode::Exclusive
                } else {
                    LockMode::Shared
                };
                acquired = self.ctx.ensure_row_lock(oid, rid, mode)?;
            }

            let tuple = Tuple::from_bytes(&self.plan.schema, &bytes)?;

            if let Some(filter) = &self.plan.filter {
                if !filter.matches(&tuple) {
                    // The row is not emitted, so its lock is not needed
                    if acquired {
                        self.ctx.lock_manager.unlock_row(&self.ctx.txn, oid, rid, true)?;
                    }
                    continue;
                }
            }

            if acquired
                && !self.plan.for_update
                && self.ctx.isolation_level() == IsolationLevel::ReadCommitted
            {
                self.ctx.lock_manager.unlock_row(&self.ctx.txn, oid, rid, false)?;
            }

            return Ok(Some((tuple, rid)));
        }
    }
}
