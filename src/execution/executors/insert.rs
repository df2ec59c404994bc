use std::sync::Arc;

use crate::common::{RecordId, Result, StrataError, TableOid, INVALID_RID};
use crate::concurrency::{IndexWriteRecord, LockMode, TableWriteRecord, WriteOp};
use crate::tuple::{SchemaRef, Tuple, Value};

use crate::execution::executor_context::ExecutorContext;
use crate::execution::plan::PlanNode;
use crate::execution::ExecutorImpl;

/// Pulls rows from its child, appends them to the table heap, maintains
/// every index on the table, and logs write records for rollback. Emits a
/// single row holding the insert count.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    child: Box<ExecutorImpl>,
    schema: SchemaRef,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, table_oid: TableOid, child: Box<ExecutorImpl>) -> Self {
        Self {
            ctx,
            table_oid,
            child,
            schema: PlanNode::count_schema(),
            done: false,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn init(&mut self) -> Result<()> {
        self.done = false;
        self.ctx
            .ensure_table_lock(self.table_oid, LockMode::IntentionExclusive)?;
        self.child.init()
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table = self.ctx.catalog.table(self.table_oid)?;
        let indexes = self.ctx.catalog.table_indexes(self.table_oid);
        let txn = &self.ctx.txn;
        let mut count = 0i32;

        while let Some((tuple, _)) = self.child.next()? {
            let bytes = tuple.to_bytes(&table.schema)?;
            let rid = table.heap.insert_tuple(&bytes)?;

            // New rows are born exclusively locked by their writer
            self.ctx
                .lock_manager
                .lock_row(txn, LockMode::Exclusive, self.table_oid, rid)?;

            txn.append_table_write(TableWriteRecord {
                table_oid: self.table_oid,
                rid,
                op: WriteOp::Insert,
            });

            for index in &indexes {
                let key = tuple.key_from_column(index.key_column, index.tree.key_width())?;
                if !index.tree.insert(&key, rid)? {
                    return Err(StrataError::DuplicateKey);
                }
                txn.append_index_write(IndexWriteRecord {
                    index_oid: index.oid,
                    key,
                    rid,
                    op: WriteOp::Insert,
                });
            }

            count += 1;
        }

        Ok(Some((
            Tuple::new(vec![Value::Integer(count)]),
            INVALID_RID,
        )))
    }
}
