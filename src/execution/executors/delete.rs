use std::sync::Arc;

use crate::common::{RecordId, Result, TableOid, INVALID_RID};
use crate::concurrency::{IndexWriteRecord, LockMode, TableWriteRecord, WriteOp};
use crate::tuple::{SchemaRef, Tuple, Value};

use crate::execution::executor_context::ExecutorContext;
use crate::execution::plan::PlanNode;
use crate::execution::ExecutorImpl;

/// Tombstones every row its child produces, unhooks the rows from all
/// indexes, and logs write records for rollback. Emits a single count row.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    child: Box<ExecutorImpl>,
    schema: SchemaRef,
    done: bool,
}

impl DeleteExecutor {
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

        while let Some((tuple, rid)) = self.child.next()? {
            self.ctx
                .ensure_row_lock(self.table_oid, rid, LockMode::Exclusive)?;

            table.heap.set_deleted(rid, true)?;
            txn.append_table_write(TableWriteRecord {
                table_oid: self.table_oid,
                rid,
                op: WriteOp::Delete,
            });

            for index in &indexes {
                let key = tuple.key_from_column(index.key_column, index.tree.key_width())?;
                index.tree.remove(&key)?;
                txn.append_index_write(IndexWriteRecord {
                    index_oid: index.oid,
                    key,
                    rid,
                    op: WriteOp::Delete,
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
