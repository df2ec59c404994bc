use std::sync::Arc;

use crate::common::{RecordId, Result, StrataError, TableOid, INVALID_RID};
use crate::concurrency::{IndexWriteRecord, LockMode, TableWriteRecord, WriteOp};
use crate::execution::expression::Expression;
use crate::tuple::{SchemaRef, Tuple, Value};

use crate::execution::executor_context::ExecutorContext;
use crate::execution::plan::PlanNode;
use crate::execution::ExecutorImpl;

/// Updates rows as delete-then-insert: the old version is tombstoned, the
/// new version appended, and both halves logged so rollback can restore
/// the original row. Emits a single count row.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    table_oid: TableOid,
    target_exprs: Vec<Expression>,
    child: Box<ExecutorImpl>,
    schema: SchemaRef,
    done: bool,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        table_oid: TableOid,
        target_exprs: Vec<Expression>,
        child: Box<ExecutorImpl>,
    ) -> Self {
        Self {
            ctx,
            table_oid,
            target_exprs,
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

        while let Some((old_tuple, old_rid)) = self.child.next()? {
            self.ctx
                .ensure_row_lock(self.table_oid, old_rid, LockMode::Exclusive)?;

            table.heap.set_deleted(old_rid, true)?;
            txn.append_table_write(TableWriteRecord {
                table_oid: self.table_oid,
                rid: old_rid,
                op: WriteOp::Delete,
            });
            for index in &indexes {
                let key = old_tuple.key_from_column(index.key_column, index.tree.key_width())?;
                index.tree.remove(&key)?;
                txn.append_index_write(IndexWriteRecord {
                    index_oid: index.oid,
                    key,
                    rid: old_rid,
                    op: WriteOp::Delete,
                });
            }

            let new_values: Vec<Value> = self
                .target_exprs
                .iter()
                .map(|expr| expr.evaluate(&old_tuple))
                .collect();
            let new_tuple = Tuple::new(new_values);

            let new_rid = table.heap.insert_tuple(&new_tuple.to_bytes(&table.schema)?)?;
            self.ctx
                .lock_manager
                .lock_row(txn, LockMode::Exclusive, self.table_oid, new_rid)?;
            txn.append_table_write(TableWriteRecord {
                table_oid: self.table_oid,
                rid: new_rid,
                op: WriteOp::Insert,
            });
            for index in &indexes {
                let key = new_tuple.key_from_column(index.key_column, index.tree.key_width())?;
                if !index.tree.insert(&key, new_rid)? {
                    return Err(StrataError::DuplicateKey);
                }
                txn.append_index_write(IndexWriteRecord {
                    index_oid: index.oid,
                    key,
                    rid: new_rid,
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
