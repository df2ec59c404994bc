use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::{RecordId, Result};
use crate::index::BTreeIterator;
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::executor_context::ExecutorContext;
use crate::execution::plan::IndexScanPlan;

/// Walks the B+ tree in key order, resolving RIDs against the table heap
/// and skipping tuples whose metadata marks them deleted.
pub struct IndexScanExecutor {
    ctx: Arc<ExecutorContext>,
    plan: IndexScanPlan,
    table: Option<Arc<TableInfo>>,
    iter: Option<BTreeIterator>,
}

impl IndexScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: IndexScanPlan) -> Self {
        Self {
            ctx,
            plan,
            table: None,
            iter: None,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.plan.schema)
    }

    pub fn init(&mut self) -> Result<()> {
        let index = self.ctx.catalog.index(self.plan.index_oid)?;
        let table = self.ctx.catalog.table(index.table_oid)?;

        let iter = match &self.plan.start_key {
            Some(value) => {
                let key = value.to_key_bytes(index.tree.key_width())?;
                index.tree.begin_at(&key)?
            }
            None => index.tree.begin()?,
        };

        self.iter = Some(iter);
        self.table = Some(table);
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let iter = self.iter.as_mut().expect("init was called");
        let table = self.table.as_ref().expect("init was called");

        loop {
            let (_key, rid) = match iter.next()? {
                Some(entry) => entry,
                None => return Ok(None),
            };

            let (deleted, bytes) = table.heap.get_tuple(rid)?;
            if deleted {
                continue;
            }

            let tuple = Tuple::from_bytes(&self.plan.schema, &bytes)?;
            return Ok(Some((tuple, rid)));
        }
    }
}
