use std::sync::Arc;

use crate::common::{RecordId, Result, INVALID_RID};
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::plan::ValuesPlan;

/// Emits a fixed list of rows; the usual source below an insert.
pub struct ValuesExecutor {
    plan: ValuesPlan,
    cursor: usize,
}

impl ValuesExecutor {
    pub fn new(plan: ValuesPlan) -> Self {
        Self { plan, cursor: 0 }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.plan.schema)
    }

    pub fn init(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        let row = match self.plan.rows.get(self.cursor) {
            Some(row) => row,
            None => return Ok(None),
        };
        self.cursor += 1;

        let empty = Tuple::empty();
        let values = row.iter().map(|expr| expr.evaluate(&empty)).collect();
        Ok(Some((Tuple::new(values), INVALID_RID)))
    }
}
