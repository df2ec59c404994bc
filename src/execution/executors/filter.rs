use crate::common::{RecordId, Result};
use crate::execution::expression::Expression;
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::ExecutorImpl;

/// Passes through child rows that satisfy the predicate.
pub struct FilterExecutor {
    child: Box<ExecutorImpl>,
    predicate: Expression,
}

impl FilterExecutor {
    pub fn new(child: Box<ExecutorImpl>, predicate: Expression) -> Self {
        Self { child, predicate }
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.child.output_schema()
    }

    pub fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            if self.predicate.matches(&tuple) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }
}
