use std::sync::Arc;

use crate::common::{RecordId, Result};
use crate::execution::expression::Expression;
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::ExecutorImpl;

/// Maps each child row through a list of expressions.
pub struct ProjectionExecutor {
    child: Box<ExecutorImpl>,
    exprs: Vec<Expression>,
    schema: SchemaRef,
}

impl ProjectionExecutor {
    pub fn new(child: Box<ExecutorImpl>, exprs: Vec<Expression>, schema: SchemaRef) -> Self {
        Self {
            child,
            exprs,
            schema,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        match self.child.next()? {
            Some((tuple, rid)) => {
                let values = self.exprs.iter().map(|e| e.evaluate(&tuple)).collect();
                Ok(Some((Tuple::new(values), rid)))
            }
            None => Ok(None),
        }
    }
}
