use crate::common::{RecordId, Result};
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::ExecutorImpl;

/// Emits at most `limit` child rows.
pub struct LimitExecutor {
    child: Box<ExecutorImpl>,
    limit: usize,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(child: Box<ExecutorImpl>, limit: usize) -> Self {
        Self {
            child,
            limit,
            emitted: 0,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.child.output_schema()
    }

    pub fn init(&mut self) -> Result<()> {
        self.emitted = 0;
        self.child.init()
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(entry) => {
                self.emitted += 1;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }
}
