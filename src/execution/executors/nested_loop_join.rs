use std::sync::Arc;

use crate::common::{RecordId, Result, INVALID_RID};
use crate::execution::expression::Expression;
use crate::tuple::{SchemaRef, Tuple, Value};

use crate::execution::plan::JoinType;
use crate::execution::ExecutorImpl;

/// Inner/left nested-loop join: the right child is re-initialized for
/// every left row; an unmatched left row under LEFT join is emitted once
/// with NULL padding for the right side.
pub struct NestedLoopJoinExecutor {
    left: Box<ExecutorImpl>,
    right: Box<ExecutorImpl>,
    predicate: Expression,
    join_type: JoinType,
    schema: SchemaRef,
    left_tuple: Option<Tuple>,
    left_matched: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<ExecutorImpl>,
        right: Box<ExecutorImpl>,
        predicate: Expression,
        join_type: JoinType,
        schema: SchemaRef,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            join_type,
            schema,
            left_tuple: None,
            left_matched: false,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn init(&mut self) -> Result<()> {
        self.left_tuple = None;
        self.left_matched = false;
        self.left.init()?;
        self.right.init()
    }

    fn null_padded(&self, left: &Tuple) -> Tuple {
        let right_width = self.right.output_schema().column_count();
        let mut values = left.values().to_vec();
        values.extend(std::iter::repeat(Value::Null).take(right_width));
        Tuple::new(values)
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            if self.left_tuple.is_none() {
                match self.left.next()? {
                    Some((tuple, _)) => {
                        self.left_tuple = Some(tuple);
                        self.left_matched = false;
                        self.right.init()?;
                    }
                    None => return Ok(None),
                }
            }

            let left_tuple = self.left_tuple.as_ref().expect("left tuple is set");

            while let Some((right_tuple, _)) = self.right.next()? {
                if self
                    .predicate
                    .evaluate_join(left_tuple, &right_tuple)
                    .as_bool()
                    .unwrap_or(false)
                {
                    self.left_matched = true;
                    let joined = left_tuple.join(&right_tuple);
                    return Ok(Some((joined, INVALID_RID)));
                }
            }

            // Right side exhausted for this left row
            if self.join_type == JoinType::Left && !self.left_matched {
                let padded = self.null_padded(left_tuple);
                self.left_tuple = None;
                return Ok(Some((padded, INVALID_RID)));
            }
            self.left_tuple = None;
        }
    }
}
