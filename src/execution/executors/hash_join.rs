use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{RecordId, Result, INVALID_RID};
use crate::execution::expression::Expression;
use crate::tuple::{SchemaRef, Tuple, Value};

use crate::execution::plan::JoinType;
use crate::execution::ExecutorImpl;

/// Inner/left hash join. `init` builds a hash table over the right child
/// keyed by the combined hash of its key expressions; `next` probes with
/// the left keys and verifies matches by value, since distinct keys can
/// share a combined hash.
pub struct HashJoinExecutor {
    left: Box<ExecutorImpl>,
    right: Box<ExecutorImpl>,
    left_keys: Vec<Expression>,
    right_keys: Vec<Expression>,
    join_type: JoinType,
    schema: SchemaRef,
    hash_table: HashMap<u64, Vec<Tuple>>,
    left_tuple: Option<Tuple>,
    candidates: Vec<Tuple>,
    candidate_idx: usize,
    left_matched: bool,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<ExecutorImpl>,
        right: Box<ExecutorImpl>,
        left_keys: Vec<Expression>,
        right_keys: Vec<Expression>,
        join_type: JoinType,
        schema: SchemaRef,
    ) -> Self {
        Self {
            left,
            right,
            left_keys,
            right_keys,
            join_type,
            schema,
            hash_table: HashMap::new(),
            left_tuple: None,
            candidates: Vec::new(),
            candidate_idx: 0,
            left_matched: false,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Combined hash over the key expressions; null values contribute
    /// nothing, mirroring how they never match on probe.
    fn combined_hash(keys: &[Expression], tuple: &Tuple) -> u64 {
        let mut hash = 0u64;
        for key in keys {
            let value = key.evaluate(tuple);
            if !value.is_null() {
                hash = hash
                    .rotate_left(5)
                    .wrapping_mul(0x9e3779b97f4a7c15)
                    ^ value.hash_value();
            }
        }
        hash
    }

    fn keys_match(&self, left: &Tuple, right: &Tuple) -> bool {
        self.left_keys
            .iter()
            .zip(self.right_keys.iter())
            .all(|(lk, rk)| lk.evaluate(left).eq_joinable(&rk.evaluate(right)))
    }

    pub fn init(&mut self) -> Result<()> {
        self.hash_table.clear();
        self.left_tuple = None;
        self.candidates.clear();
        self.candidate_idx = 0;
        self.left_matched = false;

        self.left.init()?;
        self.right.init()?;

        while let Some((tuple, _)) = self.right.next()? {
            let hash = Self::combined_hash(&self.right_keys, &tuple);
            self.hash_table.entry(hash).or_default().push(tuple);
        }
        Ok(())
    }

    fn null_padded(&self, left: &Tuple) -> Tuple {
        let right_width = self.right.output_schema().column_count();
        let mut values = left.values().to_vec();
        values.extend(std::iter::repeat(Value::Null).take(right_width));
        Tuple::new(values)
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        loop {
            if let Some(left_tuple) = self.left_tuple.clone() {
                while self.candidate_idx < self.candidates.len() {
                    let right_tuple = self.candidates[self.candidate_idx].clone();
                    self.candidate_idx += 1;
                    if self.keys_match(&left_tuple, &right_tuple) {
                        self.left_matched = true;
                        return Ok(Some((left_tuple.join(&right_tuple), INVALID_RID)));
                    }
                }

                // Probe exhausted for this left row
                let emit_padded = self.join_type == JoinType::Left && !self.left_matched;
                self.left_tuple = None;
                if emit_padded {
                    return Ok(Some((self.null_padded(&left_tuple), INVALID_RID)));
                }
            }

            match self.left.next()? {
                Some((tuple, _)) => {
                    let hash = Self::combined_hash(&self.left_keys, &tuple);
                    self.candidates = self.hash_table.get(&hash).cloned().unwrap_or_default();
                    self.candidate_idx = 0;
                    self.left_matched = false;
                    self.left_tuple = Some(tuple);
                }
                None => return Ok(None),
            }
        }
    }
}
