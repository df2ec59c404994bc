use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::common::{RecordId, Result, INVALID_RID};
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::plan::OrderBy;
use crate::execution::ExecutorImpl;

use super::sort::compare_by_order;

/// Heap entry ordered by the shared order-by list; the heap keeps the
/// *worst* row on top so it can be displaced cheaply.
struct HeapEntry {
    tuple: Tuple,
    order_bys: Arc<Vec<OrderBy>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_by_order(&self.tuple, &other.tuple, &self.order_bys)
    }
}

/// Keeps the N best rows under the order comparator in a bounded max-heap
/// and emits them in ascending order.
pub struct TopNExecutor {
    child: Box<ExecutorImpl>,
    order_bys: Arc<Vec<OrderBy>>,
    n: usize,
    sorted: Vec<Tuple>,
    cursor: usize,
}

impl TopNExecutor {
    pub fn new(child: Box<ExecutorImpl>, order_bys: Vec<OrderBy>, n: usize) -> Self {
        Self {
            child,
            order_bys: Arc::new(order_bys),
            n,
            sorted: Vec::new(),
            cursor: 0,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.child.output_schema()
    }

    pub fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.sorted.clear();
        self.cursor = 0;

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.n + 1);
        while let Some((tuple, _)) = self.child.next()? {
            heap.push(HeapEntry {
                tuple,
                order_bys: Arc::clone(&self.order_bys),
            });
            if heap.len() > self.n {
                heap.pop();
            }
        }

        self.sorted = heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| entry.tuple)
            .collect();
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        match self.sorted.get(self.cursor) {
            Some(tuple) => {
                self.cursor += 1;
                Ok(Some((tuple.clone(), INVALID_RID)))
            }
            None => Ok(None),
        }
    }
}
