use std::cmp::Ordering;

use crate::common::{RecordId, Result, INVALID_RID};
use crate::tuple::{SchemaRef, Tuple};

use crate::execution::plan::{OrderBy, OrderByType};
use crate::execution::ExecutorImpl;

/// Compares two rows under an order-by list: keys are evaluated left to
/// right, DESC reverses, and the first non-equal key decides.
pub(crate) fn compare_by_order(a: &Tuple, b: &Tuple, order_bys: &[OrderBy]) -> Ordering {
    for order_by in order_bys {
        let va = order_by.expr.evaluate(a);
        let vb = order_by.expr.evaluate(b);
        let ord = match order_by.order_type {
            OrderByType::Desc => vb.compare(&va),
            OrderByType::Asc | OrderByType::Default => va.compare(&vb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Materializes the child in `init` and emits rows in sorted order. The
/// sort is stable, so equal keys keep their arrival order.
pub struct SortExecutor {
    child: Box<ExecutorImpl>,
    order_bys: Vec<OrderBy>,
    sorted: Vec<Tuple>,
    cursor: usize,
}

impl SortExecutor {
    pub fn new(child: Box<ExecutorImpl>, order_bys: Vec<OrderBy>) -> Self {
        Self {
            child,
            order_bys,
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

        while let Some((tuple, _)) = self.child.next()? {
            self.sorted.push(tuple);
        }
        let order_bys = self.order_bys.clone();
        self.sorted
            .sort_by(|a, b| compare_by_order(a, b, &order_bys));
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
