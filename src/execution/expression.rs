use std::cmp::Ordering;

use crate::tuple::{Tuple, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Expression tree evaluated against one tuple, or against a pair of
/// tuples in a join context. Column references carry the tuple index
/// (0 = left/base, 1 = right) the plan layer assigned them.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column { tuple_idx: usize, col_idx: usize },
    Constant(Value),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(tuple_idx: usize, col_idx: usize) -> Self {
        Expression::Column { tuple_idx, col_idx }
    }

    pub fn constant(value: Value) -> Self {
        Expression::Constant(value)
    }

    pub fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::comparison(ComparisonOp::Eq, left, right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::Logic {
            op: LogicOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluates against a single tuple; every column reference must have
    /// tuple index 0.
    pub fn evaluate(&self, tuple: &Tuple) -> Value {
        self.eval(&|tuple_idx, col_idx| {
            debug_assert_eq!(tuple_idx, 0, "single-tuple context");
            tuple.value(col_idx).clone()
        })
    }

    /// Evaluates in a join context: tuple index selects the side.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> Value {
        self.eval(&|tuple_idx, col_idx| {
            if tuple_idx == 0 {
                left.value(col_idx).clone()
            } else {
                right.value(col_idx).clone()
            }
        })
    }

    fn eval(&self, resolve: &dyn Fn(usize, usize) -> Value) -> Value {
        match self {
            Expression::Column { tuple_idx, col_idx } => resolve(*tuple_idx, *col_idx),
            Expression::Constant(value) => value.clone(),
            Expression::Comparison { op, left, right } => {
                let lhs = left.eval(resolve);
                let rhs = right.eval(resolve);
                if lhs.is_null() || rhs.is_null() {
                    return Value::Null;
                }
                let ord = lhs.compare(&rhs);
                let result = match op {
                    ComparisonOp::Eq => ord == Ordering::Equal,
                    ComparisonOp::NotEq => ord != Ordering::Equal,
                    ComparisonOp::Lt => ord == Ordering::Less,
                    ComparisonOp::LtEq => ord != Ordering::Greater,
                    ComparisonOp::Gt => ord == Ordering::Greater,
                    ComparisonOp::GtEq => ord != Ordering::Less,
                };
                Value::Boolean(result)
            }
            Expression::Logic { op, left, right } => {
                let lhs = left.eval(resolve).as_bool().unwrap_or(false);
                let rhs = right.eval(resolve).as_bool().unwrap_or(false);
                Value::Boolean(match op {
                    LogicOp::And => lhs && rhs,
                    LogicOp::Or => lhs || rhs,
                })
            }
        }
    }

    /// True when the expression evaluates to boolean true.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        self.evaluate(tuple).as_bool().unwrap_or(false)
    }
}
