//! Peephole plan rewrites, applied bottom-up:
//! a nested-loop join whose predicate is a conjunction of cross-side
//! column equalities becomes a hash join, and a limit directly above a
//! sort becomes a top-N.

use crate::execution::expression::{ComparisonOp, Expression, LogicOp};
use crate::execution::plan::{HashJoinPlan, NestedLoopJoinPlan, PlanNode, TopNPlan};

/// Applies every rule until the tree stops changing shape (one bottom-up
/// pass per rule suffices for these two).
pub fn optimize(plan: PlanNode) -> PlanNode {
    let plan = rewrite_bottom_up(plan, &nlj_to_hash_join);
    rewrite_bottom_up(plan, &sort_limit_to_topn)
}

fn rewrite_bottom_up(plan: PlanNode, rule: &dyn Fn(PlanNode) -> PlanNode) -> PlanNode {
    let plan = map_children(plan, &|child| rewrite_bottom_up(child, rule));
    rule(plan)
}

fn map_children(plan: PlanNode, f: &dyn Fn(PlanNode) -> PlanNode) -> PlanNode {
    match plan {
        PlanNode::Insert(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Insert(p)
        }
        PlanNode::Delete(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Delete(p)
        }
        PlanNode::Update(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Update(p)
        }
        PlanNode::NestedLoopJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::NestedLoopJoin(p)
        }
        PlanNode::HashJoin(mut p) => {
            p.left = Box::new(f(*p.left));
            p.right = Box::new(f(*p.right));
            PlanNode::HashJoin(p)
        }
        PlanNode::Filter(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Filter(p)
        }
        PlanNode::Projection(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Projection(p)
        }
        PlanNode::Sort(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Sort(p)
        }
        PlanNode::Limit(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::Limit(p)
        }
        PlanNode::TopN(mut p) => {
            p.child = Box::new(f(*p.child));
            PlanNode::TopN(p)
        }
        leaf @ (PlanNode::SeqScan(_) | PlanNode::IndexScan(_) | PlanNode::Values(_)) => leaf,
    }
}

/// Collects `col(t) = col(1-t)` equalities from a conjunction. Column
/// references are normalized to tuple index 0 on their own side. Returns
/// None when any conjunct fails the pattern.
fn extract_equi_keys(
    expr: &Expression,
    left_keys: &mut Vec<Expression>,
    right_keys: &mut Vec<Expression>,
) -> Option<()> {
    match expr {
        Expression::Logic {
            op: LogicOp::And,
            left,
            right,
        } => {
            extract_equi_keys(left, left_keys, right_keys)?;
            extract_equi_keys(right, left_keys, right_keys)
        }
        Expression::Comparison {
            op: ComparisonOp::Eq,
            left,
            right,
        } => match (left.as_ref(), right.as_ref()) {
            (
                Expression::Column {
                    tuple_idx: 0,
                    col_idx: lcol,
                },
                Expression::Column {
                    tuple_idx: 1,
                    col_idx: rcol,
                },
            ) => {
                left_keys.push(Expression::column(0, *lcol));
                right_keys.push(Expression::column(0, *rcol));
                Some(())
            }
            (
                Expression::Column {
                    tuple_idx: 1,
                    col_idx: rcol,
                },
                Expression::Column {
                    tuple_idx: 0,
                    col_idx: lcol,
                },
            ) => {
                left_keys.push(Expression::column(0, *lcol));
                right_keys.push(Expression::column(0, *rcol));
                Some(())
            }
            _ => None,
        },
        _ => None,
    }
}

fn nlj_to_hash_join(plan: PlanNode) -> PlanNode {
    let nlj = match plan {
        PlanNode::NestedLoopJoin(nlj) => nlj,
        other => return other,
    };

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    if extract_equi_keys(&nlj.predicate, &mut left_keys, &mut right_keys).is_some() {
        let NestedLoopJoinPlan {
            left,
            right,
            join_type,
            schema,
            ..
        } = nlj;
        return PlanNode::HashJoin(HashJoinPlan {
            left,
            right,
            left_keys,
            right_keys,
            join_type,
            schema,
        });
    }

    PlanNode::NestedLoopJoin(nlj)
}

fn sort_limit_to_topn(plan: PlanNode) -> PlanNode {
    let limit = match plan {
        PlanNode::Limit(limit) => limit,
        other => return other,
    };

    if let PlanNode::Sort(sort) = *limit.child {
        return PlanNode::TopN(TopNPlan {
            child: sort.child,
            order_bys: sort.order_bys,
            n: limit.limit,
        });
    }

    PlanNode::Limit(limit)
}
