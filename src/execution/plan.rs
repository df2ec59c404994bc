use std::sync::Arc;

use crate::common::{IndexOid, TableOid};
use crate::tuple::{Column, DataType, Schema, SchemaRef, Value};

use super::expression::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByType {
    /// Unspecified direction, treated as ascending
    Default,
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub order_type: OrderByType,
    pub expr: Expression,
}

#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table_oid: TableOid,
    pub schema: SchemaRef,
    pub filter: Option<Expression>,
    /// Scan feeds an update/delete: take IX on the table, X on rows
    pub for_update: bool,
}

#[derive(Debug, Clone)]
pub struct IndexScanPlan {
    pub index_oid: IndexOid,
    pub schema: SchemaRef,
    /// Start iteration at the first key >= this value
    pub start_key: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ValuesPlan {
    pub rows: Vec<Vec<Expression>>,
    pub schema: SchemaRef,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table_oid: TableOid,
    /// One expression per output column, evaluated against the old row
    pub target_exprs: Vec<Expression>,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub predicate: Expression,
    pub join_type: JoinType,
    pub schema: SchemaRef,
}

#[derive(Debug, Clone)]
pub struct HashJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    /// Key expressions over the left child, tuple index 0
    pub left_keys: Vec<Expression>,
    /// Key expressions over the right child, tuple index 0
    pub right_keys: Vec<Expression>,
    pub join_type: JoinType,
    pub schema: SchemaRef,
}

#[derive(Debug, Clone)]
pub struct FilterPlan {
    pub child: Box<PlanNode>,
    pub predicate: Expression,
}

#[derive(Debug, Clone)]
pub struct ProjectionPlan {
    pub child: Box<PlanNode>,
    pub exprs: Vec<Expression>,
    pub schema: SchemaRef,
}

#[derive(Debug, Clone)]
pub struct SortPlan {
    pub child: Box<PlanNode>,
    pub order_bys: Vec<OrderBy>,
}

#[derive(Debug, Clone)]
pub struct LimitPlan {
    pub child: Box<PlanNode>,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct TopNPlan {
    pub child: Box<PlanNode>,
    pub order_bys: Vec<OrderBy>,
    pub n: usize,
}

/// Physical plan tree consumed by the executor factory. Construction is
/// the planner's business; this layer only reads it.
#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    IndexScan(IndexScanPlan),
    Values(ValuesPlan),
    Insert(InsertPlan),
    Delete(DeletePlan),
    Update(UpdatePlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    HashJoin(HashJoinPlan),
    Filter(FilterPlan),
    Projection(ProjectionPlan),
    Sort(SortPlan),
    Limit(LimitPlan),
    TopN(TopNPlan),
}

impl PlanNode {
    /// Schema of a mutation executor's single count row.
    pub fn count_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![Column::new("count", DataType::Integer)]))
    }

    pub fn output_schema(&self) -> SchemaRef {
        match self {
            PlanNode::SeqScan(plan) => Arc::clone(&plan.schema),
            PlanNode::IndexScan(plan) => Arc::clone(&plan.schema),
            PlanNode::Values(plan) => Arc::clone(&plan.schema),
            PlanNode::Insert(_) | PlanNode::Delete(_) | PlanNode::Update(_) => Self::count_schema(),
            PlanNode::NestedLoopJoin(plan) => Arc::clone(&plan.schema),
            PlanNode::HashJoin(plan) => Arc::clone(&plan.schema),
            PlanNode::Filter(plan) => plan.child.output_schema(),
            PlanNode::Projection(plan) => Arc::clone(&plan.schema),
            PlanNode::Sort(plan) => plan.child.output_schema(),
            PlanNode::Limit(plan) => plan.child.output_schema(),
            PlanNode::TopN(plan) => plan.child.output_schema(),
        }
    }
}
