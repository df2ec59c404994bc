//! Pull-based query execution. Every operator exposes `init` and `next`;
//! `next` hands back one `(tuple, rid)` at a time. Operators are a sum
//! type dispatched by match, so the hot loop stays free of virtual calls.

pub mod executor_context;
pub mod executors;
pub mod expression;
pub mod plan;

use std::sync::Arc;

use crate::common::{RecordId, Result, StrataError};
use crate::tuple::{SchemaRef, Tuple};

pub use executor_context::ExecutorContext;
use executors::*;
use plan::PlanNode;

/// The executor sum type. Children are boxed `ExecutorImpl`s built by
/// [`create_executor`].
pub enum ExecutorImpl {
    SeqScan(SeqScanExecutor),
    IndexScan(IndexScanExecutor),
    Values(ValuesExecutor),
    Insert(InsertExecutor),
    Delete(DeleteExecutor),
    Update(UpdateExecutor),
    NestedLoopJoin(NestedLoopJoinExecutor),
    HashJoin(HashJoinExecutor),
    Filter(FilterExecutor),
    Projection(ProjectionExecutor),
    Sort(SortExecutor),
    Limit(LimitExecutor),
    TopN(TopNExecutor),
}

impl ExecutorImpl {
    pub fn init(&mut self) -> Result<()> {
        match self {
            ExecutorImpl::SeqScan(e) => e.init(),
            ExecutorImpl::IndexScan(e) => e.init(),
            ExecutorImpl::Values(e) => e.init(),
            ExecutorImpl::Insert(e) => e.init(),
            ExecutorImpl::Delete(e) => e.init(),
            ExecutorImpl::Update(e) => e.init(),
            ExecutorImpl::NestedLoopJoin(e) => e.init(),
            ExecutorImpl::HashJoin(e) => e.init(),
            ExecutorImpl::Filter(e) => e.init(),
            ExecutorImpl::Projection(e) => e.init(),
            ExecutorImpl::Sort(e) => e.init(),
            ExecutorImpl::Limit(e) => e.init(),
            ExecutorImpl::TopN(e) => e.init(),
        }
    }

    pub fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        match self {
            ExecutorImpl::SeqScan(e) => e.next(),
            ExecutorImpl::IndexScan(e) => e.next(),
            ExecutorImpl::Values(e) => e.next(),
            ExecutorImpl::Insert(e) => e.next(),
            ExecutorImpl::Delete(e) => e.next(),
            ExecutorImpl::Update(e) => e.next(),
            ExecutorImpl::NestedLoopJoin(e) => e.next(),
            ExecutorImpl::HashJoin(e) => e.next(),
            ExecutorImpl::Filter(e) => e.next(),
            ExecutorImpl::Projection(e) => e.next(),
            ExecutorImpl::Sort(e) => e.next(),
            ExecutorImpl::Limit(e) => e.next(),
            ExecutorImpl::TopN(e) => e.next(),
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        match self {
            ExecutorImpl::SeqScan(e) => e.output_schema(),
            ExecutorImpl::IndexScan(e) => e.output_schema(),
            ExecutorImpl::Values(e) => e.output_schema(),
            ExecutorImpl::Insert(e) => e.output_schema(),
            ExecutorImpl::Delete(e) => e.output_schema(),
            ExecutorImpl::Update(e) => e.output_schema(),
            ExecutorImpl::NestedLoopJoin(e) => e.output_schema(),
            ExecutorImpl::HashJoin(e) => e.output_schema(),
            ExecutorImpl::Filter(e) => e.output_schema(),
            ExecutorImpl::Projection(e) => e.output_schema(),
            ExecutorImpl::Sort(e) => e.output_schema(),
            ExecutorImpl::Limit(e) => e.output_schema(),
            ExecutorImpl::TopN(e) => e.output_schema(),
        }
    }
}

/// Builds the executor tree for a plan.
pub fn create_executor(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> Result<ExecutorImpl> {
    Ok(match plan {
        PlanNode::SeqScan(p) => {
            ExecutorImpl::SeqScan(SeqScanExecutor::new(Arc::clone(ctx), p.clone()))
        }
        PlanNode::IndexScan(p) => {
            ExecutorImpl::IndexScan(IndexScanExecutor::new(Arc::clone(ctx), p.clone()))
        }
        PlanNode::Values(p) => ExecutorImpl::Values(ValuesExecutor::new(p.clone())),
        PlanNode::Insert(p) => ExecutorImpl::Insert(InsertExecutor::new(
            Arc::clone(ctx),
            p.table_oid,
            Box::new(create_executor(ctx, &p.child)?),
        )),
        PlanNode::Delete(p) => ExecutorImpl::Delete(DeleteExecutor::new(
            Arc::clone(ctx),
            p.table_oid,
            Box::new(create_executor(ctx, &p.child)?),
        )),
        PlanNode::Update(p) => ExecutorImpl::Update(UpdateExecutor::new(
            Arc::clone(ctx),
            p.table_oid,
            p.target_exprs.clone(),
            Box::new(create_executor(ctx, &p.child)?),
        )),
        PlanNode::NestedLoopJoin(p) => ExecutorImpl::NestedLoopJoin(NestedLoopJoinExecutor::new(
            Box::new(create_executor(ctx, &p.left)?),
            Box::new(create_executor(ctx, &p.right)?),
            p.predicate.clone(),
            p.join_type,
            Arc::clone(&p.schema),
        )),
        PlanNode::HashJoin(p) => ExecutorImpl::HashJoin(HashJoinExecutor::new(
            Box::new(create_executor(ctx, &p.left)?),
            Box::new(create_executor(ctx, &p.right)?),
            p.left_keys.clone(),
            p.right_keys.clone(),
            p.join_type,
            Arc::clone(&p.schema),
        )),
        PlanNode::Filter(p) => ExecutorImpl::Filter(FilterExecutor::new(
            Box::new(create_executor(ctx, &p.child)?),
            p.predicate.clone(),
        )),
        PlanNode::Projection(p) => ExecutorImpl::Projection(ProjectionExecutor::new(
            Box::new(create_executor(ctx, &p.child)?),
            p.exprs.clone(),
            Arc::clone(&p.schema),
        )),
        PlanNode::Sort(p) => ExecutorImpl::Sort(SortExecutor::new(
            Box::new(create_executor(ctx, &p.child)?),
            p.order_bys.clone(),
        )),
        PlanNode::Limit(p) => ExecutorImpl::Limit(LimitExecutor::new(
            Box::new(create_executor(ctx, &p.child)?),
            p.limit,
        )),
        PlanNode::TopN(p) => ExecutorImpl::TopN(TopNExecutor::new(
            Box::new(create_executor(ctx, &p.child)?),
            p.order_bys.clone(),
            p.n,
        )),
    })
}

/// Runs a plan to completion, collecting its output rows. A lock-manager
/// abort along the way surfaces as an execution failure after the
/// transaction manager has rolled the transaction back.
pub fn execute_plan(ctx: &Arc<ExecutorContext>, plan: &PlanNode) -> Result<Vec<Tuple>> {
    let mut executor = create_executor(ctx, plan)?;

    let run = (|| -> Result<Vec<Tuple>> {
        executor.init()?;
        let mut rows = Vec::new();
        while let Some((tuple, _)) = executor.next()? {
            rows.push(tuple);
        }
        Ok(rows)
    })();

    match run {
        Ok(rows) => Ok(rows),
        Err(err) => {
            if let StrataError::TxnAborted { txn_id, reason } = &err {
                ctx.txn_manager.abort(&ctx.txn)?;
                return Err(StrataError::ExecutionFailure(format!(
                    "transaction {txn_id} aborted: {reason}"
                )));
            }
            Err(err)
        }
    }
}
