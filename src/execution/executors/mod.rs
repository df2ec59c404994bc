mod delete;
mod filter;
mod hash_join;
mod index_scan;
mod insert;
mod limit;
mod nested_loop_join;
mod projection;
mod seq_scan;
mod sort;
mod topn;
mod update;
mod values;

pub use delete::DeleteExecutor;
pub use filter::FilterExecutor;
pub use hash_join::HashJoinExecutor;
pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use limit::LimitExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use projection::ProjectionExecutor;
pub use seq_scan::SeqScanExecutor;
pub use sort::SortExecutor;
pub use topn::TopNExecutor;
pub use update::UpdateExecutor;
pub use values::ValuesExecutor;
