use std::sync::Arc;

use stratadb::buffer::BufferPoolManager;
use stratadb::catalog::Catalog;
use stratadb::concurrency::{IsolationLevel, LockManager, TransactionManager};
use stratadb::execution::executor_context::ExecutorContext;
use stratadb::execution::expression::Expression;
use stratadb::execution::plan::{InsertPlan, PlanNode, SeqScanPlan, ValuesPlan};
use stratadb::execution::execute_plan;
use stratadb::storage::disk::DiskManager;
use stratadb::tuple::{Column, DataType, Schema, Value};

fn main() -> stratadb::Result<()> {
    tracing_subscriber::fmt().init();

    println!("stratadb - storage and transaction engine demo");
    println!("==============================================\n");

    let db_path = "demo.db";
    let disk = Arc::new(DiskManager::new(db_path)?);
    let bpm = Arc::new(BufferPoolManager::new(64, 2, disk));
    println!("buffer pool: {} frames, LRU-2 replacement", bpm.pool_size());

    let catalog = Arc::new(Catalog::new(Arc::clone(&bpm)));
    let lock_manager = Arc::new(LockManager::new());
    let txn_manager = Arc::new(TransactionManager::new(
        Arc::clone(&lock_manager),
        Arc::clone(&catalog),
    ));

    let schema = Arc::new(Schema::new(vec![
        Column::new("id", DataType::Integer),
        Column::new("name", DataType::VarChar(32)),
    ]));
    let table = catalog.create_table("heroes", Arc::clone(&schema))?;
    println!("created table 'heroes' as {}", table.oid);

    let txn = txn_manager.begin(IsolationLevel::RepeatableRead);
    let ctx = Arc::new(ExecutorContext::new(
        Arc::clone(&catalog),
        Arc::clone(&lock_manager),
        Arc::clone(&txn_manager),
        Arc::clone(&txn),
    ));

    let rows = vec![
        vec![
            Expression::constant(Value::Integer(1)),
            Expression::constant(Value::String("ada".into())),
        ],
        vec![
            Expression::constant(Value::Integer(2)),
            Expression::constant(Value::String("grace".into())),
        ],
        vec![
            Expression::constant(Value::Integer(3)),
            Expression::constant(Value::String("edsger".into())),
        ],
    ];
    let insert = PlanNode::Insert(InsertPlan {
        table_oid: table.oid,
        child: Box::new(PlanNode::Values(ValuesPlan {
            rows,
            schema: Arc::clone(&schema),
        })),
    });
    let result = execute_plan(&ctx, &insert)?;
    println!("inserted {} rows", result[0].value(0));

    let scan = PlanNode::SeqScan(SeqScanPlan {
        table_oid: table.oid,
        schema: Arc::clone(&schema),
        filter: None,
        for_update: false,
    });
    println!("\nscan of 'heroes':");
    for row in execute_plan(&ctx, &scan)? {
        println!("  ({}, {})", row.value(0), row.value(1));
    }

    txn_manager.commit(&txn)?;
    bpm.flush_all_pages()?;
    println!("\ntransaction committed, pages flushed");

    std::fs::remove_file(db_path).ok();
    Ok(())
}
