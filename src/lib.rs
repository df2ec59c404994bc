//! Stratadb - an educational disk-oriented database storage and
//! transaction engine.
//!
//! The engine stores data in fixed-size pages on disk and caches them in
//! a buffer pool; a B+ tree index, a multi-granularity lock manager, and
//! a small pull-based executor layer sit on top.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): disk I/O and page organization
//!   - `DiskManager`: reads and writes pages in a single database file
//!   - `DiskScheduler`: background worker feeding the disk through a queue
//!   - `TablePage`/`TableHeap`: tombstoning tuple storage with a page chain
//!
//! - **Buffer pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: pins pages into frames, evicts with LRU-K
//!   - `LruKReplacer`: backward-k-distance replacement policy
//!   - `PageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII pin + latch
//!
//! - **Index** (`index`): B+ tree over buffer-pool pages with fixed-width
//!   keys, a caller-supplied comparator, and latch-crabbing writers
//!
//! - **Concurrency** (`concurrency`): strict 2PL with five lock modes at
//!   table and row granularity, FIFO queues with upgrade priority, and a
//!   background deadlock detector that aborts the youngest cycle member
//!
//! - **Execution** (`execution`): pull-based operators (scans, mutations,
//!   joins, sort, top-N) that coordinate with the lock manager
//!
//! - **Optimizer** (`optimizer`): NLJ-to-hash-join and sort-limit-to-top-N
//!   rewrites
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratadb::buffer::BufferPoolManager;
//! use stratadb::storage::disk::DiskManager;
//!
//! let disk = Arc::new(DiskManager::new("demo.db").unwrap());
//! let bpm = BufferPoolManager::new(64, 2, disk);
//!
//! let page_id = bpm.new_page().unwrap();
//! {
//!     let mut guard = bpm.fetch_page_write(page_id).unwrap();
//!     guard.data_mut()[0] = 42;
//! }
//! bpm.unpin_page(page_id, false);
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod index;
pub mod optimizer;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError, TableOid, TxnId};
