use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferPoolManager;
use crate::common::{IndexOid, Result, StrataError, TableOid};
use crate::index::{BPlusTree, KeyComparator};
use crate::storage::TableHeap;
use crate::tuple::{SchemaRef, Tuple};

/// Everything the executors need to know about a table.
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: SchemaRef,
    pub heap: Arc<TableHeap>,
}

/// Everything the executors need to know about an index.
pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_oid: TableOid,
    /// Column of the table schema the index keys on
    pub key_column: usize,
    pub tree: Arc<BPlusTree>,
}

#[derive(Default)]
struct CatalogState {
    tables: HashMap<TableOid, Arc<TableInfo>>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, Arc<IndexInfo>>,
    /// Indexes per table, for insert/delete maintenance
    table_indexes: HashMap<TableOid, Vec<IndexOid>>,
}

/// Executor-facing registry of tables and indexes. This is the thin
/// surface the executors consume; persistence of the catalog itself is a
/// non-goal.
pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    next_table_oid: AtomicU32,
    next_index_oid: AtomicU32,
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            next_table_oid: AtomicU32::new(0),
            next_index_oid: AtomicU32::new(0),
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn create_table(&self, name: impl Into<String>, schema: SchemaRef) -> Result<Arc<TableInfo>> {
        let name = name.into();
        let oid = TableOid::new(self.next_table_oid.fetch_add(1, Ordering::SeqCst));
        let heap = Arc::new(TableHeap::new(Arc::clone(&self.bpm))?);

        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            heap,
        });

        let mut state = self.state.write();
        state.tables.insert(oid, Arc::clone(&info));
        state.table_names.insert(name, oid);
        state.table_indexes.insert(oid, Vec::new());
        Ok(info)
    }

    pub fn create_index(
        &self,
        name: impl Into<String>,
        table_oid: TableOid,
        key_column: usize,
        key_width: usize,
        comparator: Arc<dyn KeyComparator>,
    ) -> Result<Arc<IndexInfo>> {
        let table = self.table(table_oid)?;

        let oid = IndexOid::new(self.next_index_oid.fetch_add(1, Ordering::SeqCst));
        let tree = Arc::new(BPlusTree::new(
            Arc::clone(&self.bpm),
            comparator,
            key_width,
        )?);

        // Backfill rows that predate the index
        let mut iter = table.heap.iter()?;
        while let Some((rid, deleted, bytes)) = iter.next()? {
            if deleted {
                continue;
            }
            let tuple = Tuple::from_bytes(&table.schema, &bytes)?;
            let key = tuple.key_from_column(key_column, key_width)?;
            tree.insert(&key, rid)?;
        }

        let info = Arc::new(IndexInfo {
            oid,
            name: name.into(),
            table_oid,
            key_column,
            tree,
        });

        let mut state = self.state.write();
        state.indexes.insert(oid, Arc::clone(&info));
        state
            .table_indexes
            .entry(table_oid)
            .or_default()
            .push(oid);
        Ok(info)
    }

    pub fn table(&self, oid: TableOid) -> Result<Arc<TableInfo>> {
        self.state
            .read()
            .tables
            .get(&oid)
            .cloned()
            .ok_or(StrataError::TableNotFound(oid))
    }

    pub fn table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let state = self.state.read();
        let oid = state.table_names.get(name)?;
        state.tables.get(oid).cloned()
    }

    pub fn index(&self, oid: IndexOid) -> Result<Arc<IndexInfo>> {
        self.state
            .read()
            .indexes
            .get(&oid)
            .cloned()
            .ok_or(StrataError::IndexNotFound(oid))
    }

    /// Indexes that must be maintained for mutations of `table_oid`.
    pub fn table_indexes(&self, table_oid: TableOid) -> Vec<Arc<IndexInfo>> {
        let state = self.state.read();
        state
            .table_indexes
            .get(&table_oid)
            .map(|oids| {
                oids.iter()
                    .filter_map(|oid| state.indexes.get(oid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Int32Comparator;
    use crate::storage::disk::DiskManager;
    use crate::tuple::{Column, DataType, Schema};
    use tempfile::NamedTempFile;

    #[test]
    fn test_create_and_lookup() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
        let catalog = Catalog::new(bpm);

        let schema = Arc::new(Schema::new(vec![Column::new("id", DataType::Integer)]));
        let table = catalog.create_table("users", schema).unwrap();
        assert_eq!(catalog.table(table.oid).unwrap().name, "users");
        assert_eq!(catalog.table_by_name("users").unwrap().oid, table.oid);

        let index = catalog
            .create_index("users_id", table.oid, 0, 4, Arc::new(Int32Comparator))
            .unwrap();
        assert_eq!(catalog.index(index.oid).unwrap().table_oid, table.oid);
        assert_eq!(catalog.table_indexes(table.oid).len(), 1);
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(8, 2, dm));
        let catalog = Catalog::new(bpm);

        assert!(matches!(
            catalog.table(TableOid::new(9)),
            Err(StrataError::TableNotFound(_))
        ));
    }
}
