use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result, SlotId, StrataError};

use super::page::{TablePageMut, TablePageRef};

/// Heap of tuples stored in a forward-linked chain of table pages.
/// Inserts append to the last page, starting a fresh page when the
/// current one is full. Deletes are tombstones so aborts can revive rows.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let mut guard = bpm.new_page_guarded()?.upgrade_write();
        let first_page_id = guard.page_id();
        TablePageMut::new(guard.data_mut()).init(first_page_id);
        drop(guard);

        Ok(Self {
            bpm,
            first_page_id,
            last_page_id: Mutex::new(first_page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Appends a serialized tuple and returns its RID.
    pub fn insert_tuple(&self, tuple: &[u8]) -> Result<RecordId> {
        let mut last_page_id = self.last_page_id.lock();

        let mut guard = self.bpm.fetch_page_write(*last_page_id)?;
        let mut page = TablePageMut::new(guard.data_mut());
        match page.insert_tuple(tuple) {
            Ok(slot_id) => return Ok(RecordId::new(*last_page_id, slot_id)),
            Err(StrataError::TupleTooLarge { .. }) if page.as_ref().tuple_count() > 0 => {}
            Err(e) => return Err(e),
        }

        // Current tail is full; chain a fresh page
        let mut new_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let new_page_id = new_guard.page_id();
        let mut new_page = TablePageMut::new(new_guard.data_mut());
        new_page.init(new_page_id);
        let slot_id = new_page.insert_tuple(tuple)?;

        TablePageMut::new(guard.data_mut()).set_next_page_id(Some(new_page_id));
        *last_page_id = new_page_id;

        Ok(RecordId::new(new_page_id, slot_id))
    }

    /// Reads a tuple and its tombstone flag.
    pub fn get_tuple(&self, rid: RecordId) -> Result<(bool, Vec<u8>)> {
        let guard = self.bpm.fetch_page_read(rid.page_id)?;
        let page = TablePageRef::new(guard.data());
        let deleted = page.is_deleted(rid.slot_id)?;
        let bytes = page.get_tuple(rid.slot_id)?.to_vec();
        Ok((deleted, bytes))
    }

    /// Sets or clears a tuple's tombstone.
    pub fn set_deleted(&self, rid: RecordId, deleted: bool) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(rid.page_id)?;
        TablePageMut::new(guard.data_mut()).set_deleted(rid.slot_id, deleted)
    }

    /// Cursor over every slot in the heap, tombstoned ones included. The
    /// cursor stops at the heap's tail as of this call, so a mutation
    /// executor never revisits rows it appended itself.
    pub fn iter(&self) -> Result<TableIterator> {
        let stop_page_id = *self.last_page_id.lock();
        let stop_slot_count = {
            let guard = self.bpm.fetch_page_read(stop_page_id)?;
            TablePageRef::new(guard.data()).tuple_count()
        };

        Ok(TableIterator {
            bpm: Arc::clone(&self.bpm),
            current_page_id: Some(self.first_page_id),
            next_slot: 0,
            stop_page_id,
            stop_slot_count,
        })
    }
}

/// Forward cursor over the heap's page chain. Yields the RID, tombstone
/// flag, and raw bytes of each slot; callers decide what to skip. No
/// latch is held between calls.
pub struct TableIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    next_slot: usize,
    /// Tail position captured when the cursor was created
    stop_page_id: PageId,
    stop_slot_count: usize,
}

impl TableIterator {
    pub fn next(&mut self) -> Result<Option<(RecordId, bool, Vec<u8>)>> {
        loop {
            let page_id = match self.current_page_id {
                Some(page_id) => page_id,
                None => return Ok(None),
            };

            let at_stop_page = page_id == self.stop_page_id;

            let guard = self.bpm.fetch_page_read(page_id)?;
            let page = TablePageRef::new(guard.data());

            let slot_limit = if at_stop_page {
                self.stop_slot_count
            } else {
                page.tuple_count()
            };

            if self.next_slot < slot_limit {
                let slot_id = SlotId::new(self.next_slot as u16);
                let rid = RecordId::new(page_id, slot_id);
                let deleted = page.is_deleted(slot_id)?;
                let bytes = page.get_tuple(slot_id)?.to_vec();
                self.next_slot += 1;
                return Ok(Some((rid, deleted, bytes)));
            }

            self.current_page_id = if at_stop_page {
                None
            } else {
                page.next_page_id()
            };
            self.next_slot = 0;
        }
    }
}
