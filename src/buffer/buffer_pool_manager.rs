use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{FrameId, PageId, Result, StrataError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::page_guard::{PageGuard, ReadPageGuard, WritePageGuard};
use super::{FrameHeader, LruKReplacer};

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Shared buffer pool internals. Page guards hold an `Arc` of this so they
/// can unpin on drop without owning the pool itself.
pub(crate) struct PoolInner {
    frames: Vec<Arc<FrameHeader>>,
    /// Guards the page table and the free list; victim selection and the
    /// accompanying I/O happen under this lock so the pool invariants hold
    /// atomically per operation
    state: Mutex<PoolState>,
    replacer: LruKReplacer,
    disk_scheduler: DiskScheduler,
}

impl PoolInner {
    /// Unpins `page_id`, OR-ing in the dirty flag. False when the page is
    /// not cached or its pin count is already zero.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let frame = &self.frames[frame_id.as_usize()];
        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames, pinning
/// pages while they are in use and evicting with the LRU-K policy when a
/// free frame is needed.
pub struct BufferPoolManager {
    pool_size: usize,
    inner: Arc<PoolInner>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let inner = Arc::new(PoolInner {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        });

        Self { pool_size, inner }
    }

    /// Allocates a fresh page pinned into a frame (pin count 1). The caller
    /// must `unpin_page` it, or use [`Self::new_page_guarded`] instead.
    /// Fails with `BufferPoolFull` when every frame is pinned.
    pub fn new_page(&self) -> Result<PageId> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let frame_id = Self::acquire_victim_frame(inner, &mut state)?;
        let page_id = inner.disk_scheduler.disk_manager().allocate_page()?;

        let frame = &inner.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        inner.replacer.record_access(frame_id);
        inner.replacer.set_evictable(frame_id, false);

        Ok(page_id)
    }

    /// Allocates a fresh page and wraps the pin in a guard.
    pub fn new_page_guarded(&self) -> Result<PageGuard> {
        let page_id = self.new_page()?;
        let frame = {
            let state = self.inner.state.lock();
            let frame_id = state.page_table[&page_id];
            Arc::clone(&self.inner.frames[frame_id.as_usize()])
        };
        Ok(PageGuard::new(Arc::clone(&self.inner), page_id, frame))
    }

    /// Pins `page_id` without latching it.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageGuard::new(Arc::clone(&self.inner), page_id, frame))
    }

    /// Pins `page_id` and takes the shared page latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    /// Pins `page_id` and takes the exclusive page latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_write())
    }

    /// Pins `page_id` into a frame, reading it from disk on a miss.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let inner = &self.inner;
        let mut state = inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &inner.frames[frame_id.as_usize()];
            frame.pin();
            inner.replacer.record_access(frame_id);
            inner.replacer.set_evictable(frame_id, false);
            return Ok(Arc::clone(frame));
        }

        let frame_id = Self::acquire_victim_frame(inner, &mut state)?;
        let frame = &inner.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        inner.disk_scheduler.schedule_read_sync(page_id, &mut data)?;
        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        inner.replacer.record_access(frame_id);
        inner.replacer.set_evictable(frame_id, false);

        Ok(Arc::clone(frame))
    }

    /// Unpins `page_id`, OR-ing in the dirty flag. False when the page is
    /// not cached or its pin count is already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.inner.unpin_page(page_id, is_dirty)
    }

    /// Writes `page_id` to disk regardless of its dirty flag, then clears
    /// the flag. False when the page is not cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let inner = &self.inner;
        let state = inner.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };

        let frame = &inner.frames[frame_id.as_usize()];
        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        inner.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.set_dirty(false);

        Ok(true)
    }

    /// Flushes every dirty cached page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = &self.inner;
        let state = inner.state.lock();

        for (&page_id, &frame_id) in state.page_table.iter() {
            let frame = &inner.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                inner.disk_scheduler.schedule_write_sync(page_id, &data)?;
                frame.set_dirty(false);
            }
        }

        Ok(())
    }

    /// Removes `page_id` from the pool and deallocates it on disk.
    /// `Ok(true)` when deleted or not cached; `PageStillPinned` when pinned.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };

        let frame = &inner.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Err(StrataError::PageStillPinned(page_id));
        }

        state.page_table.remove(&page_id);
        inner.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        inner.disk_scheduler.disk_manager().deallocate_page(page_id);

        Ok(true)
    }

    /// Returns the pin count for a cached page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.inner.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    /// Number of frames the replacer currently considers evictable.
    pub fn evictable_count(&self) -> usize {
        self.inner.replacer.size()
    }

    pub fn disk_manager(&self) -> Arc<DiskManager> {
        Arc::clone(self.inner.disk_scheduler.disk_manager())
    }

    /// Picks a victim frame: free list first, then the replacer. A dirty
    /// victim is flushed before its frame is handed out.
    fn acquire_victim_frame(inner: &PoolInner, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = inner.replacer.evict().ok_or(StrataError::BufferPoolFull)?;
        let frame = &inner.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!(page = old_page_id.as_u32(), "flushing dirty victim page");
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            inner.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }

        state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}
