use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::PoolInner;
use super::FrameHeader;

type ReadLatch = ArcRwLockReadGuard<RawRwLock, Box<[u8; PAGE_SIZE]>>;
type WriteLatch = ArcRwLockWriteGuard<RawRwLock, Box<[u8; PAGE_SIZE]>>;

struct GuardCore {
    pool: Arc<PoolInner>,
    page_id: PageId,
    frame: Arc<FrameHeader>,
    is_dirty: bool,
}

impl GuardCore {
    fn release(self) {
        self.pool.unpin_page(self.page_id, self.is_dirty);
    }
}

/// RAII pin on a page with no latch held. Convertible into a latched guard.
/// A moved-from guard is inert; drop releases the pin exactly once.
pub struct PageGuard {
    core: Option<GuardCore>,
}

impl PageGuard {
    pub(crate) fn new(pool: Arc<PoolInner>, page_id: PageId, frame: Arc<FrameHeader>) -> Self {
        Self {
            core: Some(GuardCore {
                pool,
                page_id,
                frame,
                is_dirty: false,
            }),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.core.as_ref().expect("guard is live").page_id
    }

    /// Takes the shared page latch, keeping the pin.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let core = self.core.take().expect("guard is live");
        let latch = core.frame.data_latch().read_arc();
        ReadPageGuard {
            core: Some(core),
            latch: Some(latch),
        }
    }

    /// Takes the exclusive page latch, keeping the pin.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let core = self.core.take().expect("guard is live");
        let latch = core.frame.data_latch().write_arc();
        WritePageGuard {
            core: Some(core),
            latch: Some(latch),
        }
    }

    /// Drops this guard, releasing the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            core.release();
        }
    }
}

/// RAII pin plus shared page latch. Drop releases the latch, then the pin.
pub struct ReadPageGuard {
    core: Option<GuardCore>,
    latch: Option<ReadLatch>,
}

impl ReadPageGuard {
    pub fn page_id(&self) -> PageId {
        self.core.as_ref().expect("guard is live").page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().expect("guard is live")[..]
    }

    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch must go before the pin so no unpinned page stays latched
        self.latch.take();
        if let Some(core) = self.core.take() {
            core.release();
        }
    }
}

/// RAII pin plus exclusive page latch. Mutable access marks the page
/// dirty; drop releases the latch, then the pin with the dirty flag.
pub struct WritePageGuard {
    core: Option<GuardCore>,
    latch: Option<WriteLatch>,
}

impl WritePageGuard {
    pub fn page_id(&self) -> PageId {
        self.core.as_ref().expect("guard is live").page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.latch.as_ref().expect("guard is live")[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.core.as_mut().expect("guard is live").is_dirty = true;
        &mut self.latch.as_mut().expect("guard is live")[..]
    }

    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        if let Some(core) = self.core.take() {
            core.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::NamedTempFile;

    use crate::buffer::BufferPoolManager;
    use crate::storage::disk::DiskManager;

    #[test]
    fn test_guard_unpins_on_drop() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = BufferPoolManager::new(4, 2, dm);

        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let guard = bpm.fetch_page_basic(page_id).unwrap();
            assert_eq!(guard.page_id(), page_id);
            assert_eq!(bpm.get_pin_count(page_id), Some(1));
        }
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
    }

    #[test]
    fn test_upgrade_keeps_single_pin() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = BufferPoolManager::new(4, 2, dm);

        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let guard = bpm.fetch_page_basic(page_id).unwrap();
            let mut write = guard.upgrade_write();
            assert_eq!(bpm.get_pin_count(page_id), Some(1));
            write.data_mut()[0] = 5;
        }
        assert_eq!(bpm.get_pin_count(page_id), Some(0));

        let read = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(read.data()[0], 5);
    }

    #[test]
    fn test_write_guard_marks_dirty() {
        let temp = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp.path()).unwrap());
        let bpm = BufferPoolManager::new(4, 2, dm);

        let page_id = bpm.new_page().unwrap();
        bpm.unpin_page(page_id, false);

        {
            let mut guard = bpm.fetch_page_write(page_id).unwrap();
            guard.data_mut()[1] = 11;
        }

        // Eviction must write the mutated page back
        let mut spill = Vec::new();
        for _ in 0..4 {
            let p = bpm.new_page().unwrap();
            bpm.unpin_page(p, false);
            spill.push(p);
        }
        let guard = bpm.fetch_page_read(page_id).unwrap();
        assert_eq!(guard.data()[1], 11);
    }
}
