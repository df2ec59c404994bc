use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// FrameHeader manages a single buffer frame: eviction metadata plus the
/// page bytes behind a read/write latch. The latch is held through owned
/// (`arc_lock`) guards so page guards can carry it across scopes.
pub struct FrameHeader {
    frame_id: FrameId,
    /// The page currently held by this frame (INVALID_PAGE_ID if none)
    page_id: Mutex<PageId>,
    /// Number of callers currently holding this frame
    pin_count: AtomicU32,
    /// Whether the page bytes diverge from their on-disk copy
    is_dirty: AtomicBool,
    /// Page bytes behind the page latch
    data: Arc<RwLock<Box<[u8; PAGE_SIZE]>>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: Mutex::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: Arc::new(RwLock::new(Box::new([0u8; PAGE_SIZE]))),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.lock()
    }

    pub fn set_page_id(&self, page_id: PageId) {
        *self.page_id.lock() = page_id;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        loop {
            let current = self.pin_count.load(Ordering::Acquire);
            if current == 0 {
                return None;
            }
            if self
                .pin_count
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(current - 1);
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// The latch-protected page bytes; cloned into page guards so the
    /// latch guard can outlive any borrow of this header.
    pub(crate) fn data_latch(&self) -> Arc<RwLock<Box<[u8; PAGE_SIZE]>>> {
        Arc::clone(&self.data)
    }

    /// Copies page bytes out under a shared latch.
    pub fn copy_to(&self, out: &mut [u8]) {
        assert_eq!(out.len(), PAGE_SIZE);
        out.copy_from_slice(&self.data.read()[..]);
    }

    /// Copies page bytes in under an exclusive latch.
    pub fn copy_from(&self, src: &[u8]) {
        assert_eq!(src.len(), PAGE_SIZE);
        self.data.write().copy_from_slice(src);
    }

    /// Resets the frame to its initial state, zeroing the page bytes.
    pub fn reset(&self) {
        *self.page_id.lock() = INVALID_PAGE_ID;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_unpin() {
        let frame = FrameHeader::new(FrameId::new(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
    }

    #[test]
    fn test_reset_clears_state() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.set_page_id(PageId::new(7));
        frame.pin();
        frame.set_dirty(true);
        frame.copy_from(&[1u8; PAGE_SIZE]);

        frame.reset();

        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        let mut out = [1u8; PAGE_SIZE];
        frame.copy_to(&mut out);
        assert!(out.iter().all(|b| *b == 0));
    }
}
