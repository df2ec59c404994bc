use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result};

use super::btree_page::BTreePageRef;

/// Ordered cursor over the leaf chain. Holds a shared latch on the current
/// leaf; advancing past its last slot latches the next leaf before the
/// current one is released. The end state holds no leaf at all.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    key_width: usize,
    leaf: Option<ReadPageGuard>,
    index: usize,
}

impl BTreeIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        key_width: usize,
        leaf: ReadPageGuard,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            key_width,
            leaf: Some(leaf),
            index,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>, key_width: usize) -> Self {
        Self {
            bpm,
            key_width,
            leaf: None,
            index: 0,
        }
    }

    /// True once the cursor has moved past the rightmost leaf's last slot.
    pub fn is_end(&self) -> bool {
        self.leaf.is_none()
    }

    /// Returns the current entry and advances, or None at the end.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        loop {
            let guard = match self.leaf.as_ref() {
                Some(guard) => guard,
                None => return Ok(None),
            };

            let next_page = {
                let page = BTreePageRef::new(guard.data(), self.key_width);
                if self.index < page.size() {
                    let entry = (
                        page.key_at(self.index).to_vec(),
                        page.leaf_value_at(self.index),
                    );
                    self.index += 1;
                    return Ok(Some(entry));
                }
                page.next_page_id()
            };

            match next_page {
                Some(page_id) => {
                    // Latch transfer: take the next leaf before letting go
                    // of the current one
                    let next_guard = self.bpm.fetch_page_read(page_id)?;
                    self.leaf = Some(next_guard);
                    self.index = 0;
                }
                None => {
                    self.leaf = None;
                    return Ok(None);
                }
            }
        }
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BTreeIterator::next(self) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
