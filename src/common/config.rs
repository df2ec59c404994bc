use std::time::Duration;

use super::types::{FrameId, PageId, RecordId, SlotId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Placeholder RID for rows that do not live in any table heap
pub const INVALID_RID: RecordId = RecordId::new(INVALID_PAGE_ID, SlotId(0));

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Supported fixed key widths for B+ tree keys, in bytes
pub const KEY_WIDTHS: [usize; 5] = [4, 8, 16, 32, 64];

/// How often the deadlock detector wakes up
pub const DEADLOCK_DETECTION_INTERVAL: Duration = Duration::from_millis(50);
