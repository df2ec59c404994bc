use thiserror::Error;

use super::types::{IndexOid, PageId, RecordId, TableOid, TxnId};

/// Reasons a transaction can be aborted by the lock manager or the
/// deadlock detector. Surfaced inside [`StrataError::TxnAborted`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("lock requested while in the shrinking phase")]
    LockOnShrinking,

    #[error("shared lock requested under READ_UNCOMMITTED")]
    LockSharedOnReadUncommitted,

    #[error("another transaction is already upgrading on this queue")]
    UpgradeConflict,

    #[error("requested lock mode is not a legal upgrade")]
    IncompatibleUpgrade,

    #[error("attempted to unlock a lock that is not held")]
    AttemptedUnlockButNoLockHeld,

    #[error("table unlocked before unlocking all of its rows")]
    TableUnlockedBeforeUnlockingRows,

    #[error("row lock requested without the required table lock")]
    TableLockNotPresent,

    #[error("chosen as deadlock victim")]
    Deadlock,
}

/// Database error types
#[derive(Error, Debug)]
pub enum StrataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Tuple of {tuple_size} bytes exceeds available space {available}")]
    TupleTooLarge { tuple_size: usize, available: usize },

    #[error("Slot {0} is not occupied")]
    EmptySlot(u16),

    #[error("Duplicate key in index")]
    DuplicateKey,

    #[error("Unsupported key width {0} (expected 4, 8, 16, 32 or 64)")]
    UnsupportedKeyWidth(usize),

    #[error("Table {0} not found")]
    TableNotFound(TableOid),

    #[error("Index {0} not found")]
    IndexNotFound(IndexOid),

    #[error("Tuple {0} not found")]
    TupleNotFound(RecordId),

    #[error("Transaction {txn_id} aborted: {reason}")]
    TxnAborted { txn_id: TxnId, reason: AbortReason },

    #[error("Transaction {0} is not active")]
    TxnNotActive(TxnId),

    #[error("Execution failure: {0}")]
    ExecutionFailure(String),
}

impl StrataError {
    /// Abort reason carried by this error, if it is a transaction abort.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            StrataError::TxnAborted { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
