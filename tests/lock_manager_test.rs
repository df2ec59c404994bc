use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stratadb::common::{AbortReason, PageId, RecordId, SlotId, StrataError, TableOid};
use stratadb::concurrency::{
    IsolationLevel, LockManager, LockMode, Transaction, TransactionState,
};

fn txn(id: u64, level: IsolationLevel) -> Arc<Transaction> {
    Arc::new(Transaction::new(id, level))
}

fn rid(n: u32) -> RecordId {
    RecordId::new(PageId::new(n), SlotId::new(0))
}

fn abort_reason(err: StrataError) -> AbortReason {
    match err {
        StrataError::TxnAborted { reason, .. } => reason,
        other => panic!("expected txn abort, got {other}"),
    }
}

#[test]
fn test_shared_lock_blocks_exclusive_until_release() {
    let lm = Arc::new(LockManager::new());
    let oid = TableOid::new(1);

    let t1 = txn(1, IsolationLevel::RepeatableRead);
    let t2 = txn(2, IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, oid).unwrap();

    let waiter = {
        let lm = Arc::clone(&lm);
        let t2 = Arc::clone(&t2);
        thread::spawn(move || lm.lock_table(&t2, LockMode::Exclusive, oid))
    };

    // Give the X request time to park in the queue
    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished());

    lm.unlock_table(&t1, oid).unwrap();
    waiter.join().unwrap().unwrap();

    // First unlock under REPEATABLE_READ shrinks the releaser
    assert_eq!(t1.state(), TransactionState::Shrinking);
    assert_eq!(t2.state(), TransactionState::Growing);
    assert!(t2.holds_table_lock(oid, LockMode::Exclusive));
}

#[test]
fn test_compatible_readers_share_a_table() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);

    let txns: Vec<_> = (1..=3)
        .map(|id| txn(id, IsolationLevel::RepeatableRead))
        .collect();
    for t in &txns {
        lm.lock_table(t, LockMode::IntentionShared, oid).unwrap();
    }
    for t in &txns {
        assert!(t.holds_table_lock(oid, LockMode::IntentionShared));
    }
}

#[test]
fn test_row_lock_requires_table_lock() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);
    let t1 = txn(1, IsolationLevel::RepeatableRead);

    let err = lm
        .lock_row(&t1, LockMode::Exclusive, oid, rid(1))
        .unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::TableLockNotPresent);
    assert_eq!(t1.state(), TransactionState::Aborted);

    // IS is not enough for an X row lock either
    let t2 = txn(2, IsolationLevel::RepeatableRead);
    lm.lock_table(&t2, LockMode::IntentionShared, oid).unwrap();
    let err = lm
        .lock_row(&t2, LockMode::Exclusive, oid, rid(1))
        .unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::TableLockNotPresent);
}

#[test]
fn test_table_unlock_with_live_row_locks_aborts() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);
    let t1 = txn(1, IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::IntentionExclusive, oid).unwrap();
    lm.lock_row(&t1, LockMode::Exclusive, oid, rid(1)).unwrap();

    let err = lm.unlock_table(&t1, oid).unwrap_err();
    assert_eq!(
        abort_reason(err),
        AbortReason::TableUnlockedBeforeUnlockingRows
    );
}

#[test]
fn test_unlock_without_lock_aborts() {
    let lm = LockManager::new();
    let t1 = txn(1, IsolationLevel::RepeatableRead);

    let err = lm.unlock_table(&t1, TableOid::new(1)).unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::AttemptedUnlockButNoLockHeld);
}

#[test]
fn test_read_uncommitted_rejects_shared_modes() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);

    for mode in [
        LockMode::Shared,
        LockMode::IntentionShared,
        LockMode::SharedIntentionExclusive,
    ] {
        let t = txn(1, IsolationLevel::ReadUncommitted);
        let err = lm.lock_table(&t, mode, oid).unwrap_err();
        assert_eq!(abort_reason(err), AbortReason::LockSharedOnReadUncommitted);
    }

    // X and IX are fine
    let t = txn(2, IsolationLevel::ReadUncommitted);
    lm.lock_table(&t, LockMode::IntentionExclusive, oid).unwrap();
}

#[test]
fn test_shrinking_rules_per_isolation_level() {
    let lm = LockManager::new();
    let oid_a = TableOid::new(1);
    let oid_b = TableOid::new(2);

    // REPEATABLE_READ: no lock at all once shrinking
    let t = txn(1, IsolationLevel::RepeatableRead);
    lm.lock_table(&t, LockMode::Shared, oid_a).unwrap();
    lm.unlock_table(&t, oid_a).unwrap();
    assert_eq!(t.state(), TransactionState::Shrinking);
    let err = lm.lock_table(&t, LockMode::Shared, oid_b).unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::LockOnShrinking);

    // READ_COMMITTED: releasing S does not shrink; an X release does, and
    // then only S/IS may still be taken
    let t = txn(2, IsolationLevel::ReadCommitted);
    lm.lock_table(&t, LockMode::Shared, oid_a).unwrap();
    lm.unlock_table(&t, oid_a).unwrap();
    assert_eq!(t.state(), TransactionState::Growing);

    lm.lock_table(&t, LockMode::Exclusive, oid_a).unwrap();
    lm.unlock_table(&t, oid_a).unwrap();
    assert_eq!(t.state(), TransactionState::Shrinking);

    lm.lock_table(&t, LockMode::IntentionShared, oid_b).unwrap();
    let err = lm
        .lock_table(&t, LockMode::IntentionExclusive, oid_b)
        .unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::LockOnShrinking);
}

#[test]
fn test_same_mode_rerequest_is_a_noop() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);
    let t = txn(1, IsolationLevel::RepeatableRead);

    lm.lock_table(&t, LockMode::Shared, oid).unwrap();
    lm.lock_table(&t, LockMode::Shared, oid).unwrap();
    lm.unlock_table(&t, oid).unwrap();
    // The single underlying grant is gone now
    let err = lm.unlock_table(&t, oid).unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::AttemptedUnlockButNoLockHeld);
}

#[test]
fn test_upgrade_replaces_held_mode() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);
    let t = txn(1, IsolationLevel::RepeatableRead);

    lm.lock_table(&t, LockMode::IntentionShared, oid).unwrap();
    lm.lock_table(&t, LockMode::Exclusive, oid).unwrap();

    assert!(t.holds_table_lock(oid, LockMode::Exclusive));
    assert!(!t.holds_table_lock(oid, LockMode::IntentionShared));
}

#[test]
fn test_illegal_upgrade_aborts() {
    let lm = LockManager::new();
    let oid = TableOid::new(1);
    let t = txn(1, IsolationLevel::RepeatableRead);

    lm.lock_table(&t, LockMode::Exclusive, oid).unwrap();
    let err = lm.lock_table(&t, LockMode::Shared, oid).unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::IncompatibleUpgrade);
}

#[test]
fn test_second_upgrader_aborts_with_upgrade_conflict() {
    let lm = Arc::new(LockManager::new());
    let oid = TableOid::new(1);

    let t1 = txn(1, IsolationLevel::RepeatableRead);
    let t2 = txn(2, IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, oid).unwrap();
    lm.lock_table(&t2, LockMode::Shared, oid).unwrap();

    // T1's upgrade to X parks behind T2's S grant
    let upgrader = {
        let lm = Arc::clone(&lm);
        let t1 = Arc::clone(&t1);
        thread::spawn(move || lm.lock_table(&t1, LockMode::Exclusive, oid))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!upgrader.is_finished());

    // A second concurrent upgrade on the same queue is refused
    let err = lm.lock_table(&t2, LockMode::Exclusive, oid).unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::UpgradeConflict);

    // Releasing T2's locks lets the first upgrader through
    lm.unlock_all(&t2);
    upgrader.join().unwrap().unwrap();
    assert!(t1.holds_table_lock(oid, LockMode::Exclusive));
}

// T1 holds S, T2 waits for X, T1 releases. Four lock operations in
// total; T1 ends up SHRINKING and T2 granted.
#[test]
fn test_fifo_grant_after_release() {
    let lm = Arc::new(LockManager::new());
    let oid = TableOid::new(7);

    let t1 = txn(1, IsolationLevel::RepeatableRead);
    let t2 = txn(2, IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::Shared, oid).unwrap();

    let waiter = {
        let lm = Arc::clone(&lm);
        let t2 = Arc::clone(&t2);
        thread::spawn(move || {
            lm.lock_table(&t2, LockMode::Exclusive, oid).unwrap();
            lm.unlock_table(&t2, oid).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(30));
    lm.unlock_table(&t1, oid).unwrap();
    waiter.join().unwrap();

    assert_eq!(t1.state(), TransactionState::Shrinking);
    assert_eq!(t2.state(), TransactionState::Shrinking);
}

// Crossed X row requests deadlock; within a detector period the
// younger transaction aborts and the older finishes.
#[test]
fn test_deadlock_detector_aborts_youngest() {
    let lm = Arc::new(LockManager::with_detection_interval(
        Duration::from_millis(20),
    ));
    let oid = TableOid::new(1);

    let t1 = txn(1, IsolationLevel::RepeatableRead);
    let t2 = txn(2, IsolationLevel::RepeatableRead);

    lm.lock_table(&t1, LockMode::IntentionExclusive, oid).unwrap();
    lm.lock_table(&t2, LockMode::IntentionExclusive, oid).unwrap();

    lm.lock_row(&t1, LockMode::Exclusive, oid, rid(1)).unwrap();
    lm.lock_row(&t2, LockMode::Exclusive, oid, rid(2)).unwrap();

    let crossing = {
        let lm = Arc::clone(&lm);
        let t1 = Arc::clone(&t1);
        thread::spawn(move || lm.lock_row(&t1, LockMode::Exclusive, oid, rid(2)))
    };

    thread::sleep(Duration::from_millis(30));
    // T2 -> r1 closes the cycle; T2 has the higher id and must die
    let err = lm
        .lock_row(&t2, LockMode::Exclusive, oid, rid(1))
        .unwrap_err();
    assert_eq!(abort_reason(err), AbortReason::Deadlock);
    assert_eq!(t2.state(), TransactionState::Aborted);

    lm.unlock_all(&t2);
    crossing.join().unwrap().unwrap();
    assert!(t1.holds_row_lock(oid, rid(2), LockMode::Exclusive));
    assert_eq!(t1.state(), TransactionState::Growing);
}

#[test]
fn test_unlock_all_releases_everything() {
    let lm = Arc::new(LockManager::new());
    let oid = TableOid::new(1);

    let t1 = txn(1, IsolationLevel::RepeatableRead);
    lm.lock_table(&t1, LockMode::IntentionExclusive, oid).unwrap();
    lm.lock_row(&t1, LockMode::Exclusive, oid, rid(1)).unwrap();
    lm.lock_row(&t1, LockMode::Exclusive, oid, rid(2)).unwrap();

    lm.unlock_all(&t1);
    assert!(!t1.holds_rows_on_table(oid));
    assert_eq!(t1.table_lock_mode(oid), None);

    // The table is immediately available to others
    let t2 = txn(2, IsolationLevel::RepeatableRead);
    lm.lock_table(&t2, LockMode::Exclusive, oid).unwrap();
}
