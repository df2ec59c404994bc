use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::common::{
    AbortReason, RecordId, Result, StrataError, TableOid, TxnId, DEADLOCK_DETECTION_INTERVAL,
};

use super::transaction::{IsolationLevel, Transaction, TransactionState};

/// The five multi-granularity lock modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

/// Lock compatibility matrix.
pub fn are_compatible(a: LockMode, b: LockMode) -> bool {
    use LockMode::*;
    match (a, b) {
        (IntentionShared, Exclusive) | (Exclusive, IntentionShared) => false,
        (IntentionShared, _) | (_, IntentionShared) => true,
        (IntentionExclusive, IntentionExclusive) => true,
        (IntentionExclusive, _) | (_, IntentionExclusive) => false,
        (Shared, Shared) => true,
        _ => false,
    }
}

/// Lock upgrade matrix: which `(held, requested)` pairs are legal.
pub fn can_upgrade(held: LockMode, requested: LockMode) -> bool {
    use LockMode::*;
    matches!(
        (held, requested),
        (IntentionShared, Shared)
            | (IntentionShared, Exclusive)
            | (IntentionShared, IntentionExclusive)
            | (IntentionShared, SharedIntentionExclusive)
            | (Shared, Exclusive)
            | (Shared, SharedIntentionExclusive)
            | (IntentionExclusive, Exclusive)
            | (IntentionExclusive, SharedIntentionExclusive)
            | (SharedIntentionExclusive, Exclusive)
    )
}

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct QueueState {
    requests: Vec<LockRequest>,
    /// At most one transaction may be upgrading on a queue at a time
    upgrading: Option<TxnId>,
}

/// Per-target FIFO request queue with a condition variable for waiters.
#[derive(Default)]
struct LockRequestQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

impl QueueState {
    /// A request is grantable when it is the front of the ungranted region
    /// (the upgrading request is inserted there, giving it priority) and is
    /// compatible with every granted request.
    fn is_grantable(&self, txn_id: TxnId) -> bool {
        let request = self
            .requests
            .iter()
            .find(|r| !r.granted)
            .expect("caller has an ungranted request queued");
        if request.txn_id != txn_id {
            return false;
        }
        self.requests
            .iter()
            .filter(|r| r.granted)
            .all(|r| are_compatible(r.mode, request.mode))
    }

    fn grant(&mut self, txn_id: TxnId) -> LockMode {
        let request = self
            .requests
            .iter_mut()
            .find(|r| r.txn_id == txn_id && !r.granted)
            .expect("request is queued");
        request.granted = true;
        if self.upgrading == Some(txn_id) {
            self.upgrading = None;
        }
        request.mode
    }

    /// Drops any request (granted or not) this transaction has queued.
    fn purge(&mut self, txn_id: TxnId) {
        self.requests.retain(|r| r.txn_id != txn_id);
        if self.upgrading == Some(txn_id) {
            self.upgrading = None;
        }
    }
}

struct LockManagerInner {
    table_queues: Mutex<HashMap<TableOid, Arc<LockRequestQueue>>>,
    row_queues: Mutex<HashMap<(TableOid, RecordId), Arc<LockRequestQueue>>>,
    /// Transactions that have touched the lock manager, so the deadlock
    /// detector can abort a victim by id
    active_txns: Mutex<HashMap<TxnId, Arc<Transaction>>>,
    detection_enabled: AtomicBool,
}

/// Multi-granularity lock manager with strict 2PL, FIFO queues with
/// upgrade priority, isolation-level enforcement, and a background
/// deadlock detector that aborts the youngest transaction on a cycle.
pub struct LockManager {
    inner: Arc<LockManagerInner>,
    detector_handle: Option<JoinHandle<()>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_detection_interval(DEADLOCK_DETECTION_INTERVAL)
    }

    pub fn with_detection_interval(interval: Duration) -> Self {
        let inner = Arc::new(LockManagerInner {
            table_queues: Mutex::new(HashMap::new()),
            row_queues: Mutex::new(HashMap::new()),
            active_txns: Mutex::new(HashMap::new()),
            detection_enabled: AtomicBool::new(true),
        });

        let detector_inner = Arc::clone(&inner);
        let detector_handle = thread::spawn(move || {
            while detector_inner.detection_enabled.load(Ordering::Relaxed) {
                thread::sleep(interval);
                detector_inner.run_detection_pass();
            }
        });

        Self {
            inner,
            detector_handle: Some(detector_handle),
        }
    }

    /// Acquires a table lock, blocking until it is granted or the
    /// transaction is aborted.
    pub fn lock_table(&self, txn: &Arc<Transaction>, mode: LockMode, oid: TableOid) -> Result<()> {
        self.check_can_lock(txn, mode)?;
        self.register(txn);

        let queue = self.table_queue(oid);
        if let Some(old_mode) = self.acquire(txn, mode, &queue)? {
            txn.remove_table_lock(old_mode, oid);
        }
        txn.add_table_lock(mode, oid);
        Ok(())
    }

    /// Releases a table lock, applying the 2PL state transition.
    pub fn unlock_table(&self, txn: &Arc<Transaction>, oid: TableOid) -> Result<()> {
        if txn.holds_rows_on_table(oid) {
            return Err(self.abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let queue = self.table_queue(oid);
        let mode = self.release(txn, &queue)?;
        txn.remove_table_lock(mode, oid);
        self.update_state_on_unlock(txn, mode);
        Ok(())
    }

    /// Acquires a row lock. Row locks support only S and X; the matching
    /// intention (or stronger) table lock must already be held.
    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        oid: TableOid,
        rid: RecordId,
    ) -> Result<()> {
        assert!(
            matches!(mode, LockMode::Shared | LockMode::Exclusive),
            "row locks support only S and X"
        );
        self.check_can_lock(txn, mode)?;

        let table_mode = txn.table_lock_mode(oid);
        let hierarchy_ok = match mode {
            LockMode::Shared => table_mode.is_some(),
            LockMode::Exclusive => matches!(
                table_mode,
                Some(LockMode::IntentionExclusive)
                    | Some(LockMode::SharedIntentionExclusive)
                    | Some(LockMode::Exclusive)
            ),
            _ => unreachable!(),
        };
        if !hierarchy_ok {
            return Err(self.abort(txn, AbortReason::TableLockNotPresent));
        }

        self.register(txn);
        let queue = self.row_queue(oid, rid);
        if let Some(old_mode) = self.acquire(txn, mode, &queue)? {
            txn.remove_row_lock(old_mode, oid, rid);
        }
        txn.add_row_lock(mode, oid, rid);
        Ok(())
    }

    /// Releases a row lock. With `force`, the 2PL state transition is
    /// skipped (READ_COMMITTED scans and rollback use this).
    pub fn unlock_row(
        &self,
        txn: &Arc<Transaction>,
        oid: TableOid,
        rid: RecordId,
        force: bool,
    ) -> Result<()> {
        let queue = self.row_queue(oid, rid);
        let mode = self.release(txn, &queue)?;
        txn.remove_row_lock(mode, oid, rid);
        if !force {
            self.update_state_on_unlock(txn, mode);
        }
        Ok(())
    }

    /// Releases every lock the transaction still holds, rows before
    /// tables, with no 2PL transitions. Called at commit and abort.
    pub fn unlock_all(&self, txn: &Arc<Transaction>) {
        let (rows, tables) = txn.held_locks();

        for (mode, oid, rid) in rows {
            let queue = self.row_queue(oid, rid);
            let mut state = queue.state.lock();
            state.purge(txn.id());
            queue.cv.notify_all();
            drop(state);
            txn.remove_row_lock(mode, oid, rid);
        }

        for (mode, oid) in tables {
            let queue = self.table_queue(oid);
            let mut state = queue.state.lock();
            state.purge(txn.id());
            queue.cv.notify_all();
            drop(state);
            txn.remove_table_lock(mode, oid);
        }

        self.inner.active_txns.lock().remove(&txn.id());
    }

    // ---- internals ----

    fn table_queue(&self, oid: TableOid) -> Arc<LockRequestQueue> {
        let mut map = self.inner.table_queues.lock();
        Arc::clone(map.entry(oid).or_default())
    }

    fn row_queue(&self, oid: TableOid, rid: RecordId) -> Arc<LockRequestQueue> {
        let mut map = self.inner.row_queues.lock();
        Arc::clone(map.entry((oid, rid)).or_default())
    }

    fn register(&self, txn: &Arc<Transaction>) {
        self.inner
            .active_txns
            .lock()
            .entry(txn.id())
            .or_insert_with(|| Arc::clone(txn));
    }

    /// Marks the transaction aborted and builds the typed abort error.
    fn abort(&self, txn: &Arc<Transaction>, reason: AbortReason) -> StrataError {
        txn.set_state(TransactionState::Aborted);
        debug!(txn = txn.id(), ?reason, "aborting transaction");
        StrataError::TxnAborted {
            txn_id: txn.id(),
            reason,
        }
    }

    /// Isolation-level admission check, applied on every lock call.
    fn check_can_lock(&self, txn: &Arc<Transaction>, mode: LockMode) -> Result<()> {
        use LockMode::*;

        if !txn.is_active() {
            return Err(StrataError::TxnNotActive(txn.id()));
        }

        let shrinking = txn.state() == TransactionState::Shrinking;
        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => {
                if matches!(mode, Shared | IntentionShared | SharedIntentionExclusive) {
                    return Err(self.abort(txn, AbortReason::LockSharedOnReadUncommitted));
                }
                if shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::ReadCommitted => {
                if shrinking && !matches!(mode, Shared | IntentionShared) {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
            IsolationLevel::RepeatableRead => {
                if shrinking {
                    return Err(self.abort(txn, AbortReason::LockOnShrinking));
                }
            }
        }
        Ok(())
    }

    /// Queues the request (handling re-requests and upgrades) and parks
    /// until it is granted or the transaction is aborted. Returns the
    /// replaced mode when the grant was an upgrade.
    fn acquire(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        queue: &Arc<LockRequestQueue>,
    ) -> Result<Option<LockMode>> {
        let txn_id = txn.id();
        let mut state = queue.state.lock();

        let mut upgraded_from = None;
        if let Some(pos) = state
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && r.granted)
        {
            let held = state.requests[pos].mode;
            if held == mode {
                return Ok(None);
            }
            if state.upgrading.is_some() {
                return Err(self.abort(txn, AbortReason::UpgradeConflict));
            }
            if !can_upgrade(held, mode) {
                return Err(self.abort(txn, AbortReason::IncompatibleUpgrade));
            }

            // Swap the grant for an upgrade request at the head of the
            // ungranted region
            state.requests.remove(pos);
            let insert_pos = state
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(state.requests.len());
            state.requests.insert(
                insert_pos,
                LockRequest {
                    txn_id,
                    mode,
                    granted: false,
                },
            );
            state.upgrading = Some(txn_id);
            upgraded_from = Some(held);
            // The dropped grant may unblock earlier waiters
            queue.cv.notify_all();
        } else {
            state.requests.push(LockRequest {
                txn_id,
                mode,
                granted: false,
            });
        }

        loop {
            if txn.state() == TransactionState::Aborted {
                // Aborted while waiting (deadlock victim): withdraw
                state.purge(txn_id);
                queue.cv.notify_all();
                return Err(StrataError::TxnAborted {
                    txn_id,
                    reason: AbortReason::Deadlock,
                });
            }

            if state.is_grantable(txn_id) {
                state.grant(txn_id);
                // The next FIFO waiter may be compatible with this grant
                queue.cv.notify_all();
                return Ok(upgraded_from);
            }

            queue.cv.wait(&mut state);
        }
    }

    /// Removes this transaction's granted request and wakes the queue.
    fn release(&self, txn: &Arc<Transaction>, queue: &Arc<LockRequestQueue>) -> Result<LockMode> {
        let txn_id = txn.id();
        let mut state = queue.state.lock();

        let pos = state
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && r.granted);
        let pos = match pos {
            Some(pos) => pos,
            None => {
                drop(state);
                return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
            }
        };

        let mode = state.requests.remove(pos).mode;
        queue.cv.notify_all();
        Ok(mode)
    }

    /// First unlock flips GROWING to SHRINKING, except that releasing
    /// S or IS under READ_COMMITTED never shrinks.
    fn update_state_on_unlock(&self, txn: &Arc<Transaction>, mode: LockMode) {
        if txn.state() != TransactionState::Growing {
            return;
        }
        let keeps_growing = txn.isolation_level() == IsolationLevel::ReadCommitted
            && matches!(mode, LockMode::Shared | LockMode::IntentionShared);
        if !keeps_growing {
            txn.set_state(TransactionState::Shrinking);
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.inner.detection_enabled.store(false, Ordering::Relaxed);
        if let Some(handle) = self.detector_handle.take() {
            let _ = handle.join();
        }
    }
}

impl LockManagerInner {
    /// One detector pass: rebuild the wait-for graph, abort the youngest
    /// transaction on each cycle until the graph is acyclic.
    fn run_detection_pass(&self) {
        let mut graph = self.build_wait_for_graph();

        while let Some(victim) = find_cycle_victim(&graph) {
            warn!(victim, "deadlock cycle detected, aborting youngest member");

            if let Some(txn) = self.active_txns.lock().get(&victim).cloned() {
                txn.set_state(TransactionState::Aborted);
            }
            self.purge_from_all_queues(victim);

            graph.remove(&victim);
            for edges in graph.values_mut() {
                edges.remove(&victim);
            }
        }
    }

    /// Edges run from each waiting request to every granted request it is
    /// incompatible with, across both table and row queues.
    fn build_wait_for_graph(&self) -> BTreeMap<TxnId, BTreeSet<TxnId>> {
        let mut graph: BTreeMap<TxnId, BTreeSet<TxnId>> = BTreeMap::new();

        let queues: Vec<Arc<LockRequestQueue>> = {
            let tables = self.table_queues.lock();
            let rows = self.row_queues.lock();
            tables.values().chain(rows.values()).cloned().collect()
        };

        for queue in queues {
            let state = queue.state.lock();
            for waiter in state.requests.iter().filter(|r| !r.granted) {
                for holder in state.requests.iter().filter(|r| r.granted) {
                    if !are_compatible(waiter.mode, holder.mode) {
                        graph
                            .entry(waiter.txn_id)
                            .or_default()
                            .insert(holder.txn_id);
                    }
                }
            }
        }

        graph
    }

    fn purge_from_all_queues(&self, txn_id: TxnId) {
        let queues: Vec<Arc<LockRequestQueue>> = {
            let tables = self.table_queues.lock();
            let rows = self.row_queues.lock();
            tables.values().chain(rows.values()).cloned().collect()
        };

        for queue in queues {
            let mut state = queue.state.lock();
            let had = state.requests.iter().any(|r| r.txn_id == txn_id);
            state.purge(txn_id);
            if had {
                queue.cv.notify_all();
            }
        }
    }
}

/// DFS from the lowest transaction id, exploring neighbors in ascending
/// order. Returns the youngest (highest-id) transaction on the first
/// cycle found, or None when the graph is acyclic.
fn find_cycle_victim(graph: &BTreeMap<TxnId, BTreeSet<TxnId>>) -> Option<TxnId> {
    let mut visited: HashSet<TxnId> = HashSet::new();

    for &start in graph.keys() {
        if visited.contains(&start) {
            continue;
        }
        let mut path: Vec<TxnId> = Vec::new();
        let mut on_path: HashSet<TxnId> = HashSet::new();
        if let Some(victim) = dfs(graph, start, &mut visited, &mut path, &mut on_path) {
            return Some(victim);
        }
    }
    None
}

fn dfs(
    graph: &BTreeMap<TxnId, BTreeSet<TxnId>>,
    node: TxnId,
    visited: &mut HashSet<TxnId>,
    path: &mut Vec<TxnId>,
    on_path: &mut HashSet<TxnId>,
) -> Option<TxnId> {
    visited.insert(node);
    path.push(node);
    on_path.insert(node);

    if let Some(edges) = graph.get(&node) {
        for &next in edges {
            if on_path.contains(&next) {
                // Cycle: everything on the path from `next` onward
                let cycle_start = path.iter().position(|&t| t == next).expect("on path");
                return path[cycle_start..].iter().copied().max();
            }
            if !visited.contains(&next) {
                if let Some(victim) = dfs(graph, next, visited, path, on_path) {
                    return Some(victim);
                }
            }
        }
    }

    path.pop();
    on_path.remove(&node);
    None
}
