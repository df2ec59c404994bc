use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single tracked frame.
#[derive(Debug)]
struct LruKNode {
    /// Last up-to-k access timestamps, oldest at the front
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl LruKNode {
    fn new(timestamp: Timestamp) -> Self {
        let mut history = VecDeque::new();
        history.push_back(timestamp);
        Self {
            history,
            is_evictable: false,
        }
    }

    fn oldest(&self) -> Timestamp {
        *self.history.front().expect("node has at least one access")
    }
}

#[derive(Debug, Default)]
struct ReplacerState {
    /// Monotonic tick advanced on every recorded access
    tick: Timestamp,
    nodes: HashMap<FrameId, LruKNode>,
    /// Frames with fewer than k accesses, FIFO by first access.
    /// Every one of these has backward k-distance +inf.
    history_queue: VecDeque<FrameId>,
    /// Frames with at least k accesses, keyed by their oldest retained
    /// timestamp. Iterating in key order visits the largest backward
    /// k-distance first.
    cache_index: BTreeMap<Timestamp, FrameId>,
    evictable_count: usize,
}

/// LRU-K replacement policy.
///
/// Evicts the evictable frame with the largest backward k-distance, where
/// the distance is the age of the k-th most recent access. Frames with
/// fewer than k recorded accesses have +inf distance and are evicted
/// first, oldest first access winning ties.
pub struct LruKReplacer {
    k: usize,
    max_frames: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer tracking at most `max_frames` frames.
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k >= 1, "k must be at least 1");
        Self {
            k,
            max_frames,
            state: Mutex::new(ReplacerState::default()),
        }
    }

    /// Records an access to `frame_id` at the next monotonic tick.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let state = &mut *state;
        state.tick += 1;
        let now = state.tick;

        match state.nodes.get_mut(&frame_id) {
            None => {
                state.nodes.insert(frame_id, LruKNode::new(now));
                state.history_queue.push_back(frame_id);
            }
            Some(node) => {
                if node.history.len() < self.k {
                    node.history.push_back(now);
                    if node.history.len() == self.k {
                        // Graduates from the +inf class into the cache list
                        let oldest = node.oldest();
                        state.history_queue.retain(|f| *f != frame_id);
                        state.cache_index.insert(oldest, frame_id);
                    }
                } else {
                    // Slide the k-window and re-position in the cache list
                    let old_oldest = node.history.pop_front().expect("history is full");
                    node.history.push_back(now);
                    let new_oldest = node.oldest();
                    state.cache_index.remove(&old_oldest);
                    state.cache_index.insert(new_oldest, frame_id);
                }
            }
        }
    }

    /// Marks `frame_id` as evictable or pinned-down.
    pub fn set_evictable(&self, frame_id: FrameId, is_evictable: bool) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut state = self.state.lock();
        let state = &mut *state;
        if let Some(node) = state.nodes.get_mut(&frame_id) {
            if node.is_evictable != is_evictable {
                node.is_evictable = is_evictable;
                if is_evictable {
                    state.evictable_count += 1;
                } else {
                    state.evictable_count -= 1;
                }
            }
        }
    }

    /// Stops tracking `frame_id` entirely.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if let Some(node) = state.nodes.remove(&frame_id) {
            if node.is_evictable {
                state.evictable_count -= 1;
            }
            if node.history.len() < self.k {
                state.history_queue.retain(|f| *f != frame_id);
            } else {
                state.cache_index.remove(&node.oldest());
            }
        }
    }

    /// Evicts the evictable frame with the largest backward k-distance and
    /// removes it from the replacer. Returns None when nothing is evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.evictable_count == 0 {
            return None;
        }

        // +inf class first: oldest first access wins
        let mut victim = state
            .history_queue
            .iter()
            .copied()
            .find(|f| state.nodes[f].is_evictable);

        if victim.is_none() {
            // Cache list is keyed by oldest retained timestamp, so the
            // first evictable entry has the largest backward k-distance
            victim = state
                .cache_index
                .values()
                .copied()
                .find(|f| state.nodes[f].is_evictable);
        }

        let frame_id = victim?;
        let node = state.nodes.remove(&frame_id).expect("victim is tracked");
        state.evictable_count -= 1;
        if node.history.len() < self.k {
            state.history_queue.retain(|f| *f != frame_id);
        } else {
            state.cache_index.remove(&node.oldest());
        }

        Some(frame_id)
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evict_empty() {
        let replacer = LruKReplacer::new(2, 10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_ties_break_by_first_access() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.record_access(FrameId::new(2));
        for f in 0..3 {
            replacer.set_evictable(FrameId::new(f), true);
        }
        assert_eq!(replacer.size(), 3);

        // All three are in the +inf class; the earliest first access goes first
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_infinite_distance_evicted_before_finite() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 1 has fewer than k accesses, so its distance is +inf
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_largest_backward_k_distance_wins() {
        let replacer = LruKReplacer::new(2, 10);

        // Frame 0 accessed at t=1,2; frame 1 at t=3,4; frame 2 at t=5,6
        for f in 0..3u32 {
            replacer.record_access(FrameId::new(f));
            replacer.record_access(FrameId::new(f));
        }
        for f in 0..3u32 {
            replacer.set_evictable(FrameId::new(f), true);
        }

        // Oldest k-th access is frame 0's
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_reaccess_repositions_cached_frame() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0)); // t=1
        replacer.record_access(FrameId::new(0)); // t=2
        replacer.record_access(FrameId::new(1)); // t=3
        replacer.record_access(FrameId::new(1)); // t=4
        replacer.record_access(FrameId::new(0)); // t=5, window now [2,5]

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 0 retains [2,5], frame 1 retains [3,4]; 2 < 3, so frame 0
        // keeps the larger backward k-distance despite the fresh access
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));

        replacer.record_access(FrameId::new(2)); // t=6
        replacer.record_access(FrameId::new(2)); // t=7
        replacer.set_evictable(FrameId::new(2), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_non_evictable_frames_are_skipped() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(1));
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_toggle_evictable_adjusts_size() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_remove_untracks_frame() {
        let replacer = LruKReplacer::new(2, 10);

        replacer.record_access(FrameId::new(0));
        replacer.record_access(FrameId::new(0));
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.remove(FrameId::new(0));
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_out_of_range_frames_are_ignored() {
        let replacer = LruKReplacer::new(2, 2);

        replacer.record_access(FrameId::new(5));
        replacer.set_evictable(FrameId::new(5), true);
        assert_eq!(replacer.size(), 0);
    }
}
