use rand::prelude::*;
use stratadb::buffer::LruKReplacer;
use stratadb::common::FrameId;

#[test]
fn test_scripted_sequence() {
    let replacer = LruKReplacer::new(2, 7);

    for f in 1..=6u32 {
        replacer.record_access(FrameId::new(f));
    }
    for f in 1..=5u32 {
        replacer.set_evictable(FrameId::new(f), true);
    }
    replacer.set_evictable(FrameId::new(6), false);
    assert_eq!(replacer.size(), 5);

    // Frame 1 gets a second access, moving it out of the +inf class
    replacer.record_access(FrameId::new(1));

    // The +inf frames go first, oldest first access winning
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), Some(FrameId::new(3)));
    assert_eq!(replacer.evict(), Some(FrameId::new(4)));
    assert_eq!(replacer.size(), 2);

    // Frame 5 still has a single access; frame 1 has two
    assert_eq!(replacer.evict(), Some(FrameId::new(5)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), None);

    // Frame 6 was never evictable and is still tracked
    replacer.set_evictable(FrameId::new(6), true);
    assert_eq!(replacer.evict(), Some(FrameId::new(6)));
}

/// Reference model: recompute the victim from scratch on every evict.
struct ModelReplacer {
    k: usize,
    tick: u64,
    frames: std::collections::HashMap<u32, (Vec<u64>, bool)>,
}

impl ModelReplacer {
    fn new(k: usize) -> Self {
        Self {
            k,
            tick: 0,
            frames: std::collections::HashMap::new(),
        }
    }

    fn record_access(&mut self, f: u32) {
        self.tick += 1;
        let entry = self.frames.entry(f).or_insert((Vec::new(), false));
        entry.0.push(self.tick);
        if entry.0.len() > self.k {
            entry.0.remove(0);
        }
    }

    fn set_evictable(&mut self, f: u32, e: bool) {
        if let Some(entry) = self.frames.get_mut(&f) {
            entry.1 = e;
        }
    }

    fn evict(&mut self) -> Option<u32> {
        // +inf class: fewest-than-k accesses, earliest first access first
        let victim = self
            .frames
            .iter()
            .filter(|(_, (h, e))| *e && h.len() < self.k)
            .min_by_key(|(_, (h, _))| h[0])
            .map(|(&f, _)| f)
            .or_else(|| {
                self.frames
                    .iter()
                    .filter(|(_, (h, e))| *e && h.len() == self.k)
                    .min_by_key(|(_, (h, _))| h[0])
                    .map(|(&f, _)| f)
            });
        if let Some(f) = victim {
            self.frames.remove(&f);
        }
        victim
    }
}

#[test]
fn test_matches_reference_model_on_random_workload() {
    let mut rng = StdRng::seed_from_u64(0xbadcafe);

    for _ in 0..20 {
        let replacer = LruKReplacer::new(2, 50);
        let mut model = ModelReplacer::new(2);

        for _ in 0..500 {
            match rng.gen_range(0..10) {
                0..=4 => {
                    let f = rng.gen_range(0..50u32);
                    replacer.record_access(FrameId::new(f));
                    model.record_access(f);
                }
                5..=7 => {
                    let f = rng.gen_range(0..50u32);
                    let e = rng.gen_bool(0.7);
                    replacer.set_evictable(FrameId::new(f), e);
                    model.set_evictable(f, e);
                }
                _ => {
                    let expected = model.evict();
                    let got = replacer.evict().map(|f| f.as_u32());
                    assert_eq!(got, expected);
                }
            }
        }
        assert_eq!(replacer.size(), model.frames.values().filter(|(_, e)| *e).count());
    }
}
