//! # Top-K entity tracker
//! Bounded frequency table of entity strings.
//!
//! After every `observe` the table is trimmed back to `k` entries by dropping
//! the lowest counts. Equal counts are ordered by first-seen sequence: the
//! earliest-inserted entry is evicted first, and ranked output lists the
//! earliest-inserted entry first.
//!
//! Eviction is not LFU: an entity dropped at count 1 starts again from 1 if it
//! shows up later, even when it would have overtaken a retained entry. That is
//! accepted; the table only approximates the true top-K.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    /// Monotonic insertion sequence, used for deterministic tie-breaks.
    seq: u64,
}

#[derive(Debug, Clone)]
pub struct TopEntityTracker {
    k: usize,
    slots: HashMap<String, Slot>,
    next_seq: u64,
}

impl TopEntityTracker {
    /// `k == 0` is treated as 1.
    pub fn new(k: usize) -> Self {
        let k = k.max(1);
        Self {
            k,
            slots: HashMap::with_capacity(k + 1),
            next_seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn count(&self, entity: &str) -> Option<u64> {
        self.slots.get(entity).map(|s| s.count)
    }

    /// Increment `entity` (inserting it at 1), then evict down to `k`.
    /// Returns the entities evicted by this call.
    pub fn observe(&mut self, entity: &str) -> Vec<String> {
        match self.slots.get_mut(entity) {
            Some(slot) => slot.count += 1,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.slots
                    .insert(entity.to_string(), Slot { count: 1, seq });
            }
        }
        self.evict()
    }

    fn evict(&mut self) -> Vec<String> {
        if self.slots.len() <= self.k {
            return Vec::new();
        }
        let excess = self.slots.len() - self.k;

        let mut order: Vec<(&String, Slot)> = self.slots.iter().map(|(e, s)| (e, *s)).collect();
        order.sort_by(|a, b| a.1.count.cmp(&b.1.count).then(a.1.seq.cmp(&b.1.seq)));

        let victims: Vec<String> = order
            .into_iter()
            .take(excess)
            .map(|(e, _)| e.clone())
            .collect();
        for v in &victims {
            self.slots.remove(v);
        }
        victims
    }

    /// Entities by descending count; ties keep first-seen order.
    pub fn ranked(&self) -> Vec<(String, u64)> {
        let mut out: Vec<(&String, Slot)> = self.slots.iter().map(|(e, s)| (e, *s)).collect();
        out.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.1.seq.cmp(&b.1.seq)));
        out.into_iter().map(|(e, s)| (e.clone(), s.count)).collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
