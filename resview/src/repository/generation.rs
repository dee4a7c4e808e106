//! Generation counters.
//!
//! Every published snapshot gets a generation drawn from a shared
//! [`Generations`] source, so generations are unique and increase across all
//! leaves owned by one engine. Composites derive their generation from their
//! children via [`DerivedGeneration`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation source shared by the leaves of one engine.
#[derive(Debug, Default)]
pub struct Generations {
    counter: AtomicU64,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next generation (starting at 1).
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently allocated generation.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// Generation of a composite, derived from its children's.
///
/// A composite's generation is `offset + sum(child generations)`, where the
/// offset is stored alongside the child list it belongs to. Child generations
/// only ever grow, so the sum grows whenever any child publishes. Structural
/// changes may shrink the sum; [`DerivedGeneration::rebase`] picks an offset
/// for the new list so the composite's generation still moves strictly
/// forward. Every observed value is folded into a high-water mark, and no
/// observation ever returns less than it.
#[derive(Debug, Default)]
pub struct DerivedGeneration {
    high_water: AtomicU64,
}

impl DerivedGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of a child list with `offset` and current `child_sum`.
    pub fn observe(&self, offset: u64, child_sum: u64) -> u64 {
        let value = offset.wrapping_add(child_sum);
        let previous = self.high_water.fetch_max(value, Ordering::AcqRel);
        previous.max(value)
    }

    /// Offset for a new child list whose generation sum is `new_sum`.
    ///
    /// `current` is the generation of the list being replaced. Returns the
    /// offset and the resulting generation, one past anything observed so
    /// far.
    pub fn rebase(&self, current: u64, new_sum: u64) -> (u64, u64) {
        let target = self
            .high_water
            .load(Ordering::Acquire)
            .max(current)
            .wrapping_add(1);
        self.high_water.fetch_max(target, Ordering::AcqRel);
        (target.wrapping_sub(new_sum), target)
    }

    /// Highest generation observed so far.
    pub fn high_water(&self) -> u64 {
        self.high_water.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_start_at_one() {
        let generations = Generations::new();
        assert_eq!(generations.current(), 0);
        assert_eq!(generations.next(), 1);
        assert_eq!(generations.next(), 2);
        assert_eq!(generations.current(), 2);
    }

    #[test]
    fn test_derived_follows_child_sum() {
        let derived = DerivedGeneration::new();
        assert_eq!(derived.observe(0, 0), 0);
        assert_eq!(derived.observe(0, 5), 5);
        assert_eq!(derived.observe(0, 7), 7);
    }

    #[test]
    fn test_rebase_moves_forward_when_sum_shrinks() {
        let derived = DerivedGeneration::new();
        let before = derived.observe(0, 10);
        assert_eq!(before, 10);

        // A child with generation 8 is removed: sum drops from 10 to 2
        let (offset, after) = derived.rebase(before, 2);
        assert_eq!(after, 11);
        assert_eq!(derived.observe(offset, 2), 11);

        // Remaining child publishes: 2 -> 3
        assert_eq!(derived.observe(offset, 3), 12);
    }

    #[test]
    fn test_rebase_without_membership_change() {
        let derived = DerivedGeneration::new();
        let before = derived.observe(0, 4);
        let (offset, after) = derived.rebase(before, 4);
        assert!(after > before);
        assert_eq!(derived.observe(offset, 4), after);
    }

    #[test]
    fn test_stale_offset_never_reads_backwards() {
        let derived = DerivedGeneration::new();
        let (offset, rebased) = derived.rebase(derived.observe(0, 1000), 1);
        assert_eq!(rebased, 1001);
        // A reader still holding the old list with a smaller sum
        assert_eq!(derived.observe(0, 3), 1001);
        assert_eq!(derived.observe(offset, 1), 1001);
        assert_eq!(derived.high_water(), 1001);
    }
}
