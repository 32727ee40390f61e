//! ScheduledTask — the `BinaryHeap` ordering wrapper around a `Task`.
//!
//! `BinaryHeap` is a max-heap, so `Ord` is defined to pop the highest
//! `Priority` first and, among equal priorities, the lowest `sequence`
//! (earliest submission) first — FIFO within a priority band.

use std::cmp::Ordering;

use crate::domain::Task;

#[derive(Debug, Clone)]
pub struct ScheduledTask(pub Task);

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.sequence == other.0.sequence
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}
