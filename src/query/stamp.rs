// src/query/stamp.rs
use std::collections::HashMap;

use crate::models::DatasetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Summary(DatasetId),
    Records(DatasetId),
}

impl Slot {
    pub fn dataset_id(&self) -> DatasetId {
        match self {
            Slot::Summary(id) | Slot::Records(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub slot: Slot,
    pub stamp: Stamp,
}

/// Latest issued stamp per slot. A response is applied only while its
/// ticket is still the latest for the slot.
#[derive(Debug, Default)]
pub struct StampRegistry {
    next: u64,
    latest: HashMap<Slot, Stamp>,
}

impl StampRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps are globally increasing, so they also order issues across slots.
    pub fn issue(&mut self, slot: Slot) -> Ticket {
        self.next += 1;
        let stamp = Stamp(self.next);
        self.latest.insert(slot, stamp);
        Ticket { slot, stamp }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.slot) == Some(&ticket.stamp)
    }

    /// Drops both slots of a dataset; its in-flight responses become stale.
    pub fn retire(&mut self, dataset_id: DatasetId) {
        self.latest.retain(|slot, _| slot.dataset_id() != dataset_id);
    }

    pub fn clear(&mut self) {
        self.latest.clear();
    }
}
