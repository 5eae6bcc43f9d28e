// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Packet Flow Engine - Split Group Registry

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{BoxId, GroupId};

/// Bookkeeping for one split large packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub original_size: u32,
    pub expected: u32,
    /// Fragment index -> box holding it.
    pub arrived: BTreeMap<u32, BoxId>,
    /// Fragments destroyed before reaching a merger.
    pub lost: u32,
}

impl Group {
    pub fn is_ready(&self) -> bool {
        self.arrived.len() as u32 + self.lost >= self.expected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Accepted,
    /// This index was already registered; the registry is unchanged.
    Duplicate,
    /// Unknown or already closed group.
    Unknown,
}

/// Loss charged when a group of `original` size closes with the given
/// reconstituted pieces: every missing unit counts, plus one for each
/// extra piece beyond the first.
///
/// `compute_partial_loss(8, &[5]) == 3`, `compute_partial_loss(8, &[3, 5]) == 1`.
pub fn compute_partial_loss(original: u32, pieces: &[u32]) -> u32 {
    if pieces.is_empty() {
        return original;
    }
    let present: u32 = pieces.iter().sum();
    original.saturating_sub(present) + (pieces.len() as u32 - 1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRegistry {
    open: BTreeMap<GroupId, Group>,
    /// Ids below this were issued; any of them not open has closed.
    next_id: u64,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, original_size: u32) -> GroupId {
        let id = GroupId(self.next_id);
        self.next_id += 1;
        self.open.insert(
            id,
            Group {
                id,
                original_size,
                expected: original_size,
                arrived: BTreeMap::new(),
                lost: 0,
            },
        );
        id
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        self.open.get(&id)
    }

    pub fn is_open(&self, id: GroupId) -> bool {
        self.open.contains_key(&id)
    }

    pub fn was_closed(&self, id: GroupId) -> bool {
        id.0 < self.next_id && !self.open.contains_key(&id)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.open.values()
    }

    pub fn register_arrival(&mut self, id: GroupId, index: u32, holder: BoxId) -> Arrival {
        let Some(group) = self.open.get_mut(&id) else {
            return Arrival::Unknown;
        };
        if index >= group.expected || group.arrived.contains_key(&index) {
            return Arrival::Duplicate;
        }
        group.arrived.insert(index, holder);
        Arrival::Accepted
    }

    /// Record a destroyed fragment. Fragments that already arrived are
    /// accounted for by the merge and are ignored here.
    pub fn report_lost(&mut self, id: GroupId, index: u32) {
        if let Some(group) = self.open.get_mut(&id) {
            if !group.arrived.contains_key(&index) {
                group.lost += 1;
            }
        }
    }

    /// Open groups whose every fragment has either arrived or been lost.
    pub fn ready_groups(&self) -> Vec<GroupId> {
        self.open
            .values()
            .filter(|g| g.is_ready())
            .map(|g| g.id)
            .collect()
    }

    /// Close and remove a group. Returns the loss still owed on top of the
    /// fragments already counted individually.
    pub fn close(&mut self, id: GroupId, pieces: &[u32]) -> Option<u32> {
        let group = self.open.remove(&id)?;
        let partial = compute_partial_loss(group.original_size, pieces);
        let extra = partial.saturating_sub(group.lost);
        info!(group = %id, partial, extra, "group closed");
        Some(extra)
    }

    /// Replace the open groups and the id watermark, as captured in a
    /// snapshot.
    pub(crate) fn restore(&mut self, groups: &[Group], next_id: u64) {
        self.open = groups.iter().map(|g| (g.id, g.clone())).collect();
        let above_open = groups.iter().map(|g| g.id.0 + 1).max().unwrap_or(0);
        self.next_id = next_id.max(above_open);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_loss_examples() {
        assert_eq!(compute_partial_loss(8, &[5]), 3);
        assert_eq!(compute_partial_loss(8, &[3, 5]), 1);
        assert_eq!(compute_partial_loss(8, &[8]), 0);
        assert_eq!(compute_partial_loss(8, &[]), 8);
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let mut reg = GroupRegistry::new();
        let g = reg.create(4);
        assert_eq!(reg.register_arrival(g, 1, BoxId(0)), Arrival::Accepted);
        assert_eq!(reg.register_arrival(g, 1, BoxId(0)), Arrival::Duplicate);
        assert_eq!(reg.get(g).unwrap().arrived.len(), 1);
    }

    #[test]
    fn test_unknown_group() {
        let mut reg = GroupRegistry::new();
        assert_eq!(reg.register_arrival(GroupId(99), 0, BoxId(0)), Arrival::Unknown);
    }

    #[test]
    fn test_ready_counts_losses() {
        let mut reg = GroupRegistry::new();
        let g = reg.create(3);
        reg.register_arrival(g, 0, BoxId(1));
        reg.register_arrival(g, 2, BoxId(1));
        assert!(reg.ready_groups().is_empty());
        reg.report_lost(g, 1);
        assert_eq!(reg.ready_groups(), vec![g]);
    }

    #[test]
    fn test_close_charges_only_uncounted_loss() {
        let mut reg = GroupRegistry::new();
        let g = reg.create(8);
        for i in 0..5 {
            reg.register_arrival(g, i, BoxId(0));
        }
        for i in 5..8 {
            reg.report_lost(g, i);
        }
        // Three fragments already counted, partial loss is also three.
        assert_eq!(reg.close(g, &[5]), Some(0));
        assert!(!reg.is_open(g));
        assert!(reg.was_closed(g));
        assert_eq!(reg.register_arrival(g, 0, BoxId(0)), Arrival::Unknown);
    }

    #[test]
    fn test_closed_groups_need_no_bookkeeping() {
        let mut reg = GroupRegistry::new();
        for _ in 0..1000 {
            let g = reg.create(2);
            reg.close(g, &[2]);
        }
        assert!(reg.was_closed(GroupId(0)));
        assert!(reg.was_closed(GroupId(999)));
        assert!(!reg.was_closed(GroupId(1000)));
        assert_eq!(reg.open_count(), 0);
        assert_eq!(reg.next_id(), 1000);
    }

    #[test]
    fn test_restore_rewinds_watermark() {
        let mut reg = GroupRegistry::new();
        let a = reg.create(4);
        reg.create(4);
        let snapshot: Vec<Group> = reg.groups().cloned().collect();
        let watermark = reg.next_id();
        reg.create(4);
        reg.close(a, &[4]);
        reg.restore(&snapshot, watermark);
        assert!(reg.is_open(a));
        assert_eq!(reg.create(4), GroupId(2));
    }

    #[test]
    fn test_close_two_pieces() {
        let mut reg = GroupRegistry::new();
        let g = reg.create(8);
        assert_eq!(reg.close(g, &[3, 5]), Some(1));
        assert_eq!(reg.close(g, &[3, 5]), None);
    }
}
