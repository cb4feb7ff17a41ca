//! The topology snapshot: slot ranges, the node each owns, and a dense
//! slot -> range index for O(1) lookup. Published as an immutable value
//! behind an atomic pointer; never mutated in place.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::hash::SLOT_COUNT;
use crate::pool::PoolName;

/// Monotonically non-decreasing counter identifying a SlotMap snapshot.
pub type TopologyVersion = u64;

/// A cluster node owning one or more slot ranges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub pool: PoolName,
}

/// An inclusive `[start, end]` range of slots owned by `node`, as returned by
/// `CLUSTER SLOTS`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub node: Node,
}

/// A versioned, immutable slot-to-node snapshot.
#[derive(Clone, Debug)]
pub struct SlotMap {
    pub version: TopologyVersion,
    pub ranges: Vec<SlotRange>,
    // 1-based index into `ranges` for each slot; 0 means unassigned.
    slot_index: Vec<u16>,
}

/// A `SlotMap` contained overlapping ranges — two ranges both claim a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlappingRanges;

impl fmt::Display for OverlappingRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlapping slot ranges")
    }
}

impl std::error::Error for OverlappingRanges {}

impl SlotMap {
    /// The map an unstarted topology cache holds before its first refresh:
    /// version 0, every slot unassigned.
    pub fn empty() -> Self {
        Self {
            version: 0,
            ranges: Vec::new(),
            slot_index: vec![0; SLOT_COUNT as usize],
        }
    }

    /// Build a new snapshot from freshly parsed ranges, sorting them by start
    /// slot and rejecting overlaps. Gaps (unassigned slots) are allowed.
    pub fn from_ranges(
        version: TopologyVersion,
        mut ranges: Vec<SlotRange>,
    ) -> Result<Self, OverlappingRanges> {
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(OverlappingRanges);
            }
        }

        let mut slot_index = vec![0u16; SLOT_COUNT as usize];
        for (i, range) in ranges.iter().enumerate() {
            let idx = (i + 1) as u16;
            for slot in range.start..=range.end {
                slot_index[slot as usize] = idx;
            }
        }

        Ok(Self {
            version,
            ranges,
            slot_index,
        })
    }

    /// The pool owning `slot` at this snapshot, or `None` if unassigned.
    pub fn pool_for_slot(&self, slot: u16) -> Option<&PoolName> {
        let idx = *self.slot_index.get(slot as usize)?;
        if idx == 0 {
            return None;
        }
        self.ranges.get((idx - 1) as usize).map(|r| &r.node.pool)
    }
}

/// A read-mostly, lock-free handle onto the current `SlotMap`.
#[derive(Clone)]
pub struct SlotCache(Arc<ArcSwap<SlotMap>>);

impl SlotCache {
    pub fn new() -> Self {
        Self(Arc::new(ArcSwap::from_pointee(SlotMap::empty())))
    }

    /// The version and pool (if any) owning `slot` at the current snapshot.
    pub fn get_pool(&self, slot: u16) -> (TopologyVersion, Option<PoolName>) {
        let map = self.0.load();
        (map.version, map.pool_for_slot(slot).cloned())
    }

    /// The full current snapshot, for administrative fan-out operations.
    pub fn get_slot_maps(&self) -> Arc<SlotMap> {
        self.0.load_full()
    }

    pub fn version(&self) -> TopologyVersion {
        self.0.load().version
    }

    pub(crate) fn store(&self, map: SlotMap) {
        self.0.store(Arc::new(map));
    }
}

impl Default for SlotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, port: u16) -> Node {
        Node {
            host: host.to_string(),
            port,
            pool: PoolName::new(host, port),
        }
    }

    #[test]
    fn empty_map_has_no_assigned_slots() {
        let map = SlotMap::empty();
        assert_eq!(map.pool_for_slot(0), None);
        assert_eq!(map.pool_for_slot(16383), None);
    }

    #[test]
    fn slot_resolves_to_containing_range() {
        let ranges = vec![
            SlotRange {
                start: 0,
                end: 100,
                node: node("10.0.0.1", 6379),
            },
            SlotRange {
                start: 200,
                end: 16383,
                node: node("10.0.0.2", 6380),
            },
        ];
        let map = SlotMap::from_ranges(1, ranges).unwrap();
        assert_eq!(
            map.pool_for_slot(50),
            Some(&PoolName::new("10.0.0.1", 6379))
        );
        assert_eq!(
            map.pool_for_slot(300),
            Some(&PoolName::new("10.0.0.2", 6380))
        );
        // Gap between 101 and 199 is unassigned.
        assert_eq!(map.pool_for_slot(150), None);
    }

    #[test]
    fn overlapping_ranges_are_rejected() {
        let ranges = vec![
            SlotRange {
                start: 0,
                end: 100,
                node: node("10.0.0.1", 6379),
            },
            SlotRange {
                start: 50,
                end: 200,
                node: node("10.0.0.2", 6380),
            },
        ];
        assert!(matches!(SlotMap::from_ranges(1, ranges), Err(OverlappingRanges)));
    }

    #[test]
    fn cache_publishes_atomically() {
        let cache = SlotCache::new();
        assert_eq!(cache.version(), 0);
        let ranges = vec![SlotRange {
            start: 0,
            end: 16383,
            node: node("10.0.0.1", 6379),
        }];
        cache.store(SlotMap::from_ranges(1, ranges).unwrap());
        let (version, pool) = cache.get_pool(866);
        assert_eq!(version, 1);
        assert_eq!(pool, Some(PoolName::new("10.0.0.1", 6379)));
    }
}
