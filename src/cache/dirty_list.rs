//! The dirty list: an address-sorted container of every dirty entry
//! (spec §4.1.2, §9 design note "Skip list choice").
//!
//! A `BTreeMap` stands in for the C skip list: ordered iteration by
//! address, O(log n) insert/remove, and a cheap bulk drain are all it
//! needs to provide. It exists only while needed (bulk flushes, SWMR,
//! serialization); `slist_enabled = false` turns inserts/removes into
//! no-ops so the hot path (protect/unprotect without a pending flush)
//! never pays for the bookkeeping.

use std::collections::BTreeMap;

use crate::cache::address::Address;
use crate::cache::arena::Handle;

#[derive(Default)]
pub struct DirtyList {
    entries: BTreeMap<Address, Handle>,
    enabled: bool,
}

impl DirtyList {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), enabled: true }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.entries.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn insert(&mut self, addr: Address, handle: Handle) {
        if self.enabled {
            self.entries.insert(addr, handle);
        }
    }

    pub fn remove(&mut self, addr: Address) {
        if self.enabled {
            self.entries.remove(&addr);
        }
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.entries.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in ascending address order (spec §4.1.4: "within a ring,
    /// serialization proceeds in dirty-list order").
    pub fn iter_ascending(&self) -> impl Iterator<Item = (Address, Handle)> + '_ {
        self.entries.iter().map(|(a, h)| (*a, *h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::arena::Arena;

    #[test]
    fn iterates_in_address_order() {
        let mut arena: Arena<u8> = Arena::new();
        let mut list = DirtyList::new();
        let addrs = [300u64, 100, 200];
        for a in addrs {
            let h = arena.insert(0);
            list.insert(Address::new(a), h);
        }
        let seen: Vec<u64> = list.iter_ascending().map(|(a, _)| a.as_u64()).collect();
        assert_eq!(seen, vec![100, 200, 300]);
    }

    #[test]
    fn disabled_list_is_a_no_op() {
        let mut arena: Arena<u8> = Arena::new();
        let mut list = DirtyList::new();
        list.set_enabled(false);
        let h = arena.insert(0);
        list.insert(Address::new(1), h);
        assert_eq!(list.len(), 0);
    }
}
