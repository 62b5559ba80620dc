//! Flush-dependency graph helpers (spec §4.1.5, §9 "Cycles in flush
//! deps").
//!
//! The client hierarchy forbids cycles by construction (it's a DAG
//! rooted at the superblock); in debug builds a DFS from the prospective
//! child confirms the new edge wouldn't close a cycle before the cache
//! commits to it.

use std::collections::HashSet;

use crate::cache::arena::{Arena, Handle};
use crate::cache::entry::Entry;

/// Returns `true` if adding the edge `child -> parent` (child must
/// serialize before parent) would close a cycle. A cycle exists exactly
/// when `child` is already reachable from `parent` by following existing
/// parent edges — i.e. `parent` is already (transitively) a child of
/// `child`, so the new edge would complete a loop.
pub fn would_cycle(arena: &Arena<Entry>, parent: Handle, child: Handle) -> bool {
    if parent == child {
        return true;
    }
    let mut seen: HashSet<Handle> = HashSet::new();
    let mut stack = vec![parent];
    while let Some(h) = stack.pop() {
        if h == child {
            return true;
        }
        if !seen.insert(h) {
            continue;
        }
        if let Some(entry) = arena.get(h) {
            stack.extend(entry.flush_dep.parents.iter().copied());
        }
    }
    false
}
