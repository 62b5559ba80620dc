//! Generational arena backing every live `Entry`.
//!
//! Spec §9's design note: express each entry as an arena-allocated value
//! and index it by generational handle instead of embedded `next/prev`
//! raw pointers. This removes aliasing pitfalls and makes the
//! scan-restart epoch check (§4.1.3) local to the arena: any mutation of
//! a slot bumps a global epoch counter the scanners compare against.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/{}", self.index, self.generation)
    }
}

enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    /// Bumped by `insert`, `remove`, and `get_mut` — any scan iterating
    /// while epoch changes underneath it must restart (spec §4.1.3).
    epoch: u64,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new(), free_head: None, len: 0, epoch: 0 }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> Handle {
        self.epoch += 1;
        if let Some(idx) = self.free_head {
            let slot = &mut self.slots[idx as usize];
            let generation = match *slot {
                Slot::Vacant { next_free, generation } => {
                    self.free_head = next_free;
                    generation
                }
                Slot::Occupied { .. } => unreachable!("free list pointed at an occupied slot"),
            };
            *slot = Slot::Occupied { value, generation };
            self.len += 1;
            return Handle { index: idx, generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied { value, generation: 0 });
        self.len += 1;
        Handle { index, generation: 0 }
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        self.epoch += 1;
        let slot = self.slots.get_mut(handle.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {
                let next_gen = generation.wrapping_add(1);
                let old = std::mem::replace(
                    slot,
                    Slot::Vacant { next_free: self.free_head, generation: next_gen },
                );
                self.free_head = Some(handle.index);
                self.len -= 1;
                match old {
                    Slot::Occupied { value, .. } => Some(value),
                    Slot::Vacant { .. } => None,
                }
            }
            _ => None,
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { value, generation } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.epoch += 1;
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { value, generation } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied { value, generation } => {
                Some((Handle { index: i as u32, generation: *generation }, value))
            }
            Slot::Vacant { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut arena: Arena<&'static str> = Arena::new();
        let h1 = arena.insert("a");
        let h2 = arena.insert("b");
        assert_eq!(arena.get(h1), Some(&"a"));
        assert_eq!(arena.remove(h1), Some("a"));
        assert_eq!(arena.get(h1), None);
        assert_eq!(arena.get(h2), Some(&"b"));
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut arena: Arena<i32> = Arena::new();
        let h1 = arena.insert(1);
        arena.remove(h1);
        let h2 = arena.insert(2);
        assert_ne!(h1, h2);
        assert_eq!(arena.get(h1), None);
        assert_eq!(arena.get(h2), Some(&2));
    }

    #[test]
    fn epoch_bumps_on_mutation() {
        let mut arena: Arena<i32> = Arena::new();
        let e0 = arena.epoch();
        let h = arena.insert(1);
        assert!(arena.epoch() > e0);
        let e1 = arena.epoch();
        arena.remove(h);
        assert!(arena.epoch() > e1);
    }
}
