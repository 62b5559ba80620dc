//! Ring-ordered flush (spec §4.1.4) and single-entry serialization
//! (spec §4.1.1, §4.1.5).
//!
//! Within a ring, dirty entries serialize in ascending-address order (so
//! the write pattern is close to sequential); a ring isn't considered
//! done until every entry in it has `n_unserialized_children == 0`,
//! which may take more than one pass if a child in the same ring hasn't
//! serialized yet.

use super::{Address, Cache, FlushScope, Handle, NotifyAction};
use crate::{Error, Result};

impl Cache {
    /// `flush(scope, invalidate)` (spec §4.1.1).
    pub fn flush(&mut self, scope: FlushScope, invalidate: bool) -> Result<()> {
        self.serialization_in_progress = true;
        let result = self.flush_scope(scope);
        self.serialization_in_progress = false;
        result?;

        if invalidate {
            self.invalidate_scope(scope)?;
        }
        Ok(())
    }

    fn flush_scope(&mut self, scope: FlushScope) -> Result<()> {
        match scope {
            FlushScope::All => {
                for ring in 0..self.ring_count {
                    self.flush_ring(ring as super::Ring)?;
                }
                Ok(())
            }
            FlushScope::Ring(ring) => self.flush_ring(ring),
            FlushScope::Tagged(tag) => self.flush_tagged(tag),
        }
    }

    fn invalidate_scope(&mut self, scope: FlushScope) -> Result<()> {
        let candidates: Vec<Handle> = match scope {
            FlushScope::All => self.arena.iter().map(|(h, _)| h).collect(),
            FlushScope::Ring(ring) => {
                self.arena.iter().filter(|(_, e)| e.ring == ring).map(|(h, _)| h).collect()
            }
            FlushScope::Tagged(tag) => self.tags.members(tag).collect(),
        };
        for handle in candidates {
            if self.entry(handle).map(|e| e.is_evictable()).unwrap_or(false) {
                self.detach_entry(handle)?;
            }
        }
        Ok(())
    }

    fn flush_ring(&mut self, ring: super::Ring) -> Result<()> {
        loop {
            let due: Vec<(Address, Handle)> = self
                .dirty
                .iter_ascending()
                .filter(|(_, h)| self.entry(*h).map(|e| e.ring == ring).unwrap_or(false))
                .collect();
            if due.is_empty() {
                return Ok(());
            }
            let mut progressed = false;
            for (_, handle) in due {
                if !self.entry(handle)?.flush_dep.is_ready_to_serialize() {
                    continue;
                }
                self.flush_entry(handle)?;
                progressed = true;
            }
            if !progressed {
                return Err(Error::corrupt(
                    "flush_dep",
                    format!("ring {ring} has entries whose children never became ready"),
                ));
            }
        }
    }

    fn flush_tagged(&mut self, tag: super::EntryTag) -> Result<()> {
        loop {
            let due: Vec<Handle> = self
                .tags
                .members(tag)
                .filter(|h| self.entry(*h).map(|e| e.is_dirty()).unwrap_or(false))
                .collect();
            if due.is_empty() {
                return Ok(());
            }
            let mut progressed = false;
            for handle in due {
                if !self.entry(handle)?.flush_dep.is_ready_to_serialize() {
                    continue;
                }
                self.flush_entry(handle)?;
                progressed = true;
            }
            if !progressed {
                return Err(Error::corrupt("flush_dep", "tagged flush stalled on unready children"));
            }
        }
    }

    /// Serialize and write a single dirty entry: `pre_serialize` may
    /// relocate or resize it before `serialize` hands the cache a byte
    /// buffer to write verbatim (spec §4.1.1 data-flow diagram).
    pub(crate) fn flush_entry(&mut self, handle: Handle) -> Result<()> {
        let (class_id, mut addr) = {
            let e = self.entry(handle)?;
            (e.class_id, e.addr)
        };
        let class = self.class_of(class_id)?;

        let mut body = self
            .entry_mut(handle)?
            .body
            .take()
            .ok_or_else(|| Error::corrupt("body", "entry body missing during flush"))?;

        let action = match class.pre_serialize(addr, &mut body) {
            Ok(action) => action,
            Err(err) => {
                self.entry_mut(handle)?.body = Some(body);
                return Err(Error::FlushFailed { addr, source: Box::new(err) });
            }
        };
        self.entry_mut(handle)?.body = Some(body);

        if let Some(new_addr) = action.new_addr {
            if new_addr != addr {
                self.move_entry(addr, new_addr)?;
                addr = new_addr;
            }
        }
        if let Some(new_size) = action.new_size {
            self.resize_entry(handle, new_size)?;
        }

        let body = self
            .entry_mut(handle)?
            .body
            .take()
            .ok_or_else(|| Error::corrupt("body", "entry body missing during flush"))?;
        let mut buf = Vec::with_capacity(self.entry(handle)?.size);
        let serialize_result = class.serialize(addr, &body, &mut buf);
        self.entry_mut(handle)?.body = Some(body);
        serialize_result
            .map_err(|e| Error::SerializeFailed { addr, class: class_id, reason: e.to_string() })?;

        self.store.write(addr.as_u64(), &buf)?;

        {
            let entry = self.entry_mut(handle)?;
            entry.flags.remove(super::EntryFlags::DIRTY);
            entry.flags.insert(super::EntryFlags::IMAGE_UP_TO_DATE);
        }
        self.dirty.remove(addr);
        self.stats_mut().flushes += 1;

        self.call_notify(handle, NotifyAction::Flush)?;
        self.propagate_serialized(handle)?;
        Ok(())
    }

    fn propagate_serialized(&mut self, handle: Handle) -> Result<()> {
        let parents = self.entry(handle)?.flush_dep.parents.clone();
        for parent in parents {
            if let Some(p) = self.arena.get_mut(parent) {
                p.flush_dep.n_unserialized_children = p.flush_dep.n_unserialized_children.saturating_sub(1);
                p.flush_dep.n_dirty_children = p.flush_dep.n_dirty_children.saturating_sub(1);
            }
            self.call_notify(parent, NotifyAction::ChildSerialized)?;
            self.call_notify(parent, NotifyAction::ChildCleaned)?;
        }
        Ok(())
    }
}
