//! Tags and corking (spec §4.1.6).
//!
//! Every entry may carry an optional tag identifying the object it
//! belongs to (typically an object-header address). `flush_tagged` uses
//! this map to find exactly the entries for one tag without walking the
//! whole index; corking a tag pins every current and future member.

use std::collections::HashSet;

use crate::cache::arena::Handle;
use crate::cache::entry::Tag;

#[derive(Default)]
pub struct TagInfo {
    pub members: HashSet<Handle>,
    pub corked: bool,
}

#[derive(Default)]
pub struct TagMap {
    tags: std::collections::HashMap<Tag, TagInfo>,
}

impl TagMap {
    pub fn new() -> Self {
        Self { tags: std::collections::HashMap::new() }
    }

    pub fn add_member(&mut self, tag: Tag, handle: Handle) {
        self.tags.entry(tag).or_default().members.insert(handle);
    }

    pub fn remove_member(&mut self, tag: Tag, handle: Handle) {
        if let Some(info) = self.tags.get_mut(&tag) {
            info.members.remove(&handle);
            if info.members.is_empty() && !info.corked {
                self.tags.remove(&tag);
            }
        }
    }

    pub fn is_corked(&self, tag: Tag) -> bool {
        self.tags.get(&tag).map(|i| i.corked).unwrap_or(false)
    }

    pub fn set_corked(&mut self, tag: Tag, corked: bool) {
        self.tags.entry(tag).or_default().corked = corked;
    }

    pub fn members(&self, tag: Tag) -> impl Iterator<Item = Handle> + '_ {
        self.tags.get(&tag).into_iter().flat_map(|i| i.members.iter().copied())
    }
}
