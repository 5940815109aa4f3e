//! # Render Lists
//!
//! Output of the render-list builder: a small fixed set of named groups, each
//! with a fixed capacity so one pathological view cannot grow without bound.
//!
//! ## Architecture
//!
//! - **RenderGroup**: Which pass an entry is drawn in
//! - **RenderEntry**: One object to draw, with its resolved alpha
//! - **RenderList**: The grouped output for one view
//! - **ViewModelRenderList**: Opaque and translucent lists for view models
//!
//! Entries past a group's capacity are dropped with a warning; a full group
//! keeps every entry it already accepted.

use crate::scene::{ModelKind, RenderableHandle};

/// Named output group of a render list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderGroup {
    /// Depth-tested, depth-writing objects
    Opaque,
    /// Depth-tested translucent objects, sorted back-to-front per cell
    Translucent,
    /// Translucent objects drawn without depth testing
    TranslucentIgnoreZ,
}

impl RenderGroup {
    /// Every group, in draw order
    pub const ALL: [Self; 3] = [Self::Opaque, Self::Translucent, Self::TranslucentIgnoreZ];

    fn index(self) -> usize {
        match self {
            Self::Opaque => 0,
            Self::Translucent => 1,
            Self::TranslucentIgnoreZ => 2,
        }
    }
}

/// One object in a render group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderEntry {
    /// Object to draw
    pub handle: RenderableHandle,
    /// Position of the object's cell in the view's visible-cell walk
    pub cell_index: u32,
    /// Classification of the object's model
    pub model_kind: ModelKind,
    /// Resolved alpha after fades
    pub alpha: u8,
    /// Drawn in both the opaque and translucent passes
    pub two_pass: bool,
    /// Bypasses the shadow-depth cache
    pub shadow_depth_no_cache: bool,
}

/// Grouped, bounded output for one view
#[derive(Debug, Clone)]
pub struct RenderList {
    groups: [Vec<RenderEntry>; 3],
    dropped: [usize; 3],
    capacity: usize,
}

impl RenderList {
    /// Create an empty list whose groups each hold `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: [Vec::new(), Vec::new(), Vec::new()],
            dropped: [0; 3],
            capacity,
        }
    }

    /// Append an entry; returns false and drops it when the group is full
    pub fn push(&mut self, group: RenderGroup, entry: RenderEntry) -> bool {
        let index = group.index();
        if self.groups[index].len() >= self.capacity {
            if self.dropped[index] == 0 {
                log::warn!("Render group {:?} full at {} entries; dropping", group, self.capacity);
            }
            self.dropped[index] += 1;
            return false;
        }
        self.groups[index].push(entry);
        true
    }

    /// Entries of a group
    pub fn group(&self, group: RenderGroup) -> &[RenderEntry] {
        &self.groups[group.index()]
    }

    pub(crate) fn group_mut(&mut self, group: RenderGroup) -> &mut [RenderEntry] {
        &mut self.groups[group.index()]
    }

    /// Number of entries in a group
    pub fn count(&self, group: RenderGroup) -> usize {
        self.groups[group.index()].len()
    }

    /// Entries rejected from a group because it was full
    pub fn dropped(&self, group: RenderGroup) -> usize {
        self.dropped[group.index()]
    }

    /// Entries across all groups
    pub fn total_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Capacity of each group
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empty every group, keeping allocations
    pub fn clear(&mut self) {
        self.groups.iter_mut().for_each(Vec::clear);
        self.dropped = [0; 3];
    }

    /// Whether nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }
}

impl Default for RenderList {
    fn default() -> Self {
        Self::new(crate::config::VisibilityConfig::default().group_capacity)
    }
}

/// Render lists for objects drawn with the view models
#[derive(Debug, Clone, Default)]
pub struct ViewModelRenderList {
    /// Opaque view models, plus the opaque pass of two-pass ones
    pub opaque: Vec<RenderEntry>,
    /// Translucent view models
    pub translucent: Vec<RenderEntry>,
}

impl ViewModelRenderList {
    /// Entries across both lists
    pub fn total_count(&self) -> usize {
        self.opaque.len() + self.translucent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::KeyData;

    fn entry(id: u64) -> RenderEntry {
        RenderEntry {
            handle: RenderableHandle::from(KeyData::from_ffi(id)),
            cell_index: 0,
            model_kind: ModelKind::Entity,
            alpha: 255,
            two_pass: false,
            shadow_depth_no_cache: false,
        }
    }

    #[test]
    fn test_render_list_groups_are_separate() {
        let mut list = RenderList::new(8);
        assert!(list.is_empty());

        list.push(RenderGroup::Opaque, entry(1));
        list.push(RenderGroup::Opaque, entry(2));
        list.push(RenderGroup::TranslucentIgnoreZ, entry(3));

        assert_eq!(list.count(RenderGroup::Opaque), 2);
        assert_eq!(list.count(RenderGroup::Translucent), 0);
        assert_eq!(list.count(RenderGroup::TranslucentIgnoreZ), 1);
        assert_eq!(list.total_count(), 3);
    }

    #[test]
    fn test_render_list_capacity_clamps() {
        let mut list = RenderList::new(2);
        assert!(list.push(RenderGroup::Translucent, entry(1)));
        assert!(list.push(RenderGroup::Translucent, entry(2)));
        assert!(!list.push(RenderGroup::Translucent, entry(3)));
        assert!(!list.push(RenderGroup::Translucent, entry(4)));

        assert_eq!(list.count(RenderGroup::Translucent), 2);
        assert_eq!(list.dropped(RenderGroup::Translucent), 2);
        assert_eq!(list.group(RenderGroup::Translucent)[1], entry(2));

        // Other groups still accept entries
        assert!(list.push(RenderGroup::Opaque, entry(5)));

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.dropped(RenderGroup::Translucent), 0);
    }
}
