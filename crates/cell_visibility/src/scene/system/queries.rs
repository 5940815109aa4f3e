//! Read-side spatial queries, per-cell payloads and detail objects

use super::CellVisibilitySystem;
use crate::error::{VisibilityError, VisibilityResult};
use crate::scene::cell_table::{CellPayload, SubsystemId};
use crate::scene::renderable::RenderableHandle;
use crate::scene::shadow::ShadowHandle;
use crate::spatial::{Aabb, CellId, EntryId};

impl CellVisibilitySystem {
    /// Cells an object is indexed in, up to `max_cells_per_query`
    pub fn cells_for(&self, handle: RenderableHandle) -> Vec<CellId> {
        self.cells_iter(handle).take(self.config.max_cells_per_query).collect()
    }

    /// Iterate the cells an object is indexed in
    pub fn cells_iter(&self, handle: RenderableHandle) -> impl Iterator<Item = CellId> + '_ {
        let head = self.renderables.get(handle).map_or(EntryId::INVALID, |r| r.cell_head);
        self.cell_renderables.buckets_of(head)
    }

    /// Whether any cell of the object is in the current potentially visible set
    pub fn is_in_pvs(&self, handle: RenderableHandle) -> bool {
        let Some(partition) = &self.partition else {
            return false;
        };
        let cells = self.cells_for(handle);
        !cells.is_empty() && partition.any_cells_visible(&cells)
    }

    /// Objects whose cached bounds intersect `bounds`, each once, at most `max`
    pub fn entities_in_box(&mut self, bounds: &Aabb, max: usize) -> Vec<RenderableHandle> {
        let mut found = Vec::new();
        let Some(partition) = self.partition.clone() else {
            log::warn!("Box query before level init");
            return found;
        };
        if max == 0 {
            return found;
        }

        let mut cells = std::mem::take(&mut self.cell_scratch);
        cells.clear();
        partition.cells_in_box(bounds, &mut cells);

        let enumeration = self.next_enumeration();
        'cells: for &cell in &cells {
            let mut entry = self.cells.get(cell).map_or(EntryId::INVALID, |c| c.renderable_head);
            while let Some(handle) = self.cell_renderables.element(entry) {
                entry = self.cell_renderables.next_in_bucket(entry);
                let Some(record) = self.renderables.get_mut(handle) else {
                    continue;
                };
                if record.enum_count == enumeration {
                    continue;
                }
                record.enum_count = enumeration;
                if record.bounds.intersects(bounds) {
                    found.push(handle);
                    if found.len() >= max {
                        break 'cells;
                    }
                }
            }
        }

        self.cell_scratch = cells;
        found
    }

    /// Objects indexed in a cell
    pub fn renderables_in_cell(&self, cell: CellId) -> impl Iterator<Item = RenderableHandle> + '_ {
        let head = self.cells.get(cell).map_or(EntryId::INVALID, |c| c.renderable_head);
        self.cell_renderables.elements_in(head)
    }

    /// Shadows projected into a cell
    pub fn shadows_in_cell(&self, cell: CellId) -> impl Iterator<Item = ShadowHandle> + '_ {
        let head = self.cells.get(cell).map_or(EntryId::INVALID, |c| c.shadow_head);
        self.cell_shadows.elements_in(head)
    }

    /// Shadows landing on an object
    pub fn shadows_on_renderable(&self, handle: RenderableHandle) -> impl Iterator<Item = ShadowHandle> + '_ {
        let head = self.renderables.get(handle).map_or(EntryId::INVALID, |r| r.shadow_head);
        self.renderable_shadows.elements_in(head)
    }

    /// Objects a shadow lands on
    pub fn renderables_in_shadow(&self, shadow: ShadowHandle) -> impl Iterator<Item = RenderableHandle> + '_ {
        let head = self.shadows.get(shadow).map_or(EntryId::INVALID, |s| s.renderable_head);
        self.renderable_shadows.buckets_of(head)
    }

    /// Cells a shadow is projected into
    pub fn cells_in_shadow(&self, shadow: ShadowHandle) -> impl Iterator<Item = CellId> + '_ {
        let head = self.shadows.get(shadow).map_or(EntryId::INVALID, |s| s.cell_head);
        self.cell_shadows.buckets_of(head)
    }

    fn require_level(&self) -> VisibilityResult<()> {
        if self.partition.is_some() {
            Ok(())
        } else {
            Err(VisibilityError::LevelNotLoaded)
        }
    }

    /// Attach subsystem data to a cell, dropping what was there
    pub fn set_cell_payload(
        &mut self,
        cell: CellId,
        subsystem: SubsystemId,
        payload: Option<CellPayload>,
    ) -> VisibilityResult<()> {
        self.require_level()?;
        self.cells.set_payload(cell, subsystem, payload)
    }

    /// Subsystem data of a cell, if present and of type `T`
    pub fn cell_payload<T: std::any::Any>(&self, cell: CellId, subsystem: SubsystemId) -> Option<&T> {
        self.cells.payload(cell, subsystem)
    }

    /// Record the detail objects that live in a cell
    pub fn set_detail_objects(&mut self, cell: CellId, first: u32, count: u32) -> VisibilityResult<()> {
        self.require_level()?;
        self.cells.set_detail_objects(cell, first, count)
    }

    /// `(first, count)` of a cell's detail objects
    pub fn detail_objects(&self, cell: CellId) -> Option<(u32, u32)> {
        self.cells.detail_objects(cell)
    }

    /// Request a cell's detail objects for `frame`
    pub fn draw_detail_objects(&mut self, cell: CellId, frame: i64) -> Option<(u32, u32)> {
        self.cells.draw_detail_objects(cell, frame)
    }

    /// Whether a cell has detail objects to draw in `frame`
    pub fn should_draw_detail_objects(&self, cell: CellId, frame: i64) -> bool {
        self.cells.should_draw_detail_objects(cell, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{add, grid_system};
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::renderable::test_support::TestOwner;
    use crate::scene::CellVisibilitySystem;

    #[test]
    fn test_cells_for_respects_query_cap() {
        let (mut system, _) = grid_system();
        system.config.max_cells_per_query = 2;
        let owner = TestOwner::new("floor", Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(250.0, 250.0, 10.0)));
        let handle = add(&mut system, &owner);
        system.reconcile();

        assert_eq!(system.cells_iter(handle).count(), 16);
        assert_eq!(system.cells_for(handle).len(), 2);
    }

    #[test]
    fn test_pvs_check_uses_partition() {
        let (mut system, partition) = grid_system();
        let owner = TestOwner::cube("crate", Vec3::new(100.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);
        assert!(!system.is_in_pvs(handle));

        system.reconcile();
        assert!(system.is_in_pvs(handle));

        partition.set_visible_cells(&[CellId(0)]);
        assert!(!system.is_in_pvs(handle));
        partition.set_visible_cells(&[CellId(1)]);
        assert!(system.is_in_pvs(handle));
    }

    #[test]
    fn test_entities_in_box_dedups_and_caps() {
        let (mut system, _) = grid_system();
        let wide = TestOwner::new("wide", Aabb::new(Vec3::new(10.0, 10.0, 10.0), Vec3::new(100.0, 20.0, 20.0)));
        let near = TestOwner::cube("near", Vec3::new(20.0, 40.0, 10.0), 2.0);
        let far = TestOwner::cube("far", Vec3::new(200.0, 200.0, 10.0), 2.0);
        let wide = add(&mut system, &wide);
        let near = add(&mut system, &near);
        add(&mut system, &far);
        system.pre_render();

        let query = Aabb::new(Vec3::zeros(), Vec3::new(127.0, 63.0, 63.0));
        let mut found = system.entities_in_box(&query, 10);
        found.sort();
        let mut expected = vec![wide, near];
        expected.sort();
        assert_eq!(found, expected);

        assert_eq!(system.entities_in_box(&query, 1).len(), 1);
        assert!(system.entities_in_box(&query, 0).is_empty());
    }

    #[test]
    fn test_payloads_require_level() {
        let mut system = CellVisibilitySystem::new(Default::default());
        assert!(matches!(
            system.set_cell_payload(CellId(0), SubsystemId(0), None),
            Err(VisibilityError::LevelNotLoaded)
        ));
        assert!(matches!(system.set_detail_objects(CellId(0), 0, 1), Err(VisibilityError::LevelNotLoaded)));
        assert!(system.entities_in_box(&Aabb::new(Vec3::zeros(), Vec3::repeat(1.0)), 4).is_empty());
    }

    #[test]
    fn test_cell_payload_and_details() {
        let (mut system, _) = grid_system();
        system.set_cell_payload(CellId(2), SubsystemId(3), Some(Box::new(String::from("fog")))).unwrap();
        assert_eq!(system.cell_payload::<String>(CellId(2), SubsystemId(3)).map(String::as_str), Some("fog"));

        system.set_detail_objects(CellId(2), 40, 8).unwrap();
        assert_eq!(system.detail_objects(CellId(2)), Some((40, 8)));
        assert_eq!(system.draw_detail_objects(CellId(2), 3), Some((40, 8)));
        assert!(system.should_draw_detail_objects(CellId(2), 3));
        assert!(!system.should_draw_detail_objects(CellId(2), 4));
    }
}
