//! Reconciliation of moved objects into the cell index

use std::sync::Arc;

use super::{
    cell_renderable_heads, renderable_cell_heads, renderable_shadow_heads, shadow_renderable_heads,
    CellVisibilitySystem,
};
use crate::render::services::{ModelCacheGuard, ReceiverKind};
use crate::scene::dirty::{bloated_bounds, ReconcileReport};
use crate::scene::renderable::{RenderFlags, RenderableHandle};
use crate::scene::shadow::{ShadowFlags, ShadowHandle};
use crate::spatial::{Aabb, CellId, EntryId};

impl CellVisibilitySystem {
    /// Re-place every queued object whose placement box changed
    ///
    /// Sweeps the dirty queue until it is empty or the configured sweep cap is
    /// reached. Objects queued again while being placed are picked up by the
    /// next sweep; whatever is left at the cap waits for the next call.
    pub fn reconcile(&mut self) -> ReconcileReport {
        self.assert_main_thread();
        let mut report = ReconcileReport::default();
        if self.reinsertion_disabled || self.partition.is_none() {
            return report;
        }

        let cache = Arc::clone(&self.model_cache);
        let _lock = ModelCacheGuard::new(cache.as_ref());

        while !self.notifier.is_empty() {
            if report.iterations >= self.config.max_reconcile_iterations {
                report.abandoned = self.notifier.len();
                log::warn!("Too many dirty renderables; {} left for next frame", report.abandoned);
                break;
            }
            report.iterations += 1;

            self.notifier.set_reconciling(true);
            let batch = self.notifier.take_batch();
            for &handle in batch.iter().rev() {
                self.notifier.clear_mark(handle);
                if self.reconcile_one(handle) {
                    report.reinsertions += 1;
                }
            }
            self.notifier.set_reconciling(false);
        }

        log::trace!("Reconciled {} renderables in {} sweeps", report.reinsertions, report.iterations);
        report
    }

    fn reconcile_one(&mut self, handle: RenderableHandle) -> bool {
        let Some(record) = self.renderables.get_mut(handle) else {
            if cfg!(debug_assertions) {
                log::warn!("Stale renderable {handle:?} in dirty queue");
            }
            return false;
        };
        record.flags.remove(RenderFlags::BOUNDS_VALID);

        if record.renders_with_view_models() {
            return false;
        }
        if !record.is_enabled() {
            self.remove_from_tree(handle);
            return false;
        }

        let tight = record.owner.placement_bounds();
        let bloated = bloated_bounds(
            &tight,
            &record.bloated_bounds,
            record.flags.contains(RenderFlags::BLOAT_BOUNDS),
            self.config.bloat_granularity,
            self.config.min_shrink_volume,
        );
        if bloated == record.bloated_bounds {
            return false;
        }

        self.remove_from_tree(handle);
        self.insert_into_tree(handle, bloated);
        true
    }

    fn insert_into_tree(&mut self, handle: RenderableHandle, bloated: Aabb) {
        let Some(partition) = self.partition.clone() else {
            return;
        };
        let enumeration = self.next_enumeration();
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        debug_assert!(!record.renders_with_view_models());

        record.bloated_bounds = bloated;
        let receives = record.receives_shadow(ShadowFlags::PROJECTED_TEXTURE_TYPE_MASK);
        if self.config.debug_placement {
            log::debug!("Placing {} in {:?}..{:?}", record.owner.debug_name(), bloated.min, bloated.max);
        }

        let mut cells = std::mem::take(&mut self.cell_scratch);
        cells.clear();
        partition.cells_in_box(&bloated, &mut cells);
        if cells.len() > self.config.max_cells_per_insert {
            log::warn!(
                "Renderable spans {} cells; keeping the first {}",
                cells.len(),
                self.config.max_cells_per_insert
            );
            cells.truncate(self.config.max_cells_per_insert);
        }

        for &cell in &cells {
            self.add_renderable_to_cell(cell, handle, receives, enumeration);
        }

        let area = partition.area_of_cells(&cells);
        if let Some(record) = self.renderables.get_mut(handle) {
            record.area = area;
        }
        self.cell_scratch = cells;
    }

    fn add_renderable_to_cell(&mut self, cell: CellId, handle: RenderableHandle, receives: bool, enumeration: u32) {
        let entry = self.cell_renderables.add_pair(
            &mut cell_renderable_heads(&mut self.cells),
            &mut renderable_cell_heads(&mut self.renderables),
            cell,
            handle,
        );
        if !entry.is_valid() || !receives {
            return;
        }

        let attach_all = self.config.shadows_on_renderables;
        let mut entry = self.cells.get(cell).map_or(EntryId::INVALID, |c| c.shadow_head);
        while let Some(shadow) = self.cell_shadows.element(entry) {
            entry = self.cell_shadows.next_in_bucket(entry);

            let Some(info) = self.shadows.get_mut(shadow) else {
                continue;
            };
            if info.enum_count == enumeration || !(attach_all || info.always_on_renderables()) {
                continue;
            }
            info.enum_count = enumeration;
            self.add_shadow_to_renderable(handle, shadow);
        }
    }

    /// Relate a shadow to a renderable if the renderable accepts its kind
    pub(super) fn add_shadow_to_renderable(&mut self, handle: RenderableHandle, shadow: ShadowHandle) {
        let (Some(record), Some(info)) = (self.renderables.get(handle), self.shadows.get(shadow)) else {
            return;
        };
        if !record.receives_shadow(info.flags) {
            return;
        }
        let client_shadow = info.client_shadow;
        let receiver = ReceiverKind::from_model_kind(record.model_kind);

        self.renderable_shadows.add_pair(
            &mut renderable_shadow_heads(&mut self.renderables),
            &mut shadow_renderable_heads(&mut self.shadows),
            handle,
            shadow,
        );
        if let Some(kind) = receiver {
            self.shadow_receivers.add_shadow_to_receiver(client_shadow, handle, kind);
        }
    }

    /// Drop an object from every cell and every shadow landing on it
    pub(super) fn remove_from_tree(&mut self, handle: RenderableHandle) {
        let Some(record) = self.renderables.get(handle) else {
            return;
        };
        let receiver = ReceiverKind::from_model_kind(record.model_kind);

        self.cell_renderables.remove_element(
            &mut cell_renderable_heads(&mut self.cells),
            &mut renderable_cell_heads(&mut self.renderables),
            handle,
        );
        self.renderable_shadows.remove_bucket(
            &mut renderable_shadow_heads(&mut self.renderables),
            &mut shadow_renderable_heads(&mut self.shadows),
            handle,
        );
        if let Some(kind) = receiver {
            self.shadow_receivers.remove_all_shadows_from_receiver(handle, kind);
        }
    }

    /// Refresh cached world bounds of enabled objects whose cache is stale
    pub fn compute_all_bounds(&mut self) {
        let cache = Arc::clone(&self.model_cache);
        let _lock = ModelCacheGuard::new(cache.as_ref());

        for record in self.renderables.values_mut() {
            if !record.is_enabled() || record.flags.contains(RenderFlags::BOUNDS_VALID) {
                continue;
            }
            record.bounds = record.owner.world_bounds();
            if !record.flags.contains(RenderFlags::BOUNDS_ALWAYS_RECOMPUTE) {
                record.flags.insert(RenderFlags::BOUNDS_VALID);
            }
        }
    }

    /// Per-view preparation: reconcile, then refresh cached bounds
    pub fn pre_render(&mut self) -> ReconcileReport {
        let report = self.reconcile();
        self.compute_all_bounds();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{add, grid_system};
    use super::*;
    use crate::foundation::math::{Transform, Vec3};
    use crate::render::services::test_support::CountingLock;
    use crate::scene::dirty::ChangeNotifier;
    use crate::scene::renderable::test_support::TestOwner;
    use crate::scene::renderable::{ModelClass, RenderableDesc, RenderableOwner};
    use crate::spatial::AreaId;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_object_lands_in_its_cell() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::new("unit", Aabb::new(Vec3::zeros(), Vec3::repeat(1.0)));
        let handle = add(&mut system, &owner);

        let report = system.reconcile();
        assert_eq!(report.reinsertions, 1);
        assert_eq!(report.iterations, 1);
        assert_eq!(system.cells_for(handle), vec![CellId(0)]);
        assert_eq!(system.renderable(handle).unwrap().area(), Some(AreaId(0)));
        assert!(system.renderable(handle).unwrap().bloated_bounds().contains(&owner.world_bounds()));
    }

    #[test]
    fn test_repeat_marks_reinsert_once() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("crate", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);
        system.reconcile();

        owner.set_bounds(Aabb::from_center_extents(Vec3::new(100.0, 10.0, 10.0), Vec3::repeat(1.0)));
        system.mark_changed(handle);
        system.mark_changed(handle);
        assert_eq!(system.reconcile().reinsertions, 1);
        assert_eq!(system.cells_for(handle), vec![CellId(1)]);

        system.mark_changed(handle);
        system.mark_changed(handle);
        assert_eq!(system.reconcile().reinsertions, 0);
    }

    #[test]
    fn test_bloated_bounds_limit_reinsertions() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("particles", Vec3::new(30.0, 10.0, 10.0), 2.0);
        let handle = add(&mut system, &owner);
        system.set_bloated_bounds(handle, true);
        system.reconcile();

        let moves = 12;
        let mut reinsertions = 0;
        for step in 0..moves {
            let x = 28.0 + (step % 4) as f32 * 3.0;
            owner.set_bounds(Aabb::from_center_extents(Vec3::new(x, 10.0, 10.0), Vec3::repeat(2.0)));
            system.mark_changed(handle);
            reinsertions += system.reconcile().reinsertions;
        }
        assert!(reinsertions < moves);
        assert!(reinsertions <= 1);
    }

    #[test]
    fn test_spanning_object_has_no_single_area() {
        let partition = Arc::new({
            let mut grid = crate::spatial::UniformGridPartition::new(Vec3::zeros(), 64.0, [2, 1, 1]);
            grid.set_area(CellId(1), AreaId(3));
            grid
        });
        let mut system = CellVisibilitySystem::new(Default::default());
        system.level_init(partition);
        let owner = TestOwner::cube("bridge", Vec3::new(64.0, 10.0, 10.0), 8.0);
        let handle = add(&mut system, &owner);
        system.reconcile();

        let mut cells = system.cells_for(handle);
        cells.sort();
        assert_eq!(cells, vec![CellId(0), CellId(1)]);
        assert_eq!(system.renderable(handle).unwrap().area(), None);
    }

    /// Owner that queues itself again every time it is placed
    struct Restless {
        notifier: ChangeNotifier,
        handle: Mutex<Option<RenderableHandle>>,
        calls: AtomicU32,
    }

    impl RenderableOwner for Restless {
        fn local_bounds(&self) -> Aabb {
            let step = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
            Aabb::from_center_extents(Vec3::new(10.0 + step * 64.0, 10.0, 10.0), Vec3::repeat(1.0))
        }

        fn transform(&self) -> Transform {
            Transform::identity()
        }

        fn model_class(&self) -> ModelClass {
            ModelClass::Studio
        }

        fn on_handle_changed(&self, handle: Option<RenderableHandle>) {
            *self.handle.lock().unwrap() = handle;
        }

        fn placement_bounds(&self) -> Aabb {
            let bounds = self.world_bounds();
            if let Some(handle) = *self.handle.lock().unwrap() {
                self.notifier.mark_changed(handle);
            }
            bounds
        }
    }

    #[test]
    fn test_sweep_cap_abandons_runaway_objects() {
        crate::foundation::logging::init_for_tests();
        let (mut system, _) = grid_system();
        let owner = Arc::new(Restless {
            notifier: system.notifier(),
            handle: Mutex::new(None),
            calls: AtomicU32::new(0),
        });
        let handle = system.register(RenderableDesc::new(owner));

        let report = system.reconcile();
        assert_eq!(report.iterations, 10);
        assert_eq!(report.reinsertions, 10);
        assert_eq!(report.abandoned, 1);
        assert!(system.notifier().is_queued(handle));
    }

    #[test]
    fn test_disabled_reinsertion_keeps_queue() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("crate", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);

        system.disable_reinsertion(true);
        assert_eq!(system.reconcile(), ReconcileReport::default());
        assert!(system.notifier().is_queued(handle));

        system.disable_reinsertion(false);
        assert_eq!(system.reconcile().reinsertions, 1);
    }

    #[test]
    fn test_compute_all_bounds_caches_until_changed() {
        let lock = Arc::new(CountingLock::default());
        let (system, _) = grid_system();
        let mut system = system.with_model_cache(lock.clone());
        let owner = TestOwner::cube("crate", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);

        system.pre_render();
        assert_eq!(system.renderable(handle).unwrap().bounds(), owner.world_bounds());
        assert_eq!(lock.acquisitions.load(Ordering::SeqCst), 2);
        assert_eq!(lock.depth.load(Ordering::SeqCst), 0);

        let moved = Aabb::from_center_extents(Vec3::new(20.0, 10.0, 10.0), Vec3::repeat(1.0));
        owner.set_bounds(moved);
        system.compute_all_bounds();
        assert_ne!(system.renderable(handle).unwrap().bounds(), moved);

        system.mark_changed(handle);
        system.compute_all_bounds();
        assert_eq!(system.renderable(handle).unwrap().bounds(), moved);
    }

    #[test]
    fn test_always_recompute_ignores_cache() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("ragdoll", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);
        system.set_cached_bounds_disabled(handle, true);
        system.pre_render();

        let moved = Aabb::from_center_extents(Vec3::new(12.0, 10.0, 10.0), Vec3::repeat(1.0));
        owner.set_bounds(moved);
        system.compute_all_bounds();
        assert_eq!(system.renderable(handle).unwrap().bounds(), moved);
    }
}
