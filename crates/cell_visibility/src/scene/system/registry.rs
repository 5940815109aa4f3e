//! Renderable registration and per-object settings
//!
//! Every call taking a [`RenderableHandle`] is a no-op for handles that were
//! never issued or have been unregistered, and getters return defaults.

use std::sync::Arc;

use super::CellVisibilitySystem;
use crate::scene::renderable::{
    ModelKind, RenderFlags, RenderableDesc, RenderableHandle, RenderableRecord, TranslucencyKind,
    SPLITSCREEN_ALL,
};
use crate::spatial::Aabb;

impl CellVisibilitySystem {
    /// Register a drawable and queue it for placement
    pub fn register(&mut self, desc: RenderableDesc) -> RenderableHandle {
        let owner = Arc::clone(&desc.owner);
        let handle = self.renderables.insert(RenderableRecord::new(&desc));
        owner.on_handle_changed(Some(handle));

        self.set_render_with_view_models(handle, desc.render_with_view_models);
        self.mark_changed(handle);
        handle
    }

    /// Remove a drawable from every index and queue
    pub fn unregister(&mut self, handle: RenderableHandle) {
        let Some(record) = self.renderables.get(handle) else {
            return;
        };
        let owner = Arc::clone(&record.owner);

        if record.flags.contains(RenderFlags::ALTERNATE_SORTING) {
            self.counts.alternate_sort = self.counts.alternate_sort.saturating_sub(1);
        }
        let depth_opt_outs = u32::from(record.disable_shadow_depth) + u32::from(record.disable_csm);
        self.counts.shadow_depth_disabled = self.counts.shadow_depth_disabled.saturating_sub(depth_opt_outs);
        if record.disable_shadow_depth_cache {
            self.counts.shadow_depth_cache_disabled = self.counts.shadow_depth_cache_disabled.saturating_sub(1);
        }
        let with_view_models = record.renders_with_view_models();

        self.notifier.remove(handle);
        if with_view_models {
            self.view_models.retain(|&h| h != handle);
        }
        self.remove_from_tree(handle);
        self.renderables.remove(handle);
        owner.on_handle_changed(None);
    }

    /// Whether `handle` names a registered renderable
    pub fn contains(&self, handle: RenderableHandle) -> bool {
        self.renderables.contains_key(handle)
    }

    /// Record of a registered renderable
    pub fn renderable(&self, handle: RenderableHandle) -> Option<&RenderableRecord> {
        self.renderables.get(handle)
    }

    /// Flag a renderable whose bounds or placement inputs changed
    ///
    /// Repeat calls before the next reconciliation queue it only once.
    pub fn mark_changed(&mut self, handle: RenderableHandle) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        record.flags.remove(RenderFlags::BOUNDS_VALID);
        self.notifier.mark_changed(handle);
    }

    /// Move an object between the cell index and the view-model list
    pub fn set_render_with_view_models(&mut self, handle: RenderableHandle, enable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        let current = record.flags.contains(RenderFlags::RENDER_WITH_VIEWMODELS);
        if enable == current {
            return;
        }

        if enable {
            record.flags.insert(RenderFlags::RENDER_WITH_VIEWMODELS);
            self.view_models.push(handle);
            self.remove_from_tree(handle);
        } else {
            record.flags.remove(RenderFlags::RENDER_WITH_VIEWMODELS);
            record.bloated_bounds = Aabb::empty();
            self.view_models.retain(|&h| h != handle);
            self.mark_changed(handle);
        }
    }

    /// Whether the object is drawn with the view models
    pub fn is_rendering_with_view_models(&self, handle: RenderableHandle) -> bool {
        self.renderables.get(handle).is_some_and(RenderableRecord::renders_with_view_models)
    }

    /// Enable or disable drawing; disabled objects leave the cell index
    pub fn set_rendering_enabled(&mut self, handle: RenderableHandle, enable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        if enable == record.is_enabled() {
            return;
        }

        if enable {
            record.flags.remove(RenderFlags::DISABLE_RENDERING);
            record.bloated_bounds = Aabb::empty();
            self.mark_changed(handle);
        } else {
            record.flags.insert(RenderFlags::DISABLE_RENDERING);
            self.remove_from_tree(handle);
        }
    }

    /// Whether the object is drawn
    pub fn is_rendering_enabled(&self, handle: RenderableHandle) -> bool {
        self.renderables.get(handle).is_some_and(RenderableRecord::is_enabled)
    }

    /// Let placement bounds grow to avoid reinsertion
    pub fn set_bloated_bounds(&mut self, handle: RenderableHandle, enable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        if enable {
            record.flags.insert(RenderFlags::BLOAT_BOUNDS);
        } else if record.flags.contains(RenderFlags::BLOAT_BOUNDS) {
            record.flags.remove(RenderFlags::BLOAT_BOUNDS);
            self.mark_changed(handle);
        }
    }

    /// Never trust cached world bounds for this object
    pub fn set_cached_bounds_disabled(&mut self, handle: RenderableHandle, disable: bool) {
        if let Some(record) = self.renderables.get_mut(handle) {
            record.flags.set(RenderFlags::BOUNDS_ALWAYS_RECOMPUTE, disable);
        }
    }

    /// Draw in the opaque group even when translucent
    pub fn set_force_opaque_pass(&mut self, handle: RenderableHandle, enable: bool) {
        if let Some(record) = self.renderables.get_mut(handle) {
            record.flags.set(RenderFlags::FORCE_OPAQUE_PASS, enable);
        }
    }

    /// Whether the object is forced into the opaque group
    pub fn is_force_opaque_pass(&self, handle: RenderableHandle) -> bool {
        self.renderables
            .get(handle)
            .is_some_and(|r| r.flags.contains(RenderFlags::FORCE_OPAQUE_PASS))
    }

    /// Sort the object in the farthest cell it occupies
    pub fn set_alternate_sorting(&mut self, handle: RenderableHandle, enable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        if enable == record.flags.contains(RenderFlags::ALTERNATE_SORTING) {
            return;
        }
        record.flags.set(RenderFlags::ALTERNATE_SORTING, enable);
        if enable {
            self.counts.alternate_sort += 1;
        } else {
            self.counts.alternate_sort = self.counts.alternate_sort.saturating_sub(1);
        }
    }

    /// Include the object in fast reflection views
    pub fn set_fast_reflections(&mut self, handle: RenderableHandle, enable: bool) {
        if let Some(record) = self.renderables.get_mut(handle) {
            record.render_in_fast_reflection = enable;
        }
    }

    /// Whether the object is drawn in fast reflection views
    pub fn is_rendering_in_fast_reflections(&self, handle: RenderableHandle) -> bool {
        self.renderables.get(handle).is_some_and(|r| r.render_in_fast_reflection)
    }

    /// Exclude the object from shadow-depth views
    pub fn set_shadow_depth_disabled(&mut self, handle: RenderableHandle, disable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        if record.disable_shadow_depth != disable {
            record.disable_shadow_depth = disable;
            adjust_count(&mut self.counts.shadow_depth_disabled, disable);
        }
    }

    /// Exclude the object from cascaded shadow views
    pub fn set_csm_disabled(&mut self, handle: RenderableHandle, disable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        if record.disable_csm != disable {
            record.disable_csm = disable;
            adjust_count(&mut self.counts.shadow_depth_disabled, disable);
        }
    }

    /// Exclude the object from cached shadow-depth rendering
    pub fn set_shadow_depth_caching_disabled(&mut self, handle: RenderableHandle, disable: bool) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        if record.disable_shadow_depth_cache != disable {
            record.disable_shadow_depth_cache = disable;
            adjust_count(&mut self.counts.shadow_depth_cache_disabled, disable);
        }
    }

    /// Whether the object is excluded from shadow-depth views
    pub fn is_shadow_depth_disabled(&self, handle: RenderableHandle) -> bool {
        self.renderables.get(handle).is_some_and(|r| r.disable_shadow_depth)
    }

    /// Whether the object is excluded from cascaded shadow views
    pub fn is_csm_disabled(&self, handle: RenderableHandle) -> bool {
        self.renderables.get(handle).is_some_and(|r| r.disable_csm)
    }

    /// Whether the object is excluded from cached shadow-depth rendering
    pub fn is_shadow_depth_caching_disabled(&self, handle: RenderableHandle) -> bool {
        self.renderables.get(handle).is_some_and(|r| r.disable_shadow_depth_cache)
    }

    /// Restrict the splitscreen slots the object is drawn in
    pub fn set_splitscreen_mask(&mut self, handle: RenderableHandle, mask: u8) {
        if let Some(record) = self.renderables.get_mut(handle) {
            record.splitscreen_mask = mask & SPLITSCREEN_ALL;
        }
    }

    /// Splitscreen slots the object is drawn in
    pub fn splitscreen_mask(&self, handle: RenderableHandle) -> u8 {
        self.renderables.get(handle).map_or(0, |r| r.splitscreen_mask)
    }

    /// Change how the object takes part in translucent rendering
    pub fn set_translucency_kind(&mut self, handle: RenderableHandle, kind: TranslucencyKind) {
        if let Some(record) = self.renderables.get_mut(handle) {
            record.translucency = kind;
        }
    }

    /// Translucency participation; opaque for unknown handles
    pub fn translucency_kind(&self, handle: RenderableHandle) -> TranslucencyKind {
        self.renderables.get(handle).map_or_else(TranslucencyKind::default, |r| r.translucency)
    }

    /// Reclassify the object; [`ModelKind::Unknown`] re-infers from the owner
    pub fn set_model_kind(&mut self, handle: RenderableHandle, kind: ModelKind) {
        let Some(record) = self.renderables.get_mut(handle) else {
            return;
        };
        let kind = match kind {
            ModelKind::Unknown => ModelKind::infer(record.owner.model_class()),
            kind => kind,
        };
        if record.model_kind != kind {
            record.model_kind = kind;
            self.mark_changed(handle);
        }
    }

    /// Model classification; [`ModelKind::Unknown`] for unknown handles
    pub fn model_kind(&self, handle: RenderableHandle) -> ModelKind {
        self.renderables.get(handle).map_or_else(ModelKind::default, |r| r.model_kind)
    }

    /// Globally enable or disable static props
    pub fn set_draw_static_props(&mut self, enable: bool) {
        self.config.draw_static_props = enable;
    }

    /// Suspend reconciliation; queued objects wait until it is re-enabled
    pub fn disable_reinsertion(&mut self, disable: bool) {
        self.reinsertion_disabled = disable;
    }
}

fn adjust_count(count: &mut u32, increment: bool) {
    if increment {
        *count += 1;
    } else {
        debug_assert!(*count > 0, "opt-out count underflow");
        *count = count.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{add, grid_system};
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::renderable::test_support::TestOwner;
    use crate::scene::renderable::ModelClass;
    use crate::spatial::CellId;

    #[test]
    fn test_register_assigns_handle_and_queues() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("crate", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);

        assert_eq!(*owner.handle.lock().unwrap(), Some(handle));
        assert!(system.notifier().is_queued(handle));
        assert!(system.is_rendering_enabled(handle));
        assert_eq!(system.model_kind(handle), ModelKind::StudioModel);
    }

    #[test]
    fn test_unregister_is_idempotent_and_clears_owner() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("crate", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);
        system.reconcile();
        system.set_shadow_depth_disabled(handle, true);
        system.set_csm_disabled(handle, true);
        system.set_shadow_depth_caching_disabled(handle, true);
        system.set_alternate_sorting(handle, true);

        system.unregister(handle);
        system.unregister(handle);

        assert!(!system.contains(handle));
        assert_eq!(*owner.handle.lock().unwrap(), None);
        assert_eq!(system.counts(), super::super::RenderCounts::default());
        assert_eq!(system.renderables_in_cell(CellId(0)).count(), 0);
    }

    #[test]
    fn test_stale_handle_calls_are_noops() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("gone", Vec3::zeros(), 1.0);
        let handle = add(&mut system, &owner);
        system.unregister(handle);

        system.mark_changed(handle);
        system.set_rendering_enabled(handle, false);
        system.set_alternate_sorting(handle, true);
        system.set_model_kind(handle, ModelKind::Brush);

        assert!(system.notifier().is_empty());
        assert_eq!(system.counts().alternate_sort, 0);
        assert_eq!(system.translucency_kind(handle), TranslucencyKind::Opaque);
        assert_eq!(system.splitscreen_mask(handle), 0);
        assert!(!system.is_rendering_enabled(handle));
    }

    #[test]
    fn test_view_model_toggle() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("hands", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);
        system.reconcile();
        assert_eq!(system.cells_for(handle), vec![CellId(0)]);

        system.set_render_with_view_models(handle, true);
        assert!(system.cells_for(handle).is_empty());
        assert_eq!(system.view_models, vec![handle]);

        system.mark_changed(handle);
        assert_eq!(system.reconcile().reinsertions, 0);
        assert!(system.cells_for(handle).is_empty());

        system.set_render_with_view_models(handle, false);
        assert!(system.view_models.is_empty());
        assert!(system.renderable(handle).unwrap().bloated_bounds().is_empty());
        assert_eq!(system.reconcile().reinsertions, 1);
        assert_eq!(system.cells_for(handle), vec![CellId(0)]);
    }

    #[test]
    fn test_registering_with_view_models_skips_index() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("weapon", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = system.register(RenderableDesc::new(owner).with_view_models(true));

        system.reconcile();
        assert!(system.is_rendering_with_view_models(handle));
        assert!(system.cells_for(handle).is_empty());
    }

    #[test]
    fn test_disabling_leaves_index_and_enabling_returns() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("door", Vec3::new(10.0, 10.0, 10.0), 1.0);
        let handle = add(&mut system, &owner);
        system.reconcile();

        system.set_rendering_enabled(handle, false);
        assert!(system.cells_for(handle).is_empty());
        system.mark_changed(handle);
        system.reconcile();
        assert!(system.cells_for(handle).is_empty());

        system.set_rendering_enabled(handle, true);
        system.reconcile();
        assert_eq!(system.cells_for(handle), vec![CellId(0)]);
    }

    #[test]
    fn test_counts_follow_changes_only() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("prop", Vec3::zeros(), 1.0);
        let handle = add(&mut system, &owner);

        system.set_shadow_depth_disabled(handle, true);
        system.set_shadow_depth_disabled(handle, true);
        system.set_csm_disabled(handle, true);
        assert_eq!(system.counts().shadow_depth_disabled, 2);

        system.set_shadow_depth_disabled(handle, false);
        assert_eq!(system.counts().shadow_depth_disabled, 1);

        system.set_alternate_sorting(handle, true);
        system.set_alternate_sorting(handle, true);
        assert_eq!(system.counts().alternate_sort, 1);
    }

    #[test]
    fn test_model_kind_change_marks_changed() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::with_class("lamp", ModelClass::Brush, Aabb::empty());
        let handle = add(&mut system, &owner);
        system.reconcile();
        assert!(system.notifier().is_empty());

        system.set_model_kind(handle, ModelKind::Unknown);
        assert!(system.notifier().is_empty());

        system.set_model_kind(handle, ModelKind::StaticProp);
        assert!(system.notifier().is_queued(handle));
        assert_eq!(system.model_kind(handle), ModelKind::StaticProp);
    }

    #[test]
    fn test_bloated_bounds_toggle() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("smoke", Vec3::zeros(), 1.0);
        let handle = add(&mut system, &owner);
        system.reconcile();

        system.set_bloated_bounds(handle, true);
        assert!(system.notifier().is_empty());
        system.set_bloated_bounds(handle, false);
        assert!(system.notifier().is_queued(handle));
    }

    #[test]
    fn test_splitscreen_mask_is_two_bits() {
        let (mut system, _) = grid_system();
        let owner = TestOwner::cube("p2", Vec3::zeros(), 1.0);
        let handle = add(&mut system, &owner);
        system.set_splitscreen_mask(handle, 0xfe);
        assert_eq!(system.splitscreen_mask(handle), 0b10);
    }
}
