//! # Render-List Builder
//!
//! Turns the cell index into the grouped draw lists for one view.
//!
//! ## Pipeline
//!
//! ```text
//! gather       visible cells, a boundary marker before each cell's objects
//! dedup        once per frame stamp (last occurrence for alternate sorting)
//! filters      static props, splitscreen, fast reflections, shadow depth, translucents
//! snapshot     cached bounds, area, occlusion eligibility
//! cull         per-area frustum
//! fade         base alpha, distance and screen fades, shadow falloff
//! occlusion    eligible objects only
//! emit         opaque / translucent / translucent-ignore-z, per-cell back-to-front sort
//! ```
//!
//! Every stage preserves order. The only persistent state a build touches is
//! each object's frame stamp, which ends up equal to the view's frame for
//! exactly the objects that were emitted.

use std::collections::HashMap;

use super::fade::{apply_fade, distance_fade, screen_fade};
use super::list::{RenderEntry, RenderGroup, RenderList, ViewModelRenderList};
use super::services::RenderServices;
use super::sort::{sort_back_to_front, view_depth};
use super::view::{ViewKind, ViewSetup};
use crate::foundation::collections::SlotMap;
use crate::scene::{
    CellVisibilitySystem, ModelKind, RenderFlags, RenderableHandle, RenderableRecord, TranslucencyKind,
};
use crate::spatial::{Aabb, AreaId};

/// Per-object working state of one build
#[derive(Debug, Clone, Copy)]
struct Candidate {
    handle: RenderableHandle,
    bounds: Aabb,
    area: Option<AreaId>,
    alpha: u8,
    ignores_z: bool,
    occlusion_test: bool,
}

impl Candidate {
    fn new(handle: RenderableHandle) -> Self {
        Self {
            handle,
            bounds: Aabb::empty(),
            area: None,
            alpha: 255,
            ignores_z: false,
            occlusion_test: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Start of the next visible cell's objects
    CellBoundary,
    Object(Candidate),
}

/// Drop candidates `keep` rejects, rolling their frame stamp back
fn extract(
    renderables: &mut SlotMap<RenderableHandle, RenderableRecord>,
    frame: i64,
    slots: &mut Vec<Slot>,
    mut keep: impl FnMut(&RenderableRecord, &mut Candidate) -> bool,
) {
    slots.retain_mut(|slot| {
        let Slot::Object(candidate) = slot else {
            return true;
        };
        let Some(record) = renderables.get_mut(candidate.handle) else {
            return false;
        };
        if keep(record, candidate) {
            true
        } else {
            record.render_frame = frame - 1;
            false
        }
    });
}

/// Group an object lands in at its owner's current alpha
fn resolve_group(record: &RenderableRecord) -> RenderGroup {
    match record.owner.alpha_state() {
        Some(state) if record.is_translucent_at(state.alpha) => {
            if state.ignores_z {
                RenderGroup::TranslucentIgnoreZ
            } else {
                RenderGroup::Translucent
            }
        }
        _ => RenderGroup::Opaque,
    }
}

fn entry_for(handle: RenderableHandle, record: &RenderableRecord, cell_index: u32, alpha: u8) -> RenderEntry {
    RenderEntry {
        handle,
        cell_index,
        model_kind: record.model_kind,
        alpha,
        two_pass: false,
        shadow_depth_no_cache: record.disable_shadow_depth_cache,
    }
}

/// Builds render lists from a [`CellVisibilitySystem`]
///
/// Holds only the collaborators it calls out to; all indexed state lives in
/// the system passed to [`Self::build`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderListBuilder<'a> {
    services: RenderServices<'a>,
}

impl<'a> RenderListBuilder<'a> {
    /// Builder with no occlusion and no shadow falloff updates
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder calling out to `services`
    pub fn with_services(services: RenderServices<'a>) -> Self {
        Self { services }
    }

    /// Build the render list for `view`
    ///
    /// Call [`CellVisibilitySystem::pre_render`] first so placement and cached
    /// bounds are current.
    pub fn build(&self, system: &mut CellVisibilitySystem, view: &ViewSetup) -> RenderList {
        system.assert_main_thread();
        let mut list = RenderList::new(system.config.group_capacity);

        if view.fast_entity_rendering && system.config.fast_reflection_fast_path {
            Self::build_for_fast_reflections(system, view, &mut list);
        } else if view.kind == ViewKind::CascadedShadow {
            Self::build_for_cascaded_shadows(system, view, &mut list);
        } else {
            let mut slots = Self::gather(system, view);
            let gathered = slots.len();

            Self::extract_duplicates(system, view.render_frame, &mut slots);
            Self::extract_filtered(system, view, &mut slots);
            Self::snapshot_bounds(system, &mut slots);
            Self::extract_culled(system, view, &mut slots);
            if view.draw_translucent_objects {
                self.compute_translucency(system, view, &mut slots);
            }
            self.extract_occluded(system, view, &mut slots);

            log::trace!("{:?} view frame {}: {} gathered, {} survived", view.kind, view.render_frame, gathered, slots.len());
            Self::add_to_render_lists(system, view, &slots, &mut list);
        }

        log::trace!(
            "{:?} view frame {}: {} opaque, {} translucent, {} ignore-z",
            view.kind,
            view.render_frame,
            list.count(RenderGroup::Opaque),
            list.count(RenderGroup::Translucent),
            list.count(RenderGroup::TranslucentIgnoreZ)
        );
        list
    }

    fn gather(system: &CellVisibilitySystem, view: &ViewSetup) -> Vec<Slot> {
        let capacity = system.config.max_candidates;
        let mut slots = Vec::with_capacity(capacity.min(2048));
        let mut overflow = false;

        if view.kind != ViewKind::Sky3d && system.config.draw_all_renderables {
            // Everything counts as being in the first visible cell
            slots.push(Slot::CellBoundary);
            for handle in system.renderables.keys() {
                if slots.len() >= capacity {
                    overflow = true;
                    break;
                }
                slots.push(Slot::Object(Candidate::new(handle)));
            }
        } else {
            'cells: for &cell in &view.visible_cells {
                if slots.len() >= capacity {
                    overflow = true;
                    break;
                }
                slots.push(Slot::CellBoundary);
                for handle in system.renderables_in_cell(cell) {
                    if slots.len() >= capacity {
                        overflow = true;
                        break 'cells;
                    }
                    slots.push(Slot::Object(Candidate::new(handle)));
                }
            }
        }

        if overflow {
            log::warn!("Render candidate array full at {} entries; dropping the rest of the view", capacity);
        }
        slots
    }

    fn extract_duplicates(system: &mut CellVisibilitySystem, frame: i64, slots: &mut Vec<Slot>) {
        let renderables = &mut system.renderables;

        if system.counts.alternate_sort == 0 {
            slots.retain(|slot| {
                let Slot::Object(candidate) = slot else {
                    return true;
                };
                let Some(record) = renderables.get_mut(candidate.handle) else {
                    return false;
                };
                if !record.is_indexable() || record.render_frame == frame {
                    return false;
                }
                record.render_frame = frame;
                true
            });
            return;
        }

        // Alternate-sorted objects keep their last occurrence, so count them first
        let mut occurrences: HashMap<RenderableHandle, u32> = HashMap::new();
        slots.retain(|slot| {
            let Slot::Object(candidate) = slot else {
                return true;
            };
            let Some(record) = renderables.get_mut(candidate.handle) else {
                return false;
            };
            if !record.is_indexable() {
                return false;
            }
            if record.flags.contains(RenderFlags::ALTERNATE_SORTING) {
                *occurrences.entry(candidate.handle).or_default() += 1;
                return true;
            }
            if record.render_frame == frame {
                return false;
            }
            record.render_frame = frame;
            true
        });

        if occurrences.is_empty() {
            return;
        }
        slots.retain(|slot| {
            let Slot::Object(candidate) = slot else {
                return true;
            };
            let Some(remaining) = occurrences.get_mut(&candidate.handle) else {
                return true;
            };
            *remaining -= 1;
            if *remaining != 0 {
                return false;
            }
            if let Some(record) = renderables.get_mut(candidate.handle) {
                record.render_frame = frame;
            }
            true
        });
    }

    fn extract_filtered(system: &mut CellVisibilitySystem, view: &ViewSetup, slots: &mut Vec<Slot>) {
        let frame = view.render_frame;
        let config = &system.config;
        let renderables = &mut system.renderables;

        if !config.draw_static_props {
            extract(renderables, frame, slots, |record, _| record.model_kind != ModelKind::StaticProp);
        }

        if let Some(slot) = view.splitscreen_slot {
            let slot_mask = 1u8 << slot.min(7);
            extract(renderables, frame, slots, |record, _| record.splitscreen_mask & slot_mask != 0);
        }

        if view.fast_entity_rendering {
            extract(renderables, frame, slots, |record, _| record.render_in_fast_reflection);
        }

        if view.kind == ViewKind::ShadowDepthTexture {
            extract(renderables, frame, slots, |record, _| !record.disable_shadow_depth);
            if view.draw_depth_view_non_cached_only {
                extract(renderables, frame, slots, |record, _| record.disable_shadow_depth_cache);
            }
        }

        if !view.draw_translucent_objects {
            extract(renderables, frame, slots, |record, _| record.translucency != TranslucencyKind::Translucent);
        }
    }

    fn snapshot_bounds(system: &CellVisibilitySystem, slots: &mut [Slot]) {
        for slot in slots {
            let Slot::Object(candidate) = slot else {
                continue;
            };
            if let Some(record) = system.renderables.get(candidate.handle) {
                candidate.bounds = record.bounds;
                candidate.area = record.area;
                candidate.occlusion_test = record.model_kind.wants_occlusion_test();
                candidate.alpha = 255;
            }
        }
    }

    fn extract_culled(system: &mut CellVisibilitySystem, view: &ViewSetup, slots: &mut Vec<Slot>) {
        let portal_test = system.config.portal_test_entities;
        extract(&mut system.renderables, view.render_frame, slots, |_, candidate| {
            let frustum = if portal_test { view.frustum_for_area(candidate.area) } else { &view.main_frustum };
            !frustum.cull_box(&candidate.bounds)
        });
    }

    fn compute_translucency(&self, system: &mut CellVisibilitySystem, view: &ViewSetup, slots: &mut Vec<Slot>) {
        let config = &system.config;
        let fades = view.fades_enabled();
        let fov = if config.alpha_fade_use_fov { view.fade.fov_distance_adjust } else { 1.0 };
        let distance_factor_sq = (fov * view.fade.global_distance_scale).powi(2);
        let screen_fades = view.fade.level_range.0 > 0.0 || view.fade.global_range.0 > 0.0;
        let big_prop_limit = config.disable_distance_fade_on_big_props.then_some(config.big_prop_diagonal_sq);
        let falloff = self.services.shadow_falloff;

        extract(&mut system.renderables, view.render_frame, slots, |record, candidate| {
            let Some(state) = record.owner.alpha_state() else {
                return true;
            };
            candidate.alpha = state.alpha;
            candidate.ignores_z = state.ignores_z;

            if fades {
                let bounds = candidate.bounds;
                let is_big = big_prop_limit.is_some_and(|limit| bounds.diagonal_length_squared() > limit);
                let mut factor = if is_big {
                    1.0
                } else {
                    distance_fade(&state, &bounds, view.render_origin, distance_factor_sq)
                };
                if screen_fades {
                    let center = bounds.center();
                    let radius = (bounds.max - center).norm();
                    let info = &view.screen_size;
                    factor = factor
                        .min(screen_fade(&state, center, radius, info, view.fade.level_range))
                        .min(screen_fade(&state, center, radius, info, view.fade.global_range));
                }
                candidate.alpha = apply_fade(candidate.alpha, factor);
            }

            if let Some(shadow) = state.shadow {
                let alpha = record.owner.override_shadow_alpha(candidate.alpha);
                falloff.set_falloff_bias(shadow, 255 - alpha);
            }

            candidate.alpha != 0
        });
    }

    fn extract_occluded(&self, system: &mut CellVisibilitySystem, view: &ViewSetup, slots: &mut Vec<Slot>) {
        if !system.config.occlusion_enabled {
            return;
        }
        let occlusion = self.services.occlusion;
        extract(&mut system.renderables, view.render_frame, slots, |_, candidate| {
            !(candidate.occlusion_test && occlusion.is_occluded(view.occlusion_view_id, &candidate.bounds))
        });
    }

    fn add_to_render_lists(system: &CellVisibilitySystem, view: &ViewSetup, slots: &[Slot], list: &mut RenderList) {
        let mut run_start = 0;
        let mut depths: Vec<f32> = Vec::new();
        let mut cell_index = 0u32;
        let mut first_cell = true;

        let finish_run = |list: &mut RenderList, depths: &mut Vec<f32>, run_start: &mut usize| {
            if view.draw_translucent_objects && depths.len() > 1 {
                let run = &mut list.group_mut(RenderGroup::Translucent)[*run_start..];
                sort_back_to_front(run, depths);
            }
            *run_start = list.count(RenderGroup::Translucent);
            depths.clear();
        };

        for slot in slots {
            let candidate = match slot {
                Slot::CellBoundary => {
                    finish_run(list, &mut depths, &mut run_start);
                    if first_cell {
                        first_cell = false;
                    } else {
                        cell_index += 1;
                    }
                    continue;
                }
                Slot::Object(candidate) => candidate,
            };
            let Some(record) = system.renderables.get(candidate.handle) else {
                continue;
            };

            let entry = entry_for(candidate.handle, record, cell_index, candidate.alpha);
            if !record.is_translucent_at(candidate.alpha) || record.flags.contains(RenderFlags::FORCE_OPAQUE_PASS) {
                list.push(RenderGroup::Opaque, entry);
                continue;
            }

            let two_pass = record.translucency == TranslucencyKind::TwoPass && candidate.alpha == 255;
            if view.draw_translucent_objects {
                let entry = RenderEntry { two_pass, ..entry };
                if candidate.ignores_z {
                    list.push(RenderGroup::TranslucentIgnoreZ, entry);
                } else if list.push(RenderGroup::Translucent, entry) {
                    depths.push(view_depth(&candidate.bounds, view.render_origin, view.render_forward));
                }
            }
            if two_pass {
                list.push(RenderGroup::Opaque, RenderEntry { alpha: 255, two_pass: true, ..entry });
            }
        }

        finish_run(list, &mut depths, &mut run_start);
    }

    /// Flat walk for reflection views that only draw flagged objects
    fn build_for_fast_reflections(system: &mut CellVisibilitySystem, view: &ViewSetup, list: &mut RenderList) {
        let frame = view.render_frame;
        for (handle, record) in system.renderables.iter_mut() {
            if !record.is_indexable() || record.render_frame == frame {
                continue;
            }
            record.render_frame = frame;
            if !record.render_in_fast_reflection {
                continue;
            }
            // Area frustums are not refined for this path
            if view.main_frustum.cull_box(&record.bounds) {
                continue;
            }
            list.push(resolve_group(record), entry_for(handle, record, 0, 255));
        }
    }

    /// Flat walk for cascaded shadow map views
    fn build_for_cascaded_shadows(system: &mut CellVisibilitySystem, view: &ViewSetup, list: &mut RenderList) {
        let frame = view.render_frame;
        let csm = &system.config.csm;
        let entity_shadows = csm.enabled && csm.entity_shadows;
        let static_prop_shadows = csm.enabled && csm.static_prop_shadows;
        let sprite_shadows = csm.enabled && csm.sprite_shadows;

        for (handle, record) in system.renderables.iter_mut() {
            if !csm.ignore_disable_shadow_depth
                && (record.disable_shadow_depth || (record.disable_csm && csm.optimize_static_props))
            {
                continue;
            }
            if !record.is_indexable() {
                continue;
            }
            if !entity_shadows && matches!(record.model_kind, ModelKind::Entity | ModelKind::StudioModel) {
                continue;
            }
            if !static_prop_shadows && record.model_kind == ModelKind::StaticProp {
                continue;
            }
            if !sprite_shadows && record.flags.contains(RenderFlags::IS_SPRITE) {
                continue;
            }
            if record.render_frame == frame {
                continue;
            }
            record.render_frame = frame;

            if !csm.disable_culling {
                if let Some(culler) = &view.csm_culler {
                    if culler.cull_box(&record.bounds) {
                        continue;
                    }
                }
            }
            list.push(resolve_group(record), entry_for(handle, record, 0, 255));
        }
    }
}

impl CellVisibilitySystem {
    /// Build the render list for `view` with the given collaborators
    pub fn build_render_list(&mut self, view: &ViewSetup, services: RenderServices<'_>) -> RenderList {
        RenderListBuilder::with_services(services).build(self, view)
    }

    /// Split view-model objects into opaque and translucent lists
    ///
    /// `splitscreen_slot` restricts the lists to objects drawn in that slot.
    pub fn collate_view_model_renderables(&self, splitscreen_slot: Option<u8>) -> ViewModelRenderList {
        let mut lists = ViewModelRenderList::default();
        let slot_mask = splitscreen_slot.map(|slot| 1u8 << slot.min(7));

        for &handle in self.view_models.iter().rev() {
            let Some(record) = self.renderables.get(handle) else {
                continue;
            };
            if slot_mask.is_some_and(|mask| record.splitscreen_mask & mask == 0) {
                continue;
            }

            let alpha = record.alpha_state().alpha;
            let entry = entry_for(handle, record, 0, alpha);
            if !record.is_translucent_at(alpha) {
                lists.opaque.push(RenderEntry { alpha: 255, ..entry });
                continue;
            }

            let two_pass = record.translucency == TranslucencyKind::TwoPass;
            lists.translucent.push(RenderEntry { two_pass, ..entry });
            if two_pass {
                lists.opaque.push(RenderEntry { alpha: 255, two_pass, ..entry });
            }
        }
        lists
    }

    /// Group and entry an object would be emitted with, ignoring visibility
    pub fn generate_render_list_entry(&self, handle: RenderableHandle) -> Option<(RenderGroup, RenderEntry)> {
        let record = self.renderables.get(handle)?;
        let state = record.alpha_state();
        let group = if !record.is_translucent_at(state.alpha) {
            RenderGroup::Opaque
        } else if state.ignores_z {
            RenderGroup::TranslucentIgnoreZ
        } else {
            RenderGroup::Translucent
        };
        let entry = RenderEntry {
            two_pass: record.translucency == TranslucencyKind::TwoPass,
            shadow_depth_no_cache: false,
            ..entry_for(handle, record, 0, state.alpha)
        };
        Some((group, entry))
    }
}
