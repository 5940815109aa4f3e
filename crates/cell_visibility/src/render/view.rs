//! Per-view parameters for render-list building

use crate::foundation::math::{Mat4, Vec3};
use crate::spatial::{AreaId, CellId, Frustum};

/// What a view renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewKind {
    /// Main player view
    #[default]
    Main,
    /// 3D skybox; never fades and never uses the debug gather
    Sky3d,
    /// Depth-only view into a projected shadow texture
    ShadowDepthTexture,
    /// Cascaded shadow map view
    CascadedShadow,
    /// Water or mirror reflection
    Reflection,
    /// Anything else the client renders
    Other,
}

/// Projection data for estimating an object's on-screen size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSizeInfo {
    /// Combined view-projection matrix
    pub view_proj: Mat4,
    /// Viewport height in pixels
    pub viewport_height: f32,
    /// World-space camera up vector
    pub view_up: Vec3,
}

impl Default for ScreenSizeInfo {
    fn default() -> Self {
        Self { view_proj: Mat4::identity(), viewport_height: 0.0, view_up: Vec3::new(0.0, 0.0, 1.0) }
    }
}

/// Alpha fade inputs shared by every object in a view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSettings {
    /// Fades run at all for this view
    pub enabled: bool,
    /// Field-of-view distance adjustment of the local player
    pub fov_distance_adjust: f32,
    /// Global distance fade scale (per CPU tier)
    pub global_distance_scale: f32,
    /// `(min, max)` screen width fade range set by the level
    pub level_range: (f32, f32),
    /// `(min, max)` screen width fade range set globally
    pub global_range: (f32, f32),
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fov_distance_adjust: 1.0,
            global_distance_scale: 1.0,
            level_range: (0.0, 0.0),
            global_range: (0.0, 0.0),
        }
    }
}

/// Everything the builder needs to know about one view
#[derive(Debug, Clone)]
pub struct ViewSetup {
    /// What the view renders
    pub kind: ViewKind,
    /// Frame stamp written into emitted objects; must differ between views
    pub render_frame: i64,
    /// Cells visible from the view, nearest first
    pub visible_cells: Vec<CellId>,
    /// Camera frustum
    pub main_frustum: Frustum,
    /// Frustums clipped to each area's portals, indexed by area id
    pub area_frustums: Vec<Frustum>,
    /// Camera position
    pub render_origin: Vec3,
    /// Normalized view direction
    pub render_forward: Vec3,
    /// Translucent objects are drawn in this view
    pub draw_translucent_objects: bool,
    /// Reflection view restricted to objects flagged for fast reflections
    pub fast_entity_rendering: bool,
    /// Volume culler for cascaded shadow views
    pub csm_culler: Option<Frustum>,
    /// Shadow-depth view only redraws objects that bypass the depth cache
    pub draw_depth_view_non_cached_only: bool,
    /// View id passed to occlusion queries
    pub occlusion_view_id: u32,
    /// Projection data for screen-size fades
    pub screen_size: ScreenSizeInfo,
    /// Active splitscreen slot, when splitscreen is on
    pub splitscreen_slot: Option<u8>,
    /// Fade inputs
    pub fade: FadeSettings,
}

impl ViewSetup {
    /// Main view at `origin` looking along `forward`, seeing `visible_cells`
    pub fn new(render_frame: i64, origin: Vec3, forward: Vec3, visible_cells: Vec<CellId>) -> Self {
        let forward = if forward.norm_squared() > f32::EPSILON { forward.normalize() } else { Vec3::new(1.0, 0.0, 0.0) };
        Self {
            kind: ViewKind::Main,
            render_frame,
            visible_cells,
            main_frustum: Frustum::infinite(),
            area_frustums: Vec::new(),
            render_origin: origin,
            render_forward: forward,
            draw_translucent_objects: true,
            fast_entity_rendering: false,
            csm_culler: None,
            draw_depth_view_non_cached_only: false,
            occlusion_view_id: 0,
            screen_size: ScreenSizeInfo::default(),
            splitscreen_slot: None,
            fade: FadeSettings::default(),
        }
    }

    /// Set the view kind
    pub fn with_kind(mut self, kind: ViewKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the camera frustum
    pub fn with_frustum(mut self, frustum: Frustum) -> Self {
        self.main_frustum = frustum;
        self
    }

    /// Choose whether translucent objects are drawn
    pub fn with_translucents(mut self, draw: bool) -> Self {
        self.draw_translucent_objects = draw;
        self
    }

    /// Frustum to cull an object of `area` against
    ///
    /// Objects spanning several areas, and areas without a refined frustum,
    /// use the camera frustum.
    pub fn frustum_for_area(&self, area: Option<AreaId>) -> &Frustum {
        area.and_then(|a| self.area_frustums.get(usize::from(a.0)))
            .unwrap_or(&self.main_frustum)
    }

    /// Whether any fade can change alpha in this view
    pub fn fades_enabled(&self) -> bool {
        self.fade.enabled && self.kind != ViewKind::Sky3d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Plane;

    #[test]
    fn test_area_frustum_fallback() {
        let mut view = ViewSetup::new(1, Vec3::zeros(), Vec3::new(0.0, 2.0, 0.0), Vec::new());
        assert_eq!(view.render_forward, Vec3::new(0.0, 1.0, 0.0));

        let half_space = Frustum::new([Plane::new(Vec3::new(1.0, 0.0, 0.0), 0.0); 6]);
        view.area_frustums.push(half_space);

        assert_eq!(*view.frustum_for_area(Some(AreaId(0))), half_space);
        assert_eq!(*view.frustum_for_area(Some(AreaId(3))), Frustum::infinite());
        assert_eq!(*view.frustum_for_area(None), Frustum::infinite());
    }

    #[test]
    fn test_skybox_never_fades() {
        let view = ViewSetup::new(1, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), Vec::new());
        assert!(view.fades_enabled());
        assert!(!view.with_kind(ViewKind::Sky3d).fades_enabled());
    }
}
