//! Renderable records and the owner capability interface
//!
//! A renderable is anything drawable that the visibility system indexes. The
//! system never owns the drawable itself; it holds an [`RenderableOwner`]
//! capability object it queries for bounds, transform, classification and
//! alpha when it needs them.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use super::shadow::{ClientShadowId, ShadowFlags};
use crate::foundation::collections::new_key_type;
use crate::foundation::math::{Transform, Vec3};
use crate::spatial::{Aabb, AreaId, EntryId};

new_key_type! {
    /// Stable handle to a registered renderable
    pub struct RenderableHandle;
}

bitflags! {
    /// Per-renderable state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFlags: u32 {
        /// Never drawn and not indexed in any cell
        const DISABLE_RENDERING = 1 << 0;
        /// Translucent sort uses the last cell the object was seen in
        const ALTERNATE_SORTING = 1 << 1;
        /// Drawn with the view models instead of through the cells
        const RENDER_WITH_VIEWMODELS = 1 << 2;
        /// Placement bounds may grow to avoid reinsertion
        const BLOAT_BOUNDS = 1 << 3;
        /// Cached world bounds are current
        const BOUNDS_VALID = 1 << 4;
        /// Cached world bounds are never trusted
        const BOUNDS_ALWAYS_RECOMPUTE = 1 << 5;
        /// Owner's model is a sprite
        const IS_SPRITE = 1 << 6;
        /// Drawn in the opaque group even when translucent
        const FORCE_OPAQUE_PASS = 1 << 7;
    }
}

/// How an object participates in translucent rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TranslucencyKind {
    /// Always opaque
    #[default]
    Opaque,
    /// Always translucent
    Translucent,
    /// Drawn in both the opaque and translucent passes
    TwoPass,
}

/// Model classification used by culling and shadow reception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelKind {
    /// Infer from the owner's model class at registration
    #[default]
    Unknown,
    /// Generic entity; never receives projected shadows
    Entity,
    /// Animated studio model
    StudioModel,
    /// Static prop
    StaticProp,
    /// Brush model
    Brush,
}

impl ModelKind {
    /// Kind implied by an owner's model class
    pub fn infer(class: ModelClass) -> Self {
        match class {
            ModelClass::Brush => Self::Brush,
            ModelClass::Studio => Self::StudioModel,
            ModelClass::Sprite | ModelClass::Other => Self::Entity,
        }
    }

    /// Whether occlusion queries are worth running for this kind
    pub fn wants_occlusion_test(self) -> bool {
        matches!(self, Self::StaticProp | Self::StudioModel)
    }
}

/// Type of model backing a renderable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelClass {
    /// World brush geometry
    Brush,
    /// Studio (mesh) model
    Studio,
    /// Camera-facing sprite
    Sprite,
    /// Anything else, or no model
    Other,
}

/// Which point distance fade measures from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceFadeMode {
    /// Distance to the bounds center
    #[default]
    Center,
    /// Distance to the nearest point of the bounds
    Bounds,
}

/// Alpha and fade parameters an owner reports per frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaState {
    /// Base render alpha
    pub alpha: u8,
    /// Drawn without depth testing
    pub ignores_z: bool,
    /// Distance at which fading starts
    pub fade_start: f32,
    /// Distance at which the object is fully faded; zero disables distance fade
    pub fade_end: f32,
    /// Point distance fade measures from
    pub distance_fade_mode: DistanceFadeMode,
    /// Divisor for projected screen size; zero or less disables screen fade
    pub fade_scale: f32,
    /// Shadow whose falloff follows this object's alpha
    pub shadow: Option<ClientShadowId>,
}

impl Default for AlphaState {
    fn default() -> Self {
        Self {
            alpha: 255,
            ignores_z: false,
            fade_start: 0.0,
            fade_end: 0.0,
            distance_fade_mode: DistanceFadeMode::Center,
            fade_scale: 0.0,
            shadow: None,
        }
    }
}

/// Capabilities the visibility system needs from a renderable's owner
///
/// Implementations are shared with worker threads that compute placement,
/// so they must be `Send + Sync`.
pub trait RenderableOwner: Send + Sync {
    /// Render bounds in the owner's local space
    fn local_bounds(&self) -> Aabb;

    /// Local-to-world transform
    fn transform(&self) -> Transform;

    /// World-space render bounds used for culling
    fn world_bounds(&self) -> Aabb {
        self.local_bounds().transformed(&self.transform())
    }

    /// World-space bounds used for cell placement
    ///
    /// Attached objects may return a looser box than [`Self::world_bounds`]
    /// so they do not need their parent's exact pose.
    fn placement_bounds(&self) -> Aabb {
        self.world_bounds()
    }

    /// Type of the backing model
    fn model_class(&self) -> ModelClass;

    /// Current alpha state, or `None` for a fully opaque owner without fades
    fn alpha_state(&self) -> Option<AlphaState> {
        None
    }

    /// Alpha used for this object's shadow falloff, given its render alpha
    fn override_shadow_alpha(&self, alpha: u8) -> u8 {
        alpha
    }

    /// Whether projected textures of the given kinds land on this object
    fn receives_projected_textures(&self, flags: ShadowFlags) -> bool {
        let _ = flags;
        true
    }

    /// Name used in diagnostics
    fn debug_name(&self) -> String {
        "<unknown renderable>".to_string()
    }

    /// Called when the system assigns or clears this owner's handle
    fn on_handle_changed(&self, handle: Option<RenderableHandle>) {
        let _ = handle;
    }
}

/// Registration-time description of a renderable
#[derive(Clone)]
pub struct RenderableDesc {
    /// Capability object for the drawable
    pub owner: Arc<dyn RenderableOwner>,
    /// Drawn with the view models instead of through the cells
    pub render_with_view_models: bool,
    /// Translucency participation
    pub translucency: TranslucencyKind,
    /// Classification; [`ModelKind::Unknown`] is inferred from the owner
    pub model_kind: ModelKind,
    /// Two-bit mask of splitscreen slots the object is drawn in
    pub splitscreen_mask: u8,
}

impl RenderableDesc {
    /// Opaque, inferred-kind, visible-to-all description for `owner`
    pub fn new(owner: Arc<dyn RenderableOwner>) -> Self {
        Self {
            owner,
            render_with_view_models: false,
            translucency: TranslucencyKind::Opaque,
            model_kind: ModelKind::Unknown,
            splitscreen_mask: SPLITSCREEN_ALL,
        }
    }

    /// Set the translucency kind
    pub fn with_translucency(mut self, translucency: TranslucencyKind) -> Self {
        self.translucency = translucency;
        self
    }

    /// Set the model kind
    pub fn with_model_kind(mut self, model_kind: ModelKind) -> Self {
        self.model_kind = model_kind;
        self
    }

    /// Route the object through the view-model list
    pub fn with_view_models(mut self, render_with_view_models: bool) -> Self {
        self.render_with_view_models = render_with_view_models;
        self
    }

    /// Restrict the splitscreen slots the object is drawn in
    pub fn with_splitscreen_mask(mut self, mask: u8) -> Self {
        self.splitscreen_mask = mask & SPLITSCREEN_ALL;
        self
    }
}

/// Splitscreen mask with both slots enabled
pub const SPLITSCREEN_ALL: u8 = 0b11;

/// Bookkeeping for one registered renderable
pub struct RenderableRecord {
    pub(crate) owner: Arc<dyn RenderableOwner>,
    pub(crate) flags: RenderFlags,
    pub(crate) translucency: TranslucencyKind,
    pub(crate) model_kind: ModelKind,
    pub(crate) splitscreen_mask: u8,
    pub(crate) render_in_fast_reflection: bool,
    pub(crate) disable_shadow_depth: bool,
    pub(crate) disable_csm: bool,
    pub(crate) disable_shadow_depth_cache: bool,
    /// Cached world bounds used for culling
    pub(crate) bounds: Aabb,
    /// Placement-only bounds; always contains `bounds` once placed
    pub(crate) bloated_bounds: Aabb,
    pub(crate) area: Option<AreaId>,
    /// Last view frame the object was emitted for
    pub(crate) render_frame: i64,
    /// Last enumeration pass that visited this object
    pub(crate) enum_count: u32,
    pub(crate) cell_head: EntryId,
    pub(crate) shadow_head: EntryId,
}

impl fmt::Debug for RenderableRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableRecord")
            .field("owner", &self.owner.debug_name())
            .field("flags", &self.flags)
            .field("translucency", &self.translucency)
            .field("model_kind", &self.model_kind)
            .field("bounds", &self.bounds)
            .field("bloated_bounds", &self.bloated_bounds)
            .field("area", &self.area)
            .field("render_frame", &self.render_frame)
            .finish_non_exhaustive()
    }
}

impl RenderableRecord {
    pub(crate) fn new(desc: &RenderableDesc) -> Self {
        let class = desc.owner.model_class();
        let model_kind = match desc.model_kind {
            ModelKind::Unknown => ModelKind::infer(class),
            kind => kind,
        };
        let flags = if class == ModelClass::Sprite {
            RenderFlags::IS_SPRITE
        } else {
            RenderFlags::empty()
        };

        Self {
            owner: Arc::clone(&desc.owner),
            flags,
            translucency: desc.translucency,
            model_kind,
            splitscreen_mask: desc.splitscreen_mask & SPLITSCREEN_ALL,
            render_in_fast_reflection: false,
            disable_shadow_depth: false,
            disable_csm: false,
            disable_shadow_depth_cache: false,
            bounds: Aabb::new(Vec3::zeros(), Vec3::zeros()),
            bloated_bounds: Aabb::empty(),
            area: None,
            render_frame: -1,
            enum_count: 0,
            cell_head: EntryId::INVALID,
            shadow_head: EntryId::INVALID,
        }
    }

    /// Owner capability object
    pub fn owner(&self) -> &Arc<dyn RenderableOwner> {
        &self.owner
    }

    /// State bits
    pub fn flags(&self) -> RenderFlags {
        self.flags
    }

    /// Translucency participation
    pub fn translucency(&self) -> TranslucencyKind {
        self.translucency
    }

    /// Model classification
    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    /// Cached world bounds
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Placement bounds
    pub fn bloated_bounds(&self) -> Aabb {
        self.bloated_bounds
    }

    /// Area the object's cells lie in
    pub fn area(&self) -> Option<AreaId> {
        self.area
    }

    /// Last frame the object was emitted for; -1 before the first
    pub fn render_frame(&self) -> i64 {
        self.render_frame
    }

    /// Whether the object is drawn at all
    pub fn is_enabled(&self) -> bool {
        !self.flags.contains(RenderFlags::DISABLE_RENDERING)
    }

    /// Whether the object is drawn with the view models
    pub fn renders_with_view_models(&self) -> bool {
        self.flags.contains(RenderFlags::RENDER_WITH_VIEWMODELS)
    }

    /// Whether the object belongs in the cell index
    pub fn is_indexable(&self) -> bool {
        !self
            .flags
            .intersects(RenderFlags::DISABLE_RENDERING | RenderFlags::RENDER_WITH_VIEWMODELS)
    }

    /// Whether shadows of the given kinds can land on this object
    ///
    /// Generic entities and sprites never receive; everything else asks the owner.
    pub fn receives_shadow(&self, flags: ShadowFlags) -> bool {
        if self.model_kind == ModelKind::Entity || self.flags.contains(RenderFlags::IS_SPRITE) {
            return false;
        }
        self.owner.receives_projected_textures(flags)
    }

    /// Owner alpha, or fully opaque defaults when the owner reports none
    pub(crate) fn alpha_state(&self) -> AlphaState {
        self.owner.alpha_state().unwrap_or_default()
    }

    /// Whether the object draws translucently at `alpha`
    pub(crate) fn is_translucent_at(&self, alpha: u8) -> bool {
        alpha != 255 || self.translucency != TranslucencyKind::Opaque
    }
}
