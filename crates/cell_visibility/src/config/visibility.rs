//! Visibility system tunables

use super::{Config, ConfigError};
use serde::{Deserialize, Serialize};

/// Cascaded shadow map traversal switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsmConfig {
    /// Cascaded shadow rendering is on at all
    pub enabled: bool,
    /// Entities (non static props) cast into cascades
    pub entity_shadows: bool,
    /// Static props cast into cascades
    pub static_prop_shadows: bool,
    /// Sprites cast into cascades
    pub sprite_shadows: bool,
    /// Ignore the per-object shadow-depth opt-out
    pub ignore_disable_shadow_depth: bool,
    /// Skip static props that lie inside the cascade volume culler
    pub optimize_static_props: bool,
    /// Skip the cascade frustum test
    pub disable_culling: bool,
}

impl Default for CsmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entity_shadows: true,
            static_prop_shadows: true,
            sprite_shadows: false,
            ignore_disable_shadow_depth: false,
            optimize_static_props: false,
            disable_culling: false,
        }
    }
}

/// Runtime settings of the cell visibility system and render-list builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Grid bloated bounds snap to
    pub bloat_granularity: f32,
    /// Merged bloated boxes at or below this volume are always kept
    pub min_shrink_volume: f32,
    /// Safety cap on dirty-queue sweeps per reconciliation
    pub max_reconcile_iterations: u32,
    /// Cells accepted from one placement query
    pub max_cells_per_insert: usize,
    /// Cells returned by a cells-for-object query
    pub max_cells_per_query: usize,
    /// Capacity of the per-view candidate array
    pub max_candidates: usize,
    /// Capacity of each render group
    pub group_capacity: usize,
    /// Plain shadows propagate onto renderables, not only flashlights
    pub shadows_on_renderables: bool,
    /// Static props are drawn at all
    pub draw_static_props: bool,
    /// Gather every object instead of walking visible cells
    pub draw_all_renderables: bool,
    /// Run occlusion queries on eligible objects
    pub occlusion_enabled: bool,
    /// Cull against the frustum of the object's area
    pub portal_test_entities: bool,
    /// Use the flat traversal for fast-reflection views
    pub fast_reflection_fast_path: bool,
    /// Scale distance fade by the field-of-view factor
    pub alpha_fade_use_fov: bool,
    /// Skip distance fade on objects larger than `big_prop_diagonal_sq`
    pub disable_distance_fade_on_big_props: bool,
    /// Squared diagonal above which an object counts as big
    pub big_prop_diagonal_sq: f32,
    /// Log every placement
    pub debug_placement: bool,
    /// Cascaded shadow settings
    pub csm: CsmConfig,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            bloat_granularity: 32.0,
            min_shrink_volume: 32.0 * 32.0 * 32.0,
            max_reconcile_iterations: 10,
            max_cells_per_insert: 1024,
            max_cells_per_query: 128,
            max_candidates: 16384,
            group_capacity: 4096,
            shadows_on_renderables: true,
            draw_static_props: true,
            draw_all_renderables: false,
            occlusion_enabled: true,
            portal_test_entities: true,
            fast_reflection_fast_path: true,
            alpha_fade_use_fov: true,
            disable_distance_fade_on_big_props: false,
            big_prop_diagonal_sq: 48000.0,
            debug_placement: false,
            csm: CsmConfig::default(),
        }
    }
}

impl Config for VisibilityConfig {}

impl VisibilityConfig {
    /// Reject values the system cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bloat_granularity.is_finite() && self.bloat_granularity > 0.0) {
            return Err(ConfigError::Invalid {
                field: "bloat_granularity",
                reason: format!("must be positive, got {}", self.bloat_granularity),
            });
        }
        if self.min_shrink_volume < 0.0 {
            return Err(ConfigError::Invalid {
                field: "min_shrink_volume",
                reason: "must not be negative".to_string(),
            });
        }
        let counts = [
            ("max_reconcile_iterations", self.max_reconcile_iterations as usize),
            ("max_cells_per_insert", self.max_cells_per_insert),
            ("max_cells_per_query", self.max_cells_per_query),
            ("max_candidates", self.max_candidates),
            ("group_capacity", self.group_capacity),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be at least 1".to_string() });
            }
        }
        Ok(())
    }
}
