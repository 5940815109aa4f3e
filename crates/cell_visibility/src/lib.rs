//! # Cell Visibility
//!
//! Incremental visibility index over a level's spatial partition, and the
//! per-view builder that turns it into grouped, sorted draw lists.
//!
//! ## Features
//!
//! - **Cell Index**: Which objects and shadow projectors occupy which cells
//! - **Lazy Reinsertion**: Moved objects are queued and placed once per view
//! - **Bloated Bounds**: Grid-snapped placement boxes with hysteresis
//! - **Shadow Propagation**: Projectors attach to receivers in their cells
//! - **Render Lists**: Deduplicated, culled, faded and back-to-front sorted
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cell_visibility::prelude::*;
//!
//! # struct Crate;
//! # impl RenderableOwner for Crate {
//! #     fn local_bounds(&self) -> Aabb { Aabb::new(Vec3::zeros(), Vec3::repeat(1.0)) }
//! #     fn transform(&self) -> Transform { Transform::identity() }
//! #     fn model_class(&self) -> ModelClass { ModelClass::Studio }
//! # }
//! let partition = Arc::new(UniformGridPartition::new(Vec3::zeros(), 64.0, [16, 16, 4]));
//! let mut system = CellVisibilitySystem::new(VisibilityConfig::default());
//! system.level_init(partition.clone());
//!
//! let handle = system.register(RenderableDesc::new(Arc::new(Crate)));
//! system.pre_render();
//!
//! let mut cells = Vec::new();
//! partition.visible_cells_from(Vec3::zeros(), &mut cells);
//! let view = ViewSetup::new(1, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), cells);
//! let list = RenderListBuilder::new().build(&mut system, &view);
//! assert_eq!(list.group(RenderGroup::Opaque)[0].handle, handle);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod error;
pub mod foundation;
pub mod render;
pub mod scene;
pub mod spatial;

pub use error::{VisibilityError, VisibilityResult};

/// Common imports for users of the visibility system
pub mod prelude {
    pub use crate::{
        config::{Config, CsmConfig, VisibilityConfig},
        error::{VisibilityError, VisibilityResult},
        foundation::math::{Transform, Vec3},
        render::{
            FadeSettings, RenderEntry, RenderGroup, RenderList, RenderListBuilder, RenderServices, ViewKind,
            ViewSetup,
        },
        scene::{
            AlphaState, CellVisibilitySystem, ClientShadowId, ModelClass, ModelKind, RenderableDesc,
            RenderableHandle, RenderableOwner, ShadowFlags, ShadowHandle, TranslucencyKind,
        },
        spatial::{Aabb, CellId, Frustum, SpatialPartition, UniformGridPartition},
    };
}
