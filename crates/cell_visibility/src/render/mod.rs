//! # Render Lists
//!
//! Per-view construction of the grouped draw lists from the cell index.
//!
//! ## Architecture
//!
//! - **ViewSetup**: Frustums, visible cells and pass flags for one view
//! - **RenderListBuilder**: Gather, filter, cull, fade and sort pipeline
//! - **RenderList**: Fixed-capacity opaque and translucent groups
//! - **Services**: Occlusion, shadow falloff and model cache collaborators
//!
//! Sorting and fades are plain functions in [`sort`] and [`fade`] so tools can
//! reuse them outside a build.

pub mod builder;
pub mod fade;
pub mod list;
pub mod services;
pub mod sort;
pub mod view;

pub use builder::RenderListBuilder;
pub use list::{RenderEntry, RenderGroup, RenderList, ViewModelRenderList};
pub use services::{
    ModelCacheGuard, ModelCacheLock, NoModelCacheLock, NoOcclusion, NoShadowFalloff, NoShadowReceivers,
    OcclusionQuery, ReceiverKind, RenderServices, ShadowFalloffSink, ShadowReceiverSink,
};
pub use view::{FadeSettings, ScreenSizeInfo, ViewKind, ViewSetup};
