//! Scene visibility index
//!
//! Tracks which drawable objects occupy which cells of the level's spatial
//! partition, and which shadow projectors land on which objects.
//!
//! ## Architecture
//!
//! ```text
//! Game code (register / mark_changed / project)
//!      ↓
//! ChangeNotifier (dirty queue, any thread)
//!      ↓
//! CellVisibilitySystem::reconcile (owning thread, once per view)
//!      ↓
//! Cell index: cell ↔ renderable, cell ↔ shadow, renderable ↔ shadow
//!      ↓
//! RenderListBuilder (per view)
//! ```

pub mod cell_table;
pub mod dirty;
pub mod renderable;
pub mod shadow;
mod system;

pub use cell_table::{CellPayload, CellRecord, CellTable, SubsystemId, MAX_SUBSYSTEMS};
pub use dirty::{bloated_bounds, ChangeNotifier, ReconcileReport};
pub use renderable::{
    AlphaState, DistanceFadeMode, ModelClass, ModelKind, RenderFlags, RenderableDesc, RenderableHandle,
    RenderableOwner, RenderableRecord, TranslucencyKind, SPLITSCREEN_ALL,
};
pub use shadow::{ClientShadowId, ShadowFlags, ShadowHandle, ShadowRecord};
pub use system::{CellVisibilitySystem, RenderCounts};

#[cfg(test)]
pub(crate) use system::test_support;
