//! Spatial primitives and the cell partition interface
//!
//! Bounding boxes and frustums for culling, the bidirectional multimap used
//! for every cell/object/shadow relation, and the partition collaborator that
//! maps boxes to cells.

pub mod bounds;
pub mod frustum;
pub mod multimap;
pub mod partition;

pub use bounds::Aabb;
pub use frustum::{Frustum, Plane};
pub use multimap::{BidirectionalMultimap, EntryId, HeadStore, Heads, Records};
pub use partition::{AreaId, CellId, SpatialPartition, UniformGridPartition};
