//! Error types for fallible visibility system entry points
//!
//! Invalid handles are not errors; handle-taking calls on stale handles are
//! silent no-ops.

use crate::config::ConfigError;
use crate::spatial::CellId;

/// Errors raised by level-scoped and configuration operations
#[derive(thiserror::Error, Debug)]
pub enum VisibilityError {
    /// No level is loaded, so there is no cell table
    #[error("No level is loaded")]
    LevelNotLoaded,

    /// A cell index beyond the level's cell count
    #[error("Cell {cell:?} out of range (level has {count} cells)")]
    CellOutOfRange {
        /// Requested cell
        cell: CellId,
        /// Cells in the level
        count: usize,
    },

    /// A subsystem payload slot that does not exist
    #[error("Subsystem slot {0} out of range")]
    SubsystemOutOfRange(usize),

    /// Configuration failed to load or validate
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for visibility operations
pub type VisibilityResult<T> = Result<T, VisibilityError>;
