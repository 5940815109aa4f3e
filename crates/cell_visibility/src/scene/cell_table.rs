//! Per-level cell records
//!
//! One record per partition cell, allocated in bulk when a level loads. Each
//! record holds the heads of the cell's renderable and shadow lists, the
//! cell's detail-object range, and opaque payload slots other subsystems can
//! hang per-cell data on.

use crate::error::{VisibilityError, VisibilityResult};
use crate::spatial::{CellId, EntryId, Records};
use std::any::Any;

/// Number of per-cell payload slots
pub const MAX_SUBSYSTEMS: usize = 4;

/// Payload slot owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubsystemId(pub usize);

impl SubsystemId {
    /// Detail-object system; a payload here makes a cell draw details
    pub const DETAIL_OBJECTS: Self = Self(0);
}

/// Opaque per-cell subsystem data
pub type CellPayload = Box<dyn Any + Send + Sync>;

/// State of one partition cell
#[derive(Default)]
pub struct CellRecord {
    pub(crate) renderable_head: EntryId,
    pub(crate) shadow_head: EntryId,
    detail_first: u32,
    detail_count: u32,
    detail_render_frame: Option<i64>,
    payloads: [Option<CellPayload>; MAX_SUBSYSTEMS],
}

impl std::fmt::Debug for CellRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellRecord")
            .field("renderable_head", &self.renderable_head)
            .field("shadow_head", &self.shadow_head)
            .field("detail_first", &self.detail_first)
            .field("detail_count", &self.detail_count)
            .field("payloads", &self.payloads.iter().filter(|p| p.is_some()).count())
            .finish()
    }
}

impl CellRecord {
    /// Whether any renderable lists this cell
    pub fn has_renderables(&self) -> bool {
        self.renderable_head.is_valid()
    }

    /// Whether any shadow lists this cell
    pub fn has_shadows(&self) -> bool {
        self.shadow_head.is_valid()
    }
}

/// Fixed-size array of cell records for the loaded level
#[derive(Debug, Default)]
pub struct CellTable {
    cells: Vec<CellRecord>,
}

impl CellTable {
    /// Allocate `count` empty cells
    pub fn new(count: usize) -> Self {
        let mut cells = Vec::with_capacity(count);
        cells.resize_with(count, CellRecord::default);
        Self { cells }
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the table has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Look up a cell
    pub fn get(&self, cell: CellId) -> Option<&CellRecord> {
        self.cells.get(cell.index())
    }

    fn checked_mut(&mut self, cell: CellId) -> VisibilityResult<&mut CellRecord> {
        let count = self.cells.len();
        self.cells
            .get_mut(cell.index())
            .ok_or(VisibilityError::CellOutOfRange { cell, count })
    }

    /// Store a payload, dropping whatever the slot held before
    pub fn set_payload(
        &mut self,
        cell: CellId,
        subsystem: SubsystemId,
        payload: Option<CellPayload>,
    ) -> VisibilityResult<()> {
        let record = self.checked_mut(cell)?;
        let slot = record
            .payloads
            .get_mut(subsystem.0)
            .ok_or(VisibilityError::SubsystemOutOfRange(subsystem.0))?;
        *slot = payload;
        Ok(())
    }

    /// Borrow a payload as `T`; `None` if absent or of another type
    pub fn payload<T: Any>(&self, cell: CellId, subsystem: SubsystemId) -> Option<&T> {
        self.get(cell)?
            .payloads
            .get(subsystem.0)?
            .as_deref()?
            .downcast_ref::<T>()
    }

    /// Whether a payload is present
    pub fn has_payload(&self, cell: CellId, subsystem: SubsystemId) -> bool {
        self.get(cell)
            .and_then(|r| r.payloads.get(subsystem.0))
            .is_some_and(Option::is_some)
    }

    /// Drop every payload in every cell
    pub fn clear_payloads(&mut self) {
        for record in &mut self.cells {
            record.payloads.iter_mut().for_each(|p| *p = None);
        }
    }

    /// Record the detail objects that live in a cell
    pub fn set_detail_objects(&mut self, cell: CellId, first: u32, count: u32) -> VisibilityResult<()> {
        let record = self.checked_mut(cell)?;
        record.detail_first = first;
        record.detail_count = count;
        Ok(())
    }

    /// `(first, count)` of the cell's detail objects
    pub fn detail_objects(&self, cell: CellId) -> Option<(u32, u32)> {
        self.get(cell).map(|r| (r.detail_first, r.detail_count))
    }

    /// Stamp the cell as drawing details this frame and return its range
    pub fn draw_detail_objects(&mut self, cell: CellId, frame: i64) -> Option<(u32, u32)> {
        let record = self.cells.get_mut(cell.index())?;
        record.detail_render_frame = Some(frame);
        Some((record.detail_first, record.detail_count))
    }

    /// Whether details were requested for `frame` and there is anything to draw
    pub fn should_draw_detail_objects(&self, cell: CellId, frame: i64) -> bool {
        self.get(cell).is_some_and(|r| {
            r.detail_render_frame == Some(frame)
                && (r.detail_count != 0 || r.payloads[SubsystemId::DETAIL_OBJECTS.0].is_some())
        })
    }
}

impl Records<CellId> for CellTable {
    type Record = CellRecord;

    fn record(&self, key: CellId) -> Option<&CellRecord> {
        self.cells.get(key.index())
    }

    fn record_mut(&mut self, key: CellId) -> Option<&mut CellRecord> {
        self.cells.get_mut(key.index())
    }
}
