//! Cell visibility system
//!
//! [`CellVisibilitySystem`] owns every piece of visibility state for one
//! loaded level: the renderable and shadow arenas, the cell table and the
//! three relations between them (cell/renderable, cell/shadow and
//! renderable/shadow). Mutations only queue work; [`CellVisibilitySystem::reconcile`]
//! brings the index up to date once before each view is rendered.
//!
//! The system is single-owner. The only state other threads can reach is the
//! dirty queue, through [`CellVisibilitySystem::notifier`].

mod placement;
mod queries;
mod registry;
mod shadows;

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use super::cell_table::{CellRecord, CellTable};
use super::dirty::ChangeNotifier;
use super::renderable::{RenderableHandle, RenderableRecord};
use super::shadow::{ShadowHandle, ShadowRecord};
use crate::config::{Config, VisibilityConfig};
use crate::error::VisibilityResult;
use crate::foundation::collections::SlotMap;
use crate::render::services::{ModelCacheLock, NoModelCacheLock, NoShadowReceivers, ShadowReceiverSink};
use crate::spatial::{BidirectionalMultimap, CellId, Heads, SpatialPartition};

const RESERVED_RENDERABLES: usize = 1024;
const RESERVED_SHADOWS: usize = 256;
const RESERVED_DIRTY: usize = 256;

/// Global counts of objects that opted into special render paths
///
/// The builder skips whole filter stages when a count is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderCounts {
    /// Objects using alternate translucent sorting
    pub alternate_sort: u32,
    /// Object opt-outs from shadow-depth or cascaded-shadow rendering
    pub shadow_depth_disabled: u32,
    /// Objects excluded from shadow-depth caching
    pub shadow_depth_cache_disabled: u32,
}

type CellHeads<'a> = Heads<'a, CellTable, CellRecord>;
type RenderableHeads<'a> = Heads<'a, SlotMap<RenderableHandle, RenderableRecord>, RenderableRecord>;
type ShadowHeads<'a> = Heads<'a, SlotMap<ShadowHandle, ShadowRecord>, ShadowRecord>;

fn cell_renderable_heads(cells: &mut CellTable) -> CellHeads<'_> {
    Heads::new(cells, |c: &CellRecord| c.renderable_head, |c: &mut CellRecord, h| c.renderable_head = h)
}

fn cell_shadow_heads(cells: &mut CellTable) -> CellHeads<'_> {
    Heads::new(cells, |c: &CellRecord| c.shadow_head, |c: &mut CellRecord, h| c.shadow_head = h)
}

fn renderable_cell_heads(renderables: &mut SlotMap<RenderableHandle, RenderableRecord>) -> RenderableHeads<'_> {
    Heads::new(
        renderables,
        |r: &RenderableRecord| r.cell_head,
        |r: &mut RenderableRecord, h| r.cell_head = h,
    )
}

fn renderable_shadow_heads(renderables: &mut SlotMap<RenderableHandle, RenderableRecord>) -> RenderableHeads<'_> {
    Heads::new(
        renderables,
        |r: &RenderableRecord| r.shadow_head,
        |r: &mut RenderableRecord, h| r.shadow_head = h,
    )
}

fn shadow_cell_heads(shadows: &mut SlotMap<ShadowHandle, ShadowRecord>) -> ShadowHeads<'_> {
    Heads::new(shadows, |s: &ShadowRecord| s.cell_head, |s: &mut ShadowRecord, h| s.cell_head = h)
}

fn shadow_renderable_heads(shadows: &mut SlotMap<ShadowHandle, ShadowRecord>) -> ShadowHeads<'_> {
    Heads::new(
        shadows,
        |s: &ShadowRecord| s.renderable_head,
        |s: &mut ShadowRecord, h| s.renderable_head = h,
    )
}

/// Visibility index and render-list state for the loaded level
pub struct CellVisibilitySystem {
    pub(crate) config: VisibilityConfig,
    partition: Option<Arc<dyn SpatialPartition>>,
    model_cache: Arc<dyn ModelCacheLock>,
    shadow_receivers: Arc<dyn ShadowReceiverSink>,

    pub(crate) renderables: SlotMap<RenderableHandle, RenderableRecord>,
    shadows: SlotMap<ShadowHandle, ShadowRecord>,
    pub(crate) cells: CellTable,

    pub(crate) cell_renderables: BidirectionalMultimap<CellId, RenderableHandle>,
    cell_shadows: BidirectionalMultimap<CellId, ShadowHandle>,
    renderable_shadows: BidirectionalMultimap<RenderableHandle, ShadowHandle>,

    /// Objects drawn with the view models, in registration order
    pub(crate) view_models: Vec<RenderableHandle>,
    notifier: ChangeNotifier,
    /// Stamp of the current enumeration pass
    enum_counter: u32,
    pub(crate) counts: RenderCounts,
    reinsertion_disabled: bool,
    main_thread: ThreadId,
    cell_scratch: Vec<CellId>,
}

impl std::fmt::Debug for CellVisibilitySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellVisibilitySystem")
            .field("level_loaded", &self.partition.is_some())
            .field("cells", &self.cells.len())
            .field("renderables", &self.renderables.len())
            .field("shadows", &self.shadows.len())
            .field("view_models", &self.view_models.len())
            .field("dirty", &self.notifier.len())
            .field("counts", &self.counts)
            .finish_non_exhaustive()
    }
}

impl CellVisibilitySystem {
    /// Create a system with no level loaded
    ///
    /// The calling thread becomes the owning thread for reconciliation and
    /// render-list building.
    pub fn new(config: VisibilityConfig) -> Self {
        Self {
            config,
            partition: None,
            model_cache: Arc::new(NoModelCacheLock),
            shadow_receivers: Arc::new(NoShadowReceivers),
            renderables: SlotMap::with_key(),
            shadows: SlotMap::with_key(),
            cells: CellTable::default(),
            cell_renderables: BidirectionalMultimap::new(),
            cell_shadows: BidirectionalMultimap::new(),
            renderable_shadows: BidirectionalMultimap::new(),
            view_models: Vec::new(),
            notifier: ChangeNotifier::new(),
            enum_counter: 0,
            counts: RenderCounts::default(),
            reinsertion_disabled: false,
            main_thread: thread::current().id(),
            cell_scratch: Vec::new(),
        }
    }

    /// Load and validate a config file, then create a system from it
    pub fn from_config_file(path: impl AsRef<Path>) -> VisibilityResult<Self> {
        let config = VisibilityConfig::load_from_file(path)?;
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Use `cache` around placement and bounds queries
    pub fn with_model_cache(mut self, cache: Arc<dyn ModelCacheLock>) -> Self {
        self.model_cache = cache;
        self
    }

    /// Report receiver membership changes to `sink`
    pub fn with_shadow_receivers(mut self, sink: Arc<dyn ShadowReceiverSink>) -> Self {
        self.shadow_receivers = sink;
        self
    }

    /// Current settings
    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// Replace the settings; takes effect on the next placement or build
    pub fn set_config(&mut self, config: VisibilityConfig) {
        self.config = config;
    }

    /// Make the calling thread the owning thread
    pub fn claim_main_thread(&mut self) {
        self.main_thread = thread::current().id();
    }

    pub(crate) fn assert_main_thread(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.main_thread,
            "cell visibility system used off its owning thread"
        );
    }

    /// Allocate per-level state for `partition`
    ///
    /// Objects registered or queued before this call are placed by the next
    /// reconciliation.
    pub fn level_init(&mut self, partition: Arc<dyn SpatialPartition>) {
        if self.partition.is_some() {
            log::warn!("Level init without shutdown; dropping the previous level");
            self.level_shutdown();
        }

        let cell_count = partition.cell_count();
        self.cells = CellTable::new(cell_count);
        self.renderables.reserve(RESERVED_RENDERABLES);
        self.shadows.reserve(RESERVED_SHADOWS);
        self.notifier.reserve(RESERVED_DIRTY);
        self.cell_renderables.reserve(RESERVED_RENDERABLES);
        self.partition = Some(partition);

        log::info!("Cell visibility initialized with {cell_count} cells");
    }

    /// Free every per-level structure, including cell payloads
    pub fn level_shutdown(&mut self) {
        log::info!(
            "Cell visibility shutdown: {} renderables, {} shadows, {} cells",
            self.renderables.len(),
            self.shadows.len(),
            self.cells.len()
        );

        self.counts = RenderCounts::default();
        self.view_models.clear();
        for record in self.renderables.values() {
            record.owner.on_handle_changed(None);
        }
        self.renderables.clear();
        self.shadows.clear();
        self.cell_renderables.clear();
        self.cell_shadows.clear();
        self.renderable_shadows.clear();
        self.notifier.clear();
        self.cells.clear_payloads();
        self.cells = CellTable::default();
        self.partition = None;
    }

    /// Whether a level is loaded
    pub fn is_level_loaded(&self) -> bool {
        self.partition.is_some()
    }

    /// Partition of the loaded level
    pub fn partition(&self) -> Option<&Arc<dyn SpatialPartition>> {
        self.partition.as_ref()
    }

    /// Cloneable handle for flagging moved objects from any thread
    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    /// Number of registered renderables
    pub fn renderable_count(&self) -> usize {
        self.renderables.len()
    }

    /// Number of registered shadows
    pub fn shadow_count(&self) -> usize {
        self.shadows.len()
    }

    /// Global opt-in counts
    pub fn counts(&self) -> RenderCounts {
        self.counts
    }

    /// Cell table of the loaded level
    pub fn cells(&self) -> &CellTable {
        &self.cells
    }

    fn next_enumeration(&mut self) -> u32 {
        self.enum_counter = self.enum_counter.wrapping_add(1);
        self.enum_counter
    }
}
