//! External services the visibility system calls out to
//!
//! Each service is a trait with a no-op implementation, so a caller only
//! supplies the ones its renderer actually has.

use crate::scene::{ClientShadowId, ModelKind, RenderableHandle};
use crate::spatial::Aabb;

/// Occlusion query service
pub trait OcclusionQuery: Send + Sync {
    /// Whether `bounds` is hidden behind occluders in the given view
    fn is_occluded(&self, view_id: u32, bounds: &Aabb) -> bool;
}

/// Occlusion service that never occludes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOcclusion;

impl OcclusionQuery for NoOcclusion {
    fn is_occluded(&self, _view_id: u32, _bounds: &Aabb) -> bool {
        false
    }
}

/// Receives per-frame shadow falloff updates for faded objects
pub trait ShadowFalloffSink: Send + Sync {
    /// Set how much the shadow fades; 0 is a full-strength shadow
    fn set_falloff_bias(&self, shadow: ClientShadowId, bias: u8);
}

/// Falloff sink that drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShadowFalloff;

impl ShadowFalloffSink for NoShadowFalloff {
    fn set_falloff_bias(&self, _shadow: ClientShadowId, _bias: u8) {}
}

/// Kind of receiver a shadow manager tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKind {
    /// Animated studio model
    StudioModel,
    /// Static prop
    StaticProp,
    /// Brush model
    Brush,
}

impl ReceiverKind {
    /// Receiver kind for a model classification; generic entities have none
    pub fn from_model_kind(kind: ModelKind) -> Option<Self> {
        match kind {
            ModelKind::StudioModel => Some(Self::StudioModel),
            ModelKind::StaticProp => Some(Self::StaticProp),
            ModelKind::Brush => Some(Self::Brush),
            ModelKind::Entity | ModelKind::Unknown => None,
        }
    }
}

/// Shadow manager side of renderable/shadow membership
pub trait ShadowReceiverSink: Send + Sync {
    /// A shadow now lands on `receiver`
    fn add_shadow_to_receiver(&self, shadow: ClientShadowId, receiver: RenderableHandle, kind: ReceiverKind);

    /// `receiver` left the cell index and lost every shadow
    fn remove_all_shadows_from_receiver(&self, receiver: RenderableHandle, kind: ReceiverKind);
}

/// Receiver sink that ignores membership changes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShadowReceivers;

impl ShadowReceiverSink for NoShadowReceivers {
    fn add_shadow_to_receiver(&self, _shadow: ClientShadowId, _receiver: RenderableHandle, _kind: ReceiverKind) {}

    fn remove_all_shadows_from_receiver(&self, _receiver: RenderableHandle, _kind: ReceiverKind) {}
}

/// Coarse lock around model data that placement and bounds queries read
pub trait ModelCacheLock: Send + Sync {
    /// Acquire the lock
    fn begin_lock(&self);

    /// Release the lock
    fn end_lock(&self);
}

/// Model cache that needs no locking
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModelCacheLock;

impl ModelCacheLock for NoModelCacheLock {
    fn begin_lock(&self) {}

    fn end_lock(&self) {}
}

/// Holds a [`ModelCacheLock`] until dropped
pub struct ModelCacheGuard<'a> {
    cache: &'a dyn ModelCacheLock,
}

impl<'a> ModelCacheGuard<'a> {
    /// Acquire `cache`
    pub fn new(cache: &'a dyn ModelCacheLock) -> Self {
        cache.begin_lock();
        Self { cache }
    }
}

impl Drop for ModelCacheGuard<'_> {
    fn drop(&mut self) {
        self.cache.end_lock();
    }
}

/// Per-build collaborators of the render-list builder
#[derive(Clone, Copy)]
pub struct RenderServices<'a> {
    /// Occlusion queries for eligible candidates
    pub occlusion: &'a dyn OcclusionQuery,
    /// Falloff updates for shadows of faded objects
    pub shadow_falloff: &'a dyn ShadowFalloffSink,
}

static NO_OCCLUSION: NoOcclusion = NoOcclusion;
static NO_SHADOW_FALLOFF: NoShadowFalloff = NoShadowFalloff;

impl Default for RenderServices<'_> {
    fn default() -> Self {
        Self { occlusion: &NO_OCCLUSION, shadow_falloff: &NO_SHADOW_FALLOFF }
    }
}

impl std::fmt::Debug for RenderServices<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Recording doubles for builder and system tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Occludes every box whose center lies below `max_y`
    pub struct OccludeBelow {
        pub max_y: f32,
        pub queries: AtomicUsize,
    }

    impl OccludeBelow {
        pub fn new(max_y: f32) -> Self {
            Self { max_y, queries: AtomicUsize::new(0) }
        }
    }

    impl OcclusionQuery for OccludeBelow {
        fn is_occluded(&self, _view_id: u32, bounds: &Aabb) -> bool {
            self.queries.fetch_add(1, Ordering::SeqCst);
            bounds.center().y < self.max_y
        }
    }

    /// Records every falloff update
    #[derive(Default)]
    pub struct RecordingFalloff {
        pub updates: Mutex<Vec<(ClientShadowId, u8)>>,
    }

    impl ShadowFalloffSink for RecordingFalloff {
        fn set_falloff_bias(&self, shadow: ClientShadowId, bias: u8) {
            self.updates.lock().unwrap().push((shadow, bias));
        }
    }

    /// Records receiver membership changes
    #[derive(Default)]
    pub struct RecordingReceivers {
        pub added: Mutex<Vec<(ClientShadowId, RenderableHandle, ReceiverKind)>>,
        pub cleared: Mutex<Vec<RenderableHandle>>,
    }

    impl ShadowReceiverSink for RecordingReceivers {
        fn add_shadow_to_receiver(&self, shadow: ClientShadowId, receiver: RenderableHandle, kind: ReceiverKind) {
            self.added.lock().unwrap().push((shadow, receiver, kind));
        }

        fn remove_all_shadows_from_receiver(&self, receiver: RenderableHandle, _kind: ReceiverKind) {
            self.cleared.lock().unwrap().push(receiver);
        }
    }

    /// Counts lock depth and acquisitions
    #[derive(Default)]
    pub struct CountingLock {
        pub depth: AtomicUsize,
        pub acquisitions: AtomicUsize,
    }

    impl ModelCacheLock for CountingLock {
        fn begin_lock(&self) {
            self.depth.fetch_add(1, Ordering::SeqCst);
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
        }

        fn end_lock(&self) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CountingLock;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = CountingLock::default();
        {
            let _guard = ModelCacheGuard::new(&lock);
            assert_eq!(lock.depth.load(Ordering::SeqCst), 1);
        }
        assert_eq!(lock.depth.load(Ordering::SeqCst), 0);
        assert_eq!(lock.acquisitions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_receiver_kinds() {
        assert_eq!(ReceiverKind::from_model_kind(ModelKind::StaticProp), Some(ReceiverKind::StaticProp));
        assert_eq!(ReceiverKind::from_model_kind(ModelKind::Entity), None);
    }

    #[test]
    fn test_default_services_do_nothing() {
        let services = RenderServices::default();
        assert!(!services.occlusion.is_occluded(0, &Aabb::empty()));
        services.shadow_falloff.set_falloff_bias(ClientShadowId(3), 10);
    }
}
