//! Change notification and placement hysteresis
//!
//! Objects that move are not re-indexed immediately. They are queued here and
//! reconciled once before each view renders. The queue is the one piece of
//! visibility state that other threads may touch, so it sits behind a mutex
//! and is reachable through cloneable [`ChangeNotifier`] handles.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::renderable::RenderableHandle;
use crate::spatial::Aabb;

#[derive(Debug, Default)]
struct DirtyQueue {
    order: Vec<RenderableHandle>,
    members: HashSet<RenderableHandle>,
}

#[derive(Debug, Default)]
struct NotifierState {
    queue: Mutex<DirtyQueue>,
    reconciling: AtomicBool,
}

/// Thread-safe handle for flagging renderables whose placement changed
///
/// Clones share one queue.
#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    state: Arc<NotifierState>,
}

impl ChangeNotifier {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirtyQueue> {
        self.state.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `handle` for reconciliation
    ///
    /// Returns `false` if it was already queued.
    pub fn mark_changed(&self, handle: RenderableHandle) -> bool {
        let mut queue = self.lock();
        if queue.members.insert(handle) {
            queue.order.push(handle);
            return true;
        }
        if cfg!(debug_assertions) && self.state.reconciling.load(Ordering::Acquire) {
            log::warn!("Re-entrant change notification for {handle:?} during reconciliation");
        }
        false
    }

    /// Whether `handle` is waiting for reconciliation
    pub fn is_queued(&self, handle: RenderableHandle) -> bool {
        self.lock().members.contains(&handle)
    }

    /// Number of queued handles
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    pub(crate) fn reserve(&self, additional: usize) {
        let mut queue = self.lock();
        queue.order.reserve(additional);
        queue.members.reserve(additional);
    }

    pub(crate) fn remove(&self, handle: RenderableHandle) {
        let mut queue = self.lock();
        if queue.members.remove(&handle) {
            queue.order.retain(|&h| h != handle);
        }
    }

    pub(crate) fn clear(&self) {
        let mut queue = self.lock();
        queue.order.clear();
        queue.members.clear();
    }

    /// Take the current queue contents, oldest first
    ///
    /// Handles stay marked until [`Self::clear_mark`] so a repeat notification
    /// before they are processed is still a no-op.
    pub(crate) fn take_batch(&self) -> Vec<RenderableHandle> {
        std::mem::take(&mut self.lock().order)
    }

    pub(crate) fn clear_mark(&self, handle: RenderableHandle) {
        self.lock().members.remove(&handle);
    }

    pub(crate) fn set_reconciling(&self, reconciling: bool) {
        self.state.reconciling.store(reconciling, Ordering::Release);
    }
}

/// Outcome of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Objects removed and reinserted into the cell index
    pub reinsertions: usize,
    /// Queue sweeps performed
    pub iterations: u32,
    /// Objects left queued because the sweep cap was hit
    pub abandoned: usize,
}

/// Placement box for an object whose tight world bounds are `tight`
///
/// The box is snapped outward to `granularity`. With `bloat` set it may also
/// keep the previous placement box when merging costs little, so small jitter
/// does not move the object between cells.
pub fn bloated_bounds(tight: &Aabb, previous: &Aabb, bloat: bool, granularity: f32, min_shrink_volume: f32) -> Aabb {
    let snapped = tight.snapped(granularity);
    if !bloat {
        return snapped;
    }

    let merged = snapped.union(previous);
    let merged_volume = merged.volume();
    if merged_volume <= min_shrink_volume || snapped.volume() * 2.0 >= merged_volume {
        merged
    } else {
        snapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::foundation::math::Vec3;

    fn handles(n: usize) -> Vec<RenderableHandle> {
        let mut map: SlotMap<RenderableHandle, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_mark_changed_queues_once() {
        let notifier = ChangeNotifier::new();
        let h = handles(2);

        assert!(notifier.mark_changed(h[0]));
        assert!(!notifier.mark_changed(h[0]));
        assert!(notifier.clone().mark_changed(h[1]));
        assert_eq!(notifier.len(), 2);

        notifier.remove(h[0]);
        assert!(!notifier.is_queued(h[0]));
        assert_eq!(notifier.take_batch(), vec![h[1]]);
    }

    #[test]
    fn test_batch_marks_clear_individually() {
        let notifier = ChangeNotifier::new();
        let h = handles(1);
        notifier.mark_changed(h[0]);

        let batch = notifier.take_batch();
        assert!(notifier.is_empty());
        assert!(!notifier.mark_changed(h[0]));

        notifier.clear_mark(h[0]);
        assert!(notifier.mark_changed(h[0]));
        assert_eq!(batch, vec![h[0]]);
    }

    #[test]
    fn test_marks_from_worker_threads() {
        let notifier = ChangeNotifier::new();
        let h = handles(64);

        std::thread::scope(|scope| {
            for chunk in h.chunks(16) {
                let notifier = notifier.clone();
                scope.spawn(move || {
                    for &handle in chunk {
                        notifier.mark_changed(handle);
                        notifier.mark_changed(handle);
                    }
                });
            }
        });
        assert_eq!(notifier.len(), 64);
    }

    #[test]
    fn test_bloated_bounds_snap_outward() {
        let tight = Aabb::new(Vec3::new(1.0, -1.0, 0.0), Vec3::new(33.0, 1.0, 31.0));
        let bloated = bloated_bounds(&tight, &Aabb::empty(), false, 32.0, 0.0);
        assert_eq!(bloated, Aabb::new(Vec3::new(0.0, -32.0, 0.0), Vec3::new(64.0, 32.0, 32.0)));
        assert!(bloated.contains(&tight));
    }

    #[test]
    fn test_first_bloat_ignores_empty_previous() {
        let tight = Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(2.0, 2.0, 2.0));
        let bloated = bloated_bounds(&tight, &Aabb::empty(), true, 32.0, 32.0 * 32.0 * 32.0);
        assert_eq!(bloated, Aabb::new(Vec3::zeros(), Vec3::repeat(32.0)));
    }

    #[test]
    fn test_bloat_keeps_previous_box_for_small_moves() {
        let granularity = 32.0;
        let floor = granularity * granularity * granularity;
        let mut previous = Aabb::empty();
        let mut changes = 0;

        // Drift a small object back and forth across one grid line
        for step in 0..20 {
            let x = 28.0 + (step % 5) as f32 * 2.0;
            let tight = Aabb::from_center_extents(Vec3::new(x, 10.0, 10.0), Vec3::repeat(2.0));
            let next = bloated_bounds(&tight, &previous, true, granularity, floor);
            assert!(next.contains(&tight));
            if next != previous {
                changes += 1;
                previous = next;
            }
        }
        assert!(changes < 20);
        assert!(changes <= 2);
    }

    #[test]
    fn test_bloat_drops_previous_box_after_long_move() {
        let previous = Aabb::new(Vec3::zeros(), Vec3::repeat(64.0));
        let tight = Aabb::new(Vec3::repeat(1000.0), Vec3::repeat(1010.0));
        let next = bloated_bounds(&tight, &previous, true, 32.0, 32.0 * 32.0 * 32.0);
        assert_eq!(next, tight.snapped(32.0));
    }
}
