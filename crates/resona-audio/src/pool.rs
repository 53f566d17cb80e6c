//! Handle Pool
//!
//! Amortized-growth free list of playback handles. Acquisition never fails:
//! past an empty free list a new physical source is created, and past the
//! hard capacity cap released handles are simply destroyed instead of pooled.
//! A rate-limited trim pass evicts idle handles and shrinks the backing
//! storage when occupancy stays low.

use std::sync::Arc;

use parking_lot::Mutex;

use resona_platform::source::AudioBackend;

use crate::AudioConfig;
use crate::handle::Handle;

/// Shared reference to a pooled handle
///
/// Shared between the pool's free list, the engine's active list and
/// outstanding `AudioPlay` tokens; all accesses happen on the simulation
/// thread.
pub(crate) type HandleRef = Arc<Mutex<Handle>>;

/// Fraction of idle handles destroyed per trim pass
const TRIM_EVICT_FRACTION: f32 = 0.35;

/// Free list of reusable playback handles
///
/// The list is a stack: release pushes, acquire pops, so the bottom holds the
/// longest-idle handles. Trim tombstones evicted slots with `None`; acquire
/// skips tombstones lazily.
pub(crate) struct HandlePool {
    entries: Vec<Option<HandleRef>>,
    /// Logical capacity; grows geometrically up to `max_capacity`
    capacity: usize,
    initial_capacity: usize,
    max_capacity: usize,
    /// Minimum simulated seconds between trim passes
    trim_cooldown: f64,
    last_trim: f64,
    /// Total sources ever created, for diagnostics
    created: u64,
}

impl HandlePool {
    pub(crate) fn new(config: &AudioConfig) -> Self {
        let initial = config.initial_pool_capacity.max(1);
        let max = config.max_pool_capacity.max(initial);
        Self {
            entries: Vec::with_capacity(initial),
            capacity: initial,
            initial_capacity: initial,
            max_capacity: max,
            trim_cooldown: config.trim_cooldown,
            last_trim: f64::NEG_INFINITY,
            created: 0,
        }
    }

    /// Pop an idle handle, creating a fresh one when the free list is empty
    pub(crate) fn acquire(&mut self, backend: &dyn AudioBackend) -> HandleRef {
        while let Some(slot) = self.entries.pop() {
            if let Some(handle) = slot {
                return handle;
            }
            // Tombstone from a previous trim; cleared lazily here.
        }
        self.created += 1;
        log::debug!("audio pool empty, creating source #{}", self.created);
        Arc::new(Mutex::new(Handle::new(backend.create_source())))
    }

    /// Return a handle to the free list, or destroy it past the hard cap
    ///
    /// The handle's generation is bumped either way, invalidating any
    /// session still pointing at it.
    pub(crate) fn release(&mut self, handle: HandleRef) {
        handle.lock().release();

        if self.entries.len() >= self.capacity {
            if self.capacity < self.max_capacity {
                self.capacity = (self.capacity * 2).min(self.max_capacity);
                log::debug!("audio pool grew to capacity {}", self.capacity);
            } else {
                log::debug!("audio pool at hard cap, destroying handle");
                return;
            }
        }
        self.entries.push(Some(handle));
    }

    /// Evict a fraction of idle handles and shrink low-occupancy storage
    ///
    /// Rate-limited by the configured cooldown; extra requests inside the
    /// window are ignored.
    pub(crate) fn trim(&mut self, now: f64) {
        if now - self.last_trim < self.trim_cooldown {
            return;
        }
        self.last_trim = now;

        let idle = self.idle_count();
        let evict = (idle as f32 * TRIM_EVICT_FRACTION).ceil() as usize;
        let mut evicted = 0;
        // Bottom of the stack first: those handles have been idle longest.
        for slot in self.entries.iter_mut() {
            if evicted == evict {
                break;
            }
            if slot.take().is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            log::debug!("audio pool trimmed {evicted} idle handles");
        }

        let live = idle - evicted;
        if self.capacity > self.initial_capacity && live * 3 < self.capacity {
            self.capacity = (self.capacity / 2).max(self.initial_capacity);
            self.entries.retain(Option::is_some);
            self.entries.shrink_to(self.capacity);
            log::debug!("audio pool shrank to capacity {}", self.capacity);
        }
    }

    /// Reconfigure the hard cap, clamping the current logical capacity
    ///
    /// Lowering the cap below the current idle count destroys the excess
    /// immediately, oldest first, so the free list never holds more handles
    /// than the cap allows.
    pub(crate) fn set_max_capacity(&mut self, max: usize) {
        self.max_capacity = max.max(1);
        self.capacity = self.capacity.min(self.max_capacity);
        self.initial_capacity = self.initial_capacity.min(self.max_capacity);

        let mut excess = self.idle_count().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        for slot in self.entries.iter_mut() {
            if excess == 0 {
                break;
            }
            if slot.take().is_some() {
                excess -= 1;
            }
        }
        self.entries.retain(Option::is_some);
        self.entries.shrink_to(self.capacity);
        log::debug!(
            "audio pool cap lowered to {}, destroyed excess idle handles",
            self.max_capacity
        );
    }

    /// Idle handles currently pooled (tombstones excluded)
    pub(crate) fn idle_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_platform::source::NullBackend;

    fn config(initial: usize, max: usize) -> AudioConfig {
        AudioConfig {
            initial_pool_capacity: initial,
            max_pool_capacity: max,
            trim_cooldown: 20.0,
            ..AudioConfig::default()
        }
    }

    fn drain(pool: &mut HandlePool, backend: &NullBackend, n: usize) -> Vec<HandleRef> {
        (0..n).map(|_| pool.acquire(backend)).collect()
    }

    #[test]
    fn test_acquire_reuses_released_handle() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(4, 8));

        let handle = pool.acquire(&backend);
        let generation = handle.lock().generation();
        pool.release(handle.clone());
        assert_eq!(pool.idle_count(), 1);

        let again = pool.acquire(&backend);
        assert!(Arc::ptr_eq(&handle, &again));
        // Release invalidated the old generation.
        assert_eq!(again.lock().generation(), generation + 1);
    }

    #[test]
    fn test_capacity_grows_geometrically() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(2, 16));

        let handles = drain(&mut pool, &backend, 5);
        for handle in handles {
            pool.release(handle);
        }
        assert_eq!(pool.idle_count(), 5);
        // 2 -> 4 -> 8
        assert_eq!(pool.capacity(), 8);
    }

    #[test]
    fn test_hard_cap_destroys_overflow() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(2, 4));

        // More concurrent handles than the cap: acquisition still succeeds.
        let handles = drain(&mut pool, &backend, 10);
        assert_eq!(handles.len(), 10);
        for handle in handles {
            pool.release(handle);
        }
        // Only the first `max` made it back to the free list.
        assert_eq!(pool.idle_count(), 4);
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn test_free_list_never_exceeds_cap_under_churn() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(2, 4));

        for _ in 0..8 {
            let handles = drain(&mut pool, &backend, 12);
            for handle in handles {
                pool.release(handle);
            }
            assert!(pool.idle_count() <= 4);
        }
    }

    #[test]
    fn test_trim_evicts_oldest_and_is_rate_limited() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(2, 32));

        let handles = drain(&mut pool, &backend, 10);
        let oldest = handles[0].clone();
        for handle in handles {
            pool.release(handle);
        }
        assert_eq!(pool.idle_count(), 10);

        pool.trim(100.0);
        // ceil(10 * 0.35) = 4 evicted, bottom of the stack first.
        assert_eq!(pool.idle_count(), 6);
        assert!(
            pool.entries
                .iter()
                .flatten()
                .all(|h| !Arc::ptr_eq(h, &oldest))
        );

        // Second trim inside the cooldown window is a no-op.
        pool.trim(110.0);
        assert_eq!(pool.idle_count(), 6);

        // Past the cooldown it runs again: ceil(6 * 0.35) = 3 more evicted.
        pool.trim(125.0);
        assert_eq!(pool.idle_count(), 3);
    }

    #[test]
    fn test_trim_shrinks_capacity_to_floor() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(2, 32));

        let handles = drain(&mut pool, &backend, 17);
        for handle in handles {
            pool.release(handle);
        }
        assert_eq!(pool.capacity(), 32);

        // Repeated trims wear the pool down; capacity halves whenever
        // occupancy drops under a third, never below the initial size.
        let mut now = 0.0;
        for _ in 0..12 {
            now += 100.0;
            pool.trim(now);
        }
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_tombstones_skipped_on_acquire() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(2, 32));

        let handles = drain(&mut pool, &backend, 6);
        for handle in handles {
            pool.release(handle);
        }
        pool.trim(50.0); // evicts 3, leaves tombstones at the bottom
        assert_eq!(pool.idle_count(), 3);
        assert!(pool.slot_count() >= pool.idle_count());

        // All three survivors come out; tombstones are skipped, then fresh
        // handles are created.
        let reused = drain(&mut pool, &backend, 4);
        assert_eq!(reused.len(), 4);
        assert_eq!(pool.slot_count(), 0);
    }

    #[test]
    fn test_lowering_cap_drops_excess_idle_handles() {
        let backend = NullBackend::new();
        let mut pool = HandlePool::new(&config(4, 16));

        let handles = drain(&mut pool, &backend, 8);
        for handle in handles {
            pool.release(handle);
        }
        assert_eq!(pool.idle_count(), 8);

        // The free list obeys the new cap at once, not lazily on reuse.
        pool.set_max_capacity(4);
        assert_eq!(pool.idle_count(), 4);
        assert!(pool.capacity() <= 4);

        // Churn past the new cap keeps destroying overflow on release.
        let handles = drain(&mut pool, &backend, 8);
        for handle in handles {
            pool.release(handle);
        }
        assert!(pool.idle_count() <= 4);
    }
}
