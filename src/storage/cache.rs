//! A small time-bounded read-through cache.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of monotonic time for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Intended for tests.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base + offset
    }
}

/// Holds one value loaded on demand and reused until it is older than the TTL.
///
/// A TTL of `None` (or zero) disables caching: every call loads.
/// Failed loads are never cached.
pub struct ReadThroughCache<T> {
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> ReadThroughCache<T> {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: ttl.filter(|t| !t.is_zero()),
            clock,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value if fresh, otherwise run `load` and cache its success.
    pub fn get_or_try_load<E, F>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let Some(ttl) = self.ttl else {
            return load();
        };

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        if let Some((loaded_at, value)) = slot.as_ref() {
            if now.saturating_duration_since(*loaded_at) < ttl {
                return Ok(value.clone());
            }
        }

        let value = load()?;
        *slot = Some((now, value.clone()));
        Ok(value)
    }

    /// Drop any cached value.
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_load(calls: &Cell<u32>) -> impl Fn() -> Result<u32, ()> + '_ {
        move || {
            calls.set(calls.get() + 1);
            Ok(calls.get())
        }
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = ReadThroughCache::with_clock(Some(Duration::from_secs(60)), clock.clone());
        let calls = Cell::new(0);

        assert_eq!(cache.get_or_try_load(counting_load(&calls)), Ok(1));
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get_or_try_load(counting_load(&calls)), Ok(1));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_cache_reloads_after_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = ReadThroughCache::with_clock(Some(Duration::from_secs(60)), clock.clone());
        let calls = Cell::new(0);

        cache.get_or_try_load(counting_load(&calls)).unwrap();
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get_or_try_load(counting_load(&calls)), Ok(2));
    }

    #[test]
    fn test_disabled_cache_always_loads() {
        let cache: ReadThroughCache<u32> = ReadThroughCache::new(None);
        assert!(!cache.is_enabled());
        let calls = Cell::new(0);
        cache.get_or_try_load(counting_load(&calls)).unwrap();
        cache.get_or_try_load(counting_load(&calls)).unwrap();
        assert_eq!(calls.get(), 2);

        let zero: ReadThroughCache<u32> = ReadThroughCache::new(Some(Duration::ZERO));
        assert!(!zero.is_enabled());
    }

    #[test]
    fn test_failed_load_not_cached() {
        let cache: ReadThroughCache<u32> = ReadThroughCache::new(Some(Duration::from_secs(60)));
        assert_eq!(cache.get_or_try_load(|| Err::<u32, &str>("boom")), Err("boom"));
        assert_eq!(cache.get_or_try_load(|| Ok::<u32, &str>(7)), Ok(7));
        assert_eq!(cache.get_or_try_load(|| Ok::<u32, &str>(8)), Ok(7));
    }

    #[test]
    fn test_invalidate() {
        let cache: ReadThroughCache<u32> = ReadThroughCache::new(Some(Duration::from_secs(60)));
        cache.get_or_try_load(|| Ok::<u32, ()>(1)).unwrap();
        cache.invalidate();
        assert_eq!(cache.get_or_try_load(|| Ok::<u32, ()>(2)), Ok(2));
    }
}
