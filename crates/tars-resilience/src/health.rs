use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct HealthEntry {
    value: bool,
    checked_at: Option<Instant>,
}

/// TTL-memoized liveness probe result.
///
/// A TTL of zero never reports a valid entry, so every check is a live probe.
#[derive(Debug)]
pub struct HealthCache {
    ttl: Duration,
    entry: RwLock<HealthEntry>,
}

impl HealthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(HealthEntry::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value, if one was set less than `ttl` ago.
    pub fn get(&self) -> Option<bool> {
        let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        self.fresh(&entry).then_some(entry.value)
    }

    pub fn set(&self, value: bool) {
        let mut entry = self.entry.write().unwrap_or_else(PoisonError::into_inner);
        entry.value = value;
        entry.checked_at = Some(Instant::now());
    }

    pub fn is_valid(&self) -> bool {
        let entry = self.entry.read().unwrap_or_else(PoisonError::into_inner);
        self.fresh(&entry)
    }

    /// Forget when the value was checked so the next `get` misses.
    pub fn invalidate(&self) {
        self.entry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .checked_at = None;
    }

    /// Return the cached value, or run `probe` and cache its result.
    pub async fn get_or_probe<F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if let Some(value) = self.get() {
            return value;
        }
        let value = probe().await;
        self.set(value);
        value
    }

    fn fresh(&self, entry: &HealthEntry) -> bool {
        entry
            .checked_at
            .is_some_and(|checked_at| checked_at.elapsed() < self.ttl)
    }
}
