// =============================================================================
// Snapshot Store -- one kind of snapshot with consistent indices
// =============================================================================
//
// The primary map is the source of truth. The by-exchange and latest indices
// hold primary keys only and are rewritten under the same write lock as the
// primary map, so no reader ever observes one index ahead of another.
//
// Every removal goes through `Indices::unlink` followed by a by-exchange
// prune and `Indices::repair_latest`, or through `Indices::reset`.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::{debug, warn};

use crate::market_data::Snapshot;

/// An entry is expired once strictly more than `ttl` has passed since it was
/// written.
fn is_expired(written_at: Instant, ttl: Duration, now: Instant) -> bool {
    now.saturating_duration_since(written_at) > ttl
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

struct Entry<T> {
    value: Arc<T>,
    written_at: Instant,
}

// ---------------------------------------------------------------------------
// Indices -- the lock-protected state
// ---------------------------------------------------------------------------

pub(crate) struct Indices<T: Snapshot> {
    primary: HashMap<T::Key, Entry<T>>,
    /// Exchange -> primary keys in first-write order.
    by_exchange: HashMap<String, Vec<T::Key>>,
    latest: HashMap<T::LatestKey, T::Key>,
}

impl<T: Snapshot> Indices<T> {
    fn new() -> Self {
        Self {
            primary: HashMap::new(),
            by_exchange: HashMap::new(),
            latest: HashMap::new(),
        }
    }

    /// Upsert `value` into every index. Returns the stored value and whether
    /// the latest pointer moved to it.
    fn insert(&mut self, value: T, now: Instant) -> (Arc<T>, bool) {
        let key = value.key();
        let latest_key = value.latest_key();

        let advance = match self.latest.get(&latest_key) {
            Some(current_key) if *current_key == key => false,
            Some(current_key) => match self.primary.get(current_key) {
                Some(current) => value.supersedes(&current.value),
                None => true,
            },
            None => true,
        };

        let bucket = self.by_exchange.entry(value.exchange().to_string()).or_default();
        if !bucket.contains(&key) {
            bucket.push(key.clone());
        }

        if advance {
            self.latest.insert(latest_key, key.clone());
        }

        let value = Arc::new(value);
        self.primary.insert(
            key,
            Entry {
                value: Arc::clone(&value),
                written_at: now,
            },
        );
        (value, advance)
    }

    /// Remove `key` from the primary map and prune it from every secondary
    /// index. Emptied buckets are dropped; an orphaned latest pointer is
    /// re-aimed at the best remaining entry of its series.
    fn remove(&mut self, key: &T::Key) -> Option<Arc<T>> {
        let mut orphaned = HashSet::new();
        let value = self.unlink(key, &mut orphaned)?;

        let exchange = value.exchange();
        if let Some(bucket) = self.by_exchange.get_mut(exchange) {
            bucket.retain(|k| k != key);
            if bucket.is_empty() {
                self.by_exchange.remove(exchange);
            }
        }

        self.repair_latest(orphaned);
        Some(value)
    }

    /// Drop `key` from the primary map. If it was the latest entry of its
    /// series, the pointer is removed and the series is added to `orphaned`.
    /// The caller prunes the by-exchange index and then runs `repair_latest`.
    fn unlink(&mut self, key: &T::Key, orphaned: &mut HashSet<T::LatestKey>) -> Option<Arc<T>> {
        let entry = self.primary.remove(key)?;

        let latest_key = entry.value.latest_key();
        if self.latest.get(&latest_key) == Some(key) {
            self.latest.remove(&latest_key);
            orphaned.insert(latest_key);
        }

        Some(entry.value)
    }

    /// Drop by-exchange keys with no primary entry, and any emptied bucket.
    fn prune_buckets(&mut self) {
        let primary = &self.primary;
        self.by_exchange.retain(|_, bucket| {
            bucket.retain(|k| primary.contains_key(k));
            !bucket.is_empty()
        });
    }

    /// Re-aim the latest pointer of every orphaned series in a single pass
    /// over the primary map. Each series replays its remaining entries in
    /// write order through `supersedes`. Series with nothing left stay absent.
    fn repair_latest(&mut self, orphaned: HashSet<T::LatestKey>) {
        if orphaned.is_empty() {
            return;
        }

        let mut series: HashMap<T::LatestKey, Vec<(&T::Key, &Entry<T>)>> = HashMap::new();
        for (key, entry) in &self.primary {
            let latest_key = entry.value.latest_key();
            if orphaned.contains(&latest_key) {
                series.entry(latest_key).or_default().push((key, entry));
            }
        }

        let replacements: Vec<(T::LatestKey, T::Key)> = series
            .into_iter()
            .filter_map(|(latest_key, mut candidates)| {
                candidates.sort_by_key(|(_, e)| e.written_at);
                let mut best: Option<(&T::Key, &Entry<T>)> = None;
                for candidate in candidates {
                    best = match best {
                        Some(current) if !candidate.1.value.supersedes(&current.1.value) => {
                            Some(current)
                        }
                        _ => Some(candidate),
                    };
                }
                best.map(|(k, _)| (latest_key, k.clone()))
            })
            .collect();

        for (latest_key, key) in replacements {
            self.latest.insert(latest_key, key);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.primary = HashMap::new();
        self.by_exchange = HashMap::new();
        self.latest = HashMap::new();
    }

    fn live(&self, key: &T::Key, ttl: Duration, now: Instant) -> Option<&Arc<T>> {
        let entry = self.primary.get(key)?;
        if is_expired(entry.written_at, ttl, now) {
            return None;
        }
        Some(&entry.value)
    }

    /// Remove every entry older than `ttl`. Returns the number removed.
    ///
    /// All expired keys are unlinked first. Buckets are then pruned and
    /// orphaned latest pointers repaired in one pass each.
    pub(crate) fn sweep(&mut self, ttl: Duration, now: Instant) -> usize {
        let expired: Vec<T::Key> = self
            .primary
            .iter()
            .filter(|(_, e)| is_expired(e.written_at, ttl, now))
            .map(|(k, _)| k.clone())
            .collect();

        let mut orphaned = HashSet::new();
        for key in &expired {
            self.unlink(key, &mut orphaned);
        }
        if !expired.is_empty() {
            self.prune_buckets();
        }
        self.repair_latest(orphaned);
        expired.len()
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        for (exchange, bucket) in &self.by_exchange {
            assert!(!bucket.is_empty(), "empty by-exchange bucket for {exchange}");
            for key in bucket {
                let entry = self.primary.get(key).expect("dangling by-exchange key");
                assert_eq!(entry.value.exchange(), exchange);
            }
        }
        for (latest_key, key) in &self.latest {
            let entry = self.primary.get(key).expect("dangling latest key");
            assert_eq!(entry.value.latest_key(), *latest_key);
        }
        for (key, entry) in &self.primary {
            let bucket = self
                .by_exchange
                .get(entry.value.exchange())
                .expect("primary entry missing from by-exchange index");
            assert!(bucket.contains(key));
            assert!(self.latest.contains_key(&entry.value.latest_key()));
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Thread-safe, TTL-aware store for one snapshot kind.
///
/// Reads share the lock and never mutate; writes, removals and sweeps take it
/// exclusively. Stored snapshots are handed out as `Arc<T>`.
pub struct SnapshotStore<T: Snapshot> {
    indices: RwLock<Indices<T>>,
    ttl_nanos: AtomicU64,
}

impl<T: Snapshot> SnapshotStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            indices: RwLock::new(Indices::new()),
            ttl_nanos: AtomicU64::new(duration_to_nanos(ttl)),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_nanos(self.ttl_nanos.load(Ordering::Relaxed))
    }

    /// Change the ttl applied to every entry, including those already stored.
    /// Returns `false` (and changes nothing) for a zero duration.
    pub fn set_ttl(&self, ttl: Duration) -> bool {
        if ttl.is_zero() {
            warn!(kind = %T::KIND, "ignoring zero ttl");
            return false;
        }
        self.ttl_nanos.store(duration_to_nanos(ttl), Ordering::Relaxed);
        true
    }

    /// Insert or wholesale-replace a snapshot, updating all indices together.
    pub fn put(&self, value: T) -> Arc<T> {
        self.put_at(value, Instant::now())
    }

    pub(crate) fn put_at(&self, value: T, now: Instant) -> Arc<T> {
        let (stored, advanced) = self.indices.write().insert(value, now);
        debug!(
            kind = %T::KIND,
            key = %stored.key(),
            latest_advanced = advanced,
            "snapshot cached"
        );
        stored
    }

    pub fn get(&self, key: &T::Key) -> Option<Arc<T>> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &T::Key, now: Instant) -> Option<Arc<T>> {
        let ttl = self.ttl();
        let indices = self.indices.read();
        let entry = indices.primary.get(key)?;
        if is_expired(entry.written_at, ttl, now) {
            debug!(kind = %T::KIND, key = %key, "cached snapshot expired");
            return None;
        }
        Some(Arc::clone(&entry.value))
    }

    /// All snapshots for `exchange`, in first-write order. If any of them has
    /// expired the whole batch is reported absent, as is an unknown exchange.
    pub fn get_all_by_exchange(&self, exchange: &str) -> Option<Vec<Arc<T>>> {
        self.get_all_by_exchange_at(exchange, Instant::now())
    }

    pub(crate) fn get_all_by_exchange_at(&self, exchange: &str, now: Instant) -> Option<Vec<Arc<T>>> {
        let ttl = self.ttl();
        let indices = self.indices.read();
        let bucket = indices.by_exchange.get(exchange)?;
        if bucket.is_empty() {
            return None;
        }

        let mut out = Vec::with_capacity(bucket.len());
        for key in bucket {
            match indices.live(key, ttl, now) {
                Some(value) => out.push(Arc::clone(value)),
                None => {
                    debug!(kind = %T::KIND, exchange = %exchange, key = %key, "exchange batch expired");
                    return None;
                }
            }
        }
        Some(out)
    }

    /// The latest snapshot for one latest key (symbol or candle series).
    pub fn get_latest(&self, latest_key: &T::LatestKey) -> Option<Arc<T>> {
        self.get_latest_at(latest_key, Instant::now())
    }

    pub(crate) fn get_latest_at(&self, latest_key: &T::LatestKey, now: Instant) -> Option<Arc<T>> {
        let ttl = self.ttl();
        let indices = self.indices.read();
        let key = indices.latest.get(latest_key)?;
        let value = indices.live(key, ttl, now);
        if value.is_none() {
            debug!(kind = %T::KIND, key = %key, "latest snapshot expired");
        }
        value.cloned()
    }

    /// Every live entry of the latest index. `None` when nothing is live.
    pub fn get_latest_all(&self) -> Option<Vec<Arc<T>>> {
        self.get_latest_all_at(Instant::now())
    }

    pub(crate) fn get_latest_all_at(&self, now: Instant) -> Option<Vec<Arc<T>>> {
        let ttl = self.ttl();
        let indices = self.indices.read();
        let out: Vec<Arc<T>> = indices
            .latest
            .values()
            .filter_map(|key| indices.live(key, ttl, now).cloned())
            .collect();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Return the live snapshot for `key`, or run `fetch` and store its result.
    /// Errors are returned unchanged and nothing is stored for them.
    pub fn get_or_fetch<E, F>(&self, key: &T::Key, fetch: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let fresh = fetch()?;
        Ok(self.put(fresh))
    }

    /// Remove `key` from every index. Returns whether it was present.
    pub fn remove(&self, key: &T::Key) -> bool {
        let removed = self.indices.write().remove(key).is_some();
        if removed {
            debug!(kind = %T::KIND, key = %key, "snapshot removed");
        }
        removed
    }

    /// Physically remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> usize {
        let ttl = self.ttl();
        self.indices.write().sweep(ttl, now)
    }

    pub fn clear(&self) {
        self.indices.write().reset();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.indices.read().primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive access to the indices, for callers that must hold several
    /// stores at once.
    pub(crate) fn lock(&self) -> RwLockWriteGuard<'_, Indices<T>> {
        self.indices.write()
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.indices.read().assert_consistent();
    }
}
