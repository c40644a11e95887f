// =============================================================================
// Expiring Cell -- a single value with a time-to-live
// =============================================================================
//
// Not synchronised. Wrap it in a lock (or own it from a single task) when it
// is shared.
// =============================================================================

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    /// `None` when `now + ttl` is past the end of `Instant`'s range, which
    /// means the value never expires.
    expires_at: Option<Instant>,
}

impl<T> Slot<T> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now <= at)
    }
}

/// Holds at most one value together with its expiration instant.
///
/// Expiry is lazy: `get` reports an expired value as absent but never clears
/// it. Use `invalidate` to drop the value explicitly.
#[derive(Debug, Clone)]
pub struct ExpiringCell<T> {
    slot: Option<Slot<T>>,
    ttl: Duration,
}

impl<T> ExpiringCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { slot: None, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value`, expiring `ttl` from now.
    pub fn set(&mut self, value: T) {
        self.set_at(value, Instant::now());
    }

    pub(crate) fn set_at(&mut self, value: T, now: Instant) {
        self.slot = Some(Slot {
            value,
            expires_at: now.checked_add(self.ttl),
        });
    }

    /// The held value, or `None` if never set, invalidated, or expired.
    pub fn get(&self) -> Option<&T> {
        self.get_at(Instant::now())
    }

    pub(crate) fn get_at(&self, now: Instant) -> Option<&T> {
        match &self.slot {
            Some(slot) if slot.is_live(now) => Some(&slot.value),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    /// Drop the held value and its expiration, whatever their state.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// Change the ttl used by future `set` calls. A live value has its
    /// expiration pushed to `now + ttl`; an expired one stays expired.
    /// A zero duration is ignored.
    pub fn update_ttl(&mut self, ttl: Duration) {
        self.update_ttl_at(ttl, Instant::now());
    }

    pub(crate) fn update_ttl_at(&mut self, ttl: Duration, now: Instant) {
        if ttl.is_zero() {
            return;
        }
        self.ttl = ttl;
        if let Some(slot) = self.slot.as_mut() {
            if slot.is_live(now) {
                slot.expires_at = now.checked_add(ttl);
            }
        }
    }
}

impl<T: Clone> ExpiringCell<T> {
    /// Return the live value, or call `fetch` and cache what it returns.
    ///
    /// A failed fetch leaves the cell untouched and hands the error back
    /// unchanged. Callers racing on a miss each run their own fetch.
    pub fn get_or_set<E, F>(&mut self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.get_or_set_at(fetch, Instant::now())
    }

    pub(crate) fn get_or_set_at<E, F>(&mut self, fetch: F, now: Instant) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get_at(now) {
            return Ok(value.clone());
        }
        let value = fetch()?;
        self.set_at(value.clone(), now);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[test]
    fn empty_cell_reports_absent() {
        let cell: ExpiringCell<u32> = ExpiringCell::new(TTL);
        assert!(cell.get().is_none());
        assert!(!cell.is_valid());
    }

    #[test]
    fn value_lives_until_expiration_inclusive() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        cell.set_at(7, t0);

        assert_eq!(cell.get_at(t0), Some(&7));
        assert_eq!(cell.get_at(t0 + TTL), Some(&7));
        assert_eq!(cell.get_at(t0 + TTL + Duration::from_nanos(1)), None);
    }

    #[test]
    fn get_does_not_clear_expired_value() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        cell.set_at(1, t0);
        assert!(cell.get_at(t0 + TTL * 2).is_none());
        // Reading at an earlier instant still sees it: nothing was removed.
        assert_eq!(cell.get_at(t0), Some(&1));
    }

    #[test]
    fn invalidate_clears_live_value() {
        let mut cell = ExpiringCell::new(TTL);
        cell.set("x");
        assert!(cell.is_valid());
        cell.invalidate();
        assert!(cell.get().is_none());
    }

    #[test]
    fn update_ttl_extends_live_value() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        cell.set_at(5, t0);

        let later = t0 + Duration::from_secs(5);
        cell.update_ttl_at(Duration::from_secs(60), later);

        assert_eq!(cell.ttl(), Duration::from_secs(60));
        assert_eq!(cell.get_at(later + Duration::from_secs(60)), Some(&5));
        assert!(cell.get_at(later + Duration::from_secs(61)).is_none());
    }

    #[test]
    fn update_ttl_does_not_revive_expired_value() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        cell.set_at(5, t0);

        let after = t0 + TTL + Duration::from_secs(1);
        cell.update_ttl_at(Duration::from_secs(600), after);
        assert!(cell.get_at(after).is_none());
        assert_eq!(cell.ttl(), Duration::from_secs(600));
    }

    #[test]
    fn update_ttl_ignores_zero() {
        let mut cell: ExpiringCell<u8> = ExpiringCell::new(TTL);
        cell.update_ttl(Duration::ZERO);
        assert_eq!(cell.ttl(), TTL);
    }

    #[test]
    fn maximal_ttl_never_expires() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(Duration::MAX);
        cell.set_at(1u8, t0);
        assert_eq!(cell.get_at(t0 + Duration::from_secs(365 * 24 * 3600)), Some(&1));
        assert!(cell.is_valid());
    }

    #[test]
    fn update_ttl_to_maximal_keeps_live_value_forever() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        cell.set_at(9, t0);

        cell.update_ttl_at(Duration::MAX, t0 + Duration::from_secs(1));
        assert_eq!(cell.ttl(), Duration::MAX);
        assert_eq!(cell.get_at(t0 + TTL * 1_000), Some(&9));

        cell.update_ttl_at(TTL, t0 + Duration::from_secs(2));
        assert!(cell.get_at(t0 + TTL * 2).is_none());
    }

    #[test]
    fn get_or_set_fetches_once_while_live() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        let mut calls = 0;

        let first: Result<u32, String> = cell.get_or_set_at(
            || {
                calls += 1;
                Ok(42)
            },
            t0,
        );
        assert_eq!(first, Ok(42));

        let second: Result<u32, String> = cell.get_or_set_at(|| Ok(99), t0 + Duration::from_secs(1));
        assert_eq!(second, Ok(42));
        assert_eq!(calls, 1);
    }

    #[test]
    fn get_or_set_refetches_after_expiry() {
        let t0 = Instant::now();
        let mut cell = ExpiringCell::new(TTL);
        cell.set_at(1, t0);

        let later = t0 + TTL * 2;
        let value: Result<u32, String> = cell.get_or_set_at(|| Ok(2), later);
        assert_eq!(value, Ok(2));
        assert_eq!(cell.get_at(later), Some(&2));
    }

    #[test]
    fn get_or_set_does_not_cache_failures() {
        let mut cell: ExpiringCell<u32> = ExpiringCell::new(TTL);

        let err = cell.get_or_set(|| Err::<u32, _>(anyhow::anyhow!("exchange down")));
        assert_eq!(err.unwrap_err().to_string(), "exchange down");
        assert!(cell.get().is_none());

        let ok: Result<u32, anyhow::Error> = cell.get_or_set(|| Ok(3));
        assert_eq!(ok.unwrap(), 3);
    }
}
