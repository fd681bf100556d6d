use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info};

use crate::metrics::LIMITER_ENTRIES;

/// Admission decision for a caller identity.
///
/// `true` admits the request and consumes one token of the identity's
/// current window; `false` leaves the limiter untouched.
pub trait Limiter: Send + Sync {
    fn allow_request_from(&self, identity: &str) -> bool;
}

// Rate limit entry - remaining tokens per identity
// expires_at is None when now + window does not fit in an Instant
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub remaining: u32,
    pub expires_at: Option<Instant>,
}

impl RateLimitEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

// Longest pause between janitor sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fixed-window counter keyed by caller identity.
///
/// Each identity owns an independent window that starts over whenever a
/// token is consumed. Denials never write to the map, so identities with
/// no quota left (or a zero limit) cost no memory.
pub struct FixedWindowLimiter {
    entries: DashMap<String, RateLimitEntry>,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            limit,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn expiry_from(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.window)
    }

    // Number of entries currently held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

impl Limiter for FixedWindowLimiter {
    fn allow_request_from(&self, identity: &str) -> bool {
        let now = Instant::now();

        // entry() holds the shard lock until the match ends, so the
        // read-check-decrement below is atomic for this identity
        match self.entries.entry(identity.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let available = if entry.is_expired(now) {
                    self.limit
                } else {
                    entry.remaining
                };

                if available == 0 {
                    debug!(identity, "quota exhausted");
                    return false;
                }

                entry.remaining = available - 1;
                entry.expires_at = self.expiry_from(now);
                true
            }
            Entry::Vacant(vacant) => {
                if self.limit == 0 {
                    debug!(identity, "zero quota configured");
                    return false;
                }

                vacant.insert(RateLimitEntry {
                    remaining: self.limit - 1,
                    expires_at: self.expiry_from(now),
                });
                true
            }
        }
    }
}

// Janitor - sweeps expired entries every two windows until shutdown
pub async fn janitor(limiter: Arc<FixedWindowLimiter>, mut shutdown: watch::Receiver<bool>) {
    let period = limiter
        .window()
        .saturating_mul(2)
        .clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);
    let mut ticker = interval(period);

    info!(interval = ?period, "limiter janitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.purge_expired();
                LIMITER_ENTRIES.set(limiter.len() as f64);
                if removed > 0 {
                    debug!(removed, "purged expired limiter entries");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("limiter janitor stopped");
}
