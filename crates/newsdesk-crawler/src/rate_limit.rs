//! Per-host request limiting.
//!
//! Each host gets its own semaphore, so a busy host can only exhaust its own
//! permits. Permits are RAII guards: dropping a [`HostPermit`] on any exit
//! path, including a panic in the holder, returns the slot.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{AcquireError, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

struct HostSlot {
    permits: Arc<Semaphore>,
    /// Earliest instant the next request to this host may start.
    next_start: Mutex<Instant>,
}

#[derive(Clone)]
pub struct HostRateLimiter {
    slots: Arc<DashMap<String, Arc<HostSlot>>>,
    per_host: usize,
    min_spacing: Duration,
}

/// Proof that the holder may issue one request to `host`.
#[derive(Debug)]
pub struct HostPermit {
    host: String,
    _permit: OwnedSemaphorePermit,
}

impl HostPermit {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl HostRateLimiter {
    #[must_use]
    pub fn new(per_host: usize, min_spacing: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            per_host: per_host.max(1),
            min_spacing,
        }
    }

    /// Wait for a free slot on `host` and for its spacing window to open.
    ///
    /// # Errors
    ///
    /// Returns `AcquireError` only if the host's semaphore was closed.
    pub async fn acquire(&self, host: &str) -> Result<HostPermit, AcquireError> {
        let slot = self.slot(host);
        let permit = Arc::clone(&slot.permits).acquire_owned().await?;

        let start = {
            let mut next_start = slot.next_start.lock().await;
            let start = (*next_start).max(Instant::now());
            *next_start = start + self.min_spacing;
            start
        };
        tokio::time::sleep_until(start).await;

        tracing::trace!(host, "host permit acquired");
        Ok(HostPermit {
            host: host.to_owned(),
            _permit: permit,
        })
    }

    /// Return a permit early. Dropping it has the same effect.
    pub fn release(&self, permit: HostPermit) {
        tracing::trace!(host = %permit.host, "host permit released");
        drop(permit);
    }

    /// Permits currently held for `host`.
    #[must_use]
    pub fn in_flight(&self, host: &str) -> usize {
        self.slots
            .get(host)
            .map_or(0, |slot| self.per_host - slot.permits.available_permits())
    }

    fn slot(&self, host: &str) -> Arc<HostSlot> {
        self.slots
            .entry(host.to_owned())
            .or_insert_with(|| {
                Arc::new(HostSlot {
                    permits: Arc::new(Semaphore::new(self.per_host)),
                    next_start: Mutex::new(Instant::now()),
                })
            })
            .clone()
    }
}
