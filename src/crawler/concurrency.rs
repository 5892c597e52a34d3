//! Dual concurrency control
//!
//! Every fetch attempt holds one permit from the global pool and one from
//! its domain's pool. The global permit is always taken first so a task
//! never sits on a scarce per-domain slot while queued behind the global
//! limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// A counting permit pool that also tracks how many permits are out
#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    stats: Arc<InFlightStats>,
    size: usize,
}

#[derive(Debug, Default)]
struct InFlightStats {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl PermitPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            stats: Arc::new(InFlightStats::default()),
            size,
        }
    }

    async fn acquire(&self) -> Result<PoolPermit, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        let now = self.stats.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);
        Ok(PoolPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held
    pub fn in_flight(&self) -> usize {
        self.stats.current.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once so far
    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct PoolPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<InFlightStats>,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        self.stats.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Both permits for one fetch attempt
///
/// Dropping it releases both permits, on every exit path including task
/// cancellation.
#[derive(Debug)]
pub struct FetchPermit {
    // Field order: the domain permit is dropped before the global one
    _domain: PoolPermit,
    _global: PoolPermit,
}

/// Acquires the global permit, then the per-domain permit
///
/// # Errors
///
/// Fails only if one of the pools was closed.
pub async fn acquire_both(
    global: &PermitPool,
    domain: &PermitPool,
) -> Result<FetchPermit, AcquireError> {
    let global_permit = global.acquire().await?;
    let domain_permit = domain.acquire().await?;
    Ok(FetchPermit {
        _domain: domain_permit,
        _global: global_permit,
    })
}
