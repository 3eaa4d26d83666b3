//! Bounded pool of render contexts.
//!
//! Constructing a render context loads a style and initialises a renderer,
//! so contexts are built lazily and reused across requests. At most
//! `capacity` contexts ever exist at once.
//!
//! # Borrowing
//!
//! [`RenderContextPool::acquire`] waits for a semaphore permit (tokio
//! semaphores are fair, so waiters are served in arrival order), then takes
//! an idle context or builds a new one. The caller receives a
//! [`PooledContext`] guard; dropping it returns the context to the idle set
//! before the permit is released, so release happens on every exit path,
//! including errors, panics and cancelled futures.
//!
//! Every context is either idle or attached to exactly one permit holder,
//! and a holder only constructs after finding the idle set empty. Together
//! with the permit count this bounds live contexts by the capacity.
//!
//! # Example
//!
//! ```ignore
//! let pool = RenderContextPool::new(factory, PoolConfig::default());
//!
//! let mut context = pool.acquire().await?;
//! let raw = context.render(&request)?;
//! drop(context); // back to the idle set
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::error::PoolError;

use super::context::ContextFactory;

/// Default maximum number of live contexts.
pub const DEFAULT_POOL_SIZE: usize = 32;

// =============================================================================
// Configuration
// =============================================================================

/// Sizing and wait policy for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of contexts that may exist at once
    pub max_size: usize,

    /// How long `acquire` may wait for a free slot (`None` = forever)
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_SIZE,
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub created: usize,
    pub idle: usize,
    pub in_use: usize,
    pub peak_in_use: usize,
    pub acquisitions: u64,
    pub construction_failures: u64,
}

// =============================================================================
// Pool
// =============================================================================

struct PoolInner<F: ContextFactory> {
    factory: F,
    capacity: usize,
    acquire_timeout: Option<Duration>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<F::Context>>,
    created: AtomicUsize,
    in_use: AtomicUsize,
    peak_in_use: AtomicUsize,
    acquisitions: AtomicU64,
    construction_failures: AtomicU64,
}

impl<F: ContextFactory> PoolInner<F> {
    /// Lock the idle set, recovering from a poisoned lock.
    fn idle(&self) -> MutexGuard<'_, Vec<F::Context>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn destroy(&self, context: F::Context) {
        self.created.fetch_sub(1, Ordering::SeqCst);
        self.factory.destroy(context);
    }

    fn mark_in_use(&self) {
        let current = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_use.fetch_max(current, Ordering::SeqCst);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Build a context for a slot the caller already holds a permit for.
    ///
    /// Runs on a blocking thread. The guard is assembled here so that a
    /// caller abandoning the acquire still returns the fresh context to the
    /// idle set instead of leaking it.
    fn construct(
        self: Arc<Self>,
        permit: OwnedSemaphorePermit,
    ) -> Result<PooledContext<F>, PoolError> {
        match self.factory.create() {
            Ok(context) => {
                let created = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(created, capacity = self.capacity, "Constructed render context");
                self.mark_in_use();
                Ok(PooledContext {
                    context: Some(context),
                    pool: self,
                    _permit: permit,
                    discard: false,
                })
            }
            Err(e) => {
                self.construction_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Render context construction failed");
                drop(permit);
                Err(PoolError::Construction(e.to_string()))
            }
        }
    }
}

/// A bounded, lazily-filled pool of render contexts.
///
/// Cloning is cheap and shares the same pool.
pub struct RenderContextPool<F: ContextFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ContextFactory> Clone for RenderContextPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ContextFactory> RenderContextPool<F> {
    /// Create an empty pool. No context is built until the first acquire.
    ///
    /// A `max_size` of zero is raised to one.
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let capacity = config.max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                capacity,
                acquire_timeout: config.acquire_timeout,
                semaphore: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(Vec::with_capacity(capacity)),
                created: AtomicUsize::new(0),
                in_use: AtomicUsize::new(0),
                peak_in_use: AtomicUsize::new(0),
                acquisitions: AtomicU64::new(0),
                construction_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Borrow a context, waiting for a free slot if the pool is saturated.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Unavailable`] if the wait budget runs out
    /// - [`PoolError::Construction`] if a fresh context cannot be built; the
    ///   slot returns to "not yet constructed" so a later acquire may retry
    /// - [`PoolError::Closed`] after [`shutdown`](Self::shutdown)
    pub async fn acquire(&self) -> Result<PooledContext<F>, PoolError> {
        let permit = self.acquire_permit().await?;

        let idle = self.inner.idle().pop();
        if let Some(context) = idle {
            self.inner.mark_in_use();
            return Ok(PooledContext {
                context: Some(context),
                pool: Arc::clone(&self.inner),
                _permit: permit,
                discard: false,
            });
        }

        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.construct(permit))
            .await
            .map_err(|e| PoolError::Construction(format!("constructor aborted: {}", e)))?
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        let semaphore = Arc::clone(&self.inner.semaphore);

        match self.inner.acquire_timeout {
            None => semaphore
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed),
            Some(timeout) => match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
                Ok(permit) => permit.map_err(|_| PoolError::Closed),
                Err(_) => {
                    warn!(
                        capacity = self.inner.capacity,
                        timeout_ms = timeout.as_millis() as u64,
                        "Timed out waiting for a render context"
                    );
                    Err(PoolError::Unavailable {
                        capacity: self.inner.capacity,
                        timeout,
                    })
                }
            },
        }
    }

    /// Return a borrowed context to the pool.
    ///
    /// Equivalent to dropping the guard.
    pub fn release(&self, context: PooledContext<F>) {
        drop(context);
    }

    /// Wait for every borrowed context to come back, then destroy all
    /// contexts and refuse further acquires.
    pub async fn shutdown(&self) {
        let permits = match self
            .inner
            .semaphore
            .acquire_many(self.inner.capacity as u32)
            .await
        {
            Ok(permits) => permits,
            Err(_) => return,
        };
        self.inner.semaphore.close();

        let drained: Vec<F::Context> = self.inner.idle().drain(..).collect();
        let count = drained.len();
        for context in drained {
            self.inner.destroy(context);
        }
        drop(permits);

        info!(destroyed = count, "Render context pool shut down");
    }

    /// Whether the pool has been shut down.
    pub fn is_closed(&self) -> bool {
        self.inner.semaphore.is_closed()
    }

    /// Maximum number of contexts.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Current bookkeeping snapshot.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.capacity,
            created: self.inner.created.load(Ordering::SeqCst),
            idle: self.inner.idle().len(),
            in_use: self.inner.in_use.load(Ordering::SeqCst),
            peak_in_use: self.inner.peak_in_use.load(Ordering::SeqCst),
            acquisitions: self.inner.acquisitions.load(Ordering::Relaxed),
            construction_failures: self.inner.construction_failures.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Pooled Context Guard
// =============================================================================

/// A context borrowed from a [`RenderContextPool`].
///
/// Dereferences to the context. Dropping the guard returns the context to
/// the idle set; a guard dropped while its thread panics destroys the
/// context instead, since its internal state can no longer be trusted.
pub struct PooledContext<F: ContextFactory> {
    context: Option<F::Context>,
    pool: Arc<PoolInner<F>>,
    _permit: OwnedSemaphorePermit,
    discard: bool,
}

impl<F: ContextFactory> PooledContext<F> {
    /// Destroy the context instead of returning it, freeing the slot for a
    /// fresh construction.
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl<F: ContextFactory> Deref for PooledContext<F> {
    type Target = F::Context;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the context out.
        self.context.as_ref().expect("pooled context present until drop")
    }
}

impl<F: ContextFactory> DerefMut for PooledContext<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context.as_mut().expect("pooled context present until drop")
    }
}

impl<F: ContextFactory> Drop for PooledContext<F> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if self.discard || std::thread::panicking() || self.pool.semaphore.is_closed() {
                self.pool.destroy(context);
            } else {
                self.pool.idle().push(context);
            }
        }
        self.pool.in_use.fetch_sub(1, Ordering::SeqCst);
        // `_permit` is released after this body, once the context is idle
    }
}

// =============================================================================
// Tests
// =============================================================================
