//! Bounded pool of expensive, fragile resources.
//!
//! Admission goes through a fair semaphore holding `max` permits, so waiters
//! are served first-come-first-served and every handle outside the idle
//! queue is covered by exactly one permit. The idle queue and size counters
//! sit behind one mutex that is never held across an await point.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::error::{EngineError, PoolError};

/// Lifecycle operations the pool needs from whatever it is pooling.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + 'static;

    /// Produce a new resource.
    async fn create(&self) -> Result<Self::Resource, EngineError>;

    /// Dispose of a resource. Errors are logged and otherwise ignored.
    async fn destroy(&self, resource: Self::Resource) -> Result<(), EngineError>;

    /// Health check. `false` means the resource must not be handed out again.
    async fn validate(&self, resource: &mut Self::Resource) -> bool;
}

/// Pool sizing and validation policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Handles kept provisioned even when idle
    pub min: usize,
    /// Upper bound on live handles
    pub max: usize,
    /// Background validation interval, 0 disables the evictor
    pub eviction_interval_ms: u64,
    /// Health-check a handle before putting it back into the idle queue
    pub validate_on_return: bool,
    /// Health-check a handle before giving it to a caller
    pub validate_on_acquire: bool,
    /// Give up waiting for a handle after this long
    pub acquire_timeout_ms: Option<u64>,
    /// Destroy handles idle for longer than this (never below `min`)
    pub idle_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 10,
            eviction_interval_ms: 5000,
            validate_on_return: true,
            validate_on_acquire: true,
            acquire_timeout_ms: None,
            idle_timeout_ms: None,
        }
    }
}

impl PoolConfig {
    pub fn check(&self) -> Result<(), PoolError> {
        if self.max == 0 {
            return Err(PoolError::InvalidConfig("max must be at least 1".to_string()));
        }
        if self.min > self.max {
            return Err(PoolError::InvalidConfig(format!(
                "min ({}) exceeds max ({})",
                self.min, self.max
            )));
        }
        if self.max > Semaphore::MAX_PERMITS || u32::try_from(self.max).is_err() {
            return Err(PoolError::InvalidConfig(format!(
                "max ({}) is too large",
                self.max
            )));
        }
        Ok(())
    }

    pub fn eviction_interval(&self) -> Option<Duration> {
        (self.eviction_interval_ms > 0).then(|| Duration::from_millis(self.eviction_interval_ms))
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Live handles, including ones being created
    pub size: usize,
    /// Idle handles ready for checkout
    pub available: usize,
    /// Handles currently checked out
    pub borrowed: usize,
    /// Callers waiting for a slot
    pub pending: usize,
    pub min: usize,
    pub max: usize,
}

struct IdleEntry<R> {
    id: u64,
    resource: R,
    idle_since: Instant,
}

struct PoolState<R> {
    idle: VecDeque<IdleEntry<R>>,
    /// Live handles plus in-flight creations; handles being destroyed are not counted
    size: usize,
    creating: usize,
}

struct PoolInner<F: ResourceFactory> {
    factory: F,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState<F::Resource>>,
    closed: AtomicBool,
    pending: AtomicUsize,
    next_id: AtomicU64,
    provisioning: tokio::sync::Mutex<()>,
    shutdown: watch::Sender<bool>,
}

/// Resource pool with FIFO admission, validation on checkout/return,
/// background eviction and graceful drain.
pub struct Pool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ResourceFactory> Pool<F> {
    /// Create the pool and start provisioning `min` handles.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, PoolError> {
        config.check()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(PoolInner {
            factory,
            permits: Arc::new(Semaphore::new(config.max)),
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                size: 0,
                creating: 0,
            }),
            closed: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            provisioning: tokio::sync::Mutex::new(()),
            shutdown,
            config,
        });

        if let Some(interval) = inner.config.eviction_interval() {
            tokio::spawn(run_evictor(Arc::downgrade(&inner), interval, shutdown_rx));
        }

        if inner.config.min > 0 {
            let weak = Arc::downgrade(&inner);
            tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    if let Err(e) = inner.ensure_minimum().await {
                        tracing::warn!(error = %e, "Initial pool provisioning failed");
                    }
                }
            });
        }

        tracing::debug!(
            min = inner.config.min,
            max = inner.config.max,
            "Renderer pool created"
        );

        Ok(Self { inner })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Resolve once `min` handles are provisioned.
    pub async fn ready(&self) -> Result<(), PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::Closed);
        }
        self.inner.ensure_minimum().await?;
        tracing::info!(size = self.stats().size, "Renderer pool ready");
        Ok(())
    }

    /// Check out a validated handle, waiting in line if the pool is at capacity.
    pub async fn acquire(&self) -> Result<Pooled<F>, PoolError> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = {
            let _waiting = PendingGuard::enter(&inner.pending);
            let wait = inner.permits.clone().acquire_owned();
            let acquired = match inner.config.acquire_timeout() {
                Some(limit) => tokio::time::timeout(limit, wait)
                    .await
                    .map_err(|_| PoolError::Timeout(limit))?,
                None => wait.await,
            };
            acquired.map_err(|_| PoolError::Closed)?
        };

        loop {
            if inner.is_closed() {
                return Err(PoolError::Closed);
            }

            let idle = {
                let mut state = inner.state();
                let entry = state.idle.pop_front();
                if entry.is_none() {
                    state.size += 1;
                    state.creating += 1;
                }
                entry
            };

            let mut lease = match idle {
                Some(entry) => Pooled::new(inner.clone(), entry.id, entry.resource),
                None => {
                    let reservation = Reservation {
                        inner: inner.as_ref(),
                        armed: true,
                    };
                    let resource = inner.factory.create().await.map_err(|e| {
                        tracing::warn!(error = %e, "Failed to create renderer");
                        PoolError::Creation(e)
                    })?;
                    reservation.commit();
                    let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(id, "Renderer created");
                    Pooled::new(inner.clone(), id, resource)
                }
            };

            if inner.config.validate_on_acquire {
                let healthy = match lease.resource.as_mut() {
                    Some(resource) => inner.factory.validate(resource).await,
                    None => false,
                };
                if !healthy {
                    tracing::warn!(id = lease.id, "Renderer failed validation on checkout");
                    lease.destroy().await;
                    continue;
                }
            }

            lease.permit = Some(permit);
            tracing::debug!(id = lease.id, "Renderer checked out");
            return Ok(lease);
        }
    }

    /// Stop admitting callers, wait for every checked-out handle to come back,
    /// then dispose of all idle handles.
    pub async fn drain(&self) {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::SeqCst);
        inner.shutdown.send_replace(true);
        tracing::info!(stats = ?self.stats(), "Draining renderer pool");

        // Queued waiters are served first, see the closed flag and hand their
        // permits straight back.
        let max = u32::try_from(inner.config.max).unwrap_or(u32::MAX);
        let all_permits = inner.permits.acquire_many(max).await;
        inner.permits.close();

        let idle: Vec<_> = {
            let mut state = inner.state();
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.size = state.size.saturating_sub(idle.len());
            idle
        };
        for entry in idle {
            inner.dispose(entry.id, entry.resource).await;
        }

        drop(all_permits);
        tracing::info!("Renderer pool drained");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state();
        PoolStats {
            size: state.size,
            available: state.idle.len(),
            borrowed: state
                .size
                .saturating_sub(state.idle.len())
                .saturating_sub(state.creating),
            pending: self.inner.pending.load(Ordering::SeqCst),
            min: self.inner.config.min,
            max: self.inner.config.max,
        }
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    fn state(&self) -> MutexGuard<'_, PoolState<F::Resource>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remove a handle from the live count. Must happen before disposal starts.
    fn detach(&self) {
        let mut state = self.state();
        state.size = state.size.saturating_sub(1);
    }

    async fn dispose(&self, id: u64, resource: F::Resource) {
        match self.factory.destroy(resource).await {
            Ok(()) => tracing::debug!(id, "Renderer destroyed"),
            Err(e) => tracing::warn!(id, error = %e, "Failed to dispose renderer, ignoring"),
        }
    }

    async fn destroy_resource(&self, id: u64, resource: F::Resource) {
        self.detach();
        self.dispose(id, resource).await;
    }

    fn push_idle(&self, id: u64, resource: F::Resource, idle_since: Instant) {
        self.state().idle.push_back(IdleEntry {
            id,
            resource,
            idle_since,
        });
    }

    /// Create handles until the pool holds `min`. Only uses free capacity.
    async fn ensure_minimum(&self) -> Result<(), PoolError> {
        let _provisioning = self.provisioning.lock().await;

        loop {
            if self.is_closed() {
                return Ok(());
            }
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                return Ok(());
            };

            {
                let mut state = self.state();
                if state.size >= self.config.min {
                    return Ok(());
                }
                state.size += 1;
                state.creating += 1;
            }

            let reservation = Reservation {
                inner: self,
                armed: true,
            };
            let resource = self.factory.create().await.map_err(PoolError::Creation)?;
            reservation.commit();

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            self.push_idle(id, resource, Instant::now());
            tracing::debug!(id, "Renderer provisioned");
            drop(permit);
        }
    }

    /// Validate idle handles, destroying broken ones and ones past the idle timeout.
    async fn evict(&self) {
        let rounds = self.state().idle.len();

        for _ in 0..rounds {
            if self.is_closed() {
                return;
            }
            // A busy pool has no idle handles to spare.
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                return;
            };

            let (entry, expired) = {
                let mut state = self.state();
                let Some(entry) = state.idle.pop_front() else {
                    return;
                };
                let expired = self
                    .config
                    .idle_timeout()
                    .is_some_and(|limit| entry.idle_since.elapsed() >= limit)
                    && state.size > self.config.min;
                (entry, expired)
            };

            let IdleEntry {
                id,
                mut resource,
                idle_since,
            } = entry;

            if expired {
                tracing::debug!(id, "Evicting renderer past idle timeout");
                self.destroy_resource(id, resource).await;
            } else if self.factory.validate(&mut resource).await {
                self.push_idle(id, resource, idle_since);
            } else {
                tracing::warn!(id, "Idle renderer failed validation, evicting");
                self.destroy_resource(id, resource).await;
            }

            drop(permit);
        }
    }
}

async fn run_evictor<F: ResourceFactory>(
    pool: Weak<PoolInner<F>>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(inner) = pool.upgrade() else {
            break;
        };
        if inner.is_closed() {
            break;
        }

        inner.evict().await;
        if let Err(e) = inner.ensure_minimum().await {
            tracing::warn!(error = %e, "Failed to replenish renderer pool");
        }
    }

    tracing::debug!("Renderer evictor stopped");
}

/// Size slot reserved for a handle that is still being created.
struct Reservation<'a, F: ResourceFactory> {
    inner: &'a PoolInner<F>,
    armed: bool,
}

impl<F: ResourceFactory> Reservation<'_, F> {
    fn commit(mut self) {
        self.armed = false;
        let mut state = self.inner.state();
        state.creating = state.creating.saturating_sub(1);
    }
}

impl<F: ResourceFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state();
            state.size = state.size.saturating_sub(1);
            state.creating = state.creating.saturating_sub(1);
        }
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A checked-out handle.
///
/// End the lease with [`Pooled::release`] or [`Pooled::destroy`]. A lease
/// dropped without either is treated as abandoned mid-use: the handle is
/// destroyed in the background.
pub struct Pooled<F: ResourceFactory> {
    id: u64,
    resource: Option<F::Resource>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> Pooled<F> {
    fn new(pool: Arc<PoolInner<F>>, id: u64, resource: F::Resource) -> Self {
        Self {
            id,
            resource: Some(resource),
            permit: None,
            pool,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return the handle to the idle queue, or destroy it if it fails validation.
    ///
    /// The resource stays inside the lease while it is validated, so a
    /// release cancelled at that point ends as an abandoned lease.
    pub async fn release(mut self) {
        let pool = self.pool.clone();

        if pool.config.validate_on_return {
            let healthy = match self.resource.as_mut() {
                Some(resource) => pool.factory.validate(resource).await,
                None => return,
            };
            if !healthy {
                tracing::warn!(id = self.id, "Renderer failed validation on return, destroying");
                self.destroy().await;
                return;
            }
        }

        let Some(resource) = self.resource.take() else {
            return;
        };
        pool.push_idle(self.id, resource, Instant::now());
        tracing::debug!(id = self.id, "Renderer returned to pool");
        // The permit is dropped with `self`, after the handle is back in the queue.
    }

    /// Remove the handle from the pool and dispose of it, regardless of health.
    ///
    /// Disposal runs on its own task and completes even if this future is dropped.
    pub async fn destroy(mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        let id = self.id;
        let pool = self.pool.clone();
        let permit = self.permit.take();

        pool.detach();
        let disposal = tokio::spawn(async move {
            pool.dispose(id, resource).await;
            drop(permit);
        });
        if let Err(e) = disposal.await {
            tracing::warn!(id, error = %e, "Renderer disposal task failed");
        }
    }

    /// [`Pooled::release`] on a background task, for callers that cannot await.
    pub fn release_in_background(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(self.release());
            }
            Err(_) => drop(self),
        }
    }

    /// [`Pooled::destroy`] on a background task, for callers that cannot await.
    pub fn destroy_in_background(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(self.destroy());
            }
            Err(_) => drop(self),
        }
    }
}

impl<F: ResourceFactory> Deref for Pooled<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        self.resource
            .as_ref()
            .expect("pooled resource is present until the lease ends")
    }
}

impl<F: ResourceFactory> DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource
            .as_mut()
            .expect("pooled resource is present until the lease ends")
    }
}

impl<F: ResourceFactory> Drop for Pooled<F> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };

        tracing::warn!(id = self.id, "Renderer lease abandoned, destroying");
        self.pool.detach();

        let id = self.id;
        let pool = self.pool.clone();
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    pool.dispose(id, resource).await;
                    drop(permit);
                });
            }
            Err(_) => drop(resource),
        }
    }
}
