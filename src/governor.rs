//! Resource governor
//!
//! Independently bounded task pools per category of work, sized from the
//! device profile. Saturated pools queue without limit unless a queue limit
//! is configured; past it the submission is refused and every pool degrades
//! to a single worker. Critical submissions skip both the bound and the limit.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::task::AbortHandle;

use crate::device::DeviceProfile;
use crate::{Error, Result};

/// Category of work, each with its own pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Model inference
    Inference,
    /// Audio capture and playback
    Audio,
    /// Remote calls
    Network,
    /// Disk access
    FileIo,
    /// Everything else, including action execution
    General,
}

impl TaskCategory {
    /// All categories in pool order
    pub const ALL: [Self; 5] = [
        Self::Inference,
        Self::Audio,
        Self::Network,
        Self::FileIo,
        Self::General,
    ];

    /// Snake-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inference => "inference",
            Self::Audio => "audio",
            Self::Network => "network",
            Self::FileIo => "file_io",
            Self::General => "general",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Inference => 0,
            Self::Audio => 1,
            Self::Network => 2,
            Self::FileIo => 3,
            Self::General => 4,
        }
    }

    const fn default_request(self) -> usize {
        match self {
            Self::Inference | Self::FileIo => 2,
            Self::Audio => 1,
            Self::Network | Self::General => 4,
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested concurrency per category, capped by the device budget
#[derive(Debug, Clone, Default)]
pub struct GovernorConfig {
    /// Overrides for the built-in requests
    pub requested: HashMap<TaskCategory, usize>,

    /// Tasks allowed to wait for a worker in one pool; unbounded when `None`
    pub max_queued: Option<usize>,
}

impl GovernorConfig {
    /// Requested workers for a category
    #[must_use]
    pub fn requested(&self, category: TaskCategory) -> usize {
        self.requested
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_request())
    }
}

/// Snapshot of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Current worker bound
    pub capacity: usize,
    /// Tasks holding a worker (critical tasks included)
    pub in_flight: usize,
    /// Tasks waiting for a worker
    pub queued: usize,
}

struct Pool {
    semaphore: Arc<Semaphore>,
    capacity: AtomicUsize,
    /// Permits still held by running tasks that must be forgotten on release
    debt: AtomicUsize,
    in_flight: AtomicUsize,
    queued: AtomicUsize,
}

impl Pool {
    fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity: AtomicUsize::new(capacity),
            debt: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    fn release(&self, permit: OwnedSemaphorePermit) {
        let owed = self
            .debt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1))
            .is_ok();
        if owed {
            permit.forget();
        }
    }

    fn shrink_to(&self, target: usize) {
        let current = self.capacity.load(Ordering::SeqCst);
        if current <= target {
            return;
        }
        let excess = current - target;
        let forgotten = self.semaphore.forget_permits(excess);
        self.debt.fetch_add(excess - forgotten, Ordering::SeqCst);
        self.capacity.store(target, Ordering::SeqCst);
    }

    fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            capacity: self.capacity.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
        }
    }
}

struct Tracked {
    category: TaskCategory,
    abort: AbortHandle,
}

struct Inner {
    pools: [Pool; 5],
    tasks: Mutex<HashMap<u64, Tracked>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    degraded: AtomicBool,
    max_queued: Option<usize>,
    idle: Notify,
}

impl Inner {
    const fn pool(&self, category: TaskCategory) -> &Pool {
        &self.pools[category.index()]
    }

    fn finish(&self, id: u64) {
        let empty = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.remove(&id);
            tasks.is_empty()
        };
        if empty {
            self.idle.notify_waiters();
        }
    }
}

/// Bookkeeping for one submitted task, settled on drop
///
/// Dropped when the task completes, panics or is aborted, even before its
/// first poll.
struct TaskGuard {
    inner: Arc<Inner>,
    id: u64,
    category: TaskCategory,
    permit: Option<OwnedSemaphorePermit>,
    running: bool,
}

impl TaskGuard {
    fn new(inner: Arc<Inner>, id: u64, category: TaskCategory) -> Self {
        inner.pool(category).queued.fetch_add(1, Ordering::SeqCst);
        Self {
            inner,
            id,
            category,
            permit: None,
            running: false,
        }
    }

    fn start(&mut self) {
        let pool = self.inner.pool(self.category);
        pool.queued.fetch_sub(1, Ordering::SeqCst);
        pool.in_flight.fetch_add(1, Ordering::SeqCst);
        self.running = true;
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let pool = self.inner.pool(self.category);
        if self.running {
            pool.in_flight.fetch_sub(1, Ordering::SeqCst);
        } else {
            pool.queued.fetch_sub(1, Ordering::SeqCst);
        }
        if let Some(permit) = self.permit.take() {
            pool.release(permit);
        }
        self.inner.finish(self.id);
    }
}

/// Awaitable result of a submitted task
pub struct TaskHandle<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T>>,
    abort: AbortHandle,
}

impl<T> TaskHandle<T> {
    /// Governor-assigned task id
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the task; awaiting the handle then yields `TaskFailed`
    pub fn abort(&self) {
        self.abort.abort();
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(Error::TaskFailed(format!("task {id} was cancelled"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Bounded task pools shared by every component
#[derive(Clone)]
pub struct ResourceGovernor {
    inner: Arc<Inner>,
}

impl ResourceGovernor {
    /// Create pools sized `min(device budget, requested)` per category
    #[must_use]
    pub fn new(profile: &DeviceProfile, config: &GovernorConfig) -> Self {
        let pools = TaskCategory::ALL.map(|category| {
            let size = profile.budget(category).min(config.requested(category)).max(1);
            Pool::new(size)
        });

        tracing::debug!(
            tier = %profile.tier,
            inference = pools[0].capacity.load(Ordering::SeqCst),
            network = pools[2].capacity.load(Ordering::SeqCst),
            general = pools[4].capacity.load(Ordering::SeqCst),
            "resource governor initialized"
        );

        Self {
            inner: Arc::new(Inner {
                pools,
                tasks: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                max_queued: config.max_queued.map(|limit| limit.max(1)),
                idle: Notify::new(),
            }),
        }
    }

    /// Submit a task to a category pool
    ///
    /// Returns as soon as the task is admitted; it waits for a worker if the
    /// pool is saturated.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has begun, or `ResourceExhausted`
    /// if a queue limit is configured and the pool's queue is full
    pub fn submit<F, T>(&self, category: TaskCategory, task: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn(category, task, false)
    }

    /// Submit a task that runs immediately, outside the pool bound
    ///
    /// Used for emergency work, which must never wait behind saturation or
    /// degradation.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has begun
    pub fn submit_critical<F, T>(&self, category: TaskCategory, task: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn(category, task, true)
    }

    fn spawn<F, T>(&self, category: TaskCategory, task: F, critical: bool) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        if !critical {
            let queued = self.inner.pool(category).queued.load(Ordering::SeqCst);
            if self.inner.max_queued.is_some_and(|limit| queued >= limit) {
                tracing::warn!(category = %category, queued, "task queue full");
                self.degrade();
                return Err(Error::ResourceExhausted(format!("{category} queue full")));
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let guard = TaskGuard::new(Arc::clone(&self.inner), id, category);

        let wrapped = async move {
            let mut guard = guard;
            if !critical {
                let semaphore = Arc::clone(&guard.inner.pool(category).semaphore);
                match semaphore.acquire_owned().await {
                    Ok(permit) => guard.permit = Some(permit),
                    Err(_) => {
                        let _ = tx.send(Err(Error::ShuttingDown));
                        return;
                    }
                }
            }
            guard.start();

            let result = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|_| Error::TaskFailed(format!("task {id} panicked")));
            let _ = tx.send(result);
        };

        // Hold the registry lock across spawn so the task cannot finish
        // before it is registered
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let join = tokio::spawn(wrapped);
        let abort = join.abort_handle();
        tasks.insert(
            id,
            Tracked {
                category,
                abort: join.abort_handle(),
            },
        );
        drop(tasks);

        tracing::trace!(task_id = id, category = %category, critical, "task submitted");

        Ok(TaskHandle { id, rx, abort })
    }

    /// Shrink every pool to a single worker
    ///
    /// Running tasks keep their workers; critical submissions are unaffected.
    pub fn degrade(&self) {
        if self.inner.degraded.swap(true, Ordering::SeqCst) {
            return;
        }
        for pool in &self.inner.pools {
            pool.shrink_to(1);
        }
        tracing::warn!("resources exhausted, task pools degraded to one worker");
    }

    /// Whether `degrade` has been applied
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of a category pool
    #[must_use]
    pub fn metrics(&self, category: TaskCategory) -> PoolMetrics {
        self.inner.pool(category).metrics()
    }

    /// Number of tasks submitted and not yet finished
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop accepting work, wait for running tasks, then abort stragglers
    ///
    /// Tasks still waiting for a worker are dropped with `ShuttingDown`.
    /// Returns the number of tasks aborted after the grace period.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        for pool in &self.inner.pools {
            pool.semaphore.close();
        }

        tracing::info!(
            active = self.active_tasks(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "resource governor shutting down"
        );

        if tokio::time::timeout(grace, self.wait_idle()).await.is_ok() {
            tracing::debug!("all governed tasks finished");
            return 0;
        }

        let stragglers: Vec<(u64, Tracked)> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (id, tracked) in &stragglers {
            tracing::warn!(
                task_id = id,
                category = %tracked.category,
                "task did not finish within grace period, aborting"
            );
            tracked.abort.abort();
        }

        stragglers.len()
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.active_tasks() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceTier;

    fn governor(tier: DeviceTier) -> ResourceGovernor {
        ResourceGovernor::new(&DeviceProfile::for_tier(tier), &GovernorConfig::default())
    }

    #[test]
    fn test_capacity_is_min_of_budget_and_request() {
        let gov = governor(DeviceTier::Elite);
        assert_eq!(gov.metrics(TaskCategory::Inference).capacity, 2);
        assert_eq!(gov.metrics(TaskCategory::Network).capacity, 4);
        assert_eq!(gov.metrics(TaskCategory::Audio).capacity, 1);

        let low = governor(DeviceTier::Low);
        assert_eq!(low.metrics(TaskCategory::General).capacity, 1);
    }

    #[tokio::test]
    async fn test_submit_returns_value() {
        let gov = governor(DeviceTier::Mid);
        let handle = gov.submit(TaskCategory::General, async { 21 * 2 }).unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_saturated_pool_queues() {
        let gov = governor(DeviceTier::Low);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = gov
            .submit(TaskCategory::Inference, async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                1
            })
            .unwrap();
        started_rx.await.unwrap();

        let second = gov.submit(TaskCategory::Inference, async { 2 }).unwrap();
        let metrics = gov.metrics(TaskCategory::Inference);
        assert_eq!(metrics.in_flight, 1);
        assert_eq!(metrics.queued, 1);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 2);
        assert_eq!(gov.metrics(TaskCategory::Inference).queued, 0);
    }

    #[tokio::test]
    async fn test_critical_bypasses_saturation() {
        let gov = governor(DeviceTier::Low);
        let (_release_tx, release_rx) = oneshot::channel::<()>();
        let _blocker = gov
            .submit(TaskCategory::Network, async move {
                let _ = release_rx.await;
            })
            .unwrap();

        let critical = gov
            .submit_critical(TaskCategory::Network, async { "dialed" })
            .unwrap();
        let out = tokio::time::timeout(Duration::from_secs(1), critical)
            .await
            .expect("critical task must not wait for a worker");
        assert_eq!(out.unwrap(), "dialed");
    }

    #[tokio::test]
    async fn test_panic_surfaces_as_task_failed() {
        let gov = governor(DeviceTier::Mid);
        let handle = gov
            .submit(TaskCategory::General, async {
                let empty: Vec<u8> = Vec::new();
                empty[1]
            })
            .unwrap();
        assert!(matches!(handle.await, Err(Error::TaskFailed(_))));
        assert_eq!(gov.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let gov = governor(DeviceTier::Mid);
        assert_eq!(gov.shutdown(Duration::from_millis(10)).await, 0);
        assert!(gov.is_shut_down());
        assert!(matches!(
            gov.submit(TaskCategory::General, async {}),
            Err(Error::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stragglers() {
        let gov = governor(DeviceTier::Mid);
        let stuck = gov
            .submit(TaskCategory::General, futures::future::pending::<()>())
            .unwrap();
        let quick = gov.submit(TaskCategory::General, async { 7 }).unwrap();
        assert_eq!(quick.await.unwrap(), 7);

        let aborted = gov.shutdown(Duration::from_millis(50)).await;
        assert_eq!(aborted, 1);
        assert!(matches!(stuck.await, Err(Error::TaskFailed(_))));
    }

    #[tokio::test]
    async fn test_degrade_shrinks_pools() {
        let gov = governor(DeviceTier::Elite);
        gov.degrade();
        assert!(gov.is_degraded());
        for category in TaskCategory::ALL {
            assert_eq!(gov.metrics(category).capacity, 1);
        }
        let handle = gov.submit(TaskCategory::Network, async { true }).unwrap();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_full_queue_refuses_and_degrades() {
        let config = GovernorConfig {
            max_queued: Some(1),
            ..GovernorConfig::default()
        };
        let gov = ResourceGovernor::new(&DeviceProfile::for_tier(DeviceTier::Low), &config);
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let _running = gov
            .submit(TaskCategory::Network, async move {
                let _ = started_tx.send(());
                futures::future::pending::<()>().await;
            })
            .unwrap();
        started_rx.await.unwrap();
        let _waiting = gov.submit(TaskCategory::Network, async {}).unwrap();

        let refused = gov.submit(TaskCategory::Network, async {});
        assert!(matches!(refused, Err(Error::ResourceExhausted(_))));
        assert!(gov.is_degraded());

        let critical = gov.submit_critical(TaskCategory::Network, async { 1 }).unwrap();
        assert_eq!(critical.await.unwrap(), 1);
    }
}
