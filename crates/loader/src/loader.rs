//! Image load orchestration.
//!
//! The loader ties the pipeline together: cache lookup, de-duplication of
//! concurrent requests per key, decode on a worker pool, admission against
//! the memory budget, cache insertion, and delivery of one result to every
//! waiter. It also exposes cooperative cancellation and bounded best-effort
//! preloading.

use crate::cancel::CancellationToken;
use crate::decode::{DecodeBackend, RasterDecoder};
use crate::error::{LoadError, LoadResult};
use crate::queue::{LoadPriority, LoadQueue};
use crate::resolver::{FsResolver, ResourceResolver};
use lightbox_cache::{format_bytes, ImageCache, ImageKey, MemoryBudgetManager};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the loader's decode worker pool.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of decode worker threads.
    /// Default: number of logical CPU cores.
    pub num_workers: usize,

    /// Maximum time an idle worker waits before re-checking the queue.
    /// Default: 25ms.
    pub poll_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus(),
            poll_interval: Duration::from_millis(25),
        }
    }
}

impl LoaderConfig {
    /// Create a configuration with an explicit worker count.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Set the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

type SubscriberId = u64;

/// One in-flight request per key; holds everyone waiting on it.
struct PendingLoad {
    subscribers: Vec<(SubscriberId, mpsc::Sender<LoadResult>)>,
    token: CancellationToken,

    /// Set by the worker that takes the job; a second queue entry for the
    /// same key (a priority bump) finds it set and skips.
    claimed: bool,

    /// Preload-originated: stays alive with zero subscribers, and an empty
    /// subscriber set never aborts it.
    detached: bool,
}

struct LoaderShared {
    cache: Arc<ImageCache>,
    budget: Arc<MemoryBudgetManager>,
    resolver: Arc<dyn ResourceResolver>,
    decoder: Arc<dyn DecodeBackend>,
    pending: Mutex<HashMap<ImageKey, PendingLoad>>,
    queue: LoadQueue,
    next_subscriber: AtomicU64,
    shutdown: AtomicBool,
}

/// Handle to one caller's interest in one load request.
///
/// Each ticket resolves exactly once: with the decoded image, a
/// [`LoadError`], or [`LoadError::Cancelled`] when the caller withdrew or the
/// loader shut down.
pub struct LoadTicket {
    key: ImageKey,
    id: SubscriberId,
    rx: mpsc::Receiver<LoadResult>,
}

impl LoadTicket {
    /// The key this ticket is waiting on.
    pub fn key(&self) -> &ImageKey {
        &self.key
    }

    /// Block until the request resolves.
    pub fn wait(self) -> LoadResult {
        self.rx.recv().unwrap_or(Err(LoadError::Cancelled))
    }

    /// Block for at most `timeout`; `None` when the request is still
    /// in flight.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(LoadError::Cancelled)),
        }
    }

    /// Non-blocking poll; `None` while the request is still in flight.
    pub fn try_result(&self) -> Option<LoadResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(LoadError::Cancelled)),
        }
    }
}

/// Orchestrates image loading over an injected cache, budget, resolver and
/// decoder.
///
/// Constructed once and shared by its consumers; there is no global state.
/// For any key there is at most one pending request, and therefore at most
/// one concurrent decode, system-wide: concurrent callers for the same key
/// attach to the same request and all observe the result of a single decode.
///
/// # Example
///
/// ```no_run
/// use lightbox_cache::{ImageCache, ImageKey, MemoryBudgetManager};
/// use lightbox_loader::{ImageLoader, LoaderConfig};
/// use std::sync::Arc;
///
/// let cache = Arc::new(ImageCache::new(200, 256 * 1024 * 1024));
/// let budget = Arc::new(MemoryBudgetManager::with_limit_mb(512));
/// let loader = ImageLoader::with_defaults(cache, budget, LoaderConfig::default());
///
/// let ticket = loader.load_image(&ImageKey::for_path("/photos/a.png"));
/// match ticket.wait() {
///     Ok(image) => println!("{}x{}", image.width(), image.height()),
///     Err(err) => eprintln!("load failed: {err}"),
/// }
/// ```
pub struct ImageLoader {
    shared: Arc<LoaderShared>,
    workers: Vec<JoinHandle<()>>,
}

impl ImageLoader {
    /// Create a loader over the given collaborators and start its workers.
    pub fn new(
        cache: Arc<ImageCache>,
        budget: Arc<MemoryBudgetManager>,
        resolver: Arc<dyn ResourceResolver>,
        decoder: Arc<dyn DecodeBackend>,
        config: LoaderConfig,
    ) -> Self {
        let shared = Arc::new(LoaderShared {
            cache,
            budget,
            resolver,
            decoder,
            pending: Mutex::new(HashMap::new()),
            queue: LoadQueue::new(),
            next_subscriber: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        });

        let workers = (0..config.num_workers.max(1))
            .map(|id| {
                let shared = Arc::clone(&shared);
                let poll_interval = config.poll_interval;
                thread::Builder::new()
                    .name(format!("lightbox-decode-{id}"))
                    .spawn(move || worker_loop(shared, poll_interval))
                    .expect("Failed to spawn decode worker")
            })
            .collect();

        Self { shared, workers }
    }

    /// Create a loader with the default filesystem resolver and raster
    /// decoder.
    pub fn with_defaults(
        cache: Arc<ImageCache>,
        budget: Arc<MemoryBudgetManager>,
        config: LoaderConfig,
    ) -> Self {
        Self::new(
            cache,
            budget,
            Arc::new(FsResolver),
            Arc::new(RasterDecoder),
            config,
        )
    }

    /// Request an image.
    ///
    /// A cache hit resolves the ticket immediately without a decode. A miss
    /// either attaches to the pending request already in flight for the key,
    /// or creates one and queues it at foreground priority.
    pub fn load_image(&self, key: &ImageKey) -> LoadTicket {
        let (tx, rx) = mpsc::channel();
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let ticket = LoadTicket {
            key: key.clone(),
            id,
            rx,
        };

        let mut pending = self.shared.pending.lock().unwrap();

        // Checked under the pending lock so a request completing between the
        // lookup and the attach cannot slip through as a duplicate decode.
        if let Some(image) = self.shared.cache.get(key) {
            let _ = tx.send(Ok(image));
            return ticket;
        }

        match pending.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let load = entry.get_mut();
                load.subscribers.push((id, tx));
                if load.detached && !load.claimed {
                    // A consumer now waits on what was a background preload;
                    // requeue at foreground priority. The claimed flag keeps
                    // the duplicate queue entry from double-decoding.
                    self.shared.queue.push(key.clone(), LoadPriority::Foreground);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingLoad {
                    subscribers: vec![(id, tx)],
                    token: CancellationToken::new(),
                    claimed: false,
                    detached: false,
                });
                self.shared.queue.push(key.clone(), LoadPriority::Foreground);
            }
        }

        ticket
    }

    /// Withdraw one caller's interest in a pending load.
    ///
    /// Other subscribers are unaffected. When the last subscriber of a
    /// non-preload request withdraws, the in-flight decode is aborted
    /// best-effort and nothing is cached. The cancelled ticket resolves
    /// [`LoadError::Cancelled`]. Returns whether the ticket was still
    /// attached to a pending request.
    pub fn cancel_load(&self, ticket: &LoadTicket) -> bool {
        let mut pending = self.shared.pending.lock().unwrap();
        let Some(load) = pending.get_mut(&ticket.key) else {
            return false;
        };

        let before = load.subscribers.len();
        load.subscribers.retain(|(id, _)| *id != ticket.id);
        let removed = load.subscribers.len() != before;

        if removed && load.subscribers.is_empty() && !load.detached {
            load.token.cancel();
            pending.remove(&ticket.key);
        }

        removed
    }

    /// Warm the cache for up to `max_count` of the given keys, in order.
    ///
    /// Keys already cached or pending are skipped and do not count against
    /// `max_count`. Submitted preloads run at background priority with no
    /// subscriber; their results are discarded and failures are dropped
    /// silently. Never blocks the caller. Returns the number of keys
    /// actually submitted.
    pub fn preload_images(&self, keys: &[ImageKey], max_count: usize) -> usize {
        let mut submitted = 0;

        for key in keys {
            if submitted >= max_count {
                break;
            }
            if self.shared.cache.contains(key) {
                continue;
            }

            let mut pending = self.shared.pending.lock().unwrap();
            if let Entry::Vacant(entry) = pending.entry(key.clone()) {
                entry.insert(PendingLoad {
                    subscribers: Vec::new(),
                    token: CancellationToken::new(),
                    claimed: false,
                    detached: true,
                });
                self.shared.queue.push(key.clone(), LoadPriority::Preload);
                submitted += 1;
            }
        }

        submitted
    }

    /// Drop every cached image and debit the freed cost from the budget.
    ///
    /// In-flight pending requests are not cancelled.
    pub fn clear_cache(&self) {
        let freed = self.shared.cache.clear();
        self.shared
            .budget
            .did_unload_image(i64::try_from(freed).unwrap_or(i64::MAX));
    }

    /// Number of requests currently pending.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }

    /// The cache this loader populates.
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.shared.cache
    }

    /// The memory budget gating admissions.
    pub fn memory_budget(&self) -> &Arc<MemoryBudgetManager> {
        &self.shared.budget
    }

    /// Shut down: drain the queue, fail pending requests with `Cancelled`,
    /// and join the workers.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.queue.clear();

        let drained: Vec<PendingLoad> = {
            let mut pending = self.shared.pending.lock().unwrap();
            pending.drain().map(|(_, load)| load).collect()
        };
        for load in drained {
            load.token.cancel();
            for (_, tx) in load.subscribers {
                let _ = tx.send(Err(LoadError::Cancelled));
            }
        }

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown_inner();
        }
    }
}

/// Main loop of one decode worker.
fn worker_loop(shared: Arc<LoaderShared>, poll_interval: Duration) {
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        let Some((key, _priority)) = shared.queue.pop() else {
            thread::sleep(poll_interval);
            continue;
        };

        let token = {
            let mut pending = shared.pending.lock().unwrap();
            match pending.get_mut(&key) {
                // Cancelled before it started.
                None => continue,
                // Duplicate queue entry from a priority bump.
                Some(load) if load.claimed => continue,
                Some(load) => {
                    load.claimed = true;
                    load.token.clone()
                }
            }
        };

        execute_load(&shared, &key, &token);
    }
}

/// Resolve, decode, admit, cache and deliver one request.
///
/// The token is checked before resolving, before decoding and after
/// decoding; a cancelled request is dropped without caching or delivery.
fn execute_load(shared: &LoaderShared, key: &ImageKey, token: &CancellationToken) {
    if token.is_cancelled() {
        drop_pending(shared, key, token);
        return;
    }

    let bytes = match shared.resolver.resolve(key) {
        Ok(bytes) => bytes,
        Err(err) => {
            deliver(shared, key, token, Err(err));
            return;
        }
    };

    if token.is_cancelled() {
        drop_pending(shared, key, token);
        return;
    }

    let image = match shared.decoder.decode(key, &bytes) {
        Ok(image) => image,
        Err(err) => {
            deliver(shared, key, token, Err(err));
            return;
        }
    };

    if token.is_cancelled() {
        drop_pending(shared, key, token);
        return;
    }

    let cost = image.cost_bytes();
    if !shared.budget.should_load_image(cost as i64) {
        deliver(
            shared,
            key,
            token,
            Err(LoadError::InsufficientMemory { requested: cost }),
        );
        return;
    }

    shared.budget.did_load_image(cost as i64);
    for evicted in shared.cache.insert(key.clone(), image.clone()) {
        log::debug!(
            "evicted {} ({}) to admit {}",
            evicted.key,
            format_bytes(evicted.cost),
            key
        );
        shared.budget.did_unload_image(evicted.cost as i64);
    }

    deliver(shared, key, token, Ok(image));
}

/// Resolve the pending request for `key` with `result`, fanning it out to
/// every subscriber still attached.
///
/// `token` identifies the request the worker was executing. After a cancel,
/// a fresh request for the same key may occupy the map slot; matching on the
/// token keeps a stale worker from resolving or tearing down the newer
/// request.
fn deliver(shared: &LoaderShared, key: &ImageKey, token: &CancellationToken, result: LoadResult) {
    let Some(load) = take_same_generation(shared, key, token) else {
        return;
    };

    if let Err(err) = &result {
        log::debug!("load failed for {key}: {err}");
    }

    for (_, tx) in load.subscribers {
        let _ = tx.send(result.clone());
    }
}

fn drop_pending(shared: &LoaderShared, key: &ImageKey, token: &CancellationToken) {
    take_same_generation(shared, key, token);
}

/// Remove and return the pending entry for `key` only when it still belongs
/// to the request identified by `token`.
fn take_same_generation(
    shared: &LoaderShared,
    key: &ImageKey,
    token: &CancellationToken,
) -> Option<PendingLoad> {
    let mut pending = shared.pending.lock().unwrap();
    match pending.get(key) {
        Some(load) if load.token.shares_flag(token) => pending.remove(key),
        _ => None,
    }
}

/// Number of logical CPU cores, the default decode worker count.
fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
