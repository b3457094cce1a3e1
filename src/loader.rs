// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Coalesces point lookups into multi-get calls.
//!
//! A dispatch cycle moves through three states:
//!
//! ```text
//! ACCUMULATING ──(window taken)──> DISPATCHED ──(all calls settled)──> RESOLVED
//! ```
//!
//! [`BatchingLoader::load`] registers into the open window right away, but the
//! task that dispatches the window is only spawned when one of its callers
//! first polls. Every lookup issued in the same synchronous turn is therefore
//! in the window before its dispatch can start, on any runtime flavor. Lookups
//! registered before that task takes the window join the cycle; lookups
//! registered afterwards open the next window. The window is taken under the
//! same mutex that guards registration, so a dispatched cycle never gains a
//! request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use futures_util::future::join_all;
use log::debug;
use log::warn;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::config::LoaderConfig;
use crate::errors::LoadError;
use crate::key::LookupRequest;
use crate::multi_get::MultiGet;
use crate::partition::partition;
use crate::result_index::ResultIndex;

/// What a single lookup resolves to: the item, `None` if it does not exist, or an error.
pub type LoadResult<T> = Result<Option<T>, LoadError>;

/// Cumulative counters of a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct LoaderStats {
    /// Dispatch cycles run.
    pub cycles: u64,
    /// Multi-get calls issued.
    pub calls: u64,
    /// Multi-get calls that failed as a whole.
    pub failed_calls: u64,
    /// Lookups registered by callers, duplicates included.
    pub lookups: u64,
    /// Distinct keys sent to the store.
    pub keys: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    calls: AtomicU64,
    failed_calls: AtomicU64,
    lookups: AtomicU64,
    keys: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LoaderStats {
        LoaderStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            keys: self.keys.load(Ordering::Relaxed),
        }
    }
}

/// A distinct lookup and everyone waiting for it.
struct PendingEntry<T> {
    request: LookupRequest,
    waiters: Vec<oneshot::Sender<LoadResult<T>>>,
}

/// The lookups of the cycle in `ACCUMULATING` state.
struct Window<T> {
    id: u64,
    /// Whether the task dispatching this window has been spawned.
    scheduled: bool,
    /// Distinct lookups in first-seen order.
    entries: Vec<PendingEntry<T>>,
    positions: HashMap<LookupRequest, usize>,
    lookups: usize,
}

impl<T> Window<T> {
    fn new(id: u64) -> Self {
        Self {
            id,
            scheduled: false,
            entries: Vec::new(),
            positions: HashMap::new(),
            lookups: 0,
        }
    }

    fn register(&mut self, request: LookupRequest, waiter: oneshot::Sender<LoadResult<T>>) {
        self.lookups += 1;

        if let Some(&i) = self.positions.get(&request) {
            self.entries[i].waiters.push(waiter);
            return;
        }

        self.positions.insert(request.clone(), self.entries.len());
        self.entries.push(PendingEntry {
            request,
            waiters: vec![waiter],
        });
    }
}

struct Shared<C>
where C: MultiGet
{
    client: C,
    config: LoaderConfig,
    /// `None` when no window is accumulating.
    window: Mutex<Option<Window<C::Item>>>,
    next_window_id: AtomicU64,
    counters: Counters,
}

impl<C> Shared<C>
where C: MultiGet
{
    fn lock_window(&self) -> MutexGuard<'_, Option<Window<C::Item>>> {
        // Registration never panics while holding the lock; a poisoned window is still consistent.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a waiter to the accumulating window, opening one if needed.
    ///
    /// Returns the id of the window the waiter joined.
    fn register(
        &self,
        request: LookupRequest,
        waiter: oneshot::Sender<LoadResult<C::Item>>,
    ) -> u64 {
        let mut window = self.lock_window();
        let window = window.get_or_insert_with(|| {
            Window::new(self.next_window_id.fetch_add(1, Ordering::Relaxed))
        });
        window.register(request, waiter);
        window.id
    }

    /// Spawns the dispatch task of window `id`, unless it is already spawned
    /// or the window has been taken.
    fn schedule(self: &Arc<Self>, id: u64) {
        {
            let mut window = self.lock_window();
            match window.as_mut() {
                Some(w) if w.id == id && !w.scheduled => w.scheduled = true,
                _ => return,
            }
        }

        tokio::spawn(self.clone().run_cycle());
    }

    /// Runs one dispatch cycle, from closing the window to resolving every caller.
    async fn run_cycle(self: Arc<Self>) {
        // Let the current scheduling turn finish registering lookups.
        tokio::task::yield_now().await;

        if let Some(delay) = self.config.batch_delay {
            tokio::time::sleep(delay).await;
        }

        let Some(window) = self.lock_window().take() else {
            return;
        };

        self.dispatch(window).await;
    }

    async fn dispatch(&self, window: Window<C::Item>) {
        let Window {
            entries, lookups, ..
        } = window;

        let requests: Vec<LookupRequest> = entries.iter().map(|e| e.request.clone()).collect();
        let plan = partition(
            &requests,
            self.config.max_batch_size.get(),
            self.config.chunk_policy,
        );

        debug!(
            "BatchingLoader: dispatch lookups={} distinct={} partitions={} calls={}",
            lookups,
            plan.distinct.len(),
            plan.partitions.len(),
            plan.calls.len()
        );

        self.counters.cycles.fetch_add(1, Ordering::Relaxed);
        self.counters.lookups.fetch_add(lookups as u64, Ordering::Relaxed);
        self.counters.calls.fetch_add(plan.calls.len() as u64, Ordering::Relaxed);
        self.counters.keys.fetch_add(plan.distinct.len() as u64, Ordering::Relaxed);

        let settled = join_all(plan.calls.into_iter().map(|call| async move {
            let result = self.client.multi_get(&call).await;
            if let Err(e) = &result {
                warn!(
                    "BatchingLoader: multi-get of {} keys failed: {}",
                    call.len(),
                    e
                );
                self.counters.failed_calls.fetch_add(1, Ordering::Relaxed);
            }
            (call, result)
        }))
        .await;

        let index = ResultIndex::build(settled);

        for entry in entries {
            let result = index.lookup(&entry.request).to_result(&entry.request);
            for waiter in entry.waiters {
                if waiter.send(result.clone()).is_err() {
                    debug!(
                        "BatchingLoader: caller of {} is gone, result dropped",
                        entry.request
                    );
                }
            }
        }
    }
}

/// Batches concurrent point lookups into the fewest multi-get calls.
///
/// Identical lookups issued in the same window are sent to the store once and
/// every caller receives its own copy of the result. Cloning the loader is
/// cheap and clones share windows.
///
/// ```
/// use batch_get_loader::impls::memory::MemoryStore;
/// use batch_get_loader::AttrMap;
/// use batch_get_loader::BatchingLoader;
/// use batch_get_loader::Key;
/// use batch_get_loader::LookupRequest;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut item = AttrMap::new();
/// item.insert("id".to_string(), "id1".into());
///
/// let store = MemoryStore::new().with_item("users", item.clone());
/// let loader = BatchingLoader::new(store);
///
/// let a = loader.load(LookupRequest::new("users", Key::single("id", "id1")));
/// let b = loader.load(LookupRequest::new("users", Key::single("id", "id2")));
///
/// assert_eq!(Some(item), a.await.unwrap());
/// assert_eq!(None, b.await.unwrap());
/// assert_eq!(1, loader.stats().calls);
/// # }
/// ```
pub struct BatchingLoader<C>
where C: MultiGet
{
    shared: Arc<Shared<C>>,
}

impl<C> Clone for BatchingLoader<C>
where C: MultiGet
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C> BatchingLoader<C>
where C: MultiGet
{
    pub fn new(client: C) -> Self {
        Self::with_config(client, LoaderConfig::default())
    }

    pub fn with_config(client: C, config: LoaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                config,
                window: Mutex::new(None),
                next_window_id: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    pub fn client(&self) -> &C {
        &self.shared.client
    }

    /// Looks up one key.
    ///
    /// The lookup joins the current window at call time. The window is
    /// dispatched once any of its futures is first polled, so lookups issued
    /// before awaiting share a cycle. The future resolves exactly once:
    ///
    /// - `Ok(Some(item))` if the store found the key,
    /// - `Ok(None)` if it does not exist,
    /// - `Err(LoadError::NotProcessed)` if the store did not process it,
    /// - `Err(LoadError::Transport)` if the call carrying it failed.
    ///
    /// # Panics
    ///
    /// The returned future panics if polled outside a tokio runtime.
    pub fn load(
        &self,
        request: LookupRequest,
    ) -> impl Future<Output = LoadResult<C::Item>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let window_id = self.shared.register(request, tx);
        let shared = self.shared.clone();

        async move {
            shared.schedule(window_id);
            rx.await.unwrap_or(Err(LoadError::Canceled))
        }
    }

    /// Looks up several keys; results are in the order of `requests`.
    ///
    /// Every lookup joins the current window before this returns, and each
    /// element resolves independently.
    pub fn load_many(
        &self,
        requests: impl IntoIterator<Item = LookupRequest>,
    ) -> impl Future<Output = Vec<LoadResult<C::Item>>> + Send + 'static {
        let pending: Vec<_> = requests.into_iter().map(|r| self.load(r)).collect();
        join_all(pending)
    }

    pub fn stats(&self) -> LoaderStats {
        self.shared.counters.snapshot()
    }
}
