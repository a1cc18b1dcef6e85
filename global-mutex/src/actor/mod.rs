// Copyright 2024 tison <wander4096@gmail.com>
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

//! The per-name worker.
//!
//! Each name is served by one [`Actor`]: a dedicated OS thread that owns the kernel mutex and
//! runs a single consumer loop over two multiple-producer queues. The wait queue holds
//! acquisition requests, served in FIFO order; the pending queue holds units of work posted by
//! open episodes. Producers never block: they push and notify the wake signal.
//!
//! ```text
//! idle ──wake──▶ drain wait queue ──request──▶ kernel wait ──▶ after-acquire hook
//!  ▲                   │ empty                                        │ ok
//!  └───────────────────┘                                              ▼
//!              release ◀── before-release hook ◀── finished ◀── run episode
//! ```

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::ThreadId;
use std::time::Instant;

use crossbeam_queue::SegQueue;
use futures::channel::oneshot;

use crate::episode::EpisodeScheduler;
use crate::hook;
use crate::hook::HookFailure;
use crate::internal::WakeSignal;
use crate::schedule::Fallback;
use crate::schedule::Runnable;
use crate::sys::Acquired;
use crate::sys::KernelMutex;
use crate::Config;
use crate::Error;
use crate::LifecycleHook;
use crate::OwnedMutex;
use crate::Result;

thread_local! {
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Returns `true` on the worker thread of any global mutex.
pub(crate) fn on_worker_thread() -> bool {
    ON_WORKER.with(Cell::get)
}

pub(crate) struct AcquireRequest {
    pub(crate) completion: oneshot::Sender<Result<OwnedMutex>>,
    pub(crate) hook: Option<Arc<dyn LifecycleHook>>,
    pub(crate) fallback: Fallback,
}

pub(crate) struct PendingTask {
    scheduler: Arc<EpisodeScheduler>,
    unit: Runnable,
}

pub(crate) struct Actor {
    name: String,
    config: Config,
    kernel: KernelMutex,
    wait_queue: SegQueue<AcquireRequest>,
    pending: SegQueue<PendingTask>,
    signal: WakeSignal,
    episodes: AtomicU64,
}

impl Actor {
    /// Opens the kernel mutex and starts the worker thread.
    pub(crate) fn start(name: &str, config: Config) -> Result<Arc<Actor>> {
        let kernel = KernelMutex::open(name)?;
        let actor = Arc::new(Actor {
            name: name.to_owned(),
            config,
            kernel,
            wait_queue: SegQueue::new(),
            pending: SegQueue::new(),
            signal: WakeSignal::new(),
            episodes: AtomicU64::new(0),
        });

        let mut builder = thread::Builder::new().name(format!("global-mutex:{name}"));
        if let Some(size) = actor.config.stack_size {
            builder = builder.stack_size(size);
        }
        let worker = {
            let actor = actor.clone();
            builder.spawn(move || actor.run())
        }
        .map_err(|source| Error::Spawn {
            name: name.to_owned(),
            source,
        })?;
        // The worker binds itself too; whichever comes first wins with the same thread.
        actor.signal.bind(worker.thread().clone());

        tracing::debug!(name, "started global mutex worker");
        Ok(actor)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn worker_id(&self) -> ThreadId {
        self.signal
            .worker_id()
            .expect("worker thread is bound before the actor is shared")
    }

    pub(crate) fn is_worker_thread(&self) -> bool {
        self.signal.is_worker()
    }

    pub(crate) fn submit(&self, request: AcquireRequest) {
        self.wait_queue.push(request);
        self.signal.notify();
    }

    pub(crate) fn post(&self, scheduler: Arc<EpisodeScheduler>, unit: Runnable) {
        self.pending.push(PendingTask { scheduler, unit });
        self.signal.notify();
    }

    pub(crate) fn notify(&self) {
        self.signal.notify();
    }

    fn run(self: Arc<Self>) {
        ON_WORKER.with(|on| on.set(true));
        self.signal.bind(thread::current());
        loop {
            // Units left over from finished episodes go to their fallback targets.
            self.drain_pending();
            while let Some(request) = self.wait_queue.pop() {
                self.serve(request);
            }
            self.signal.wait();
        }
    }

    fn serve(self: &Arc<Self>, request: AcquireRequest) {
        let AcquireRequest {
            completion,
            hook,
            fallback,
        } = request;
        let name = self.name.as_str();

        if completion.is_canceled() {
            tracing::trace!(name, "skipping abandoned acquire request");
            return;
        }

        match self.kernel.lock() {
            Ok(Acquired::Owned) => {}
            Ok(Acquired::Abandoned) => {
                tracing::warn!(name, "acquired abandoned global mutex");
            }
            Err(err) => {
                tracing::debug!(name, error = %err, "kernel wait failed");
                let _ = completion.send(Err(err));
                return;
            }
        }
        let episode = self.episodes.fetch_add(1, Ordering::Relaxed);

        if let Some(hook) = &hook {
            if let Err(failure) = hook::invoke(|| hook.on_after_acquire()) {
                self.unlock();
                let err = match failure {
                    HookFailure::Error(err) => Error::Hook(err),
                    HookFailure::Panic => Error::HookPanicked,
                };
                tracing::debug!(name, episode, error = %err, "after-acquire hook failed");
                let _ = completion.send(Err(err));
                return;
            }
        }

        let scheduler = Arc::new(EpisodeScheduler::new(self.clone(), episode, fallback));
        tracing::trace!(name, episode, "episode started");
        // If the caller has gone away, the undelivered handle is dropped here and the episode
        // finishes right away.
        let _ = completion.send(Ok(OwnedMutex::new(scheduler.clone())));

        self.run_episode(&scheduler);

        if let Some(hook) = &hook {
            match hook::invoke(|| hook.on_before_release()) {
                Ok(()) => {}
                Err(HookFailure::Error(err)) => {
                    tracing::warn!(name, episode, error = %err, "before-release hook failed");
                }
                Err(HookFailure::Panic) => {
                    tracing::warn!(name, episode, "before-release hook panicked");
                }
            }
        }
        self.unlock();
        tracing::trace!(name, episode, "episode finished");

        self.drain_pending();
    }

    fn run_episode(&self, scheduler: &EpisodeScheduler) {
        let started = Instant::now();
        let mut warned = false;
        loop {
            self.drain_pending();
            if !scheduler.is_open() {
                return;
            }
            match self.config.open_episode_warning {
                Some(bound) if !warned => {
                    let elapsed = started.elapsed();
                    if elapsed >= bound {
                        tracing::warn!(
                            name = self.name.as_str(),
                            episode = scheduler.episode(),
                            ?elapsed,
                            "global mutex held longer than expected; is an OwnedMutex leaked?"
                        );
                        warned = true;
                        self.signal.wait();
                    } else {
                        self.signal.wait_timeout(bound - elapsed);
                    }
                }
                _ => self.signal.wait(),
            }
        }
    }

    fn drain_pending(&self) {
        while let Some(PendingTask { scheduler, unit }) = self.pending.pop() {
            scheduler.process(unit);
        }
    }

    fn unlock(&self) {
        if let Err(err) = self.kernel.unlock() {
            tracing::error!(name = self.name.as_str(), error = %err, "failed to release kernel mutex");
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("worker", &self.signal.worker_id())
            .field("waiting", &self.wait_queue.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
