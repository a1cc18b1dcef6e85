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

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::thread::ThreadId;

use futures::channel::oneshot;

use crate::episode::EpisodeScheduler;
use crate::Error;
use crate::Result;

mod task;


/// Proof of ownership of a global mutex.
///
/// The mutex stays held, and its worker thread stays dedicated to this owner, until the
/// `OwnedMutex` is [released](OwnedMutex::release) or dropped.
///
/// Work that must run on the thread that owns the kernel mutex, typically native calls that may
/// re-enter the same mutex, is marshalled there with [`run_on_worker`](OwnedMutex::run_on_worker)
/// or [`continue_on_worker`](OwnedMutex::continue_on_worker). Anything scheduled this way after
/// the release runs on the fallback target chosen at acquisition instead, and never on the
/// worker thread.
#[must_use = "if unused the global mutex will immediately be released"]
pub struct OwnedMutex {
    scheduler: Arc<EpisodeScheduler>,
}

impl OwnedMutex {
    pub(crate) fn new(scheduler: Arc<EpisodeScheduler>) -> Self {
        Self { scheduler }
    }

    #[cfg(test)]
    pub(crate) fn scheduler(&self) -> &Arc<EpisodeScheduler> {
        &self.scheduler
    }

    /// Returns the name of the global mutex.
    pub fn name(&self) -> &str {
        self.scheduler.actor().name()
    }

    /// Returns the id of the worker thread that owns the kernel mutex.
    pub fn worker_thread_id(&self) -> ThreadId {
        self.scheduler.actor().worker_id()
    }

    /// Returns `true` once the episode has ended.
    ///
    /// This can turn `true` while the handle is still alive, when the episode was finished
    /// through its scheduler rather than by dropping this handle.
    pub fn is_released(&self) -> bool {
        !self.scheduler.is_open()
    }

    /// Runs `f` on the worker thread and resolves to its result.
    ///
    /// When called on the worker thread itself, `f` runs inline before this method returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use global_mutex::GlobalMutex;
    /// use pollster::FutureExt;
    ///
    /// let mutex = GlobalMutex::get("Local\\global-mutex-doc-run").unwrap();
    /// let owned = mutex.acquire().block_on().unwrap();
    /// let id = owned.run_on_worker(|| std::thread::current().id()).block_on().unwrap();
    /// assert_eq!(id, owned.worker_thread_id());
    /// owned.release();
    /// ```
    pub fn run_on_worker<F, T>(&self, f: F) -> OnWorker<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let unit = Box::new(move || {
            let _ = tx.send(f());
        });
        if let Err(unit) = self.scheduler.try_run_inline(unit) {
            self.scheduler.enqueue(unit);
        }
        OnWorker { rx }
    }

    /// Drives `future` on the worker thread and resolves to its output.
    ///
    /// Every resumption of `future` is scheduled through this episode: while the mutex is held,
    /// each poll happens on the worker thread. The future starts right away, whether or not the
    /// returned [`OnWorker`] is awaited.
    ///
    /// Do not await the acquisition of the same global mutex from within `future`: global
    /// mutexes are not reentrant, and doing so deadlocks.
    pub fn continue_on_worker<F>(&self, future: F) -> OnWorker<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        task::spawn(
            async move {
                let _ = tx.send(future.await);
            },
            self.scheduler.clone(),
        );
        OnWorker { rx }
    }

    /// Releases the global mutex.
    ///
    /// The worker thread runs the before-release hook, releases the kernel mutex, and moves on
    /// to the next waiter.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for OwnedMutex {
    fn drop(&mut self) {
        if self.scheduler.finish() {
            tracing::trace!(
                name = self.name(),
                episode = self.scheduler.episode(),
                "released global mutex"
            );
        }
    }
}

impl fmt::Debug for OwnedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedMutex")
            .field("name", &self.name())
            .field("episode", &self.scheduler.episode())
            .finish()
    }
}

/// The result of work scheduled on the worker thread.
///
/// Resolves to [`Error::TaskPanicked`] if the work panicked. Dropping it does not cancel the
/// work.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct OnWorker<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> fmt::Debug for OnWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnWorker").finish_non_exhaustive()
    }
}

impl<T> Future for OnWorker<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Self { rx } = self.get_mut();
        Pin::new(rx)
            .poll(cx)
            .map(|result| result.map_err(|_| Error::TaskPanicked))
    }
}
