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

use crate::actor::AcquireRequest;
use crate::actor::Actor;
use crate::registry;
use crate::schedule::capture_current;
use crate::schedule::DefaultSchedule;
use crate::schedule::Fallback;
use crate::AcquireOptions;
use crate::Config;
use crate::Error;
use crate::OwnedMutex;
use crate::Result;


/// Name of the mutex arbitrating access to the system management bus.
pub const SMBUS_MUTEX_NAME: &str = "Global\\Access_SMBUS.HTP.Method";

/// Name of the mutex arbitrating access to the legacy ISA bus.
pub const ISA_BUS_MUTEX_NAME: &str = "Global\\Access_ISABUS.HTP.Method";

/// Name of the mutex arbitrating access to the embedded controller.
pub const EMBEDDED_CONTROLLER_MUTEX_NAME: &str = "Global\\Access_EC";

/// A named, system-wide mutex usable from async code.
///
/// Each name is served by one dedicated worker thread that acquires and releases the kernel
/// mutex. Requests from this process are queued and served in FIFO order; requests from other
/// processes contend on the kernel object itself.
///
/// Global mutexes are not reentrant: acquiring a name while already holding it deadlocks.
///
/// Once looked up, a global mutex lives until the process exits. Prefer the well-known
/// accessors such as [`GlobalMutex::smbus`] over [`GlobalMutex::get`].
///
/// # Examples
///
/// ```
/// # #[tokio::main]
/// # async fn main() {
/// use global_mutex::GlobalMutex;
///
/// let mutex = GlobalMutex::get("Local\\global-mutex-doc-acquire").unwrap();
/// let owned = mutex.acquire().await.unwrap();
/// let on_worker = owned
///     .continue_on_worker(async { std::thread::current().id() })
///     .await
///     .unwrap();
/// assert_eq!(on_worker, mutex.worker_thread_id());
/// owned.release();
/// # }
/// ```
#[derive(Clone)]
pub struct GlobalMutex {
    actor: Arc<Actor>,
}

impl GlobalMutex {
    /// Returns the global mutex with the given name, creating its worker on first use.
    ///
    /// # Errors
    ///
    /// Fails if the name is invalid, if the OS denies access to the kernel object, or if the
    /// worker thread cannot be started. A failed lookup caches nothing.
    pub fn get(name: &str) -> Result<Self> {
        registry::get_or_create(name, None).map(|actor| Self { actor })
    }

    /// Like [`GlobalMutex::get`], but creates the worker with `config`.
    ///
    /// If the global mutex already exists, it is returned unchanged and `config` is ignored.
    pub fn get_with_config(name: &str, config: Config) -> Result<Self> {
        registry::get_or_create(name, Some(config)).map(|actor| Self { actor })
    }

    /// The system management bus mutex, `Global\Access_SMBUS.HTP.Method`.
    pub fn smbus() -> Result<Self> {
        Self::get(SMBUS_MUTEX_NAME)
    }

    /// The ISA bus mutex, `Global\Access_ISABUS.HTP.Method`.
    pub fn isa_bus() -> Result<Self> {
        Self::get(ISA_BUS_MUTEX_NAME)
    }

    /// The embedded controller mutex, `Global\Access_EC`.
    pub fn embedded_controller() -> Result<Self> {
        Self::get(EMBEDDED_CONTROLLER_MUTEX_NAME)
    }

    /// Returns the name of this global mutex.
    pub fn name(&self) -> &str {
        self.actor.name()
    }

    /// Returns the id of the worker thread dedicated to this global mutex.
    pub fn worker_thread_id(&self) -> ThreadId {
        self.actor.worker_id()
    }

    /// Acquires the global mutex, without hook, falling back to the default target.
    ///
    /// See [`GlobalMutex::acquire_with`].
    pub fn acquire(&self) -> Acquire {
        self.acquire_with(AcquireOptions::new())
    }

    /// Acquires the global mutex.
    ///
    /// The request is queued as soon as this method is called. The returned future resolves
    /// to an [`OwnedMutex`] once the worker thread owns the kernel mutex and the after-acquire
    /// hook, if any, succeeded.
    ///
    /// There is no timeout. Dropping the returned future withdraws the request: the worker
    /// skips it, or releases the mutex right away if it was already acquired.
    ///
    /// # Errors
    ///
    /// The future resolves to an error if the kernel wait fails or if the after-acquire hook
    /// fails. In both cases the mutex is not held.
    pub fn acquire_with(&self, options: AcquireOptions) -> Acquire {
        let AcquireOptions {
            hook,
            capture_scheduler,
            fallback,
        } = options;
        let fallback = match fallback {
            Some(fallback) => fallback,
            None if capture_scheduler => capture_current(),
            None => Arc::new(DefaultSchedule),
        };

        let (completion, rx) = oneshot::channel();
        self.actor.submit(AcquireRequest {
            completion,
            hook,
            fallback: Fallback(fallback),
        });
        Acquire { rx }
    }
}

impl PartialEq for GlobalMutex {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.actor, &other.actor)
    }
}

impl Eq for GlobalMutex {}

impl fmt::Debug for GlobalMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalMutex")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Future returned by [`GlobalMutex::acquire`] and [`GlobalMutex::acquire_with`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Acquire {
    rx: oneshot::Receiver<Result<OwnedMutex>>,
}

impl fmt::Debug for Acquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquire").finish_non_exhaustive()
    }
}

impl Future for Acquire {
    type Output = Result<OwnedMutex>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Self { rx } = self.get_mut();
        Pin::new(rx).poll(cx).map(|result| match result {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(Error::WorkerGone),
        })
    }
}
