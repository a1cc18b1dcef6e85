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

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Named, cross-process mutexes for async Rust, with thread-affine critical sections.
//!
//! Some shared hardware resources, such as the system management bus, are arbitrated by named
//! OS mutexes that firmware, drivers and native libraries also take. Native call sequences
//! often assume that reentrant calls come from the thread that entered the critical section.
//! A [`GlobalMutex`] therefore pins all the work of a critical section to one dedicated worker
//! thread per name:
//!
//! * [`GlobalMutex::acquire`] queues a request; the worker acquires the kernel mutex and hands
//!   out an [`OwnedMutex`].
//! * [`OwnedMutex::run_on_worker`] and [`OwnedMutex::continue_on_worker`] run code on the
//!   worker thread while the mutex is held.
//! * Releasing or dropping the [`OwnedMutex`] lets the worker release the kernel mutex and serve
//!   the next request.
//!
//! A [`LifecycleHook`] can run bus-specific code on the worker thread right after the kernel
//! mutex is acquired, and right before it is released.
//!
//! # Examples
//!
//! ```
//! use global_mutex::GlobalMutex;
//! use pollster::FutureExt;
//!
//! let mutex = GlobalMutex::get("Local\\global-mutex-doc-crate").unwrap();
//! let owned = mutex.acquire().block_on().unwrap();
//! let answer = owned.run_on_worker(|| 6 * 7).block_on().unwrap();
//! assert_eq!(answer, 42);
//! owned.release();
//! ```

mod actor;
mod config;
mod episode;
mod error;
mod hook;
mod internal;
mod mutex;
mod owned;
mod registry;
mod sys;

pub mod schedule;

pub use config::AcquireOptions;
pub use config::Config;
pub use config::DEFAULT_OPEN_EPISODE_WARNING;
pub use error::BoxError;
pub use error::Error;
pub use error::Result;
pub use hook::LifecycleHook;
pub use mutex::Acquire;
pub use mutex::GlobalMutex;
pub use mutex::EMBEDDED_CONTROLLER_MUTEX_NAME;
pub use mutex::ISA_BUS_MUTEX_NAME;
pub use mutex::SMBUS_MUTEX_NAME;
pub use owned::OnWorker;
pub use owned::OwnedMutex;
pub use schedule::Schedule;

#[cfg(test)]
fn test_runtime() -> &'static tokio::runtime::Runtime {
    use std::sync::OnceLock;

    use tokio::runtime::Runtime;
    static RT: OnceLock<Runtime> = OnceLock::new();
    RT.get_or_init(|| Runtime::new().unwrap())
}
