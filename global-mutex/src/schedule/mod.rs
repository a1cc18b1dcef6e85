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

//! Fallback targets for work that outlives an episode.
//!
//! Once an [`OwnedMutex`](crate::OwnedMutex) is released, anything still scheduled through it can
//! no longer run on the worker thread. Such units are handed to the [`Schedule`] captured when the
//! mutex was acquired, so that nothing is lost.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;

#[cfg(test)]
mod tests;

/// A unit of work.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// A target able to run units of work.
pub trait Schedule: Send + Sync + 'static {
    /// Runs `unit` eventually. Must not drop it.
    fn schedule(&self, unit: Runnable);
}

const SPAWN_ATTEMPTS: u32 = 3;

/// The general-purpose fallback target.
///
/// Units go to a process-wide queue and each call starts a helper thread that drains it, so a
/// unit usually runs on its own fresh thread. If no helper thread can be spawned, the unit runs
/// inline on the calling thread, unless that is a global mutex worker: there it stays queued
/// for the next helper thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSchedule;

impl Schedule for DefaultSchedule {
    fn schedule(&self, unit: Runnable) {
        queued().push(unit);

        let mut attempt = 0;
        let err = loop {
            match spawn_helper() {
                Ok(()) => return,
                Err(err) if !crate::actor::on_worker_thread() => break err,
                Err(err) => {
                    attempt += 1;
                    if attempt == SPAWN_ATTEMPTS {
                        tracing::error!(
                            error = %err,
                            queued = queued().len(),
                            "cannot spawn fallback thread; units stay queued for the next one"
                        );
                        return;
                    }
                    thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
                }
            }
        };

        tracing::warn!(error = %err, "cannot spawn fallback thread; running units inline");
        run_queued();
    }
}

fn queued() -> &'static SegQueue<Runnable> {
    static QUEUED: OnceLock<SegQueue<Runnable>> = OnceLock::new();
    QUEUED.get_or_init(SegQueue::new)
}

fn run_queued() {
    while let Some(unit) = queued().pop() {
        unit();
    }
}

fn spawn_helper() -> io::Result<()> {
    thread::Builder::new()
        .name("global-mutex-fallback".to_owned())
        .spawn(run_queued)
        .map(drop)
}

/// A fallback target backed by a tokio runtime.
///
/// Units are run with [`spawn_blocking`](tokio::runtime::Handle::spawn_blocking). Units the
/// runtime drops without running, because it has shut down, go to [`DefaultSchedule`].
#[cfg(any(feature = "tokio", test))]
#[derive(Clone)]
pub struct TokioSchedule {
    handle: tokio::runtime::Handle,
}

#[cfg(any(feature = "tokio", test))]
impl TokioSchedule {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

#[cfg(any(feature = "tokio", test))]
impl fmt::Debug for TokioSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioSchedule").finish_non_exhaustive()
    }
}

#[cfg(any(feature = "tokio", test))]
impl Schedule for TokioSchedule {
    fn schedule(&self, unit: Runnable) {
        let unit = Forward(Some(unit));
        drop(self.handle.spawn_blocking(move || unit.run()));
    }
}

/// Owns a unit until it runs; hands it to [`DefaultSchedule`] if dropped first.
#[cfg(any(feature = "tokio", test))]
struct Forward(Option<Runnable>);

#[cfg(any(feature = "tokio", test))]
impl Forward {
    fn run(mut self) {
        if let Some(unit) = self.0.take() {
            unit();
        }
    }
}

#[cfg(any(feature = "tokio", test))]
impl Drop for Forward {
    fn drop(&mut self) {
        if let Some(unit) = self.0.take() {
            tracing::warn!("tokio runtime dropped a unit of work; forwarding it to a helper thread");
            DefaultSchedule.schedule(unit);
        }
    }
}

/// Returns the scheduler current on the calling thread, or the default target.
pub(crate) fn capture_current() -> Arc<dyn Schedule> {
    capture_runtime().unwrap_or_else(|| Arc::new(DefaultSchedule))
}

#[cfg(any(feature = "tokio", test))]
fn capture_runtime() -> Option<Arc<dyn Schedule>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(Arc::new(TokioSchedule::new(handle)))
}

#[cfg(not(any(feature = "tokio", test)))]
fn capture_runtime() -> Option<Arc<dyn Schedule>> {
    None
}

/// Wraps a shared target so it can be named in `Debug` output.
pub(crate) struct Fallback(pub(crate) Arc<dyn Schedule>);

impl Fallback {
    pub(crate) fn schedule(&self, unit: Runnable) {
        self.0.schedule(unit);
    }
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback").finish_non_exhaustive()
    }
}
