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
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::actor::Actor;
use crate::schedule::Fallback;
use crate::schedule::Runnable;

#[cfg(test)]
mod tests;

/// The scheduling target of one episode.
///
/// While the episode is open, units are posted to the actor and run on its worker thread. Once
/// [`finish`](EpisodeScheduler::finish) was called, units are forwarded to the fallback target
/// captured at acquisition time, including units that were already queued on the actor but not
/// yet run.
pub(crate) struct EpisodeScheduler {
    actor: Arc<Actor>,
    episode: u64,
    open: AtomicBool,
    fallback: Fallback,
}

impl EpisodeScheduler {
    pub(crate) fn new(actor: Arc<Actor>, episode: u64, fallback: Fallback) -> Self {
        Self {
            actor,
            episode,
            open: AtomicBool::new(true),
            fallback,
        }
    }

    pub(crate) fn actor(&self) -> &Actor {
        &self.actor
    }

    pub(crate) fn episode(&self) -> u64 {
        self.episode
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn enqueue(self: &Arc<Self>, unit: Runnable) {
        if self.is_open() {
            self.actor.post(self.clone(), unit);
        } else {
            self.fallback.schedule(unit);
        }
    }

    /// Runs `unit` right away if called on the worker thread of an open episode; otherwise
    /// hands it back.
    pub(crate) fn try_run_inline(&self, unit: Runnable) -> Result<(), Runnable> {
        if self.is_open() && self.actor.is_worker_thread() {
            unit();
            Ok(())
        } else {
            Err(unit)
        }
    }

    /// Ends the episode. Returns `true` for the call that actually closed it.
    pub(crate) fn finish(&self) -> bool {
        let closed = self.open.swap(false, Ordering::AcqRel);
        if closed {
            self.actor.notify();
        }
        closed
    }

    /// Runs a unit dequeued by the worker thread.
    pub(crate) fn process(&self, unit: Runnable) {
        if !self.is_open() {
            if catch_unwind(AssertUnwindSafe(|| self.fallback.schedule(unit))).is_err() {
                tracing::error!(
                    name = self.actor.name(),
                    episode = self.episode,
                    "fallback target panicked while taking a unit of work"
                );
            }
            return;
        }
        if catch_unwind(AssertUnwindSafe(unit)).is_err() {
            tracing::error!(
                name = self.actor.name(),
                episode = self.episode,
                "unit of work panicked on the global mutex worker"
            );
        }
    }
}

impl fmt::Debug for EpisodeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpisodeScheduler")
            .field("name", &self.actor.name())
            .field("episode", &self.episode)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
