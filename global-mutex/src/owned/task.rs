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

//! A future driven through an episode scheduler.

use std::future::Future;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::Wake;
use std::task::Waker;

use crate::episode::EpisodeScheduler;
use crate::internal::Mutex;

/// Not scheduled, waiting for a wake.
const IDLE: usize = 0;
/// Handed to the scheduler, waiting to be polled.
const SCHEDULED: usize = 1;
/// Being polled.
const RUNNING: usize = 2;
/// Woken while being polled; must be scheduled again once the poll returns.
const NOTIFIED: usize = 3;
/// Returned `Ready` or panicked. The future has been dropped.
const COMPLETED: usize = 4;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Task {
    future: Mutex<Option<BoxFuture>>,
    state: AtomicUsize,
    scheduler: Arc<EpisodeScheduler>,
}

pub(super) fn spawn<F>(future: F, scheduler: Arc<EpisodeScheduler>)
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = Arc::new(Task {
        future: Mutex::new(Some(Box::pin(future))),
        state: AtomicUsize::new(SCHEDULED),
        scheduler,
    });
    task.schedule();
}

impl Task {
    fn schedule(self: Arc<Self>) {
        let scheduler = self.scheduler.clone();
        scheduler.enqueue(Box::new(move || self.run()));
    }

    fn run(self: Arc<Self>) {
        if self
            .state
            .compare_exchange(SCHEDULED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        // Wakes never take the future lock, so a future may wake itself while being polled.
        let poll = self.future.with(|slot| {
            let Some(future) = slot.as_mut() else {
                return Poll::Ready(());
            };
            match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
                Ok(Poll::Pending) => Poll::Pending,
                Ok(Poll::Ready(())) => {
                    *slot = None;
                    Poll::Ready(())
                }
                Err(_) => {
                    tracing::error!(
                        name = self.scheduler.actor().name(),
                        episode = self.scheduler.episode(),
                        "future scheduled on the global mutex worker panicked"
                    );
                    *slot = None;
                    Poll::Ready(())
                }
            }
        });

        match poll {
            Poll::Ready(()) => self.state.store(COMPLETED, Ordering::Release),
            Poll::Pending => {
                if self
                    .state
                    .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    self.state.store(SCHEDULED, Ordering::Release);
                    self.schedule();
                }
            }
        }
    }
}

impl Wake for Task {
    fn wake(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.schedule();
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.clone().wake();
    }
}
