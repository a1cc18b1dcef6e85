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

use std::sync::OnceLock;
use std::thread;
use std::thread::Thread;
use std::thread::ThreadId;
use std::time::Duration;

/// The wake signal of a worker thread.
///
/// Any thread may [`notify`](WakeSignal::notify); only the bound worker thread may wait. A
/// notification sent while the worker is running is not lost: the next wait returns at once.
/// Waits may also return spuriously, so the worker must re-check its queues after each one.
#[derive(Debug)]
pub(crate) struct WakeSignal {
    worker: OnceLock<Thread>,
}

impl WakeSignal {
    pub(crate) const fn new() -> Self {
        Self {
            worker: OnceLock::new(),
        }
    }

    /// Binds the signal to the worker thread. Later calls are ignored.
    pub(crate) fn bind(&self, worker: Thread) {
        let _ = self.worker.set(worker);
    }

    pub(crate) fn notify(&self) {
        if let Some(worker) = self.worker.get() {
            worker.unpark();
        }
    }

    /// Blocks the worker until notified.
    pub(crate) fn wait(&self) {
        debug_assert!(self.is_worker());
        thread::park();
    }

    /// Blocks the worker until notified, or until `timeout` elapsed.
    pub(crate) fn wait_timeout(&self, timeout: Duration) {
        debug_assert!(self.is_worker());
        thread::park_timeout(timeout);
    }

    pub(crate) fn worker_id(&self) -> Option<ThreadId> {
        self.worker.get().map(Thread::id)
    }

    pub(crate) fn is_worker(&self) -> bool {
        self.worker_id() == Some(thread::current().id())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_notify_before_wait_is_not_lost() {
        let signal = Arc::new(WakeSignal::new());
        let ready = Arc::new(AtomicBool::new(false));

        let worker = {
            let signal = signal.clone();
            let ready = ready.clone();
            thread::spawn(move || {
                signal.bind(thread::current());
                while !ready.load(Ordering::Acquire) {
                    signal.wait();
                }
            })
        };
        signal.bind(worker.thread().clone());
        assert!(!signal.is_worker());
        assert_eq!(signal.worker_id(), Some(worker.thread().id()));

        ready.store(true, Ordering::Release);
        signal.notify();
        worker.join().unwrap();
    }

    #[test]
    fn test_notify_unbound_is_noop() {
        let signal = WakeSignal::new();
        signal.notify();
        assert_eq!(signal.worker_id(), None);
    }
}
