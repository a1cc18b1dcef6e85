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

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::*;

#[test]
fn test_default_schedule_runs_off_thread() {
    let (tx, rx) = mpsc::channel();
    DefaultSchedule.schedule(Box::new(move || {
        tx.send(thread::current().id()).unwrap();
    }));
    let id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_ne!(id, thread::current().id());
}

#[test]
fn test_capture_outside_runtime_uses_default() {
    let (tx, rx) = mpsc::channel();
    let target = capture_current();
    target.schedule(Box::new(move || {
        tx.send(thread::current().name().map(str::to_owned)).unwrap();
    }));
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("global-mutex-fallback"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capture_inside_runtime_uses_tokio() {
    let (tx, rx) = futures::channel::oneshot::channel();
    let target = capture_current();
    target.schedule(Box::new(move || {
        let _ = tx.send(tokio::runtime::Handle::try_current().is_ok());
    }));
    assert!(rx.await.unwrap());
}

#[test]
fn test_shut_down_runtime_forwards_units() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .unwrap();
    let target = {
        let _guard = rt.enter();
        capture_current()
    };
    rt.shutdown_background();

    let (tx, rx) = mpsc::channel();
    target.schedule(Box::new(move || {
        tx.send(thread::current().name().map(str::to_owned)).unwrap();
    }));
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("global-mutex-fallback"));
}

#[test]
fn test_queued_units_run_on_next_helper() {
    let (tx, rx) = mpsc::channel();
    let left_behind = tx.clone();
    queued().push(Box::new(move || {
        left_behind
            .send(thread::current().name().map(str::to_owned))
            .unwrap();
    }));
    DefaultSchedule.schedule(Box::new(move || {
        tx.send(thread::current().name().map(str::to_owned)).unwrap();
    }));

    for _ in 0..2 {
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("global-mutex-fallback"));
    }
}

#[test]
fn test_worker_thread_is_marked() {
    assert!(!crate::actor::on_worker_thread());

    let mutex = crate::GlobalMutex::get("global-mutex-test-worker-mark").unwrap();
    let owned = pollster::block_on(mutex.acquire()).unwrap();
    let on_worker = pollster::block_on(owned.run_on_worker(crate::actor::on_worker_thread));
    assert!(on_worker.unwrap());
    owned.release();
}
