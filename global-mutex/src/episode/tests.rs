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

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::GlobalMutex;

#[test]
fn test_finish_is_one_way() {
    let mutex = GlobalMutex::get("global-mutex-test-episode-finish").unwrap();
    let owned = pollster::block_on(mutex.acquire()).unwrap();
    let scheduler = owned.scheduler().clone();

    assert!(scheduler.is_open());
    assert!(scheduler.finish());
    assert!(!scheduler.is_open());
    assert!(!scheduler.finish());
    assert!(!scheduler.is_open());
    drop(owned);
    assert!(!scheduler.is_open());
}

#[test]
fn test_try_run_inline_off_worker() {
    let mutex = GlobalMutex::get("global-mutex-test-episode-inline").unwrap();
    let owned = pollster::block_on(mutex.acquire()).unwrap();
    let scheduler = owned.scheduler().clone();

    let ran = Arc::new(AtomicBool::new(false));
    let unit = {
        let ran = ran.clone();
        Box::new(move || ran.store(true, Ordering::SeqCst))
    };
    assert!(scheduler.try_run_inline(unit).is_err());
    assert!(!ran.load(Ordering::SeqCst));

    // on the worker, but only while the episode is open
    let on_worker = {
        let scheduler = scheduler.clone();
        pollster::block_on(owned.run_on_worker(move || {
            scheduler.try_run_inline(Box::new(|| {})).is_ok()
        }))
        .unwrap()
    };
    assert!(on_worker);
    owned.release();
}

#[test]
fn test_no_unit_lost_across_finish() {
    const PRODUCERS: usize = 4;
    const UNITS: usize = 200;

    let mutex = GlobalMutex::get("global-mutex-test-episode-no-loss").unwrap();
    let worker = mutex.worker_thread_id();

    for _ in 0..5 {
        let owned = pollster::block_on(mutex.acquire()).unwrap();
        let scheduler = owned.scheduler().clone();

        let finished = Arc::new(AtomicBool::new(false));
        let ran = Arc::new(AtomicUsize::new(0));
        let late_on_worker = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(PRODUCERS + 1));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let scheduler = scheduler.clone();
                let finished = finished.clone();
                let ran = ran.clone();
                let late_on_worker = late_on_worker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..UNITS {
                        let late = finished.load(Ordering::SeqCst);
                        let ran = ran.clone();
                        let late_on_worker = late_on_worker.clone();
                        scheduler.enqueue(Box::new(move || {
                            if late && thread::current().id() == worker {
                                late_on_worker.fetch_add(1, Ordering::SeqCst);
                            }
                            ran.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();

        barrier.wait();
        thread::sleep(Duration::from_micros(200));
        owned.release();
        finished.store(true, Ordering::SeqCst);

        for producer in producers {
            producer.join().unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while ran.load(Ordering::SeqCst) < PRODUCERS * UNITS {
            assert!(Instant::now() < deadline, "units were lost");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ran.load(Ordering::SeqCst), PRODUCERS * UNITS);
        assert_eq!(late_on_worker.load(Ordering::SeqCst), 0);
    }

    // the worker keeps serving
    let owned = pollster::block_on(mutex.acquire()).unwrap();
    owned.release();
}

#[test]
fn test_units_run_in_enqueue_order() {
    let mutex = GlobalMutex::get("global-mutex-test-episode-order").unwrap();
    let owned = pollster::block_on(mutex.acquire()).unwrap();
    let scheduler = owned.scheduler().clone();

    let seen = Arc::new(crate::internal::Mutex::new(Vec::new()));
    for i in 0..100 {
        let seen = seen.clone();
        scheduler.enqueue(Box::new(move || seen.with(|seen| seen.push(i))));
    }
    // a closure queued last observes every earlier unit
    let observed = pollster::block_on(owned.run_on_worker({
        let seen = seen.clone();
        move || seen.with(|seen| seen.clone())
    }))
    .unwrap();
    assert_eq!(observed, (0..100).collect::<Vec<_>>());
    owned.release();
}
