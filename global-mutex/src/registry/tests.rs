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

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use super::*;
use crate::Error;

#[test]
fn test_get_returns_same_actor() {
    let a = get_or_create("global-mutex-test-registry-same", None).unwrap();
    let b = get_or_create("global-mutex-test-registry-same", Some(Config::new())).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.worker_id(), b.worker_id());
}

#[test]
fn test_distinct_names_have_distinct_workers() {
    let a = get_or_create("global-mutex-test-registry-a", None).unwrap();
    let b = get_or_create("global-mutex-test-registry-b", None).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.worker_id(), b.worker_id());
}

#[test]
fn test_concurrent_first_use() {
    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                get_or_create("global-mutex-test-registry-race", None).unwrap()
            })
        })
        .collect();
    let actors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for actor in &actors[1..] {
        assert!(Arc::ptr_eq(&actors[0], actor));
    }
}

#[test]
fn test_creation_error_is_not_cached() {
    for _ in 0..2 {
        let err = get_or_create("", None).unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }), "{err:?}");
    }
    assert!(!contains(""));
}
