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

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;

use crate::BoxError;

/// Bus-specific code run on the worker thread at the boundaries of an episode.
///
/// Both methods are called synchronously on the worker thread that owns the kernel mutex:
/// `on_after_acquire` right after the kernel mutex was acquired, `on_before_release` right before
/// it is released.
///
/// An error returned by `on_after_acquire` fails the acquisition: the kernel mutex is released
/// and the error is returned to the caller of `acquire`. An error returned by
/// `on_before_release` is logged and otherwise ignored.
///
/// # Examples
///
/// ```
/// use global_mutex::BoxError;
/// use global_mutex::LifecycleHook;
///
/// struct ProbeController;
///
/// impl LifecycleHook for ProbeController {
///     fn on_after_acquire(&self) -> Result<(), BoxError> {
///         // check that the controller answers before handing out the bus
///         Ok(())
///     }
/// }
/// ```
pub trait LifecycleHook: Send + Sync + 'static {
    fn on_after_acquire(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_before_release(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

pub(crate) enum HookFailure {
    Error(BoxError),
    Panic,
}

pub(crate) fn invoke<F>(f: F) -> Result<(), HookFailure>
where
    F: FnOnce() -> Result<(), BoxError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(HookFailure::Error(err)),
        Err(_) => Err(HookFailure::Panic),
    }
}
