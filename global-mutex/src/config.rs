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
use std::sync::Arc;
use std::time::Duration;

use crate::LifecycleHook;
use crate::Schedule;

/// Default bound after which an open episode is reported as suspicious.
pub const DEFAULT_OPEN_EPISODE_WARNING: Duration = Duration::from_secs(30);

/// Per-name configuration, applied when the worker for a name is first created.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) open_episode_warning: Option<Duration>,
    pub(crate) stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            open_episode_warning: Some(DEFAULT_OPEN_EPISODE_WARNING),
            stack_size: None,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs a warning once per episode that stays open longer than `bound`.
    ///
    /// Pass `None` to disable the diagnostic.
    pub fn open_episode_warning(mut self, bound: Option<Duration>) -> Self {
        self.open_episode_warning = bound;
        self
    }

    /// Sets the stack size of the dedicated worker thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

/// Options for a single acquisition.
///
/// # Examples
///
/// ```
/// use global_mutex::AcquireOptions;
///
/// let options = AcquireOptions::new().capture_scheduler(true);
/// ```
#[derive(Clone, Default)]
pub struct AcquireOptions {
    pub(crate) hook: Option<Arc<dyn LifecycleHook>>,
    pub(crate) capture_scheduler: bool,
    pub(crate) fallback: Option<Arc<dyn Schedule>>,
}

impl AcquireOptions {
    /// Creates options with no hook, and the default fallback target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lifecycle hook run on the worker thread around the episode.
    pub fn hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Captures the scheduler that is current when `acquire` is called, and uses it as the
    /// fallback target once the episode is finished.
    ///
    /// Ignored when an explicit fallback is set with [`AcquireOptions::fallback`].
    pub fn capture_scheduler(mut self, capture: bool) -> Self {
        self.capture_scheduler = capture;
        self
    }

    /// Sets an explicit fallback target.
    pub fn fallback(mut self, fallback: Arc<dyn Schedule>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl fmt::Debug for AcquireOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquireOptions")
            .field("hook", &self.hook.is_some())
            .field("capture_scheduler", &self.capture_scheduler)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
