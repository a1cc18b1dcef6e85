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

//! Error types returned by global mutex operations.

use std::io;

use thiserror::Error;

/// A type-erased error, as raised by a [`LifecycleHook`](crate::LifecycleHook).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while creating or acquiring a global mutex.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The mutex name is empty, too long, contains a NUL character, or was rejected by the OS.
    #[error("invalid global mutex name: {name:?}")]
    InvalidName { name: String },

    /// The OS refused access to the named kernel object.
    #[error("access denied to global mutex {name:?}")]
    AccessDenied { name: String },

    /// Any other OS error raised while opening, waiting on or releasing the kernel object.
    #[error("global mutex {name:?}: {source}")]
    Os {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The dedicated worker thread could not be started.
    #[error("failed to spawn worker thread for global mutex {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The after-acquire hook returned an error; ownership was not granted.
    #[error("after-acquire hook failed: {0}")]
    Hook(#[source] BoxError),

    /// The after-acquire hook panicked; ownership was not granted.
    #[error("after-acquire hook panicked")]
    HookPanicked,

    /// The request was dropped by the worker without producing a result.
    #[error("global mutex worker dropped the request")]
    WorkerGone,

    /// A unit of work scheduled on the worker thread panicked.
    #[error("task scheduled on the global mutex worker panicked")]
    TaskPanicked,
}

impl Error {
    pub(crate) fn os(name: &str, source: io::Error) -> Self {
        Self::Os {
            name: name.to_owned(),
            source,
        }
    }

    /// Returns the hook error carried by [`Error::Hook`], if any.
    pub fn hook_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Hook(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Result type for global mutex operations.
pub type Result<T> = std::result::Result<T, Error>;
