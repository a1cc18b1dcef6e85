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

//! Named kernel mutexes.
//!
//! On Windows a name maps to a kernel mutex object, shared with every process that opens the
//! same name. On Unix a name maps to a lock file in the system temporary directory, and the
//! mutex is an exclusive `flock(2)` on that file.
//!
//! Windows mutexes are owned by a thread: [`KernelMutex::unlock`] must be called on the thread
//! that returned from [`KernelMutex::lock`].

use crate::Error;
use crate::Result;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::KernelMutex;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::KernelMutex;

/// Longest accepted name, in bytes.
pub(crate) const NAME_LEN_MAX: usize = 260;

/// How a kernel wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquired {
    Owned,
    /// The previous owner exited while holding the mutex. Ownership is still granted.
    Abandoned,
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_LEN_MAX || name.contains('\0') {
        return Err(Error::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}
