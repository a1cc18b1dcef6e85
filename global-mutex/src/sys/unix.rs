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

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use super::validate_name;
use super::Acquired;
use crate::Error;
use crate::Result;

#[derive(Debug)]
pub(crate) struct KernelMutex {
    name: String,
    file: File,
}

impl KernelMutex {
    pub(crate) fn open(name: &str) -> Result<Self> {
        validate_name(name)?;
        let path = lock_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o666)
            .open(&path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::PermissionDenied => Error::AccessDenied {
                    name: name.to_owned(),
                },
                _ => Error::os(name, err),
            })?;
        tracing::trace!(name, path = %path.display(), "opened lock file");
        Ok(Self {
            name: name.to_owned(),
            file,
        })
    }

    pub(crate) fn lock(&self) -> Result<Acquired> {
        self.flock(libc::LOCK_EX).map(|()| Acquired::Owned)
    }

    pub(crate) fn unlock(&self) -> Result<()> {
        self.flock(libc::LOCK_UN)
    }

    /// Returns `false` if another descriptor holds the lock.
    #[cfg(test)]
    pub(crate) fn try_lock(&self) -> Result<bool> {
        match self.flock(libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(true),
            Err(Error::Os { source, .. }) if source.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn flock(&self, operation: libc::c_int) -> Result<()> {
        loop {
            // SAFETY: the descriptor is owned by `self.file` and stays open for the call.
            let rc = unsafe { libc::flock(self.file.as_raw_fd(), operation) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::os(&self.name, err));
            }
        }
    }
}

fn lock_path(name: &str) -> PathBuf {
    let file_name: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    std::env::temp_dir().join(format!("{file_name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_flat() {
        let path = lock_path("Global\\Access_SMBUS.HTP.Method");
        assert_eq!(
            path.file_name().unwrap(),
            "Global_Access_SMBUS.HTP.Method.lock"
        );
        assert_eq!(path.parent().unwrap(), std::env::temp_dir());

        let path = lock_path("../escape/attempt");
        assert_eq!(path.file_name().unwrap(), ".._escape_attempt.lock");
    }

    #[test]
    fn test_exclusive_across_descriptors() {
        // Two descriptors on one file contend exactly as two processes would.
        let a = KernelMutex::open("global-mutex-sys-test-exclusive").unwrap();
        let b = KernelMutex::open("global-mutex-sys-test-exclusive").unwrap();
        a.lock().unwrap();

        assert!(!b.try_lock().unwrap());

        a.unlock().unwrap();
        b.lock().unwrap();
        b.unlock().unwrap();
    }
}
