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

use std::io;
use std::iter;
use std::ptr;

use windows_sys::Win32::Foundation::CloseHandle;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::Foundation::ERROR_ACCESS_DENIED;
use windows_sys::Win32::Foundation::ERROR_BAD_PATHNAME;
use windows_sys::Win32::Foundation::ERROR_INVALID_HANDLE;
use windows_sys::Win32::Foundation::ERROR_INVALID_NAME;
use windows_sys::Win32::Foundation::ERROR_PATH_NOT_FOUND;
use windows_sys::Win32::Foundation::HANDLE;
use windows_sys::Win32::Foundation::WAIT_ABANDONED;
use windows_sys::Win32::Foundation::WAIT_OBJECT_0;
#[cfg(test)]
use windows_sys::Win32::Foundation::WAIT_TIMEOUT;
use windows_sys::Win32::System::Threading::CreateMutexW;
use windows_sys::Win32::System::Threading::ReleaseMutex;
use windows_sys::Win32::System::Threading::WaitForSingleObject;
use windows_sys::Win32::System::Threading::INFINITE;

use super::validate_name;
use super::Acquired;
use crate::Error;
use crate::Result;

#[derive(Debug)]
pub(crate) struct KernelMutex {
    name: String,
    handle: HANDLE,
}

// SAFETY: kernel handles may be used from any thread. Ownership of the mutex itself is
// thread-bound, which the worker loop respects by locking and unlocking on one thread.
unsafe impl Send for KernelMutex {}
unsafe impl Sync for KernelMutex {}

impl KernelMutex {
    pub(crate) fn open(name: &str) -> Result<Self> {
        validate_name(name)?;
        let wide: Vec<u16> = name.encode_utf16().chain(iter::once(0)).collect();
        // SAFETY: `wide` is NUL terminated and outlives the call.
        let handle = unsafe { CreateMutexW(ptr::null(), 0, wide.as_ptr()) };
        if handle.is_null() {
            // SAFETY: no other Win32 call happened since `CreateMutexW`.
            let code = unsafe { GetLastError() };
            return Err(match code {
                ERROR_ACCESS_DENIED => Error::AccessDenied {
                    name: name.to_owned(),
                },
                // ERROR_INVALID_HANDLE: the name belongs to a non-mutex object.
                ERROR_INVALID_NAME | ERROR_BAD_PATHNAME | ERROR_PATH_NOT_FOUND
                | ERROR_INVALID_HANDLE => Error::InvalidName {
                    name: name.to_owned(),
                },
                _ => Error::os(name, io::Error::from_raw_os_error(code as i32)),
            });
        }
        Ok(Self {
            name: name.to_owned(),
            handle,
        })
    }

    pub(crate) fn lock(&self) -> Result<Acquired> {
        // SAFETY: `self.handle` is a valid mutex handle until drop.
        match unsafe { WaitForSingleObject(self.handle, INFINITE) } {
            WAIT_OBJECT_0 => Ok(Acquired::Owned),
            WAIT_ABANDONED => Ok(Acquired::Abandoned),
            _ => Err(Error::os(&self.name, io::Error::last_os_error())),
        }
    }

    /// Returns `false` if another thread holds the mutex.
    #[cfg(test)]
    pub(crate) fn try_lock(&self) -> Result<bool> {
        // SAFETY: `self.handle` is a valid mutex handle until drop.
        match unsafe { WaitForSingleObject(self.handle, 0) } {
            WAIT_OBJECT_0 | WAIT_ABANDONED => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            _ => Err(Error::os(&self.name, io::Error::last_os_error())),
        }
    }

    pub(crate) fn unlock(&self) -> Result<()> {
        // SAFETY: `self.handle` is a valid mutex handle until drop.
        if unsafe { ReleaseMutex(self.handle) } == 0 {
            return Err(Error::os(&self.name, io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for KernelMutex {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and closed exactly once.
        unsafe { CloseHandle(self.handle) };
    }
}
