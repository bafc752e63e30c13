// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::BorrowedFd;
use std::ptr::NonNull;

use log::error;
use nix::sys::mman::mmap;
use nix::sys::mman::munmap;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;

use crate::bridge_os::descriptor::AsRawDescriptor;
use crate::bridge_utils::BridgeError;
use crate::bridge_utils::BridgeResult;

/// Wraps a shared memory mapping in the current process.  Provides RAII semantics including
/// munmap when no longer needed.
#[derive(Debug)]
pub struct MemoryMapping {
    pub addr: NonNull<c_void>,
    pub size: usize,
}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        if let Err(e) = unsafe { munmap(self.addr, self.size) } {
            error!("failed to unmap buffer: {}", e);
        }
    }
}

impl MemoryMapping {
    pub fn from_descriptor(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        writable: bool,
    ) -> BridgeResult<MemoryMapping> {
        let non_zero_size = NonZeroUsize::new(size).ok_or(BridgeError::InvalidDimensions)?;
        let prot = if writable {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };

        // The borrowed descriptor stays open for the duration of the call; the kernel keeps its
        // own reference for the lifetime of the mapping.
        let fd = unsafe { BorrowedFd::borrow_raw(descriptor.as_raw_descriptor()) };
        let addr = unsafe { mmap(None, non_zero_size, prot, MapFlags::MAP_SHARED, fd, 0)? };
        Ok(MemoryMapping { addr, size })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.addr.as_ptr() as *mut u8
    }
}
