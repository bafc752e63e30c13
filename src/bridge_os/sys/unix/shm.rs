// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::convert::TryInto;
use std::ffi::CStr;
use std::fs::File;
use std::io::Seek;
use std::io::SeekFrom;
use std::os::unix::io::OwnedFd;

use libc::off_t;
use nix::sys::memfd::memfd_create;
use nix::sys::memfd::MemFdCreateFlag;
use nix::unistd::ftruncate;
use nix::unistd::sysconf;
use nix::unistd::SysconfVar;
use vmm_sys_util::align_upwards;

use crate::bridge_os::descriptor::AsRawDescriptor;
use crate::bridge_os::descriptor::IntoRawDescriptor;
use crate::bridge_os::RawDescriptor;
use crate::bridge_os::SafeDescriptor;
use crate::bridge_utils::BridgeError;
use crate::bridge_utils::BridgeResult;

pub struct SharedMemory {
    fd: OwnedFd,
    size: u64,
}

impl SharedMemory {
    /// Creates a new shared memory file descriptor of `size` bytes.
    ///
    /// The name appears in `/proc/self/fd/<shm fd>` for the purposes of debugging and does not
    /// need to be unique.  The descriptor is close-on-exec and allows memfd sealing.
    pub fn new(debug_name: &CStr, size: u64) -> BridgeResult<SharedMemory> {
        let fd = memfd_create(
            debug_name,
            MemFdCreateFlag::MFD_CLOEXEC | MemFdCreateFlag::MFD_ALLOW_SEALING,
        )?;

        let size_off_t: off_t = size.try_into()?;
        ftruncate(&fd, size_off_t)?;

        Ok(SharedMemory { fd, size })
    }

    /// Adopts a descriptor received from another process.  The size is whatever the file
    /// currently spans.
    pub fn from_descriptor(descriptor: SafeDescriptor) -> BridgeResult<SharedMemory> {
        let mut file: File = descriptor.into();
        let size = file.seek(SeekFrom::End(0))?;
        file.rewind()?;
        Ok(SharedMemory {
            fd: file.into(),
            size,
        })
    }

    /// Gets the size in bytes of the shared memory.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl AsRawDescriptor for SharedMemory {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.fd.as_raw_descriptor()
    }
}

impl IntoRawDescriptor for SharedMemory {
    fn into_raw_descriptor(self) -> RawDescriptor {
        self.fd.into_raw_descriptor()
    }
}

/// Uses the system's page size in bytes to round the given value up to the nearest page boundary.
pub fn round_up_to_page_size(v: u64) -> BridgeResult<u64> {
    let page_size_opt = sysconf(SysconfVar::PAGE_SIZE)?;
    if let Some(page_size) = page_size_opt {
        let aligned_size = align_upwards!(v, page_size as u64);
        Ok(aligned_size)
    } else {
        Err(BridgeError::Unsupported)
    }
}
