// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::FromRawFd;
use std::os::unix::io::IntoRawFd;
use std::os::unix::io::OwnedFd;
use std::os::unix::io::RawFd;

use crate::bridge_os::descriptor::AsRawDescriptor;
use crate::bridge_os::descriptor::FromRawDescriptor;
use crate::bridge_os::descriptor::IntoRawDescriptor;
use crate::bridge_os::descriptor::SafeDescriptor;

pub type RawDescriptor = RawFd;

pub const INVALID_DESCRIPTOR: RawDescriptor = -1;

impl Drop for SafeDescriptor {
    fn drop(&mut self) {
        // Safe because we own the descriptor; errors on close are not actionable.
        let _ = unsafe { libc::close(self.descriptor) };
    }
}

impl SafeDescriptor {
    /// Clones this descriptor, internally creating a new descriptor.  The new descriptor is
    /// close-on-exec.
    pub fn try_clone(&self) -> io::Result<SafeDescriptor> {
        // Safe because this doesn't modify any memory and we check the return value.
        let descriptor = unsafe { libc::fcntl(self.descriptor, libc::F_DUPFD_CLOEXEC, 0) };
        if descriptor < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(SafeDescriptor { descriptor })
        }
    }
}

impl From<OwnedFd> for SafeDescriptor {
    fn from(fd: OwnedFd) -> SafeDescriptor {
        SafeDescriptor {
            descriptor: fd.into_raw_fd(),
        }
    }
}

impl From<SafeDescriptor> for OwnedFd {
    fn from(s: SafeDescriptor) -> OwnedFd {
        // Safe because we own the SafeDescriptor at this point.
        unsafe { OwnedFd::from_raw_fd(s.into_raw_descriptor()) }
    }
}

macro_rules! AsRawDescriptor {
    ($name:ident) => {
        impl AsRawDescriptor for $name {
            fn as_raw_descriptor(&self) -> RawDescriptor {
                self.as_raw_fd()
            }
        }
    };
}

macro_rules! FromRawDescriptor {
    ($name:ident) => {
        impl FromRawDescriptor for $name {
            unsafe fn from_raw_descriptor(descriptor: RawDescriptor) -> Self {
                $name::from_raw_fd(descriptor)
            }
        }
    };
}

macro_rules! IntoRawDescriptor {
    ($name:ident) => {
        impl IntoRawDescriptor for $name {
            fn into_raw_descriptor(self) -> RawDescriptor {
                self.into_raw_fd()
            }
        }
    };
}

AsRawDescriptor!(File);
AsRawDescriptor!(OwnedFd);
FromRawDescriptor!(File);
FromRawDescriptor!(OwnedFd);
IntoRawDescriptor!(File);
IntoRawDescriptor!(OwnedFd);
