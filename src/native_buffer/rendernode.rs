// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! rendernode: tells DRM render nodes apart from primary nodes and other files.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::sys::stat::fstat;
use nix::sys::stat::SFlag;

use crate::bridge_os::AsRawDescriptor;

/// Render nodes are numbered from 128, so their minor has bit 7 set.
const DRM_RENDER_MINOR_BIT: u64 = 0x80;

/// Returns true if `descriptor` refers to a DRM render node.
pub fn is_render_node(descriptor: &dyn AsRawDescriptor) -> bool {
    let stat = match fstat(descriptor.as_raw_descriptor()) {
        Ok(stat) => stat,
        Err(_) => return false,
    };

    if SFlag::from_bits_truncate(stat.st_mode) & SFlag::S_IFMT != SFlag::S_IFCHR {
        return false;
    }

    stat.st_rdev as u64 & DRM_RENDER_MINOR_BIT != 0
}

/// Opens `device_path` and checks whether it is a DRM render node.  Paths that cannot be opened
/// are not render nodes.
pub fn is_device_path_render_node<P: AsRef<Path>>(device_path: P) -> bool {
    match OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_CLOEXEC)
        .open(device_path)
    {
        Ok(file) => is_render_node(&file),
        Err(_) => false,
    }
}
