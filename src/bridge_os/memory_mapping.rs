// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::bridge_os::sys::platform::MemoryMapping as PlatformMapping;
use crate::bridge_os::AsRawDescriptor;
use crate::bridge_utils::BridgeResult;

/// A CPU mapping of buffer memory, unmapped on drop.
pub struct MemoryMapping {
    mapping: PlatformMapping,
}

impl MemoryMapping {
    pub fn from_descriptor(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        writable: bool,
    ) -> BridgeResult<MemoryMapping> {
        let mapping = PlatformMapping::from_descriptor(descriptor, size, writable)?;
        Ok(MemoryMapping { mapping })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mapping.as_mut_ptr()
    }

    pub fn size(&self) -> usize {
        self.mapping.size
    }
}
