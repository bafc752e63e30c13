// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility file for allocating exportable native buffers from system memory.  On Linux systems,
//! this is done with memfd.  Buffers serialize to one descriptor plus a small integer header, so
//! they can be handed to another process and rebuilt there.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap as Map;

use log::debug;
use log::warn;

use crate::bridge_os::round_up_to_page_size;
use crate::bridge_os::AsRawDescriptor;
use crate::bridge_os::Descriptor;
use crate::bridge_os::MemoryMapping;
use crate::bridge_os::RawDescriptor;
use crate::bridge_os::SafeDescriptor;
use crate::bridge_os::SharedMemory;
use crate::bridge_utils::*;
use crate::native_buffer::allocator::BufferAllocationInfo;
use crate::native_buffer::allocator::HandleCounts;
use crate::native_buffer::allocator::NativeAllocator;
use crate::native_buffer::formats::canonical_layout;

/// "HBSM" in little endian, the first integer of every serialized system buffer.
const SYSTEM_BUFFER_MAGIC: i32 = 0x4d53_4248;

const SYSTEM_BUFFER_NUM_INTS: usize = 8;
const SYSTEM_BUFFER_NUM_FDS: usize = 1;

struct SystemBuffer {
    shm: SharedMemory,
    info: BufferAllocationInfo,
    stride: u32,
    size: u64,
    mapping: Option<MemoryMapping>,
    lock_count: u32,
}

impl SystemBuffer {
    fn header(&self) -> [i32; SYSTEM_BUFFER_NUM_INTS] {
        [
            SYSTEM_BUFFER_MAGIC,
            self.info.width as i32,
            self.info.height as i32,
            self.info.format.0 as i32,
            self.info.usage.0 as i32,
            self.stride as i32,
            self.size as u32 as i32,
            (self.size >> 32) as u32 as i32,
        ]
    }
}

/// A native allocator that hands out memfd-backed buffers.  It never touches a GPU, so it is the
/// allocator of choice for tests and for hosts without a vendor allocator.
pub struct SystemAllocator {
    buffers: RefCell<Map<RawBuffer, SystemBuffer>>,
    next_id: Cell<usize>,
}

impl SystemAllocator {
    pub fn new() -> SystemAllocator {
        SystemAllocator {
            buffers: RefCell::new(Default::default()),
            next_id: Cell::new(1),
        }
    }

    /// Number of buffers that have not been released yet.
    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    fn insert(&self, buffer: SystemBuffer) -> RawBuffer {
        let raw = RawBuffer(self.next_id.get());
        self.next_id.set(raw.0 + 1);
        self.buffers.borrow_mut().insert(raw, buffer);
        raw
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        SystemAllocator::new()
    }
}

impl NativeAllocator for SystemAllocator {
    fn supports_remote_buffers(&self) -> bool {
        true
    }

    fn create(&self, info: BufferAllocationInfo) -> BridgeResult<(RawBuffer, u32)> {
        let (stride, size) = canonical_layout(info.width, info.height, info.format)?;
        let shm = SharedMemory::new("hybris_bridge_buffer", round_up_to_page_size(size)?)?;

        let raw = self.insert(SystemBuffer {
            shm,
            info,
            stride,
            size,
            mapping: None,
            lock_count: 0,
        });

        debug!(
            "system buffer {:?}: {}x{} stride {}",
            raw, info.width, info.height, stride
        );
        Ok((raw, stride))
    }

    fn create_remote(
        &self,
        info: BufferAllocationInfo,
        stride: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<RawBuffer> {
        if ints.len() != SYSTEM_BUFFER_NUM_INTS || fds.len() != SYSTEM_BUFFER_NUM_FDS {
            return Err(BridgeError::ImportFailed("unexpected handle counts"));
        }

        if ints[0] != SYSTEM_BUFFER_MAGIC {
            return Err(BridgeError::ImportFailed("not a system buffer"));
        }

        if ints[1] as u32 != info.width
            || ints[2] as u32 != info.height
            || ints[3] as u32 != info.format.0
            || ints[5] as u32 != stride
        {
            return Err(BridgeError::ImportFailed("buffer parameters do not match"));
        }

        let size = ints[6] as u32 as u64 | (ints[7] as u32 as u64) << 32;
        let (_, min_size) = canonical_layout(info.width, info.height, info.format)?;
        if size < min_size {
            return Err(BridgeError::ImportFailed("buffer too small for its layout"));
        }

        let descriptor = SafeDescriptor::try_from(&Descriptor(fds[0]) as &dyn AsRawDescriptor)?;
        let shm = SharedMemory::from_descriptor(descriptor)?;
        if shm.size() < size {
            return Err(BridgeError::ImportFailed("shared memory is truncated"));
        }

        Ok(self.insert(SystemBuffer {
            shm,
            info,
            stride,
            size,
            mapping: None,
            lock_count: 0,
        }))
    }

    fn lock(&self, buffer: RawBuffer, _usage: UsageFlags) -> BridgeResult<*mut u8> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers
            .get_mut(&buffer)
            .ok_or(BridgeError::InvalidBuffer("unknown system buffer"))?;

        let mapping = match entry.mapping.take() {
            Some(mapping) => mapping,
            None => MemoryMapping::from_descriptor(&entry.shm, entry.size.try_into()?, true)?,
        };

        let ptr = mapping.as_mut_ptr();
        entry.mapping = Some(mapping);
        entry.lock_count += 1;
        Ok(ptr)
    }

    fn unlock(&self, buffer: RawBuffer) -> BridgeResult<()> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers
            .get_mut(&buffer)
            .ok_or(BridgeError::InvalidBuffer("unknown system buffer"))?;

        if entry.lock_count == 0 {
            return Err(BridgeError::InvalidBuffer("system buffer is not locked"));
        }

        entry.lock_count -= 1;
        if entry.lock_count == 0 {
            entry.mapping = None;
        }

        Ok(())
    }

    fn release(&self, buffer: RawBuffer) {
        if self.buffers.borrow_mut().remove(&buffer).is_none() {
            warn!("release of unknown system buffer {:?}", buffer);
        }
    }

    fn handle_counts(&self, buffer: RawBuffer) -> BridgeResult<HandleCounts> {
        if !self.buffers.borrow().contains_key(&buffer) {
            return Err(BridgeError::InvalidBuffer("unknown system buffer"));
        }

        Ok(HandleCounts {
            num_ints: SYSTEM_BUFFER_NUM_INTS,
            num_fds: SYSTEM_BUFFER_NUM_FDS,
        })
    }

    fn serialize(
        &self,
        buffer: RawBuffer,
        ints: &mut [i32],
        fds: &mut [RawDescriptor],
    ) -> BridgeResult<()> {
        let buffers = self.buffers.borrow();
        let entry = buffers
            .get(&buffer)
            .ok_or(BridgeError::InvalidBuffer("unknown system buffer"))?;

        if ints.len() != SYSTEM_BUFFER_NUM_INTS {
            return Err(BridgeError::CodecMismatch {
                what: "int",
                expected: SYSTEM_BUFFER_NUM_INTS,
                actual: ints.len(),
            });
        }

        if fds.len() != SYSTEM_BUFFER_NUM_FDS {
            return Err(BridgeError::CodecMismatch {
                what: "fd",
                expected: SYSTEM_BUFFER_NUM_FDS,
                actual: fds.len(),
            });
        }

        ints.copy_from_slice(&entry.header());
        fds[0] = entry.shm.as_raw_descriptor();
        Ok(())
    }

    fn query(&self, buffer: RawBuffer) -> BridgeResult<BufferAllocationInfo> {
        self.buffers
            .borrow()
            .get(&buffer)
            .map(|entry| entry.info)
            .ok_or(BridgeError::InvalidBuffer("unknown system buffer"))
    }
}
