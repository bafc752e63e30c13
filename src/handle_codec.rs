// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! handle_codec: turns a native buffer into integers plus file descriptors that can be sent to
//! another process, and back.
//!
//! The integer and descriptor arrays describe a single buffer together: they are produced in one
//! step and consumed in one step, never separately.

use std::mem::size_of;
use std::rc::Rc;

use log::error;
use zerocopy::AsBytes;
use zerocopy::FromBytes;

use crate::bridge_os::AsRawDescriptor;
use crate::bridge_os::AsRawDescriptors;
use crate::bridge_os::Descriptor;
use crate::bridge_os::RawDescriptor;
use crate::bridge_os::SafeDescriptor;
use crate::bridge_os::INVALID_DESCRIPTOR;
use crate::bridge_utils::*;
use crate::native_buffer::BufferAllocationInfo;
use crate::native_buffer::HandleCounts;
use crate::native_buffer::NativeAllocator;
use crate::native_buffer::NativeBuffer;

/// A serialized native buffer.  The descriptors are duplicates owned by this struct, so the
/// source buffer may be released while the descriptor is still in flight.
#[derive(Debug)]
pub struct BufferDescriptor {
    /// Stride in pixels.
    pub stride: u32,
    pub ints: Vec<i32>,
    pub fds: Vec<SafeDescriptor>,
}

impl BufferDescriptor {
    pub fn raw_fds(&self) -> Vec<RawDescriptor> {
        self.fds.as_slice().as_raw_descriptors()
    }

    pub fn counts(&self) -> HandleCounts {
        HandleCounts {
            num_ints: self.ints.len(),
            num_fds: self.fds.len(),
        }
    }
}

/// Returns how many integers and descriptors describe `buffer` remotely.
pub fn get_info(buffer: &NativeBuffer) -> BridgeResult<HandleCounts> {
    buffer.allocator().handle_counts(buffer.raw())
}

/// Serializes `buffer` into caller-provided arrays, whose lengths must be exactly the `counts`
/// returned by `get_info`.  The descriptors written to `fds` remain owned by the allocator.
pub fn serialize_into(
    buffer: &NativeBuffer,
    counts: HandleCounts,
    ints: &mut [i32],
    fds: &mut [RawDescriptor],
) -> BridgeResult<()> {
    if ints.len() != counts.num_ints {
        error!(
            "int array of {} does not match {} for {:?}",
            ints.len(),
            counts.num_ints,
            buffer.raw()
        );
        return Err(BridgeError::CodecMismatch {
            what: "int",
            expected: counts.num_ints,
            actual: ints.len(),
        });
    }

    if fds.len() != counts.num_fds {
        error!(
            "fd array of {} does not match {} for {:?}",
            fds.len(),
            counts.num_fds,
            buffer.raw()
        );
        return Err(BridgeError::CodecMismatch {
            what: "fd",
            expected: counts.num_fds,
            actual: fds.len(),
        });
    }

    buffer.allocator().serialize(buffer.raw(), ints, fds)
}

/// Serializes `buffer`, duplicating every descriptor so the result owns them.
pub fn serialize(buffer: &NativeBuffer) -> BridgeResult<BufferDescriptor> {
    let counts = get_info(buffer)?;
    let mut ints = vec![0; counts.num_ints];
    let mut raw_fds = vec![INVALID_DESCRIPTOR; counts.num_fds];
    serialize_into(buffer, counts, &mut ints, &mut raw_fds)?;

    let mut fds = Vec::with_capacity(raw_fds.len());
    for raw_fd in raw_fds {
        if raw_fd < 0 {
            return Err(BridgeError::InvalidBuffer("serialized descriptor is invalid"));
        }

        fds.push(SafeDescriptor::try_from(
            &Descriptor(raw_fd) as &dyn AsRawDescriptor
        )?);
    }

    Ok(BufferDescriptor {
        stride: buffer.stride(),
        ints,
        fds,
    })
}

/// Rebuilds a buffer from serialized handles.  `fds` stays owned by the caller.
pub fn deserialize(
    allocator: &Rc<dyn NativeAllocator>,
    info: BufferAllocationInfo,
    stride: u32,
    ints: &[i32],
    fds: &[RawDescriptor],
) -> BridgeResult<NativeBuffer> {
    if !allocator.supports_remote_buffers() {
        return Err(BridgeError::Unsupported);
    }

    if fds.iter().any(|fd| *fd < 0) {
        return Err(BridgeError::ImportFailed("negative descriptor"));
    }

    NativeBuffer::from_remote(allocator, info, stride, ints, fds)
}

/// The handle half of an `android_wlegl` buffer request: the integers travel as the bytes of a
/// `wl_array`, each descriptor is attached with its own `add_fd` request.
#[derive(Debug)]
pub struct WireHandle {
    ints: Vec<u8>,
    fds: Vec<SafeDescriptor>,
}

impl WireHandle {
    pub fn num_fds(&self) -> usize {
        self.fds.len()
    }

    /// Contents of the `wl_array` carrying the integers, in native byte order.
    pub fn int_array(&self) -> &[u8] {
        &self.ints
    }

    pub fn fds(&self) -> &[SafeDescriptor] {
        &self.fds
    }

    /// Decodes the integers back out of the `wl_array`.
    pub fn ints(&self) -> BridgeResult<Vec<i32>> {
        if self.ints.len() % size_of::<i32>() != 0 {
            return Err(BridgeError::Protocol("int array is not a multiple of 4 bytes"));
        }

        self.ints
            .chunks_exact(size_of::<i32>())
            .map(|chunk| i32::read_from(chunk).ok_or(BridgeError::Protocol("short int")))
            .collect()
    }

    /// Rebuilds a handle received from the wire.
    pub fn from_parts(ints: Vec<u8>, fds: Vec<SafeDescriptor>) -> WireHandle {
        WireHandle { ints, fds }
    }

    /// Splits the handle back into a `BufferDescriptor`.
    pub fn into_descriptor(self, stride: u32) -> BridgeResult<BufferDescriptor> {
        let ints = self.ints()?;
        Ok(BufferDescriptor {
            stride,
            ints,
            fds: self.fds,
        })
    }
}

impl From<BufferDescriptor> for WireHandle {
    fn from(descriptor: BufferDescriptor) -> WireHandle {
        WireHandle {
            ints: descriptor.ints.as_slice().as_bytes().to_vec(),
            fds: descriptor.fds,
        }
    }
}
