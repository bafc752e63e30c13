// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! allocator: the native buffer allocator abstraction and the owned buffer types built on top of
//! it.

use std::fmt;
use std::rc::Rc;
use std::slice;

use log::error;

use crate::bridge_os::RawDescriptor;
use crate::bridge_utils::*;
use crate::checked_arithmetic;
use crate::native_buffer::formats::PixelFormat;

/// Information required to allocate a native buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferAllocationInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: UsageFlags,
}

/// How many integers and descriptors describe a buffer outside of this process.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HandleCounts {
    pub num_ints: usize,
    pub num_fds: usize,
}

/// Trait that needs to be implemented by native buffer allocators.  A `RawBuffer` handed out by
/// `create` or `create_remote` stays valid until it is passed to `release`.
///
/// Allocators are shared between every buffer they created, so all methods take `&self`.
pub trait NativeAllocator {
    /// This function must return true if the implementation can rebuild buffers from handles
    /// serialized by another process.
    fn supports_remote_buffers(&self) -> bool;

    /// Implementations must allocate a buffer described by `info` and return it along with its
    /// stride in pixels.
    fn create(&self, info: BufferAllocationInfo) -> BridgeResult<(RawBuffer, u32)>;

    /// Implementations must rebuild a buffer from serialized handles.  The descriptors in `fds`
    /// remain owned by the caller: implementations duplicate the ones they keep.
    fn create_remote(
        &self,
        info: BufferAllocationInfo,
        stride: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<RawBuffer>;

    /// Makes the buffer contents visible to the CPU and returns a pointer to the first pixel.
    fn lock(&self, buffer: RawBuffer, usage: UsageFlags) -> BridgeResult<*mut u8>;

    fn unlock(&self, buffer: RawBuffer) -> BridgeResult<()>;

    /// Drops the reference taken by `create` or `create_remote`.
    fn release(&self, buffer: RawBuffer);

    fn handle_counts(&self, buffer: RawBuffer) -> BridgeResult<HandleCounts>;

    /// Implementations must fill `ints` and `fds`, whose lengths match `handle_counts`.  The
    /// descriptors written to `fds` are still owned by the allocator.
    fn serialize(
        &self,
        buffer: RawBuffer,
        ints: &mut [i32],
        fds: &mut [RawDescriptor],
    ) -> BridgeResult<()>;

    /// Returns the parameters the buffer was allocated with.  Vendor allocators usually can't
    /// answer this.
    fn query(&self, _buffer: RawBuffer) -> BridgeResult<BufferAllocationInfo> {
        Err(BridgeError::Unsupported)
    }
}

/// A native buffer owned by this process.  The allocator reference is dropped exactly once, when
/// the `NativeBuffer` goes out of scope.
pub struct NativeBuffer {
    raw: RawBuffer,
    info: BufferAllocationInfo,
    stride: u32,
    allocator: Rc<dyn NativeAllocator>,
}

impl NativeBuffer {
    /// Allocates a new buffer from `allocator`.
    pub fn allocate(
        allocator: &Rc<dyn NativeAllocator>,
        info: BufferAllocationInfo,
    ) -> BridgeResult<NativeBuffer> {
        if info.width == 0 || info.height == 0 {
            return Err(BridgeError::InvalidDimensions);
        }

        let (raw, stride) = allocator.create(info)?;
        Ok(NativeBuffer {
            raw,
            info,
            stride,
            allocator: allocator.clone(),
        })
    }

    /// Rebuilds a buffer serialized by another process.
    pub fn from_remote(
        allocator: &Rc<dyn NativeAllocator>,
        info: BufferAllocationInfo,
        stride: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<NativeBuffer> {
        if info.width == 0 || info.height == 0 {
            return Err(BridgeError::InvalidDimensions);
        }

        let raw = allocator.create_remote(info, stride, ints, fds)?;
        Ok(NativeBuffer {
            raw,
            info,
            stride,
            allocator: allocator.clone(),
        })
    }

    #[inline(always)]
    pub fn raw(&self) -> RawBuffer {
        self.raw
    }

    #[inline(always)]
    pub fn info(&self) -> BufferAllocationInfo {
        self.info
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.info.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.info.height
    }

    #[inline(always)]
    pub fn format(&self) -> PixelFormat {
        self.info.format
    }

    /// Stride in pixels.
    #[inline(always)]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn allocator(&self) -> &Rc<dyn NativeAllocator> {
        &self.allocator
    }

    /// Size in bytes of the CPU-visible pixel data.
    pub fn size(&self) -> BridgeResult<usize> {
        let stride = self.stride;
        let height = self.info.height;
        let bytes_per_pixel = self.info.format.bytes_per_pixel()?;
        let row_bytes = checked_arithmetic!(stride * bytes_per_pixel)?;
        let size = checked_arithmetic!(row_bytes * height)?;
        Ok(usize::try_from(size)?)
    }

    /// Maps the buffer for CPU access.  The buffer is unlocked when the returned guard is
    /// dropped.
    pub fn lock(&self, usage: UsageFlags) -> BridgeResult<BufferLock<'_>> {
        let size = self.size()?;
        let ptr = self.allocator.lock(self.raw, usage)?;
        if ptr.is_null() {
            if let Err(e) = self.allocator.unlock(self.raw) {
                error!("failed to unlock native buffer {:?}: {}", self.raw, e);
            }
            return Err(BridgeError::AllocationFailed("lock returned no mapping"));
        }

        Ok(BufferLock {
            buffer: self,
            ptr,
            size,
        })
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        self.allocator.release(self.raw);
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("raw", &self.raw)
            .field("info", &self.info)
            .field("stride", &self.stride)
            .finish()
    }
}

/// CPU access to a locked `NativeBuffer`.
pub struct BufferLock<'a> {
    buffer: &'a NativeBuffer,
    ptr: *mut u8,
    size: usize,
}

impl BufferLock<'_> {
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[u8] {
        // Safe because the allocator guarantees `size` bytes are mapped at `ptr` while the
        // buffer is locked.
        unsafe { slice::from_raw_parts(self.ptr, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safe for the same reason as `as_slice`, and `&mut self` keeps the slice unique.
        unsafe { slice::from_raw_parts_mut(self.ptr, self.size) }
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.allocator.unlock(self.buffer.raw) {
            error!("failed to unlock native buffer {:?}: {}", self.buffer.raw, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAllocator;

    fn rgba(width: u32, height: u32) -> BufferAllocationInfo {
        BufferAllocationInfo {
            width,
            height,
            format: PixelFormat::RGBA_8888,
            usage: UsageFlags::empty().use_hw_render(true),
        }
    }

    #[test]
    fn drop_releases_once() {
        let mock = Rc::new(MockAllocator::new());
        let allocator: Rc<dyn NativeAllocator> = mock.clone();

        let buffer = NativeBuffer::allocate(&allocator, rgba(64, 32)).unwrap();
        assert_eq!(buffer.width(), 64);
        assert_eq!(buffer.height(), 32);
        assert_eq!(mock.counters().created, 1);
        assert_eq!(mock.counters().released, 0);

        drop(buffer);
        assert_eq!(mock.counters().released, 1);
    }

    #[test]
    fn zero_sized_buffers_are_rejected() {
        let mock = Rc::new(MockAllocator::new());
        let allocator: Rc<dyn NativeAllocator> = mock.clone();

        assert!(matches!(
            NativeBuffer::allocate(&allocator, rgba(0, 32)),
            Err(BridgeError::InvalidDimensions)
        ));
        assert!(matches!(
            NativeBuffer::from_remote(&allocator, rgba(32, 0), 32, &[], &[]),
            Err(BridgeError::InvalidDimensions)
        ));
        assert_eq!(mock.counters().created, 0);
        assert_eq!(mock.counters().released, 0);
    }

    #[test]
    fn lock_without_mapping_unlocks_again() {
        let mock = Rc::new(MockAllocator::new());
        let allocator: Rc<dyn NativeAllocator> = mock.clone();
        let buffer = NativeBuffer::allocate(&allocator, rgba(8, 8)).unwrap();

        mock.fail_mapping(true);
        assert!(matches!(
            buffer.lock(UsageFlags::empty()),
            Err(BridgeError::AllocationFailed(_))
        ));
        assert_eq!(mock.counters().locked, 1);
        assert_eq!(mock.counters().unlocked, 1);
    }

    #[test]
    fn allocation_failure_releases_nothing() {
        let mock = Rc::new(MockAllocator::new());
        mock.fail_create(true);
        let allocator: Rc<dyn NativeAllocator> = mock.clone();

        assert!(NativeBuffer::allocate(&allocator, rgba(8, 8)).is_err());
        assert_eq!(mock.counters().released, 0);
    }

    #[test]
    fn lock_guard_unlocks() {
        let mock = Rc::new(MockAllocator::new());
        let allocator: Rc<dyn NativeAllocator> = mock.clone();
        let buffer = NativeBuffer::allocate(&allocator, rgba(4, 4)).unwrap();

        {
            let mut lock = buffer
                .lock(UsageFlags::empty().use_sw_write(true))
                .unwrap();
            assert_eq!(lock.size(), buffer.size().unwrap());
            lock.as_mut_slice()[0] = 0xff;
            assert_eq!(mock.counters().locked, 1);
            assert_eq!(mock.counters().unlocked, 0);
        }

        assert_eq!(mock.counters().unlocked, 1);
        let lock = buffer.lock(UsageFlags::empty().use_sw_read(true)).unwrap();
        assert_eq!(lock.as_slice()[0], 0xff);
    }
}
