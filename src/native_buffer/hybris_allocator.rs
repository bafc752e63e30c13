// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! hybris_allocator: allocates Android native buffers through the libhybris
//! `EGL_HYBRIS_native_buffer` entry points.
//!
//! External code found at <https://github.com/libhybris/libhybris>.

#![cfg(feature = "hybris")]

use std::cell::RefCell;
use std::collections::BTreeMap as Map;
use std::ffi::CStr;
use std::mem;
use std::os::raw::c_int;
use std::os::raw::c_void;
use std::ptr::null_mut;

use log::error;
use log::warn;

use crate::bridge_os::RawDescriptor;
use crate::bridge_utils::*;
use crate::native_buffer::allocator::BufferAllocationInfo;
use crate::native_buffer::allocator::HandleCounts;
use crate::native_buffer::allocator::NativeAllocator;
use crate::native_buffer::hybris_bindings::*;

macro_rules! load_proc {
    ($lookup:expr, $name:literal, $ty:ty) => {{
        // Safe because the name is a nul-terminated literal.
        let name = unsafe { CStr::from_bytes_with_nul_unchecked(concat!($name, "\0").as_bytes()) };
        let ptr = $lookup(name);
        if ptr.is_null() {
            error!("{} is missing, make sure the libhybris EGL implementation is used", $name);
            return Err(BridgeError::ContextInit(concat!($name, " missing")));
        }
        // Safe because libhybris exports the symbol with exactly this signature.
        unsafe { mem::transmute::<*const c_void, $ty>(ptr) }
    }};
}

/// The vendor native buffer entry points, resolved through `eglGetProcAddress`.
#[derive(Copy, Clone)]
pub struct HybrisProcs {
    create: PFNEGLHYBRISCREATENATIVEBUFFERPROC,
    create_remote: PFNEGLHYBRISCREATEREMOTEBUFFERPROC,
    lock: PFNEGLHYBRISLOCKNATIVEBUFFERPROC,
    unlock: PFNEGLHYBRISUNLOCKNATIVEBUFFERPROC,
    release: PFNEGLHYBRISRELEASENATIVEBUFFERPROC,
    get_info: PFNEGLHYBRISGETNATIVEBUFFERINFOPROC,
    serialize: PFNEGLHYBRISSERIALIZENATIVEBUFFERPROC,
}

impl HybrisProcs {
    /// Resolves every entry point with `lookup`.  Fails if any of them is missing.
    pub fn load(lookup: &dyn Fn(&CStr) -> *const c_void) -> BridgeResult<HybrisProcs> {
        Ok(HybrisProcs {
            create: load_proc!(
                lookup,
                "eglHybrisCreateNativeBuffer",
                PFNEGLHYBRISCREATENATIVEBUFFERPROC
            ),
            create_remote: load_proc!(
                lookup,
                "eglHybrisCreateRemoteBuffer",
                PFNEGLHYBRISCREATEREMOTEBUFFERPROC
            ),
            lock: load_proc!(
                lookup,
                "eglHybrisLockNativeBuffer",
                PFNEGLHYBRISLOCKNATIVEBUFFERPROC
            ),
            unlock: load_proc!(
                lookup,
                "eglHybrisUnlockNativeBuffer",
                PFNEGLHYBRISUNLOCKNATIVEBUFFERPROC
            ),
            release: load_proc!(
                lookup,
                "eglHybrisReleaseNativeBuffer",
                PFNEGLHYBRISRELEASENATIVEBUFFERPROC
            ),
            get_info: load_proc!(
                lookup,
                "eglHybrisGetNativeBufferInfo",
                PFNEGLHYBRISGETNATIVEBUFFERINFOPROC
            ),
            serialize: load_proc!(
                lookup,
                "eglHybrisSerializeNativeBuffer",
                PFNEGLHYBRISSERIALIZENATIVEBUFFERPROC
            ),
        })
    }
}

/// A native allocator backed by libhybris.  The dimensions of every live buffer are kept so that
/// `lock` can map the whole surface.
pub struct HybrisAllocator {
    procs: HybrisProcs,
    dimensions: RefCell<Map<RawBuffer, (u32, u32)>>,
}

impl HybrisAllocator {
    pub fn new(procs: HybrisProcs) -> HybrisAllocator {
        HybrisAllocator {
            procs,
            dimensions: RefCell::new(Default::default()),
        }
    }
}

impl NativeAllocator for HybrisAllocator {
    fn supports_remote_buffers(&self) -> bool {
        true
    }

    fn create(&self, info: BufferAllocationInfo) -> BridgeResult<(RawBuffer, u32)> {
        let width: EGLint = info.width.try_into()?;
        let height: EGLint = info.height.try_into()?;
        let mut stride: EGLint = 0;
        let mut buffer: EGLClientBuffer = null_mut();

        // Safe because the out pointers are valid for the duration of the call.
        let ok = unsafe {
            (self.procs.create)(
                width,
                height,
                info.usage.into(),
                info.format.0 as EGLint,
                &mut stride,
                &mut buffer,
            )
        };

        if ok == EGL_FALSE || buffer.is_null() {
            return Err(BridgeError::AllocationFailed("eglHybrisCreateNativeBuffer"));
        }

        let raw = RawBuffer(buffer as usize);
        self.dimensions
            .borrow_mut()
            .insert(raw, (info.width, info.height));
        Ok((raw, stride.try_into()?))
    }

    fn create_remote(
        &self,
        info: BufferAllocationInfo,
        stride: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<RawBuffer> {
        let mut ints = ints.to_vec();
        let mut fds = fds.to_vec();
        let mut buffer: EGLClientBuffer = null_mut();

        // Safe because the arrays outlive the call and libhybris duplicates the descriptors it
        // keeps.
        let ok = unsafe {
            (self.procs.create_remote)(
                info.width.try_into()?,
                info.height.try_into()?,
                info.usage.into(),
                info.format.0 as EGLint,
                stride.try_into()?,
                ints.len() as c_int,
                ints.as_mut_ptr(),
                fds.len() as c_int,
                fds.as_mut_ptr(),
                &mut buffer,
            )
        };

        if ok == EGL_FALSE || buffer.is_null() {
            return Err(BridgeError::ImportFailed("eglHybrisCreateRemoteBuffer"));
        }

        let raw = RawBuffer(buffer as usize);
        self.dimensions
            .borrow_mut()
            .insert(raw, (info.width, info.height));
        Ok(raw)
    }

    fn lock(&self, buffer: RawBuffer, usage: UsageFlags) -> BridgeResult<*mut u8> {
        let (width, height) = *self
            .dimensions
            .borrow()
            .get(&buffer)
            .ok_or(BridgeError::InvalidBuffer("unknown hybris buffer"))?;
        let mut vaddr: *mut c_void = null_mut();

        // Safe because `buffer` is live and `vaddr` is a valid out pointer.
        let ok = unsafe {
            (self.procs.lock)(
                buffer.0 as EGLClientBuffer,
                usage.into(),
                0,
                0,
                width.try_into()?,
                height.try_into()?,
                &mut vaddr,
            )
        };

        if ok == EGL_FALSE {
            return Err(BridgeError::InvalidBuffer("eglHybrisLockNativeBuffer"));
        }

        Ok(vaddr as *mut u8)
    }

    fn unlock(&self, buffer: RawBuffer) -> BridgeResult<()> {
        // Safe because `buffer` was handed out by this allocator.
        let ok = unsafe { (self.procs.unlock)(buffer.0 as EGLClientBuffer) };
        if ok == EGL_FALSE {
            return Err(BridgeError::InvalidBuffer("eglHybrisUnlockNativeBuffer"));
        }

        Ok(())
    }

    fn release(&self, buffer: RawBuffer) {
        self.dimensions.borrow_mut().remove(&buffer);
        // Safe because `buffer` was handed out by this allocator and is released only once.
        let ok = unsafe { (self.procs.release)(buffer.0 as EGLClientBuffer) };
        if ok == EGL_FALSE {
            warn!("eglHybrisReleaseNativeBuffer failed for {:?}", buffer);
        }
    }

    fn handle_counts(&self, buffer: RawBuffer) -> BridgeResult<HandleCounts> {
        let mut num_ints: c_int = 0;
        let mut num_fds: c_int = 0;

        // Safe because the out pointers are valid for the duration of the call.
        let ok = unsafe {
            (self.procs.get_info)(buffer.0 as EGLClientBuffer, &mut num_ints, &mut num_fds)
        };

        if ok == EGL_FALSE {
            return Err(BridgeError::InvalidBuffer("eglHybrisGetNativeBufferInfo"));
        }

        Ok(HandleCounts {
            num_ints: num_ints.try_into()?,
            num_fds: num_fds.try_into()?,
        })
    }

    fn serialize(
        &self,
        buffer: RawBuffer,
        ints: &mut [i32],
        fds: &mut [RawDescriptor],
    ) -> BridgeResult<()> {
        let counts = self.handle_counts(buffer)?;
        if ints.len() != counts.num_ints {
            return Err(BridgeError::CodecMismatch {
                what: "int",
                expected: counts.num_ints,
                actual: ints.len(),
            });
        }

        if fds.len() != counts.num_fds {
            return Err(BridgeError::CodecMismatch {
                what: "fd",
                expected: counts.num_fds,
                actual: fds.len(),
            });
        }

        // Safe because both slices were checked against the sizes libhybris reported.
        let ok = unsafe {
            (self.procs.serialize)(
                buffer.0 as EGLClientBuffer,
                ints.as_mut_ptr(),
                fds.as_mut_ptr(),
            )
        };

        if ok == EGL_FALSE {
            return Err(BridgeError::InvalidBuffer("eglHybrisSerializeNativeBuffer"));
        }

        Ok(())
    }
}
