// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

// Function pointer types transcribed from hybris/eglplatformcommon/hybris_nativebufferext.h

#![cfg(feature = "hybris")]
#![allow(dead_code, non_camel_case_types)]

use std::os::raw::c_int;
use std::os::raw::c_uint;
use std::os::raw::c_void;

pub type EGLint = i32;
pub type EGLBoolean = c_uint;
pub type EGLClientBuffer = *mut c_void;

pub const EGL_FALSE: EGLBoolean = 0;
pub const EGL_TRUE: EGLBoolean = 1;

pub type PFNEGLHYBRISCREATENATIVEBUFFERPROC = unsafe extern "C" fn(
    width: EGLint,
    height: EGLint,
    usage: EGLint,
    format: EGLint,
    stride: *mut EGLint,
    buffer: *mut EGLClientBuffer,
) -> EGLBoolean;

pub type PFNEGLHYBRISCREATEREMOTEBUFFERPROC = unsafe extern "C" fn(
    width: EGLint,
    height: EGLint,
    usage: EGLint,
    format: EGLint,
    stride: EGLint,
    num_ints: c_int,
    ints: *mut c_int,
    num_fds: c_int,
    fds: *mut c_int,
    buffer: *mut EGLClientBuffer,
) -> EGLBoolean;

pub type PFNEGLHYBRISLOCKNATIVEBUFFERPROC = unsafe extern "C" fn(
    buffer: EGLClientBuffer,
    usage: EGLint,
    l: EGLint,
    t: EGLint,
    w: EGLint,
    h: EGLint,
    vaddr: *mut *mut c_void,
) -> EGLBoolean;

pub type PFNEGLHYBRISUNLOCKNATIVEBUFFERPROC =
    unsafe extern "C" fn(buffer: EGLClientBuffer) -> EGLBoolean;

pub type PFNEGLHYBRISRELEASENATIVEBUFFERPROC =
    unsafe extern "C" fn(buffer: EGLClientBuffer) -> EGLBoolean;

pub type PFNEGLHYBRISGETNATIVEBUFFERINFOPROC = unsafe extern "C" fn(
    buffer: EGLClientBuffer,
    num_ints: *mut c_int,
    num_fds: *mut c_int,
) -> EGLBoolean;

pub type PFNEGLHYBRISSERIALIZENATIVEBUFFERPROC =
    unsafe extern "C" fn(buffer: EGLClientBuffer, ints: *mut c_int, fds: *mut c_int) -> EGLBoolean;
