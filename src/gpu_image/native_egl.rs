// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! native_egl: `EglApi` on top of the system libEGL and libGLESv2.

#![cfg(feature = "hybris")]

use std::ffi::CStr;
use std::mem;
use std::os::raw::c_void;
use std::ptr::null;
use std::ptr::null_mut;

use log::error;

use crate::bridge_utils::*;
use crate::gpu_image::egl::*;
use crate::gpu_image::egl_bindings::*;

const EGL_FALSE: EGLBoolean = 0;

fn lookup(name: &CStr) -> *const c_void {
    // Safe because `name` is a valid nul-terminated string.
    unsafe { eglGetProcAddress(name.as_ptr()) as *const c_void }
}

macro_rules! load_ext {
    ($name:literal, $ty:ty) => {{
        // Safe because the name is a nul-terminated literal.
        let name = unsafe { CStr::from_bytes_with_nul_unchecked(concat!($name, "\0").as_bytes()) };
        let ptr = lookup(name);
        if ptr.is_null() {
            error!("{} is not exported by libEGL", $name);
            return Err(BridgeError::ContextInit(concat!($name, " missing")));
        }
        // Safe because the extension defines the entry point with exactly this signature.
        unsafe { mem::transmute::<*const c_void, $ty>(ptr) }
    }};
}

/// The system EGL and GLES libraries.  Only usable from the thread owning the context.
pub struct NativeEgl {
    create_image: PFNEGLCREATEIMAGEKHRPROC,
    destroy_image: PFNEGLDESTROYIMAGEKHRPROC,
    image_target_texture: PFNGLEGLIMAGETARGETTEXTURE2DOESPROC,
}

impl NativeEgl {
    /// Resolves the image extension entry points.
    pub fn new() -> BridgeResult<NativeEgl> {
        Ok(NativeEgl {
            create_image: load_ext!("eglCreateImageKHR", PFNEGLCREATEIMAGEKHRPROC),
            destroy_image: load_ext!("eglDestroyImageKHR", PFNEGLDESTROYIMAGEKHRPROC),
            image_target_texture: load_ext!(
                "glEGLImageTargetTexture2DOES",
                PFNGLEGLIMAGETARGETTEXTURE2DOESPROC
            ),
        })
    }
}

impl EglApi for NativeEgl {
    fn get_display(&self, native_display: usize) -> EglDisplay {
        // Safe because eglGetDisplay accepts any value and returns EGL_NO_DISPLAY on failure.
        EglDisplay(unsafe { eglGetDisplay(native_display as EGLNativeDisplayType) } as usize)
    }

    fn initialize(&self, display: EglDisplay) -> Option<(i32, i32)> {
        let mut major: EGLint = 0;
        let mut minor: EGLint = 0;
        // Safe because the out pointers are valid for the duration of the call.
        let ok = unsafe { eglInitialize(display.0 as EGLDisplay, &mut major, &mut minor) };
        if ok == EGL_FALSE {
            return None;
        }

        Some((major, minor))
    }

    fn terminate(&self, display: EglDisplay) {
        // Safe because a bad display only makes EGL report an error.
        unsafe { eglTerminate(display.0 as EGLDisplay) };
    }

    fn bind_api(&self, api: u32) -> bool {
        // Safe because the call takes no pointers.
        unsafe { eglBindAPI(api) != EGL_FALSE }
    }

    fn query_string(&self, display: EglDisplay, name: i32) -> Option<String> {
        // Safe because EGL returns either null or a static nul-terminated string.
        unsafe {
            let s = eglQueryString(display.0 as EGLDisplay, name);
            if s.is_null() {
                return None;
            }

            Some(CStr::from_ptr(s).to_string_lossy().into_owned())
        }
    }

    fn choose_config(&self, display: EglDisplay, attribs: &[i32]) -> Option<EglConfig> {
        let mut config: EGLConfig = null_mut();
        let mut num_configs: EGLint = 0;
        // Safe because `attribs` is EGL_NONE terminated and room for one config is provided.
        let ok = unsafe {
            eglChooseConfig(
                display.0 as EGLDisplay,
                attribs.as_ptr(),
                &mut config,
                1,
                &mut num_configs,
            )
        };

        if ok == EGL_FALSE || num_configs < 1 {
            return None;
        }

        Some(EglConfig(config as usize))
    }

    fn create_context(
        &self,
        display: EglDisplay,
        config: EglConfig,
        attribs: &[i32],
    ) -> EglContext {
        // Safe because `attribs` is EGL_NONE terminated.
        let context = unsafe {
            eglCreateContext(
                display.0 as EGLDisplay,
                config.0 as EGLConfig,
                null_mut(),
                attribs.as_ptr(),
            )
        };
        EglContext(context as usize)
    }

    fn destroy_context(&self, display: EglDisplay, context: EglContext) {
        // Safe because a bad handle only makes EGL report an error.
        unsafe { eglDestroyContext(display.0 as EGLDisplay, context.0 as EGLContext) };
    }

    fn make_current(&self, display: EglDisplay, context: EglContext) -> bool {
        // Safe because surfaceless contexts take no surfaces.
        unsafe {
            eglMakeCurrent(
                display.0 as EGLDisplay,
                EGL_NO_SURFACE,
                EGL_NO_SURFACE,
                context.0 as EGLContext,
            ) != EGL_FALSE
        }
    }

    fn get_error(&self) -> i32 {
        // Safe because the call takes no arguments.
        unsafe { eglGetError() }
    }

    fn create_image(&self, display: EglDisplay, target: u32, buffer: RawBuffer) -> EglImage {
        // Safe because `buffer` is a live native buffer and no attributes are passed.
        let image = unsafe {
            (self.create_image)(
                display.0 as EGLDisplay,
                null_mut(),
                target,
                buffer.0 as EGLClientBuffer,
                null(),
            )
        };
        EglImage(image as usize)
    }

    fn destroy_image(&self, display: EglDisplay, image: EglImage) {
        // Safe because `image` was created on `display`.
        unsafe { (self.destroy_image)(display.0 as EGLDisplay, image.0 as EGLImageKHR) };
    }

    fn gen_texture(&self) -> u32 {
        let mut texture: GLuint = 0;
        // Safe because room for exactly one name is provided.
        unsafe { glGenTextures(1, &mut texture) };
        texture
    }

    fn bind_texture(&self, target: u32, texture: u32) {
        // Safe because the call takes no pointers.
        unsafe { glBindTexture(target, texture) };
    }

    fn tex_parameter(&self, target: u32, pname: u32, param: i32) {
        // Safe because the call takes no pointers.
        unsafe { glTexParameteri(target, pname, param) };
    }

    fn image_target_texture(&self, target: u32, image: EglImage) {
        // Safe because `image` is a live EGL image.
        unsafe { (self.image_target_texture)(target, image.0 as GLeglImageOES) };
    }

    fn delete_texture(&self, texture: u32) {
        // Safe because exactly one name is read.
        unsafe { glDeleteTextures(1, &texture) };
    }

    fn get_proc_address(&self, name: &CStr) -> *const c_void {
        lookup(name)
    }
}
