// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! egl: the slice of EGL and GLES the bridge needs, as a trait so that the vendor libraries can
//! be swapped out.

use std::ffi::CStr;
use std::os::raw::c_void;

use crate::bridge_utils::RawBuffer;

pub const EGL_SUCCESS: i32 = 0x3000;
pub const EGL_BAD_PARAMETER: i32 = 0x300C;
pub const EGL_ALPHA_SIZE: i32 = 0x3021;
pub const EGL_BLUE_SIZE: i32 = 0x3022;
pub const EGL_GREEN_SIZE: i32 = 0x3023;
pub const EGL_RED_SIZE: i32 = 0x3024;
pub const EGL_DEPTH_SIZE: i32 = 0x3025;
pub const EGL_STENCIL_SIZE: i32 = 0x3026;
pub const EGL_SURFACE_TYPE: i32 = 0x3033;
pub const EGL_NONE: i32 = 0x3038;
pub const EGL_RENDERABLE_TYPE: i32 = 0x3040;
pub const EGL_VERSION: i32 = 0x3054;
pub const EGL_EXTENSIONS: i32 = 0x3055;
pub const EGL_CONTEXT_CLIENT_VERSION: i32 = 0x3098;
pub const EGL_OPENGL_ES_API: u32 = 0x30A0;

pub const EGL_PBUFFER_BIT: i32 = 0x0001;
pub const EGL_WINDOW_BIT: i32 = 0x0004;
pub const EGL_OPENGL_ES2_BIT: i32 = 0x0004;

/// `eglCreateImageKHR` target for libhybris native buffers.
pub const EGL_NATIVE_BUFFER_HYBRIS: u32 = 0x3140;

pub const GL_TEXTURE_2D: u32 = 0x0DE1;
pub const GL_NEAREST: i32 = 0x2600;
pub const GL_TEXTURE_MAG_FILTER: u32 = 0x2800;
pub const GL_TEXTURE_MIN_FILTER: u32 = 0x2801;

macro_rules! egl_handle {
    ($name:ident, $none:ident) => {
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub usize);

        impl $name {
            pub const $none: $name = $name(0);

            #[inline(always)]
            pub fn is_none(self) -> bool {
                self == $name::$none
            }
        }
    };
}

egl_handle!(EglDisplay, NO_DISPLAY);
egl_handle!(EglConfig, NO_CONFIG);
egl_handle!(EglContext, NO_CONTEXT);
egl_handle!(EglImage, NO_IMAGE);

/// The EGL and GLES entry points used by the bridge.  Methods mirror the C functions they wrap;
/// failures are reported the way EGL reports them (a `NO_*` handle or `false`).
///
/// GLES calls act on whatever context is current on the calling thread.
pub trait EglApi {
    fn get_display(&self, native_display: usize) -> EglDisplay;

    /// Returns the (major, minor) EGL version on success.
    fn initialize(&self, display: EglDisplay) -> Option<(i32, i32)>;

    fn terminate(&self, display: EglDisplay);

    fn bind_api(&self, api: u32) -> bool;

    fn query_string(&self, display: EglDisplay, name: i32) -> Option<String>;

    /// Returns the first config matching `attribs`, which must be `EGL_NONE` terminated.
    fn choose_config(&self, display: EglDisplay, attribs: &[i32]) -> Option<EglConfig>;

    fn create_context(&self, display: EglDisplay, config: EglConfig, attribs: &[i32])
        -> EglContext;

    fn destroy_context(&self, display: EglDisplay, context: EglContext);

    /// Makes `context` current without any surface bound.
    fn make_current(&self, display: EglDisplay, context: EglContext) -> bool;

    fn get_error(&self) -> i32;

    fn create_image(&self, display: EglDisplay, target: u32, buffer: RawBuffer) -> EglImage;

    fn destroy_image(&self, display: EglDisplay, image: EglImage);

    fn gen_texture(&self) -> u32;

    fn bind_texture(&self, target: u32, texture: u32);

    fn tex_parameter(&self, target: u32, pname: u32, param: i32);

    /// `glEGLImageTargetTexture2DOES`
    fn image_target_texture(&self, target: u32, image: EglImage);

    fn delete_texture(&self, texture: u32);

    fn get_proc_address(&self, name: &CStr) -> *const c_void;
}

/// Returns true if `extension` is listed in the display's extension string.
pub fn has_extension(egl: &dyn EglApi, display: EglDisplay, extension: &str) -> bool {
    egl.query_string(display, EGL_EXTENSIONS)
        .map(|extensions| extensions.split_whitespace().any(|e| e == extension))
        .unwrap_or(false)
}
