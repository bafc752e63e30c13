// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! binder: owns the GLES rendering context and turns native buffers into textures.

use std::fmt;
use std::rc::Rc;

use log::debug;
use log::error;
use log::info;
use log::warn;

use crate::bridge_utils::*;
use crate::gpu_image::egl::*;
use crate::native_buffer::NativeBuffer;

const REQUIRED_EXTENSIONS: [&str; 2] = ["EGL_KHR_surfaceless_context", "EGL_KHR_surfaceless_gles2"];
const RECOMMENDED_EXTENSIONS: [&str; 1] = ["EGL_KHR_gl_renderbuffer_image"];

const CONFIG_ATTRIBS_GLES2: [i32; 17] = [
    EGL_RED_SIZE,
    8,
    EGL_GREEN_SIZE,
    8,
    EGL_BLUE_SIZE,
    8,
    EGL_ALPHA_SIZE,
    8,
    EGL_DEPTH_SIZE,
    24,
    EGL_STENCIL_SIZE,
    8,
    EGL_RENDERABLE_TYPE,
    EGL_OPENGL_ES2_BIT,
    EGL_SURFACE_TYPE,
    EGL_WINDOW_BIT | EGL_PBUFFER_BIT,
    EGL_NONE,
];

const CONTEXT_ATTRIBS_GLES2: [i32; 3] = [EGL_CONTEXT_CLIENT_VERSION, 2, EGL_NONE];

/// Lifecycle of the rendering context.  Images and textures can only be created when `Ready`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

/// An initialized EGL display with a current GLES2 context.  The context is destroyed and the
/// display terminated when the last image or texture referencing it goes away.
pub struct GpuContext {
    egl: Rc<dyn EglApi>,
    display: EglDisplay,
    context: EglContext,
}

impl GpuContext {
    pub fn display(&self) -> EglDisplay {
        self.display
    }

    pub fn context(&self) -> EglContext {
        self.context
    }

    pub fn egl(&self) -> &Rc<dyn EglApi> {
        &self.egl
    }

    pub fn make_current(&self) -> BridgeResult<()> {
        if !self.egl.make_current(self.display, self.context) {
            return Err(BridgeError::InvalidContextState("eglMakeCurrent failed"));
        }

        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        if !self.egl.make_current(self.display, EglContext::NO_CONTEXT) {
            warn!("failed to release the current rendering context");
        }
        self.egl.destroy_context(self.display, self.context);
        self.egl.terminate(self.display);
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("display", &self.display)
            .field("context", &self.context)
            .finish()
    }
}

/// A native buffer imported into the rendering context.  Destroyed when dropped.
#[derive(Debug)]
pub struct GpuImage {
    context: Rc<GpuContext>,
    image: EglImage,
    source: RawBuffer,
}

impl GpuImage {
    pub fn handle(&self) -> EglImage {
        self.image
    }

    /// The native buffer this image was imported from.
    pub fn source(&self) -> RawBuffer {
        self.source
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        self.context
            .egl
            .destroy_image(self.context.display, self.image);
    }
}

/// A 2D texture whose storage is a `GpuImage`.  Deleted when dropped.
#[derive(Debug)]
pub struct GpuTexture {
    context: Rc<GpuContext>,
    id: u32,
}

impl GpuTexture {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.context.egl.delete_texture(self.id);
    }
}

/// Sets up the rendering context and binds native buffers to textures.
pub struct GpuImageBinder {
    egl: Rc<dyn EglApi>,
    native_display: usize,
    state: ContextState,
    context: Option<Rc<GpuContext>>,
}

impl GpuImageBinder {
    pub fn new(egl: Rc<dyn EglApi>, native_display: usize) -> GpuImageBinder {
        GpuImageBinder {
            egl,
            native_display,
            state: ContextState::Uninitialized,
            context: None,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn egl(&self) -> &Rc<dyn EglApi> {
        &self.egl
    }

    /// Initializes EGL, creates a surfaceless GLES2 context and makes it current.  Anything
    /// created before a failing step is torn down again, and the binder ends up `Destroyed`.
    pub fn init_context(&mut self) -> BridgeResult<Rc<GpuContext>> {
        if self.state != ContextState::Uninitialized {
            return Err(BridgeError::InvalidContextState(
                "context was already initialized",
            ));
        }

        self.state = ContextState::Initializing;
        match self.try_init() {
            Ok(context) => {
                self.state = ContextState::Ready;
                self.context = Some(context.clone());
                Ok(context)
            }
            Err(e) => {
                error!("rendering context init failed: {}", e);
                self.state = ContextState::Destroyed;
                Err(e)
            }
        }
    }

    fn try_init(&self) -> BridgeResult<Rc<GpuContext>> {
        let egl = &self.egl;
        let display = egl.get_display(self.native_display);
        if display.is_none() {
            return Err(BridgeError::ContextInit("eglGetDisplay"));
        }

        let (major, minor) = egl
            .initialize(display)
            .ok_or(BridgeError::ContextInit("eglInitialize"))?;

        // From here on the display has to be terminated on failure.
        let result = self.create_context(display);
        if result.is_err() {
            egl.terminate(display);
            return result;
        }

        info!(
            "EGL {}.{} ({}) ready",
            major,
            minor,
            egl.query_string(display, EGL_VERSION)
                .unwrap_or_else(|| "unknown".to_string())
        );
        result
    }

    fn create_context(&self, display: EglDisplay) -> BridgeResult<Rc<GpuContext>> {
        let egl = &self.egl;
        if !egl.bind_api(EGL_OPENGL_ES_API) {
            return Err(BridgeError::ContextInit("eglBindAPI"));
        }

        for extension in RECOMMENDED_EXTENSIONS {
            if !has_extension(&**egl, display, extension) {
                warn!("{} is missing", extension);
            }
        }

        for extension in REQUIRED_EXTENSIONS {
            if !has_extension(&**egl, display, extension) {
                error!("{} required", extension);
                return Err(BridgeError::ContextInit("missing surfaceless extension"));
            }
        }

        let config = egl
            .choose_config(display, &CONFIG_ATTRIBS_GLES2)
            .ok_or(BridgeError::ContextInit("eglChooseConfig"))?;

        let context = egl.create_context(display, config, &CONTEXT_ATTRIBS_GLES2);
        if context.is_none() {
            return Err(BridgeError::ContextInit("eglCreateContext"));
        }

        if !egl.make_current(display, context) {
            egl.destroy_context(display, context);
            return Err(BridgeError::ContextInit("eglMakeCurrent"));
        }

        Ok(Rc::new(GpuContext {
            egl: egl.clone(),
            display,
            context,
        }))
    }

    /// Returns the context, provided it is `Ready`.
    pub fn context(&self) -> BridgeResult<&Rc<GpuContext>> {
        match (&self.context, self.state) {
            (Some(context), ContextState::Ready) => Ok(context),
            _ => Err(BridgeError::InvalidContextState("context is not ready")),
        }
    }

    pub fn make_current(&self) -> BridgeResult<()> {
        self.context()?.make_current()
    }

    /// Imports `buffer` as an EGL image.
    pub fn import_image(&self, buffer: &NativeBuffer) -> BridgeResult<GpuImage> {
        let context = self.context()?;
        let image =
            self.egl
                .create_image(context.display, EGL_NATIVE_BUFFER_HYBRIS, buffer.raw());
        if image.is_none() {
            debug!("eglCreateImageKHR rejected {:?}", buffer.raw());
            return Err(BridgeError::ImageImportFailed);
        }

        Ok(GpuImage {
            context: context.clone(),
            image,
            source: buffer.raw(),
        })
    }

    /// Creates a nearest-filtered 2D texture backed by `image`.  The context must be current.
    pub fn bind_texture(&self, image: &GpuImage) -> BridgeResult<GpuTexture> {
        let context = self.context()?;
        let egl = &self.egl;

        let texture = GpuTexture {
            context: context.clone(),
            id: egl.gen_texture(),
        };

        egl.bind_texture(GL_TEXTURE_2D, texture.id);
        egl.tex_parameter(GL_TEXTURE_2D, GL_TEXTURE_MIN_FILTER, GL_NEAREST);
        egl.tex_parameter(GL_TEXTURE_2D, GL_TEXTURE_MAG_FILTER, GL_NEAREST);
        egl.image_target_texture(GL_TEXTURE_2D, image.image);
        let err = egl.get_error();
        egl.bind_texture(GL_TEXTURE_2D, 0);

        if err != EGL_SUCCESS {
            return Err(BridgeError::TextureBindFailed(err));
        }

        Ok(texture)
    }

    /// Destroys `image`.  Must happen before the buffer it was imported from is released.
    pub fn destroy_image(&self, image: GpuImage) {
        drop(image);
    }

    /// Drops the binder's reference to the context.  The context itself is torn down once the
    /// last image and texture are gone.
    pub fn destroy(&mut self) {
        self.context = None;
        self.state = ContextState::Destroyed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native_buffer::BufferAllocationInfo;
    use crate::native_buffer::NativeAllocator;
    use crate::native_buffer::PixelFormat;
    use crate::testing::InitFailure;
    use crate::testing::MockAllocator;
    use crate::testing::MockEgl;

    fn buffer(allocator: &Rc<dyn NativeAllocator>) -> NativeBuffer {
        let info = BufferAllocationInfo {
            width: 64,
            height: 64,
            format: PixelFormat::RGBA_8888,
            usage: UsageFlags::empty().use_hw_render(true),
        };
        NativeBuffer::allocate(allocator, info).unwrap()
    }

    #[test]
    fn init_reaches_ready() {
        let egl = Rc::new(MockEgl::new());
        let mut binder = GpuImageBinder::new(egl.clone(), 0);
        assert_eq!(binder.state(), ContextState::Uninitialized);
        assert!(binder.context().is_err());

        binder.init_context().unwrap();
        assert_eq!(binder.state(), ContextState::Ready);
        assert_eq!(egl.counters().contexts_created, 1);
        assert!(egl.counters().make_current >= 1);

        assert!(matches!(
            binder.init_context(),
            Err(BridgeError::InvalidContextState(_))
        ));
    }

    #[test]
    fn destroy_survives_failed_release() {
        let egl = Rc::new(MockEgl::new());
        let mut binder = GpuImageBinder::new(egl.clone(), 0);
        binder.init_context().unwrap();

        egl.fail_release(true);
        binder.destroy();
        assert_eq!(binder.state(), ContextState::Destroyed);
        assert_eq!(egl.counters().contexts_destroyed, 1);
        assert_eq!(egl.counters().terminated, 1);
    }

    #[test]
    fn init_failures_release_partial_state() {
        for (failure, contexts_destroyed, terminated) in [
            (InitFailure::Display, 0, 0),
            (InitFailure::Initialize, 0, 0),
            (InitFailure::Extensions, 0, 1),
            (InitFailure::Config, 0, 1),
            (InitFailure::Context, 0, 1),
            (InitFailure::MakeCurrent, 1, 1),
        ] {
            let egl = Rc::new(MockEgl::new());
            egl.fail_init(failure);
            let mut binder = GpuImageBinder::new(egl.clone(), 0);

            assert!(matches!(
                binder.init_context(),
                Err(BridgeError::ContextInit(_))
            ));
            assert_eq!(binder.state(), ContextState::Destroyed, "{:?}", failure);
            let counters = egl.counters();
            assert_eq!(counters.contexts_destroyed, contexts_destroyed, "{:?}", failure);
            assert_eq!(counters.terminated, terminated, "{:?}", failure);
        }
    }

    #[test]
    fn import_requires_ready_context() {
        let egl = Rc::new(MockEgl::new());
        let allocator: Rc<dyn NativeAllocator> = Rc::new(MockAllocator::new());
        let binder = GpuImageBinder::new(egl.clone(), 0);

        assert!(matches!(
            binder.import_image(&buffer(&allocator)),
            Err(BridgeError::InvalidContextState(_))
        ));
        assert_eq!(egl.counters().images_created, 0);
    }

    #[test]
    fn import_and_bind() {
        let egl = Rc::new(MockEgl::new());
        let allocator: Rc<dyn NativeAllocator> = Rc::new(MockAllocator::new());
        let mut binder = GpuImageBinder::new(egl.clone(), 0);
        binder.init_context().unwrap();

        let buffer = buffer(&allocator);
        let image = binder.import_image(&buffer).unwrap();
        assert_eq!(image.source(), buffer.raw());

        let texture = binder.bind_texture(&image).unwrap();
        assert_ne!(texture.id(), 0);
        assert_eq!(egl.min_mag_filters(texture.id()), Some((GL_NEAREST, GL_NEAREST)));

        drop(texture);
        binder.destroy_image(image);
        let counters = egl.counters();
        assert_eq!(counters.textures_deleted, 1);
        assert_eq!(counters.images_destroyed, 1);
    }

    #[test]
    fn failed_import_and_bind() {
        let egl = Rc::new(MockEgl::new());
        let allocator: Rc<dyn NativeAllocator> = Rc::new(MockAllocator::new());
        let mut binder = GpuImageBinder::new(egl.clone(), 0);
        binder.init_context().unwrap();
        let buffer = buffer(&allocator);

        egl.fail_image_import(true);
        assert!(matches!(
            binder.import_image(&buffer),
            Err(BridgeError::ImageImportFailed)
        ));

        egl.fail_image_import(false);
        egl.fail_texture_bind(true);
        let image = binder.import_image(&buffer).unwrap();
        assert!(matches!(
            binder.bind_texture(&image),
            Err(BridgeError::TextureBindFailed(EGL_BAD_PARAMETER))
        ));
        assert_eq!(egl.counters().textures_deleted, 1);
    }

    #[test]
    fn context_outlives_binder_while_images_exist() {
        let egl = Rc::new(MockEgl::new());
        let allocator: Rc<dyn NativeAllocator> = Rc::new(MockAllocator::new());
        let mut binder = GpuImageBinder::new(egl.clone(), 0);
        binder.init_context().unwrap();
        let buffer = buffer(&allocator);
        let image = binder.import_image(&buffer).unwrap();

        binder.destroy();
        assert_eq!(binder.state(), ContextState::Destroyed);
        assert_eq!(egl.counters().terminated, 0);

        drop(image);
        let counters = egl.counters();
        assert_eq!(counters.images_destroyed, 1);
        assert_eq!(counters.contexts_destroyed, 1);
        assert_eq!(counters.terminated, 1);
    }
}
