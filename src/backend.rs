// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! backend: glamor backends and the host session that selects one of them.

use std::rc::Rc;

use log::error;
use log::info;
use log::warn;

use crate::bridge_os::RawDescriptor;
use crate::bridge_utils::*;
use crate::display::DisplayClient;
use crate::display::ProtocolObject;
use crate::display::RemoteBuffer;
use crate::display::ANDROID_WLEGL_INTERFACE;
use crate::gpu_image::EglApi;
use crate::gpu_image::GpuImageBinder;
use crate::handle_codec::BufferDescriptor;
use crate::native_buffer::NativeAllocator;
use crate::native_buffer::PixelFormat;
use crate::pixmap_bridge::BridgeStats;
use crate::pixmap_bridge::PixmapBridge;
use crate::pixmap_bridge::RenderingLayer;

/// Version of `android_wlegl` the bridge speaks.
pub const ANDROID_WLEGL_VERSION: u32 = 1;

/// Settings shared by every bridged pixmap.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Usage of buffers backing new pixmaps.
    pub create_usage: UsageFlags,
    /// Usage of buffers allocated to make a pixmap exportable.
    pub export_usage: UsageFlags,
    /// Usage of buffers rebuilt from another process's handles.
    pub import_usage: UsageFlags,
    /// Usage announced to the compositor with each display buffer.
    pub buffer_usage: UsageFlags,
    pub pixel_format: PixelFormat,
    /// Clear new backing pixmaps, since there is no root window to paint them.
    pub rootless: bool,
    /// Native display handed to `eglGetDisplay`.
    pub native_display: usize,
    pub fallback_handler: Option<FallbackHandler>,
}

impl Default for BridgeConfig {
    fn default() -> BridgeConfig {
        BridgeBuilder::new().build()
    }
}

/// Builder for `BridgeConfig`.
#[derive(Clone)]
pub struct BridgeBuilder {
    create_usage: UsageFlags,
    export_usage: UsageFlags,
    import_usage: UsageFlags,
    buffer_usage: UsageFlags,
    pixel_format: PixelFormat,
    rootless: bool,
    native_display: usize,
    fallback_handler: Option<FallbackHandler>,
}

impl BridgeBuilder {
    /// Create a new BridgeBuilder with the usages libhybris compositors expect.
    pub fn new() -> BridgeBuilder {
        BridgeBuilder {
            create_usage: UsageFlags::empty()
                .use_hw_composer(true)
                .use_hw_render(true),
            export_usage: UsageFlags::new(
                HYBRIS_USAGE_HW_TEXTURE | HYBRIS_USAGE_SW_READ_NEVER | HYBRIS_USAGE_SW_WRITE_NEVER,
            ),
            import_usage: UsageFlags::empty().use_hw_texture(true),
            buffer_usage: UsageFlags::empty().use_hw_render(true),
            pixel_format: PixelFormat::RGBA_8888,
            rootless: false,
            native_display: 0,
            fallback_handler: None,
        }
    }

    /// Sets the usage of buffers backing new pixmaps.
    pub fn set_create_usage(mut self, usage: UsageFlags) -> BridgeBuilder {
        self.create_usage = usage;
        self
    }

    /// Sets the usage of buffers allocated by `make_exportable`.
    pub fn set_export_usage(mut self, usage: UsageFlags) -> BridgeBuilder {
        self.export_usage = usage;
        self
    }

    /// Sets the usage of imported buffers.
    pub fn set_import_usage(mut self, usage: UsageFlags) -> BridgeBuilder {
        self.import_usage = usage;
        self
    }

    /// Sets the usage sent along with display buffers.
    pub fn set_buffer_usage(mut self, usage: UsageFlags) -> BridgeBuilder {
        self.buffer_usage = usage;
        self
    }

    pub fn set_pixel_format(mut self, format: PixelFormat) -> BridgeBuilder {
        self.pixel_format = format;
        self
    }

    pub fn set_rootless(mut self, rootless: bool) -> BridgeBuilder {
        self.rootless = rootless;
        self
    }

    pub fn set_native_display(mut self, native_display: usize) -> BridgeBuilder {
        self.native_display = native_display;
        self
    }

    /// Set the handler told about every pixmap that falls back to the cpu.
    pub fn set_fallback_handler(mut self, handler: Option<FallbackHandler>) -> BridgeBuilder {
        self.fallback_handler = handler;
        self
    }

    pub fn build(self) -> BridgeConfig {
        BridgeConfig {
            create_usage: self.create_usage,
            export_usage: self.export_usage,
            import_usage: self.import_usage,
            buffer_usage: self.buffer_usage,
            pixel_format: self.pixel_format,
            rootless: self.rootless,
            native_display: self.native_display,
            fallback_handler: self.fallback_handler,
        }
    }
}

impl Default for BridgeBuilder {
    fn default() -> BridgeBuilder {
        BridgeBuilder::new()
    }
}

/// The function table a glamor backend installs into the host session.
pub trait GlamorBackend {
    fn name(&self) -> &'static str;

    /// Offers a global announced by the display registry.  Returns true if the backend bound it.
    fn init_wl_registry(&mut self, name: u32, interface: &str, version: u32) -> bool;

    /// Whether every interface the backend needs has been bound.
    fn has_wl_interfaces(&self) -> bool;

    /// Sets up the rendering context.  A failure makes the backend unusable.
    fn init_egl(&mut self) -> BridgeResult<()>;

    /// Installs the pixmap hooks.  Until then pixmaps are plain rendering-layer pixmaps.
    fn init_screen(&mut self) -> BridgeResult<()>;

    fn is_available(&self) -> bool;

    fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        hint: UsageHint,
    ) -> BridgeResult<PixmapHandle>;

    fn destroy_pixmap(&mut self, pixmap: PixmapHandle) -> bool;

    /// Returns the display buffer of `pixmap` and whether it was created by this call.
    fn get_wl_buffer_for_pixmap(&mut self, pixmap: PixmapHandle)
        -> BridgeResult<(RemoteBuffer, bool)>;

    /// Implementations must build a pixmap around a buffer serialized by another process.
    #[allow(clippy::too_many_arguments)]
    fn pixmap_from_buffer(
        &mut self,
        _width: u32,
        _height: u32,
        _stride: u32,
        _depth: u32,
        _bits_per_pixel: u32,
        _ints: &[i32],
        _fds: &[RawDescriptor],
    ) -> BridgeResult<PixmapHandle> {
        Err(BridgeError::Unsupported)
    }

    /// Implementations must serialize the buffer behind `pixmap` for another process.
    fn buffer_from_pixmap(&mut self, _pixmap: PixmapHandle) -> BridgeResult<BufferDescriptor> {
        Err(BridgeError::Unsupported)
    }

    fn exchange_buffers(&mut self, _front: PixmapHandle, _back: PixmapHandle) -> BridgeResult<()> {
        Err(BridgeError::Unsupported)
    }

    fn stats(&self) -> BridgeStats {
        Default::default()
    }
}

/// Backs pixmaps with libhybris native buffers and shares them through `android_wlegl`.
pub struct HybrisBackend {
    config: BridgeConfig,
    egl: Rc<dyn EglApi>,
    allocator: Option<Rc<dyn NativeAllocator>>,
    rendering: Rc<dyn RenderingLayer>,
    display: Rc<dyn DisplayClient>,
    wlegl: Option<ProtocolObject>,
    bridge: Option<PixmapBridge>,
    egl_failed: bool,
    screen_ready: bool,
}

impl HybrisBackend {
    pub fn new(
        config: BridgeConfig,
        egl: Rc<dyn EglApi>,
        rendering: Rc<dyn RenderingLayer>,
        display: Rc<dyn DisplayClient>,
    ) -> HybrisBackend {
        HybrisBackend {
            config,
            egl,
            allocator: None,
            rendering,
            display,
            wlegl: None,
            bridge: None,
            egl_failed: false,
            screen_ready: false,
        }
    }

    /// Uses `allocator` instead of the libhybris entry points resolved at `init_egl` time.
    pub fn with_allocator(mut self, allocator: Rc<dyn NativeAllocator>) -> HybrisBackend {
        self.allocator = Some(allocator);
        self
    }

    pub fn bridge(&self) -> Option<&PixmapBridge> {
        self.bridge.as_ref()
    }

    pub fn bridge_mut(&mut self) -> Option<&mut PixmapBridge> {
        self.bridge.as_mut()
    }

    pub fn wlegl(&self) -> Option<ProtocolObject> {
        self.wlegl
    }

    fn ready_bridge(&mut self) -> BridgeResult<&mut PixmapBridge> {
        if !self.screen_ready {
            return Err(BridgeError::InvalidContextState("screen is not initialized"));
        }

        self.bridge
            .as_mut()
            .ok_or(BridgeError::InvalidContextState("egl is not initialized"))
    }

    #[cfg(feature = "hybris")]
    fn native_allocator(&self) -> BridgeResult<Rc<dyn NativeAllocator>> {
        use std::ffi::CStr;

        use crate::native_buffer::HybrisAllocator;
        use crate::native_buffer::HybrisProcs;

        if let Some(allocator) = &self.allocator {
            return Ok(allocator.clone());
        }

        let egl = self.egl.clone();
        let procs = HybrisProcs::load(&|name: &CStr| egl.get_proc_address(name))?;
        Ok(Rc::new(HybrisAllocator::new(procs)))
    }

    #[cfg(not(feature = "hybris"))]
    fn native_allocator(&self) -> BridgeResult<Rc<dyn NativeAllocator>> {
        self.allocator
            .clone()
            .ok_or(BridgeError::ContextInit("no native buffer allocator"))
    }
}

impl GlamorBackend for HybrisBackend {
    fn name(&self) -> &'static str {
        "hybris"
    }

    fn init_wl_registry(&mut self, name: u32, interface: &str, version: u32) -> bool {
        if interface != ANDROID_WLEGL_INTERFACE {
            return false;
        }

        let version = version.min(ANDROID_WLEGL_VERSION);
        let wlegl = match self.display.bind(name, interface, version) {
            Ok(wlegl) => wlegl,
            Err(e) => {
                error!("failed to bind {}: {}", interface, e);
                return false;
            }
        };

        info!("bound {} v{} as {:?}", interface, version, wlegl);
        self.wlegl = Some(wlegl);
        if let Some(bridge) = &mut self.bridge {
            bridge.set_wlegl(wlegl);
        }
        true
    }

    fn has_wl_interfaces(&self) -> bool {
        // android_wlegl is only needed once a pixmap is shown.
        true
    }

    fn init_egl(&mut self) -> BridgeResult<()> {
        if self.bridge.is_some() {
            return Err(BridgeError::InvalidContextState("egl is already initialized"));
        }

        let mut binder = GpuImageBinder::new(self.egl.clone(), self.config.native_display);
        let result = binder
            .init_context()
            .and_then(|_| self.native_allocator());
        let allocator = match result {
            Ok(allocator) => allocator,
            Err(e) => {
                self.egl_failed = true;
                return Err(e);
            }
        };

        let mut bridge = PixmapBridge::new(
            self.config.clone(),
            allocator,
            binder,
            self.rendering.clone(),
            self.display.clone(),
        );
        if let Some(wlegl) = self.wlegl {
            bridge.set_wlegl(wlegl);
        }
        self.bridge = Some(bridge);
        Ok(())
    }

    fn init_screen(&mut self) -> BridgeResult<()> {
        if self.bridge.is_none() {
            return Err(BridgeError::InvalidContextState("egl is not initialized"));
        }

        self.screen_ready = true;
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.egl_failed
    }

    fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        hint: UsageHint,
    ) -> BridgeResult<PixmapHandle> {
        match self.ready_bridge() {
            Ok(bridge) => bridge.create_pixmap(width, height, depth, hint),
            Err(_) => self.rendering.create_pixmap(width, height, depth, hint),
        }
    }

    fn destroy_pixmap(&mut self, pixmap: PixmapHandle) -> bool {
        match self.ready_bridge() {
            Ok(bridge) => bridge.destroy_pixmap(pixmap),
            Err(_) => self.rendering.destroy_pixmap(pixmap),
        }
    }

    fn get_wl_buffer_for_pixmap(
        &mut self,
        pixmap: PixmapHandle,
    ) -> BridgeResult<(RemoteBuffer, bool)> {
        self.ready_bridge()?.get_or_create_display_buffer(pixmap)
    }

    #[allow(clippy::too_many_arguments)]
    fn pixmap_from_buffer(
        &mut self,
        width: u32,
        height: u32,
        stride: u32,
        depth: u32,
        bits_per_pixel: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<PixmapHandle> {
        self.ready_bridge()?.pixmap_from_external_buffer(
            width,
            height,
            stride,
            depth,
            bits_per_pixel,
            ints,
            fds,
        )
    }

    fn buffer_from_pixmap(&mut self, pixmap: PixmapHandle) -> BridgeResult<BufferDescriptor> {
        self.ready_bridge()?.buffer_descriptors_from_pixmap(pixmap)
    }

    fn exchange_buffers(&mut self, front: PixmapHandle, back: PixmapHandle) -> BridgeResult<()> {
        self.ready_bridge()?.exchange_buffers(front, back)
    }

    fn stats(&self) -> BridgeStats {
        self.bridge
            .as_ref()
            .map(|bridge| bridge.stats())
            .unwrap_or_default()
    }
}

/// Leaves every pixmap to the rendering layer.  Nothing is ever shared with the compositor.
pub struct SoftwareBackend {
    rendering: Rc<dyn RenderingLayer>,
}

impl SoftwareBackend {
    pub fn new(rendering: Rc<dyn RenderingLayer>) -> SoftwareBackend {
        SoftwareBackend { rendering }
    }
}

impl GlamorBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn init_wl_registry(&mut self, _name: u32, _interface: &str, _version: u32) -> bool {
        false
    }

    fn has_wl_interfaces(&self) -> bool {
        true
    }

    fn init_egl(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    fn init_screen(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        hint: UsageHint,
    ) -> BridgeResult<PixmapHandle> {
        self.rendering.create_pixmap(width, height, depth, hint)
    }

    fn destroy_pixmap(&mut self, pixmap: PixmapHandle) -> bool {
        self.rendering.destroy_pixmap(pixmap)
    }

    fn get_wl_buffer_for_pixmap(
        &mut self,
        _pixmap: PixmapHandle,
    ) -> BridgeResult<(RemoteBuffer, bool)> {
        Err(BridgeError::MissingBinding)
    }
}

/// The screen a backend serves.  Exactly one backend is active at a time.
pub struct HostSession {
    rendering: Rc<dyn RenderingLayer>,
    active: Option<Box<dyn GlamorBackend>>,
}

impl HostSession {
    pub fn new(rendering: Rc<dyn RenderingLayer>) -> HostSession {
        HostSession {
            rendering,
            active: None,
        }
    }

    /// Makes `backend` the active backend.  Returns the backend it replaces, if any.
    pub fn register_backend(
        &mut self,
        backend: Box<dyn GlamorBackend>,
    ) -> Option<Box<dyn GlamorBackend>> {
        info!("using the {} glamor backend", backend.name());
        let previous = self.active.replace(backend);
        if let Some(previous) = &previous {
            warn!("replacing the {} glamor backend", previous.name());
        }
        previous
    }

    pub fn backend(&self) -> Option<&dyn GlamorBackend> {
        self.active.as_deref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut (dyn GlamorBackend + 'static)> {
        self.active.as_deref_mut()
    }

    pub fn active_backend_name(&self) -> Option<&'static str> {
        self.active.as_ref().map(|backend| backend.name())
    }

    /// Forwards a registry announcement to the active backend.
    pub fn on_registry_announce(&mut self, name: u32, interface: &str, version: u32) -> bool {
        match &mut self.active {
            Some(backend) => backend.init_wl_registry(name, interface, version),
            None => false,
        }
    }

    /// Brings up the active backend.  If it can't be used, the session drops to the software
    /// backend and the error is returned.
    pub fn init(&mut self) -> BridgeResult<()> {
        let backend = self
            .active
            .as_mut()
            .ok_or(BridgeError::InvalidContextState("no backend registered"))?;

        let result = if backend.has_wl_interfaces() {
            backend.init_egl().and_then(|_| backend.init_screen())
        } else {
            Err(BridgeError::MissingInterface(ANDROID_WLEGL_INTERFACE))
        };

        if let Err(e) = result {
            error!("{} backend is unavailable: {}", backend.name(), e);
            let mut software = SoftwareBackend::new(self.rendering.clone());
            software.init_egl()?;
            software.init_screen()?;
            self.register_backend(Box::new(software));
            return Err(e);
        }

        Ok(())
    }

    pub fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        hint: UsageHint,
    ) -> BridgeResult<PixmapHandle> {
        match &mut self.active {
            Some(backend) => backend.create_pixmap(width, height, depth, hint),
            None => self.rendering.create_pixmap(width, height, depth, hint),
        }
    }

    pub fn destroy_pixmap(&mut self, pixmap: PixmapHandle) -> bool {
        match &mut self.active {
            Some(backend) => backend.destroy_pixmap(pixmap),
            None => self.rendering.destroy_pixmap(pixmap),
        }
    }
}

/// Registers the hybris backend as the session's active backend.
pub fn init_hybris_backend(session: &mut HostSession, backend: HybrisBackend) {
    session.register_backend(Box::new(backend));
}
