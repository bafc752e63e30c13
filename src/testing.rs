// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! testing: recording stand-ins for the allocator, EGL, the rendering layer and the display
//! client.  Counters only go up, so tests can compare creations against releases.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap as Map;
use std::collections::BTreeSet as Set;
use std::ffi::CStr;
use std::fs::File;
use std::os::raw::c_void;
use std::os::unix::io::AsRawFd;
use std::ptr::null;
use std::ptr::null_mut;
use std::rc::Rc;

use crate::backend::BridgeBuilder;
use crate::backend::BridgeConfig;
use crate::bridge_os::RawDescriptor;
use crate::bridge_utils::*;
use crate::display::BufferRequest;
use crate::display::DisplayClient;
use crate::display::ProtocolObject;
use crate::display::RemoteBuffer;
use crate::display::ANDROID_WLEGL_INTERFACE;
use crate::gpu_image::*;
use crate::native_buffer::BufferAllocationInfo;
use crate::native_buffer::HandleCounts;
use crate::native_buffer::NativeAllocator;
use crate::pixmap_bridge::DrawableInfo;
use crate::pixmap_bridge::PixmapBridge;
use crate::pixmap_bridge::PixmapType;
use crate::pixmap_bridge::RenderingLayer;

const MOCK_NUM_INTS: usize = 2;
const MOCK_NUM_FDS: usize = 1;

fn bump(counter: &mut u64) {
    *counter += 1;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocatorCounters {
    pub created: u64,
    pub remote_created: u64,
    pub released: u64,
    pub locked: u64,
    pub unlocked: u64,
    pub serialized: u64,
}

struct MockBuffer {
    info: BufferAllocationInfo,
    stride: u32,
    pixels: Box<[u8]>,
}

/// Heap-backed native buffers.  Serialized handles carry the buffer id and its stride, plus a
/// descriptor for /dev/null.
pub struct MockAllocator {
    counters: RefCell<AllocatorCounters>,
    buffers: RefCell<Map<RawBuffer, MockBuffer>>,
    next_id: Cell<usize>,
    fail_create: Cell<bool>,
    fail_mapping: Cell<bool>,
    null: File,
}

impl MockAllocator {
    pub fn new() -> MockAllocator {
        MockAllocator {
            counters: Default::default(),
            buffers: Default::default(),
            next_id: Cell::new(1),
            fail_create: Cell::new(false),
            fail_mapping: Cell::new(false),
            null: File::open("/dev/null").unwrap(),
        }
    }

    pub fn counters(&self) -> AllocatorCounters {
        *self.counters.borrow()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.set(fail);
    }

    /// Makes `lock` succeed without returning a mapping.
    pub fn fail_mapping(&self, fail: bool) {
        self.fail_mapping.set(fail);
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    fn insert(&self, info: BufferAllocationInfo, stride: u32) -> BridgeResult<RawBuffer> {
        let size = stride * info.height * info.format.bytes_per_pixel()?;
        let raw = RawBuffer(self.next_id.get());
        self.next_id.set(raw.0 + 1);
        self.buffers.borrow_mut().insert(
            raw,
            MockBuffer {
                info,
                stride,
                pixels: vec![0; size as usize].into_boxed_slice(),
            },
        );
        Ok(raw)
    }
}

impl NativeAllocator for MockAllocator {
    fn supports_remote_buffers(&self) -> bool {
        true
    }

    fn create(&self, info: BufferAllocationInfo) -> BridgeResult<(RawBuffer, u32)> {
        if self.fail_create.get() {
            return Err(BridgeError::AllocationFailed("mock exhausted"));
        }

        let stride = (info.width + 7) & !7;
        let raw = self.insert(info, stride)?;
        bump(&mut self.counters.borrow_mut().created);
        Ok((raw, stride))
    }

    fn create_remote(
        &self,
        info: BufferAllocationInfo,
        stride: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<RawBuffer> {
        if ints.len() != MOCK_NUM_INTS || fds.len() != MOCK_NUM_FDS {
            return Err(BridgeError::ImportFailed("unexpected handle counts"));
        }

        if ints[1] as u32 != stride {
            return Err(BridgeError::ImportFailed("stride mismatch"));
        }

        let raw = self.insert(info, stride)?;
        bump(&mut self.counters.borrow_mut().remote_created);
        Ok(raw)
    }

    fn lock(&self, buffer: RawBuffer, _usage: UsageFlags) -> BridgeResult<*mut u8> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers
            .get_mut(&buffer)
            .ok_or(BridgeError::InvalidBuffer("unknown mock buffer"))?;
        bump(&mut self.counters.borrow_mut().locked);
        if self.fail_mapping.get() {
            return Ok(null_mut());
        }

        Ok(entry.pixels.as_mut_ptr())
    }

    fn unlock(&self, buffer: RawBuffer) -> BridgeResult<()> {
        if !self.buffers.borrow().contains_key(&buffer) {
            return Err(BridgeError::InvalidBuffer("unknown mock buffer"));
        }
        bump(&mut self.counters.borrow_mut().unlocked);
        Ok(())
    }

    fn release(&self, buffer: RawBuffer) {
        assert!(
            self.buffers.borrow_mut().remove(&buffer).is_some(),
            "{:?} released twice",
            buffer
        );
        bump(&mut self.counters.borrow_mut().released);
    }

    fn handle_counts(&self, buffer: RawBuffer) -> BridgeResult<HandleCounts> {
        if !self.buffers.borrow().contains_key(&buffer) {
            return Err(BridgeError::InvalidBuffer("unknown mock buffer"));
        }

        Ok(HandleCounts {
            num_ints: MOCK_NUM_INTS,
            num_fds: MOCK_NUM_FDS,
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
            .ok_or(BridgeError::InvalidBuffer("unknown mock buffer"))?;
        ints[0] = buffer.0 as i32;
        ints[1] = entry.stride as i32;
        fds[0] = self.null.as_raw_fd();
        bump(&mut self.counters.borrow_mut().serialized);
        Ok(())
    }

    fn query(&self, buffer: RawBuffer) -> BridgeResult<BufferAllocationInfo> {
        self.buffers
            .borrow()
            .get(&buffer)
            .map(|entry| entry.info)
            .ok_or(BridgeError::InvalidBuffer("unknown mock buffer"))
    }
}

/// The step of context initialization `MockEgl` should fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitFailure {
    Display,
    Initialize,
    Extensions,
    Config,
    Context,
    MakeCurrent,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EglCounters {
    pub contexts_created: u64,
    pub contexts_destroyed: u64,
    pub terminated: u64,
    pub make_current: u64,
    pub images_created: u64,
    pub images_destroyed: u64,
    pub textures_created: u64,
    pub textures_deleted: u64,
}

const MOCK_EXTENSIONS: &str =
    "EGL_KHR_image_base EGL_KHR_surfaceless_context EGL_KHR_surfaceless_gles2 \
     EGL_KHR_gl_renderbuffer_image EGL_HYBRIS_native_buffer2";

/// An EGL implementation that hands out increasing handles.
pub struct MockEgl {
    counters: RefCell<EglCounters>,
    fail_init: Cell<Option<InitFailure>>,
    fail_image_import: Cell<bool>,
    fail_texture_bind: Cell<bool>,
    fail_release: Cell<bool>,
    next_handle: Cell<usize>,
    bound_texture: Cell<u32>,
    error: Cell<i32>,
    filters: RefCell<Map<u32, (i32, i32)>>,
    live_images: RefCell<Set<usize>>,
}

impl MockEgl {
    pub fn new() -> MockEgl {
        MockEgl {
            counters: Default::default(),
            fail_init: Cell::new(None),
            fail_image_import: Cell::new(false),
            fail_texture_bind: Cell::new(false),
            fail_release: Cell::new(false),
            next_handle: Cell::new(1),
            bound_texture: Cell::new(0),
            error: Cell::new(EGL_SUCCESS),
            filters: Default::default(),
            live_images: Default::default(),
        }
    }

    pub fn counters(&self) -> EglCounters {
        *self.counters.borrow()
    }

    pub fn fail_init(&self, failure: InitFailure) {
        self.fail_init.set(Some(failure));
    }

    pub fn fail_image_import(&self, fail: bool) {
        self.fail_image_import.set(fail);
    }

    pub fn fail_texture_bind(&self, fail: bool) {
        self.fail_texture_bind.set(fail);
    }

    /// Makes unbinding the current context fail.
    pub fn fail_release(&self, fail: bool) {
        self.fail_release.set(fail);
    }

    /// The (min, mag) filters last set on `texture`.
    pub fn min_mag_filters(&self, texture: u32) -> Option<(i32, i32)> {
        self.filters.borrow().get(&texture).copied()
    }

    fn failing(&self, step: InitFailure) -> bool {
        self.fail_init.get() == Some(step)
    }

    fn handle(&self) -> usize {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }
}

impl EglApi for MockEgl {
    fn get_display(&self, _native_display: usize) -> EglDisplay {
        if self.failing(InitFailure::Display) {
            return EglDisplay::NO_DISPLAY;
        }
        EglDisplay(self.handle())
    }

    fn initialize(&self, _display: EglDisplay) -> Option<(i32, i32)> {
        if self.failing(InitFailure::Initialize) {
            return None;
        }
        Some((1, 4))
    }

    fn terminate(&self, _display: EglDisplay) {
        bump(&mut self.counters.borrow_mut().terminated);
    }

    fn bind_api(&self, api: u32) -> bool {
        api == EGL_OPENGL_ES_API
    }

    fn query_string(&self, _display: EglDisplay, name: i32) -> Option<String> {
        match name {
            EGL_EXTENSIONS if self.failing(InitFailure::Extensions) => {
                Some("EGL_KHR_image_base".to_string())
            }
            EGL_EXTENSIONS => Some(MOCK_EXTENSIONS.to_string()),
            EGL_VERSION => Some("1.4 mock".to_string()),
            _ => None,
        }
    }

    fn choose_config(&self, _display: EglDisplay, attribs: &[i32]) -> Option<EglConfig> {
        assert_eq!(attribs.last(), Some(&EGL_NONE));
        if self.failing(InitFailure::Config) {
            return None;
        }
        Some(EglConfig(self.handle()))
    }

    fn create_context(
        &self,
        _display: EglDisplay,
        _config: EglConfig,
        attribs: &[i32],
    ) -> EglContext {
        assert_eq!(attribs, [EGL_CONTEXT_CLIENT_VERSION, 2, EGL_NONE]);
        if self.failing(InitFailure::Context) {
            return EglContext::NO_CONTEXT;
        }
        bump(&mut self.counters.borrow_mut().contexts_created);
        EglContext(self.handle())
    }

    fn destroy_context(&self, _display: EglDisplay, _context: EglContext) {
        bump(&mut self.counters.borrow_mut().contexts_destroyed);
    }

    fn make_current(&self, _display: EglDisplay, context: EglContext) -> bool {
        bump(&mut self.counters.borrow_mut().make_current);
        if context.is_none() {
            return !self.fail_release.get();
        }

        !self.failing(InitFailure::MakeCurrent)
    }

    fn get_error(&self) -> i32 {
        self.error.replace(EGL_SUCCESS)
    }

    fn create_image(&self, _display: EglDisplay, target: u32, buffer: RawBuffer) -> EglImage {
        assert_eq!(target, EGL_NATIVE_BUFFER_HYBRIS);
        if self.fail_image_import.get() || buffer.0 == 0 {
            return EglImage::NO_IMAGE;
        }
        let image = self.handle();
        self.live_images.borrow_mut().insert(image);
        bump(&mut self.counters.borrow_mut().images_created);
        EglImage(image)
    }

    fn destroy_image(&self, _display: EglDisplay, image: EglImage) {
        assert!(
            self.live_images.borrow_mut().remove(&image.0),
            "{:?} destroyed twice",
            image
        );
        bump(&mut self.counters.borrow_mut().images_destroyed);
    }

    fn gen_texture(&self) -> u32 {
        bump(&mut self.counters.borrow_mut().textures_created);
        self.handle() as u32
    }

    fn bind_texture(&self, _target: u32, texture: u32) {
        self.bound_texture.set(texture);
    }

    fn tex_parameter(&self, _target: u32, pname: u32, param: i32) {
        let texture = self.bound_texture.get();
        let mut filters = self.filters.borrow_mut();
        let entry = filters.entry(texture).or_insert((0, 0));
        match pname {
            GL_TEXTURE_MIN_FILTER => entry.0 = param,
            GL_TEXTURE_MAG_FILTER => entry.1 = param,
            _ => (),
        }
    }

    fn image_target_texture(&self, _target: u32, image: EglImage) {
        if self.fail_texture_bind.get() || !self.live_images.borrow().contains(&image.0) {
            self.error.set(EGL_BAD_PARAMETER);
        }
    }

    fn delete_texture(&self, _texture: u32) {
        bump(&mut self.counters.borrow_mut().textures_deleted);
    }

    fn get_proc_address(&self, _name: &CStr) -> *const c_void {
        null()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderingCounters {
    pub created: u64,
    pub textureless_created: u64,
    pub destroyed: u64,
    pub textureless_destroyed: u64,
    pub cleared: u64,
    pub copies: u64,
    pub exchanges: u64,
}

struct MockPixmap {
    info: DrawableInfo,
    texture: u32,
    kind: Option<PixmapType>,
    textureless: bool,
    cleared: bool,
}

/// A rendering layer that only keeps pixmap headers.  Ordinary pixmaps get a texture id of
/// their own, starting far above the ones `MockEgl` hands out.
pub struct MockRendering {
    counters: RefCell<RenderingCounters>,
    pixmaps: RefCell<Map<PixmapHandle, MockPixmap>>,
    next_pixmap: Cell<u32>,
    next_texture: Cell<u32>,
    reject_textures: Cell<bool>,
    fail_copy: Cell<bool>,
}

impl MockRendering {
    pub fn new() -> MockRendering {
        MockRendering {
            counters: Default::default(),
            pixmaps: Default::default(),
            next_pixmap: Cell::new(1),
            next_texture: Cell::new(0x10000),
            reject_textures: Cell::new(false),
            fail_copy: Cell::new(false),
        }
    }

    pub fn counters(&self) -> RenderingCounters {
        *self.counters.borrow()
    }

    /// Makes `set_pixmap_texture` a no-op.
    pub fn reject_textures(&self, reject: bool) {
        self.reject_textures.set(reject);
    }

    pub fn fail_copy(&self, fail: bool) {
        self.fail_copy.set(fail);
    }

    pub fn add_ref(&self, pixmap: PixmapHandle) {
        if let Some(entry) = self.pixmaps.borrow_mut().get_mut(&pixmap) {
            entry.info.refcnt += 1;
        }
    }

    pub fn pixmap_type(&self, pixmap: PixmapHandle) -> Option<PixmapType> {
        self.pixmaps
            .borrow()
            .get(&pixmap)
            .and_then(|entry| entry.kind)
    }

    pub fn is_cleared(&self, pixmap: PixmapHandle) -> bool {
        self.pixmaps
            .borrow()
            .get(&pixmap)
            .map(|entry| entry.cleared)
            .unwrap_or(false)
    }

    pub fn live_pixmaps(&self) -> usize {
        self.pixmaps.borrow().len()
    }

    fn insert(&self, width: u32, height: u32, depth: u32, texture: u32) -> PixmapHandle {
        let pixmap = PixmapHandle(self.next_pixmap.get());
        self.next_pixmap.set(pixmap.0 + 1);
        let bits_per_pixel = match depth {
            0..=8 => 8,
            9..=16 => 16,
            _ => 32,
        };
        self.pixmaps.borrow_mut().insert(
            pixmap,
            MockPixmap {
                info: DrawableInfo {
                    width,
                    height,
                    depth,
                    bits_per_pixel,
                    refcnt: 1,
                },
                texture,
                kind: None,
                textureless: texture == 0,
                cleared: false,
            },
        );
        pixmap
    }
}

impl RenderingLayer for MockRendering {
    fn create_pixmap(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        _hint: UsageHint,
    ) -> BridgeResult<PixmapHandle> {
        let texture = self.next_texture.get();
        self.next_texture.set(texture + 1);
        bump(&mut self.counters.borrow_mut().created);
        let pixmap = self.insert(width, height, depth, texture);
        if let Some(entry) = self.pixmaps.borrow_mut().get_mut(&pixmap) {
            entry.kind = Some(PixmapType::TextureOnly);
        }
        Ok(pixmap)
    }

    fn create_textureless_pixmap(
        &self,
        width: u32,
        height: u32,
        depth: u32,
    ) -> BridgeResult<PixmapHandle> {
        bump(&mut self.counters.borrow_mut().textureless_created);
        Ok(self.insert(width, height, depth, 0))
    }

    fn set_pixmap_texture(&self, pixmap: PixmapHandle, texture: u32) {
        if self.reject_textures.get() {
            return;
        }
        if let Some(entry) = self.pixmaps.borrow_mut().get_mut(&pixmap) {
            entry.texture = texture;
        }
    }

    fn pixmap_texture(&self, pixmap: PixmapHandle) -> u32 {
        self.pixmaps
            .borrow()
            .get(&pixmap)
            .map(|entry| entry.texture)
            .unwrap_or(0)
    }

    fn set_pixmap_type(&self, pixmap: PixmapHandle, kind: PixmapType) {
        if let Some(entry) = self.pixmaps.borrow_mut().get_mut(&pixmap) {
            entry.kind = Some(kind);
        }
    }

    fn clear_pixmap(&self, pixmap: PixmapHandle) {
        if let Some(entry) = self.pixmaps.borrow_mut().get_mut(&pixmap) {
            entry.cleared = true;
            bump(&mut self.counters.borrow_mut().cleared);
        }
    }

    fn destroy_pixmap(&self, pixmap: PixmapHandle) -> bool {
        let mut pixmaps = self.pixmaps.borrow_mut();
        let entry = match pixmaps.get_mut(&pixmap) {
            Some(entry) => entry,
            None => return false,
        };

        entry.info.refcnt -= 1;
        if entry.info.refcnt > 0 {
            return false;
        }

        let textureless = entry.textureless;
        pixmaps.remove(&pixmap);
        let mut counters = self.counters.borrow_mut();
        bump(&mut counters.destroyed);
        if textureless {
            bump(&mut counters.textureless_destroyed);
        }
        true
    }

    fn drawable(&self, pixmap: PixmapHandle) -> Option<DrawableInfo> {
        self.pixmaps.borrow().get(&pixmap).map(|entry| entry.info)
    }

    fn copy_area(
        &self,
        src: PixmapHandle,
        dst: PixmapHandle,
        _width: u32,
        _height: u32,
    ) -> BridgeResult<()> {
        let pixmaps = self.pixmaps.borrow();
        if !pixmaps.contains_key(&src) {
            return Err(BridgeError::UnknownPixmap(src.0));
        }
        if !pixmaps.contains_key(&dst) {
            return Err(BridgeError::UnknownPixmap(dst.0));
        }
        if self.fail_copy.get() {
            return Err(BridgeError::Unsupported);
        }
        bump(&mut self.counters.borrow_mut().copies);
        Ok(())
    }

    fn exchange_fbos(&self, front: PixmapHandle, back: PixmapHandle) {
        let mut pixmaps = self.pixmaps.borrow_mut();
        let front_texture = pixmaps.get(&front).map(|entry| entry.texture);
        let back_texture = pixmaps.get(&back).map(|entry| entry.texture);
        if let (Some(front_texture), Some(back_texture)) = (front_texture, back_texture) {
            if let Some(entry) = pixmaps.get_mut(&front) {
                entry.texture = back_texture;
            }
            if let Some(entry) = pixmaps.get_mut(&back) {
                entry.texture = front_texture;
            }
        }
        bump(&mut self.counters.borrow_mut().exchanges);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DisplayCounters {
    pub bound: u64,
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
}

/// What the compositor was told about a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: i32,
    pub usage: i32,
    pub num_ints: usize,
    pub num_fds: usize,
}

pub struct MockDisplay {
    counters: RefCell<DisplayCounters>,
    next_id: Cell<u32>,
    live: RefCell<Set<u32>>,
    fail_create: Cell<bool>,
    last_bind: Cell<Option<(u32, u32)>>,
    last_request: Cell<Option<RecordedRequest>>,
}

impl MockDisplay {
    pub fn new() -> MockDisplay {
        MockDisplay {
            counters: Default::default(),
            next_id: Cell::new(100),
            live: Default::default(),
            fail_create: Cell::new(false),
            last_bind: Cell::new(None),
            last_request: Cell::new(None),
        }
    }

    pub fn counters(&self) -> DisplayCounters {
        *self.counters.borrow()
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.set(fail);
    }

    /// The (name, version) of the last bound global.
    pub fn last_bind(&self) -> Option<(u32, u32)> {
        self.last_bind.get()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.last_request.get()
    }

    pub fn live_buffers(&self) -> usize {
        self.live.borrow().len()
    }

    fn id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }
}

impl DisplayClient for MockDisplay {
    fn bind(&self, name: u32, interface: &str, version: u32) -> BridgeResult<ProtocolObject> {
        assert_eq!(interface, ANDROID_WLEGL_INTERFACE);
        bump(&mut self.counters.borrow_mut().bound);
        self.last_bind.set(Some((name, version)));
        Ok(ProtocolObject(self.id()))
    }

    fn create_buffer(
        &self,
        _wlegl: ProtocolObject,
        request: &BufferRequest,
    ) -> BridgeResult<RemoteBuffer> {
        if self.fail_create.get() {
            return Err(BridgeError::Protocol("create_buffer refused"));
        }

        self.last_request.set(Some(RecordedRequest {
            width: request.width,
            height: request.height,
            stride: request.stride,
            format: request.format,
            usage: request.usage,
            num_ints: request.handle.ints()?.len(),
            num_fds: request.handle.num_fds(),
        }));
        let id = self.id();
        self.live.borrow_mut().insert(id);
        bump(&mut self.counters.borrow_mut().buffers_created);
        Ok(RemoteBuffer(id))
    }

    fn destroy_buffer(&self, buffer: RemoteBuffer) {
        assert!(
            self.live.borrow_mut().remove(&buffer.0),
            "{:?} destroyed twice",
            buffer
        );
        bump(&mut self.counters.borrow_mut().buffers_destroyed);
    }
}

/// One of each collaborator, plus helpers to wire them into a ready `PixmapBridge`.
pub struct Fixture {
    pub allocator: Rc<MockAllocator>,
    pub egl: Rc<MockEgl>,
    pub rendering: Rc<MockRendering>,
    pub display: Rc<MockDisplay>,
}

impl Fixture {
    pub fn new() -> Fixture {
        Fixture {
            allocator: Rc::new(MockAllocator::new()),
            egl: Rc::new(MockEgl::new()),
            rendering: Rc::new(MockRendering::new()),
            display: Rc::new(MockDisplay::new()),
        }
    }

    fn build(
        &self,
        config: BridgeConfig,
        allocator: Rc<dyn NativeAllocator>,
        bind_wlegl: bool,
    ) -> PixmapBridge {
        let mut binder = GpuImageBinder::new(self.egl.clone(), config.native_display);
        binder.init_context().unwrap();
        let mut bridge = PixmapBridge::new(
            config,
            allocator,
            binder,
            self.rendering.clone(),
            self.display.clone(),
        );
        if bind_wlegl {
            let wlegl = self
                .display
                .bind(1, ANDROID_WLEGL_INTERFACE, 1)
                .unwrap();
            bridge.set_wlegl(wlegl);
        }
        bridge
    }

    pub fn bridge(&self) -> PixmapBridge {
        self.bridge_with_config(BridgeBuilder::new().build())
    }

    pub fn bridge_with_config(&self, config: BridgeConfig) -> PixmapBridge {
        self.build(config, self.allocator.clone(), true)
    }

    pub fn bridge_with_allocator(&self, allocator: Rc<dyn NativeAllocator>) -> PixmapBridge {
        self.build(BridgeBuilder::new().build(), allocator, true)
    }

    pub fn bridge_without_wlegl(&self) -> PixmapBridge {
        self.build(BridgeBuilder::new().build(), self.allocator.clone(), false)
    }
}
