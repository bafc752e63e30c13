// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! pixmap_bridge: attaches native buffers, GPU images and display buffer objects to the pixmaps
//! of the rendering layer.
//!
//! Every bridged pixmap owns one `PixmapBinding`.  The binding owns the texture, the image and
//! the native buffer, and tears them down in that order.  A display buffer object is shared with
//! the compositor and only destroyed through `DisplayClient::destroy_buffer`.

use std::collections::BTreeMap as Map;
use std::mem;
use std::rc::Rc;

use log::debug;
use log::error;
use log::warn;

use crate::backend::BridgeConfig;
use crate::bridge_os::RawDescriptor;
use crate::bridge_utils::*;
use crate::display::BufferRequest;
use crate::display::DisplayClient;
use crate::display::ProtocolObject;
use crate::display::RemoteBuffer;
use crate::display::ANDROID_WLEGL_INTERFACE;
use crate::gpu_image::GpuImage;
use crate::gpu_image::GpuImageBinder;
use crate::gpu_image::GpuTexture;
use crate::handle_codec;
use crate::handle_codec::BufferDescriptor;
use crate::native_buffer::BufferAllocationInfo;
use crate::native_buffer::NativeAllocator;
use crate::native_buffer::NativeBuffer;

/// How the rendering layer stores a pixmap's pixels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PixmapType {
    /// A texture owned by the rendering layer.
    TextureOnly,
    /// A texture whose storage is an imported native buffer.
    TextureDrm,
    /// Memory the rendering layer can't texture from.
    DrmOnly,
}

/// The drawable header of a pixmap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawableInfo {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub bits_per_pixel: u32,
    /// Number of holders of the pixmap, including the caller.
    pub refcnt: u32,
}

/// The pixmap and texture management of the rendering layer.
pub trait RenderingLayer {
    /// Creates a pixmap the way the rendering layer would without the bridge.
    fn create_pixmap(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        hint: UsageHint,
    ) -> BridgeResult<PixmapHandle>;

    /// Creates a pixmap header with no storage, for the bridge to attach a texture to.
    fn create_textureless_pixmap(
        &self,
        width: u32,
        height: u32,
        depth: u32,
    ) -> BridgeResult<PixmapHandle>;

    fn set_pixmap_texture(&self, pixmap: PixmapHandle, texture: u32);

    /// Returns the texture backing `pixmap`, or 0 if there is none.
    fn pixmap_texture(&self, pixmap: PixmapHandle) -> u32;

    fn set_pixmap_type(&self, pixmap: PixmapHandle, kind: PixmapType);

    /// Fills the pixmap with transparent black.
    fn clear_pixmap(&self, pixmap: PixmapHandle);

    /// Drops one reference to `pixmap`.  Returns true if the pixmap was freed.
    fn destroy_pixmap(&self, pixmap: PixmapHandle) -> bool;

    fn drawable(&self, pixmap: PixmapHandle) -> Option<DrawableInfo>;

    /// Copies the top-left `width` x `height` pixels of `src` into `dst`.
    fn copy_area(
        &self,
        src: PixmapHandle,
        dst: PixmapHandle,
        width: u32,
        height: u32,
    ) -> BridgeResult<()>;

    /// Swaps the framebuffer objects, and with them the textures, of two pixmaps.
    fn exchange_fbos(&self, front: PixmapHandle, back: PixmapHandle);
}

/// Counters describing how well acceleration is going.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Pixmaps created with a native buffer binding.
    pub gpu_pixmaps: u64,
    /// Eligible pixmaps that ended up CPU-only.
    pub cpu_fallbacks: u64,
    /// Display buffer objects handed to the compositor.
    pub display_buffers: u64,
    /// Pixmaps built from buffers of another process.
    pub imports: u64,
    /// Pixmaps serialized for another process.
    pub exports: u64,
}

// Fields drop in declaration order, which is the teardown order.
#[derive(Debug)]
struct GpuBacking {
    texture: GpuTexture,
    image: GpuImage,
    buffer: NativeBuffer,
    used_modifiers: bool,
}

#[derive(Debug)]
struct PixmapBinding {
    backing: GpuBacking,
    display_buffer: Option<RemoteBuffer>,
}

/// Why the GPU path of `create_pixmap` gave up.
type GpuPathError = (FallbackReason, BridgeError);

/// Owns the bindings of every bridged pixmap.
pub struct PixmapBridge {
    config: BridgeConfig,
    allocator: Rc<dyn NativeAllocator>,
    binder: GpuImageBinder,
    rendering: Rc<dyn RenderingLayer>,
    display: Rc<dyn DisplayClient>,
    wlegl: Option<ProtocolObject>,
    bindings: Map<PixmapHandle, PixmapBinding>,
    stats: BridgeStats,
}

impl PixmapBridge {
    pub fn new(
        config: BridgeConfig,
        allocator: Rc<dyn NativeAllocator>,
        binder: GpuImageBinder,
        rendering: Rc<dyn RenderingLayer>,
        display: Rc<dyn DisplayClient>,
    ) -> PixmapBridge {
        PixmapBridge {
            config,
            allocator,
            binder,
            rendering,
            display,
            wlegl: None,
            bindings: Default::default(),
            stats: Default::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn binder(&self) -> &GpuImageBinder {
        &self.binder
    }

    pub fn binder_mut(&mut self) -> &mut GpuImageBinder {
        &mut self.binder
    }

    /// Records the bound `android_wlegl` global.
    pub fn set_wlegl(&mut self, wlegl: ProtocolObject) {
        self.wlegl = Some(wlegl);
    }

    pub fn wlegl(&self) -> Option<ProtocolObject> {
        self.wlegl
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn has_binding(&self, pixmap: PixmapHandle) -> bool {
        self.bindings.contains_key(&pixmap)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// The texture attached to a bridged pixmap.
    pub fn texture(&self, pixmap: PixmapHandle) -> Option<u32> {
        self.bindings
            .get(&pixmap)
            .map(|binding| binding.backing.texture.id())
    }

    /// The native buffer backing a bridged pixmap.
    pub fn native_buffer(&self, pixmap: PixmapHandle) -> Option<&NativeBuffer> {
        self.bindings
            .get(&pixmap)
            .map(|binding| &binding.backing.buffer)
    }

    pub fn display_buffer(&self, pixmap: PixmapHandle) -> Option<RemoteBuffer> {
        self.bindings
            .get(&pixmap)
            .and_then(|binding| binding.display_buffer)
    }

    pub fn used_modifiers(&self, pixmap: PixmapHandle) -> Option<bool> {
        self.bindings
            .get(&pixmap)
            .map(|binding| binding.backing.used_modifiers)
    }

    /// Whether a pixmap of this shape should try to get a native buffer.
    pub fn is_eligible(width: u32, height: u32, depth: u32, hint: UsageHint) -> bool {
        width > 0
            && height > 0
            && depth >= 15
            && matches!(
                hint,
                UsageHint::Default | UsageHint::BackingPixmap | UsageHint::Shared
            )
    }

    /// Creates a pixmap, backed by a native buffer when possible.  Failures on the native buffer
    /// path are not reported: the pixmap silently becomes an ordinary rendering-layer pixmap.
    pub fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        hint: UsageHint,
    ) -> BridgeResult<PixmapHandle> {
        if Self::is_eligible(width, height, depth, hint) && self.binder.context().is_ok() {
            match self.create_gpu_pixmap(width, height, depth) {
                Ok(pixmap) => {
                    if self.config.rootless && hint == UsageHint::BackingPixmap {
                        self.rendering.clear_pixmap(pixmap);
                    }
                    return Ok(pixmap);
                }
                Err((reason, e)) => self.record_fallback(width, height, depth, reason, e),
            }
        }

        self.rendering.create_pixmap(width, height, depth, hint)
    }

    fn record_fallback(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
        reason: FallbackReason,
        e: BridgeError,
    ) {
        warn!(
            "{}x{}x{} pixmap falls back to the cpu ({:?}): {}",
            width, height, depth, reason, e
        );
        self.stats.cpu_fallbacks += 1;
        if let Some(handler) = &self.config.fallback_handler {
            handler.call(FallbackEvent {
                width,
                height,
                depth,
                reason,
            });
        }
    }

    fn create_gpu_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<PixmapHandle, GpuPathError> {
        let info = BufferAllocationInfo {
            width,
            height,
            format: self.config.pixel_format,
            usage: self.config.create_usage,
        };
        let buffer = NativeBuffer::allocate(&self.allocator, info)
            .map_err(|e| (FallbackReason::Allocation, e))?;

        let pixmap = self.create_pixmap_for_buffer(buffer, width, height, depth)?;
        self.stats.gpu_pixmaps += 1;
        Ok(pixmap)
    }

    /// Wraps `buffer` in a new textured pixmap.  On failure everything created here, including
    /// `buffer`, is released again.
    fn create_pixmap_for_buffer(
        &mut self,
        buffer: NativeBuffer,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<PixmapHandle, GpuPathError> {
        let pixmap = self
            .rendering
            .create_textureless_pixmap(width, height, depth)
            .map_err(|e| (FallbackReason::PixmapCreation, e))?;

        match self.attach_buffer(pixmap, buffer) {
            Ok(backing) => {
                self.bindings.insert(
                    pixmap,
                    PixmapBinding {
                        backing,
                        display_buffer: None,
                    },
                );
                Ok(pixmap)
            }
            Err(e) => {
                self.rendering.destroy_pixmap(pixmap);
                Err(e)
            }
        }
    }

    fn attach_buffer(
        &self,
        pixmap: PixmapHandle,
        buffer: NativeBuffer,
    ) -> Result<GpuBacking, GpuPathError> {
        self.binder
            .make_current()
            .map_err(|e| (FallbackReason::PixmapCreation, e))?;

        let image = self
            .binder
            .import_image(&buffer)
            .map_err(|e| (FallbackReason::ImageImport, e))?;

        let texture = self
            .binder
            .bind_texture(&image)
            .map_err(|e| (FallbackReason::TextureBind, e))?;

        self.rendering.set_pixmap_texture(pixmap, texture.id());
        if self.rendering.pixmap_texture(pixmap) != texture.id() {
            return Err((
                FallbackReason::PixmapCreation,
                BridgeError::InvalidContextState("pixmap did not take the texture"),
            ));
        }
        self.rendering.set_pixmap_type(pixmap, PixmapType::TextureDrm);

        Ok(GpuBacking {
            texture,
            image,
            buffer,
            used_modifiers: false,
        })
    }

    /// Drops a reference to `pixmap`.  The binding is torn down only when the last holder lets
    /// go: the display buffer object first, then the texture, the image and the native buffer.
    pub fn destroy_pixmap(&mut self, pixmap: PixmapHandle) -> bool {
        let last_reference = self
            .rendering
            .drawable(pixmap)
            .map(|drawable| drawable.refcnt == 1)
            .unwrap_or(false);

        if last_reference {
            if let Some(binding) = self.bindings.remove(&pixmap) {
                self.release_binding(binding);
            }
        }

        self.rendering.destroy_pixmap(pixmap)
    }

    fn release_binding(&self, binding: PixmapBinding) {
        if let Some(display_buffer) = binding.display_buffer {
            self.display.destroy_buffer(display_buffer);
        }

        let GpuBacking {
            texture,
            image,
            buffer,
            ..
        } = binding.backing;
        drop(texture);
        self.binder.destroy_image(image);
        drop(buffer);
    }

    /// Returns the display buffer object of `pixmap`, creating it on first use.  The flag is true
    /// if the object was created by this call.
    pub fn get_or_create_display_buffer(
        &mut self,
        pixmap: PixmapHandle,
    ) -> BridgeResult<(RemoteBuffer, bool)> {
        let wlegl = self.wlegl;
        let binding = self
            .bindings
            .get_mut(&pixmap)
            .ok_or(BridgeError::MissingBinding)?;

        if let Some(display_buffer) = binding.display_buffer {
            return Ok((display_buffer, false));
        }

        let wlegl = wlegl.ok_or(BridgeError::MissingInterface(ANDROID_WLEGL_INTERFACE))?;
        let request = BufferRequest::for_buffer(
            &binding.backing.buffer,
            self.config.pixel_format,
            self.config.buffer_usage,
        )?;
        let display_buffer = self.display.create_buffer(wlegl, &request)?;
        // The request, and with it our copies of the descriptors, goes away here.
        drop(request);

        binding.display_buffer = Some(display_buffer);
        self.stats.display_buffers += 1;
        debug!("{:?} is shown through {:?}", pixmap, display_buffer);
        Ok((display_buffer, true))
    }

    /// Swaps the GPU state of two bridged pixmaps, leaving each pixmap and its display buffer
    /// object where they are.  Both pixmaps must have a binding; otherwise nothing changes.
    pub fn exchange_buffers(&mut self, front: PixmapHandle, back: PixmapHandle) -> BridgeResult<()> {
        if !self.has_binding(front) || !self.has_binding(back) {
            return Err(BridgeError::MissingBinding);
        }

        self.rendering.exchange_fbos(front, back);
        if front != back {
            let mut front_binding = self
                .bindings
                .remove(&front)
                .ok_or(BridgeError::MissingBinding)?;
            if let Some(back_binding) = self.bindings.get_mut(&back) {
                mem::swap(&mut front_binding.backing, &mut back_binding.backing);
            }
            self.bindings.insert(front, front_binding);
        }

        self.rendering.set_pixmap_type(front, PixmapType::TextureDrm);
        self.rendering.set_pixmap_type(back, PixmapType::TextureDrm);
        Ok(())
    }

    /// Moves the contents of `pixmap` into a fresh native buffer, so that it can be shared with
    /// other processes.  Returns false, leaving `pixmap` untouched, if that isn't possible.
    pub fn make_exportable(&mut self, pixmap: PixmapHandle) -> bool {
        match self.try_make_exportable(pixmap) {
            Ok(()) => true,
            Err(e) => {
                warn!("{:?} can't be made exportable: {}", pixmap, e);
                false
            }
        }
    }

    fn try_make_exportable(&mut self, pixmap: PixmapHandle) -> BridgeResult<()> {
        if self.has_binding(pixmap) {
            return Ok(());
        }

        let drawable = self
            .rendering
            .drawable(pixmap)
            .ok_or(BridgeError::UnknownPixmap(pixmap.0))?;
        if drawable.bits_per_pixel != 32 {
            error!(
                "only 32bpp pixmaps can be exported, {:?} has {}bpp",
                pixmap, drawable.bits_per_pixel
            );
            return Err(BridgeError::Unsupported);
        }

        let info = BufferAllocationInfo {
            width: drawable.width,
            height: drawable.height,
            format: self.config.pixel_format,
            usage: self.config.export_usage,
        };
        let buffer = NativeBuffer::allocate(&self.allocator, info)?;
        let exported = self
            .create_pixmap_for_buffer(buffer, drawable.width, drawable.height, drawable.depth)
            .map_err(|(_, e)| e)?;

        if let Err(e) = self
            .rendering
            .copy_area(pixmap, exported, drawable.width, drawable.height)
        {
            if let Some(binding) = self.bindings.remove(&exported) {
                self.release_binding(binding);
            }
            self.rendering.destroy_pixmap(exported);
            return Err(e);
        }

        // The scratch pixmap keeps the old storage and dies with it.
        self.rendering.exchange_fbos(pixmap, exported);
        let binding = self
            .bindings
            .remove(&exported)
            .ok_or(BridgeError::MissingBinding)?;
        self.bindings.insert(pixmap, binding);
        self.rendering.set_pixmap_type(pixmap, PixmapType::TextureDrm);
        self.rendering.set_pixmap_type(exported, PixmapType::TextureDrm);
        self.rendering.destroy_pixmap(exported);
        Ok(())
    }

    /// Builds a pixmap around a buffer serialized by another process.  `fds` stays owned by the
    /// caller.
    #[allow(clippy::too_many_arguments)]
    pub fn pixmap_from_external_buffer(
        &mut self,
        width: u32,
        height: u32,
        stride: u32,
        depth: u32,
        bits_per_pixel: u32,
        ints: &[i32],
        fds: &[RawDescriptor],
    ) -> BridgeResult<PixmapHandle> {
        if width == 0 || height == 0 {
            return Err(BridgeError::InvalidDimensions);
        }

        if bits_per_pixel != 32 || !(depth == 24 || depth == 32) {
            debug!(
                "can't import depth {} / {}bpp buffers",
                depth, bits_per_pixel
            );
            return Err(BridgeError::Unsupported);
        }

        self.binder.context()?;
        let info = BufferAllocationInfo {
            width,
            height,
            format: self.config.pixel_format,
            usage: self.config.import_usage,
        };
        let buffer = handle_codec::deserialize(&self.allocator, info, stride, ints, fds)?;
        let pixmap = self
            .create_pixmap_for_buffer(buffer, width, height, depth)
            .map_err(|(_, e)| e)?;

        self.stats.imports += 1;
        Ok(pixmap)
    }

    /// Serializes the native buffer behind `pixmap`, giving it one first if needed.
    pub fn buffer_descriptors_from_pixmap(
        &mut self,
        pixmap: PixmapHandle,
    ) -> BridgeResult<BufferDescriptor> {
        if let Err(e) = self.try_make_exportable(pixmap) {
            warn!("{:?} can't be exported: {}", pixmap, e);
            return Err(e);
        }

        let binding = self
            .bindings
            .get(&pixmap)
            .ok_or(BridgeError::MissingBinding)?;
        let descriptor = handle_codec::serialize(&binding.backing.buffer)?;
        self.stats.exports += 1;
        Ok(descriptor)
    }
}

impl Drop for PixmapBridge {
    fn drop(&mut self) {
        for (_, binding) in mem::take(&mut self.bindings) {
            self.release_binding(binding);
        }
    }
}
