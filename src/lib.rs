// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A crate for backing glamor pixmaps with libhybris native buffers, and sharing those buffers
//! with a Wayland compositor through `android_wlegl`.

mod backend;
mod bridge_os;
mod bridge_utils;
mod display;
mod gpu_image;
pub mod handle_codec;
#[macro_use]
mod macros;
mod native_buffer;
mod pixmap_bridge;
#[cfg(test)]
mod testing;

pub use crate::backend::init_hybris_backend;
pub use crate::backend::BridgeBuilder;
pub use crate::backend::BridgeConfig;
pub use crate::backend::GlamorBackend;
pub use crate::backend::HostSession;
pub use crate::backend::HybrisBackend;
pub use crate::backend::SoftwareBackend;
pub use crate::backend::ANDROID_WLEGL_VERSION;
pub use crate::bridge_os::AsRawDescriptor;
pub use crate::bridge_os::FromRawDescriptor as BridgeFromRawDescriptor;
pub use crate::bridge_os::IntoRawDescriptor as BridgeIntoRawDescriptor;
pub use crate::bridge_os::RawDescriptor;
pub use crate::bridge_os::SafeDescriptor as BridgeDescriptor;
pub use crate::bridge_utils::*;
pub use crate::display::BufferRequest;
pub use crate::display::DisplayClient;
pub use crate::display::ProtocolObject;
pub use crate::display::RemoteBuffer;
pub use crate::display::ANDROID_WLEGL_INTERFACE;
pub use crate::gpu_image::ContextState;
pub use crate::gpu_image::EglApi;
pub use crate::gpu_image::EglConfig;
pub use crate::gpu_image::EglContext;
pub use crate::gpu_image::EglDisplay;
pub use crate::gpu_image::EglImage;
pub use crate::gpu_image::GpuContext;
pub use crate::gpu_image::GpuImage;
pub use crate::gpu_image::GpuImageBinder;
pub use crate::gpu_image::GpuTexture;
#[cfg(feature = "hybris")]
pub use crate::gpu_image::NativeEgl;
pub use crate::handle_codec::BufferDescriptor;
pub use crate::handle_codec::WireHandle;
pub use crate::native_buffer::*;
pub use crate::pixmap_bridge::BridgeStats;
pub use crate::pixmap_bridge::DrawableInfo;
pub use crate::pixmap_bridge::PixmapBridge;
pub use crate::pixmap_bridge::PixmapType;
pub use crate::pixmap_bridge::RenderingLayer;
