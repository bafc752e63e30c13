// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This module allocates Android native buffers: GPU and display shareable memory whose handles
//! can cross process boundaries as a set of integers plus file descriptors.
//!
//! <https://source.android.com/devices/graphics/arch-bq-gralloc>

mod allocator;
mod formats;
mod hybris_allocator;
mod hybris_bindings;
mod rendernode;
mod system_allocator;

pub use allocator::BufferAllocationInfo;
pub use allocator::BufferLock;
pub use allocator::HandleCounts;
pub use allocator::NativeAllocator;
pub use allocator::NativeBuffer;
pub use formats::canonical_layout;
pub use formats::drm_format_for_depth;
pub use formats::DrmFormat;
pub use formats::PixelFormat;
pub use formats::HYBRIS_PIXEL_FORMAT_BGRA_8888;
pub use formats::HYBRIS_PIXEL_FORMAT_RGBA_8888;
pub use formats::HYBRIS_PIXEL_FORMAT_RGBX_8888;
pub use formats::HYBRIS_PIXEL_FORMAT_RGB_565;
pub use formats::HYBRIS_PIXEL_FORMAT_RGB_888;
#[cfg(feature = "hybris")]
pub use hybris_allocator::HybrisAllocator;
#[cfg(feature = "hybris")]
pub use hybris_allocator::HybrisProcs;
pub use rendernode::is_device_path_render_node;
pub use rendernode::is_render_node;
pub use system_allocator::SystemAllocator;
