// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This module imports native buffers into a GLES context as EGL images and binds them to
//! textures, so the rendering layer can draw into them without copies.

mod binder;
mod egl;
mod egl_bindings;
mod native_egl;

pub use binder::ContextState;
pub use binder::GpuContext;
pub use binder::GpuImage;
pub use binder::GpuImageBinder;
pub use binder::GpuTexture;
pub use egl::*;
#[cfg(feature = "hybris")]
pub use native_egl::NativeEgl;
