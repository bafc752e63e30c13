// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! display: the display-protocol client as seen by the bridge.  Buffers are handed to the
//! compositor through the `android_wlegl` interface.

use crate::bridge_utils::*;
use crate::handle_codec;
use crate::handle_codec::WireHandle;
use crate::native_buffer::NativeBuffer;
use crate::native_buffer::PixelFormat;

/// Name of the vendor interface announced by compositors that accept native buffers.
pub const ANDROID_WLEGL_INTERFACE: &str = "android_wlegl";

/// A bound protocol global.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProtocolObject(pub u32);

/// A buffer object shared with the compositor.  Copying the handle does not keep the buffer
/// alive, and dropping it does not destroy it: only `DisplayClient::destroy_buffer` does.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteBuffer(pub u32);

/// Arguments of `android_wlegl.create_buffer`.
#[derive(Debug)]
pub struct BufferRequest {
    pub width: i32,
    pub height: i32,
    /// Stride in pixels.
    pub stride: i32,
    pub format: i32,
    pub usage: i32,
    pub handle: WireHandle,
}

impl BufferRequest {
    /// Serializes `buffer` into a request for a compositor-visible buffer object.  The request
    /// owns duplicates of the buffer's descriptors.
    pub fn for_buffer(
        buffer: &NativeBuffer,
        format: PixelFormat,
        usage: UsageFlags,
    ) -> BridgeResult<BufferRequest> {
        let descriptor = handle_codec::serialize(buffer)?;
        Ok(BufferRequest {
            width: buffer.width().try_into()?,
            height: buffer.height().try_into()?,
            stride: descriptor.stride.try_into()?,
            format: format.0.try_into()?,
            usage: usage.into(),
            handle: descriptor.into(),
        })
    }
}

/// The display-protocol client.  Requests are sent synchronously: descriptors attached to a
/// request are duplicated into the message before the call returns.
pub trait DisplayClient {
    /// Binds the global `name` announced by the registry.
    fn bind(&self, name: u32, interface: &str, version: u32) -> BridgeResult<ProtocolObject>;

    /// Asks the compositor, through the bound `android_wlegl` global, for a buffer object.
    fn create_buffer(
        &self,
        wlegl: ProtocolObject,
        request: &BufferRequest,
    ) -> BridgeResult<RemoteBuffer>;

    /// Destroys the local proxy and tells the compositor to drop its reference.
    fn destroy_buffer(&self, buffer: RemoteBuffer);
}
