// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! formats: Android/hybris pixel formats, Wayland DRM fourcc codes and canonical stride
//! calculations.

use std::fmt;

use log::warn;

use crate::bridge_utils::*;
use crate::checked_arithmetic;

/*
 * HAL pixel formats understood by libhybris.  YUV formats are never requested by the X server
 * and are left out.
 */
pub const HYBRIS_PIXEL_FORMAT_RGBA_8888: u32 = 1;
pub const HYBRIS_PIXEL_FORMAT_RGBX_8888: u32 = 2;
pub const HYBRIS_PIXEL_FORMAT_RGB_888: u32 = 3;
pub const HYBRIS_PIXEL_FORMAT_RGB_565: u32 = 4;
pub const HYBRIS_PIXEL_FORMAT_BGRA_8888: u32 = 5;

/// Rows of a canonical (system memory) layout are padded to this many pixels.
const CANONICAL_STRIDE_ALIGNMENT: u32 = 16;

pub const DRM_FORMAT_XRGB1555: [u8; 4] = [b'X', b'R', b'1', b'5'];
pub const DRM_FORMAT_RGB565: [u8; 4] = [b'R', b'G', b'1', b'6'];
pub const DRM_FORMAT_XRGB8888: [u8; 4] = [b'X', b'R', b'2', b'4'];
pub const DRM_FORMAT_ARGB8888: [u8; 4] = [b'A', b'R', b'2', b'4'];
pub const DRM_FORMAT_ARGB2101010: [u8; 4] = [b'A', b'R', b'3', b'0'];

/// A HAL pixel format, as passed to the native buffer allocator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    pub const RGBA_8888: PixelFormat = PixelFormat(HYBRIS_PIXEL_FORMAT_RGBA_8888);
    pub const RGBX_8888: PixelFormat = PixelFormat(HYBRIS_PIXEL_FORMAT_RGBX_8888);
    pub const RGB_888: PixelFormat = PixelFormat(HYBRIS_PIXEL_FORMAT_RGB_888);
    pub const RGB_565: PixelFormat = PixelFormat(HYBRIS_PIXEL_FORMAT_RGB_565);
    pub const BGRA_8888: PixelFormat = PixelFormat(HYBRIS_PIXEL_FORMAT_BGRA_8888);

    /// Returns the number of bytes a single pixel occupies.
    pub fn bytes_per_pixel(&self) -> BridgeResult<u32> {
        match self.0 {
            HYBRIS_PIXEL_FORMAT_RGBA_8888
            | HYBRIS_PIXEL_FORMAT_RGBX_8888
            | HYBRIS_PIXEL_FORMAT_BGRA_8888 => Ok(4),
            HYBRIS_PIXEL_FORMAT_RGB_888 => Ok(3),
            HYBRIS_PIXEL_FORMAT_RGB_565 => Ok(2),
            other => Err(BridgeError::UnsupportedFormat(other)),
        }
    }
}

impl From<u32> for PixelFormat {
    fn from(u: u32) -> PixelFormat {
        PixelFormat(u)
    }
}

impl From<PixelFormat> for u32 {
    fn from(f: PixelFormat) -> u32 {
        f.0
    }
}

/// A [fourcc](https://en.wikipedia.org/wiki/FourCC) format identifier, as used by `wl_drm`.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct DrmFormat(pub u32);

impl DrmFormat {
    /// Constructs a format identifer using a fourcc byte sequence.
    #[inline(always)]
    pub fn new(a: u8, b: u8, c: u8, d: u8) -> DrmFormat {
        DrmFormat(a as u32 | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24)
    }

    fn from_bytes(b: [u8; 4]) -> DrmFormat {
        DrmFormat::new(b[0], b[1], b[2], b[3])
    }

    /// Returns the fourcc code as a sequence of bytes.
    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; 4] {
        let f = self.0;
        [f as u8, (f >> 8) as u8, (f >> 16) as u8, (f >> 24) as u8]
    }
}

impl fmt::Debug for DrmFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = self.to_bytes();
        if b.iter().all(u8::is_ascii_graphic) {
            write!(
                f,
                "fourcc({}{}{}{})",
                b[0] as char, b[1] as char, b[2] as char, b[3] as char
            )
        } else {
            write!(
                f,
                "fourcc(0x{:02x}{:02x}{:02x}{:02x})",
                b[0], b[1], b[2], b[3]
            )
        }
    }
}

/// Maps an X drawable depth onto the `wl_drm` format the compositor expects.  Unknown depths are
/// treated as 32 bit ARGB.
pub fn drm_format_for_depth(depth: u32) -> DrmFormat {
    match depth {
        15 => DrmFormat::from_bytes(DRM_FORMAT_XRGB1555),
        16 => DrmFormat::from_bytes(DRM_FORMAT_RGB565),
        24 => DrmFormat::from_bytes(DRM_FORMAT_XRGB8888),
        30 => DrmFormat::from_bytes(DRM_FORMAT_ARGB2101010),
        32 => DrmFormat::from_bytes(DRM_FORMAT_ARGB8888),
        _ => {
            warn!("unexpected depth: {}", depth);
            DrmFormat::from_bytes(DRM_FORMAT_ARGB8888)
        }
    }
}

/// Returns the canonical (stride in pixels, size in bytes) for a system memory buffer.
pub fn canonical_layout(width: u32, height: u32, format: PixelFormat) -> BridgeResult<(u32, u64)> {
    let bytes_per_pixel = format.bytes_per_pixel()?;
    let mask = CANONICAL_STRIDE_ALIGNMENT - 1;
    let padded = checked_arithmetic!(width + mask)?;
    let stride = padded & !mask;
    let row_bytes = checked_arithmetic!(stride * bytes_per_pixel)?;
    let size = checked_arithmetic!(row_bytes * height)?;
    Ok((stride, size as u64))
}
