// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! bridge_utils: Utility enums, structs, and implementations needed by the rest of the crate.

use std::ffi::NulError;
use std::fmt;
use std::io::Error as IoError;
use std::num::TryFromIntError;
use std::rc::Rc;

#[cfg(unix)]
use nix::Error as NixError;
use remain::sorted;
use thiserror::Error;

/// Opaque, pointer-sized handle to a vendor native buffer (an `EGLClientBuffer` for libhybris).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawBuffer(pub usize);

/// Identity of a pixmap owned by the rendering layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PixmapHandle(pub u32);

/*
 * Usage bits are the Android gralloc ones, as understood by libhybris.  SW_*_NEVER are zero and
 * only exist to make call sites self-describing.
 */
pub const HYBRIS_USAGE_SW_READ_NEVER: u32 = 0x0000_0000;
pub const HYBRIS_USAGE_SW_READ_OFTEN: u32 = 0x0000_0003;
pub const HYBRIS_USAGE_SW_WRITE_NEVER: u32 = 0x0000_0000;
pub const HYBRIS_USAGE_SW_WRITE_OFTEN: u32 = 0x0000_0030;
pub const HYBRIS_USAGE_HW_TEXTURE: u32 = 0x0000_0100;
pub const HYBRIS_USAGE_HW_RENDER: u32 = 0x0000_0200;
pub const HYBRIS_USAGE_HW_2D: u32 = 0x0000_0400;
pub const HYBRIS_USAGE_HW_COMPOSER: u32 = 0x0000_0800;

/// Usage flags for constructing a native buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct UsageFlags(pub u32);

impl UsageFlags {
    /// Returns empty set of flags.
    #[inline(always)]
    pub fn empty() -> UsageFlags {
        UsageFlags(0)
    }

    /// Returns the given set of raw `HYBRIS_USAGE` flags wrapped in a UsageFlags struct.
    #[inline(always)]
    pub fn new(raw: u32) -> UsageFlags {
        UsageFlags(raw)
    }

    fn set_flag(self, bitmask: u32, set: bool) -> UsageFlags {
        if set {
            UsageFlags(self.0 | bitmask)
        } else {
            UsageFlags(self.0 & !bitmask)
        }
    }

    /// Sets the texturing flag's presence.
    #[inline(always)]
    pub fn use_hw_texture(self, e: bool) -> UsageFlags {
        self.set_flag(HYBRIS_USAGE_HW_TEXTURE, e)
    }

    /// Sets the rendering flag's presence.
    #[inline(always)]
    pub fn use_hw_render(self, e: bool) -> UsageFlags {
        self.set_flag(HYBRIS_USAGE_HW_RENDER, e)
    }

    /// Sets the composer flag's presence.
    #[inline(always)]
    pub fn use_hw_composer(self, e: bool) -> UsageFlags {
        self.set_flag(HYBRIS_USAGE_HW_COMPOSER, e)
    }

    /// Sets the SW read flag's presence.
    #[inline(always)]
    pub fn use_sw_read(self, e: bool) -> UsageFlags {
        self.set_flag(HYBRIS_USAGE_SW_READ_OFTEN, e)
    }

    /// Sets the SW write flag's presence.
    #[inline(always)]
    pub fn use_sw_write(self, e: bool) -> UsageFlags {
        self.set_flag(HYBRIS_USAGE_SW_WRITE_OFTEN, e)
    }

    /// Returns true if the texturing flag is set.
    #[inline(always)]
    pub fn uses_texturing(self) -> bool {
        self.0 & HYBRIS_USAGE_HW_TEXTURE != 0
    }

    /// Returns true if the rendering flag is set.
    #[inline(always)]
    pub fn uses_rendering(self) -> bool {
        self.0 & HYBRIS_USAGE_HW_RENDER != 0
    }

    /// Returns true if the memory will be touched by the CPU.
    #[inline(always)]
    pub fn host_visible(self) -> bool {
        self.0 & HYBRIS_USAGE_SW_READ_OFTEN != 0 || self.0 & HYBRIS_USAGE_SW_WRITE_OFTEN != 0
    }
}

impl From<UsageFlags> for u32 {
    fn from(flags: UsageFlags) -> u32 {
        flags.0
    }
}

impl From<UsageFlags> for i32 {
    fn from(flags: UsageFlags) -> i32 {
        flags.0 as i32
    }
}

/// Pixmap creation hints, numbered as the X server numbers them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsageHint {
    Default,
    Scratch,
    BackingPixmap,
    GlyphPicture,
    Shared,
    Other(u32),
}

impl From<u32> for UsageHint {
    fn from(hint: u32) -> UsageHint {
        match hint {
            0 => UsageHint::Default,
            1 => UsageHint::Scratch,
            2 => UsageHint::BackingPixmap,
            3 => UsageHint::GlyphPicture,
            4 => UsageHint::Shared,
            other => UsageHint::Other(other),
        }
    }
}

impl From<UsageHint> for u32 {
    fn from(hint: UsageHint) -> u32 {
        match hint {
            UsageHint::Default => 0,
            UsageHint::Scratch => 1,
            UsageHint::BackingPixmap => 2,
            UsageHint::GlyphPicture => 3,
            UsageHint::Shared => 4,
            UsageHint::Other(other) => other,
        }
    }
}

/// An error generated while using this crate.
#[sorted]
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The native allocator could not provide a buffer.
    #[error("native buffer allocation failed: {0}")]
    AllocationFailed(&'static str),
    /// Checked Arithmetic error
    #[error("arithmetic failed: {}({}) {op} {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedArithmetic {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
        op: &'static str,
    },
    /// The handle arrays do not match the counts reported for the buffer.
    #[error("{what} count mismatch: expected {expected}, got {actual}")]
    CodecMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// EGL display, extension or context setup failed.
    #[error("rendering context init failed: {0}")]
    ContextInit(&'static str),
    /// The image-import extension returned no image.
    #[error("native buffer image import failed")]
    ImageImportFailed,
    /// A native buffer could not be rebuilt from serialized handles.
    #[error("native buffer import failed: {0}")]
    ImportFailed(&'static str),
    /// The allocator does not know the buffer, or it is in the wrong state.
    #[error("invalid native buffer: {0}")]
    InvalidBuffer(&'static str),
    /// The operation is not legal in the rendering context's current state.
    #[error("rendering context is not ready: {0}")]
    InvalidContextState(&'static str),
    /// Zero-sized or oversized buffer request.
    #[error("invalid native buffer dimensions")]
    InvalidDimensions,
    /// An input/output error occured.
    #[error("an input/output error occur: {0}")]
    IoError(IoError),
    /// The pixmap has no native buffer binding.
    #[error("pixmap has no native buffer binding")]
    MissingBinding,
    /// A required display-protocol interface has not been announced.
    #[error("display interface {0} is not bound")]
    MissingInterface(&'static str),
    /// Nix crate error.
    #[cfg(unix)]
    #[error("The errno is {0}")]
    NixError(NixError),
    #[error("Nul Error occured {0}")]
    NulError(NulError),
    /// The display protocol refused a request.
    #[error("display protocol error: {0}")]
    Protocol(&'static str),
    /// Attaching an image to a texture raised an EGL error.
    #[error("texture binding failed with egl error {0:#x}")]
    TextureBindFailed(i32),
    /// An attempted integer conversion failed.
    #[error("int conversion failed: {0}")]
    TryFromIntError(TryFromIntError),
    /// The rendering layer does not know the pixmap.
    #[error("unknown pixmap {0}")]
    UnknownPixmap(u32),
    /// The command is unsupported.
    #[error("the requested function is not implemented")]
    Unsupported,
    /// The pixel format is not known to this crate.
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(u32),
}

#[cfg(unix)]
impl From<NixError> for BridgeError {
    fn from(e: NixError) -> BridgeError {
        BridgeError::NixError(e)
    }
}

impl From<NulError> for BridgeError {
    fn from(e: NulError) -> BridgeError {
        BridgeError::NulError(e)
    }
}

impl From<IoError> for BridgeError {
    fn from(e: IoError) -> BridgeError {
        BridgeError::IoError(e)
    }
}

impl From<TryFromIntError> for BridgeError {
    fn from(e: TryFromIntError) -> BridgeError {
        BridgeError::TryFromIntError(e)
    }
}

/// The result of an operation in this crate.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Why a pixmap that asked for native buffer backing ended up CPU-only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    Allocation,
    PixmapCreation,
    ImageImport,
    TextureBind,
}

/// Reported to the fallback handler whenever acceleration is silently downgraded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FallbackEvent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub reason: FallbackReason,
}

#[derive(Clone)]
pub struct BridgeHandler<S> {
    closure: Rc<dyn Fn(S)>,
}

impl<S> BridgeHandler<S>
where
    S: Clone + 'static,
{
    pub fn new(closure: impl Fn(S) + 'static) -> BridgeHandler<S> {
        BridgeHandler {
            closure: Rc::new(closure),
        }
    }

    pub fn call(&self, data: S) {
        (self.closure)(data)
    }
}

impl<S> fmt::Debug for BridgeHandler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure debug").finish()
    }
}

pub type FallbackHandler = BridgeHandler<FallbackEvent>;

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn usage_flags_toggle() {
        let flags = UsageFlags::empty()
            .use_hw_composer(true)
            .use_hw_render(true);
        assert_eq!(flags.0, HYBRIS_USAGE_HW_COMPOSER | HYBRIS_USAGE_HW_RENDER);
        assert!(flags.uses_rendering());
        assert!(!flags.uses_texturing());
        assert!(!flags.host_visible());

        let flags = flags.use_hw_render(false).use_sw_read(true);
        assert!(!flags.uses_rendering());
        assert!(flags.host_visible());
    }

    #[test]
    fn usage_hint_numbering() {
        assert_eq!(UsageHint::from(0), UsageHint::Default);
        assert_eq!(UsageHint::from(2), UsageHint::BackingPixmap);
        assert_eq!(UsageHint::from(4), UsageHint::Shared);
        assert_eq!(UsageHint::from(9), UsageHint::Other(9));
        assert_eq!(u32::from(UsageHint::Scratch), 1);
    }

    #[test]
    fn handler_forwards_events() {
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let handler = FallbackHandler::new(move |event: FallbackEvent| {
            assert_eq!(event.reason, FallbackReason::ImageImport);
            counter.set(counter.get() + 1);
        });

        let event = FallbackEvent {
            width: 1,
            height: 1,
            depth: 24,
            reason: FallbackReason::ImageImport,
        };
        handler.clone().call(event);
        handler.call(event);
        assert_eq!(seen.get(), 2);
    }
}
