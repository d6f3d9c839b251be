//! Window and buffer descriptors.
//!
//! These are plain data holders; the window manager is the only code
//! that mutates them.

use alloc::vec::Vec;

use crate::display::DisplayId;
use crate::format::BufferFormat;

/// Opaque window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub u8);

/// Rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// One render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Base address.
    pub address: usize,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row stride in bytes.
    pub stride: u32,
    /// Pixel format as seen by the engine.
    pub format: BufferFormat,
    /// Set by the engine once the buffer is known to its MMU.
    pub committed: bool,
}

impl BufferDescriptor {
    /// Get the buffer size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Render cycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No render target held.
    Idle,
    /// A render target was acquired and not yet presented.
    Rendering,
}

/// A rendering surface bound to one display layer.
pub struct Window {
    /// Display this window draws to.
    pub(crate) display: DisplayId,
    /// Origin on the panel.
    pub(crate) origin: (u32, u32),
    /// Width in pixels.
    pub(crate) width: u32,
    /// Height in pixels.
    pub(crate) height: u32,
    /// Render targets, in slot order.
    pub(crate) buffers: Vec<BufferDescriptor>,
    /// Index of the acquired render target.
    pub(crate) current: Option<usize>,
    /// Render cycle position.
    pub(crate) phase: FramePhase,
    /// Whether blend parameters were flushed to the layer.
    pub(crate) blend_configured: bool,
}

impl Window {
    pub(crate) fn new(display: DisplayId, rect: Rect, buffers: Vec<BufferDescriptor>) -> Self {
        Window {
            display,
            origin: (rect.x, rect.y),
            width: rect.width,
            height: rect.height,
            buffers,
            current: None,
            phase: FramePhase::Idle,
            blend_configured: false,
        }
    }

    /// Get the display.
    pub fn display(&self) -> DisplayId {
        self.display
    }

    /// Get the origin on the panel.
    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    /// Get the width.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the height.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// All buffers.
    pub fn buffers(&self) -> &[BufferDescriptor] {
        &self.buffers
    }

    /// Index of the last acquired render target.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// The last acquired render target.
    pub fn current_buffer(&self) -> Option<&BufferDescriptor> {
        self.current.and_then(|i| self.buffers.get(i))
    }

    /// Render cycle position.
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Whether the layer's blend parameters have been flushed.
    pub fn is_blend_configured(&self) -> bool {
        self.blend_configured
    }

    /// Slot holding `address`.
    pub(crate) fn slot_of(&self, address: usize) -> Option<usize> {
        self.buffers.iter().position(|b| b.address == address)
    }
}
