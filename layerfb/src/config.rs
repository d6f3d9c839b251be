//! Static configuration.
//!
//! Everything here is fixed at build time and read-only once the
//! window manager exists.

use crate::blend::BlendConfig;
use crate::error::{DisplayError, Result};

/// Buffers per window for double buffering.
pub const DEFAULT_BUFFER_COUNT: usize = 2;

/// Most buffers a window can hold.
pub const MAX_BUFFER_COUNT: usize = 3;

/// Frame buffer alignment required by the display controller.
pub const FRAME_BUFFER_ALIGN: usize = 64;

/// Hardware layers on the display controller.
pub const HW_LAYER_COUNT: usize = 7;

/// Default drain timeout for `RenderEngine::finish`.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u32 = 1000;

/// Maximum extent of one hardware layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerGeometry {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl LayerGeometry {
    pub const fn new(width: u32, height: u32) -> Self {
        LayerGeometry { width, height }
    }

    /// Bytes needed for one buffer of this layer.
    pub const fn buffer_size(&self, bytes_per_pixel: u32) -> usize {
        self.width as usize * self.height as usize * bytes_per_pixel as usize
    }
}

/// Per-layer geometry of the MIPI panel build.
///
/// Layer 0 covers the whole 720x1280 panel; the overlay layers are
/// sized for sprites and status widgets.
pub const DEFAULT_LAYER_GEOMETRY: [LayerGeometry; HW_LAYER_COUNT] = [
    LayerGeometry::new(720, 1280),
    LayerGeometry::new(360, 640),
    LayerGeometry::new(256, 256),
    LayerGeometry::new(256, 256),
    LayerGeometry::new(128, 128),
    LayerGeometry::new(128, 128),
    LayerGeometry::new(64, 64),
];

/// Whether window creation clears the initial front buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPolicy {
    /// Zero only when the allocator hands out reused memory.
    Auto,
    /// Always zero the first buffer.
    ZeroFirstBuffer,
    /// Leave memory untouched until the first draw.
    Preserve,
}

/// When a layer is blended and enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnablePolicy {
    /// On the first `swap_buffers`.
    OnFirstPresent,
    /// As part of `create_window`.
    OnCreate,
}

/// Window manager configuration.
#[derive(Debug, Clone, Copy)]
pub struct SystemConfig {
    /// Buffers allocated per window.
    pub buffer_count: usize,
    /// Frame buffer alignment in bytes.
    pub align: usize,
    /// Initial buffer clearing.
    pub clear_policy: ClearPolicy,
    /// Layer enable timing.
    pub enable_policy: EnablePolicy,
    /// Blend parameters applied to every layer unless overridden.
    pub blend: BlendConfig,
    /// Upper bound on the engine drain in `swap_buffers`.
    pub drain_timeout_ms: u32,
    /// Maximum extent of each layer.
    pub geometry: &'static [LayerGeometry],
}

impl SystemConfig {
    pub const fn new() -> Self {
        SystemConfig {
            buffer_count: DEFAULT_BUFFER_COUNT,
            align: FRAME_BUFFER_ALIGN,
            clear_policy: ClearPolicy::Auto,
            enable_policy: EnablePolicy::OnFirstPresent,
            blend: BlendConfig::new(),
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            geometry: &DEFAULT_LAYER_GEOMETRY,
        }
    }

    /// Check the configuration before any hardware is touched.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count == 0 || self.buffer_count > MAX_BUFFER_COUNT {
            return Err(DisplayError::InvalidConfig("buffer count out of range"));
        }
        if !self.align.is_power_of_two() {
            return Err(DisplayError::InvalidConfig("alignment must be a power of two"));
        }
        if self.geometry.is_empty() || self.geometry.len() > u8::MAX as usize {
            return Err(DisplayError::InvalidConfig("layer geometry table size"));
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Rendering engine sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Tessellation window width.
    pub canvas_width: u32,
    /// Tessellation window height.
    pub canvas_height: u32,
    /// Command buffer size in bytes.
    pub command_buffer_size: u32,
}

impl EngineConfig {
    pub const fn new() -> Self {
        EngineConfig {
            canvas_width: 256,
            canvas_height: 256,
            command_buffer_size: 256 << 10,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SystemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_buffer_count() {
        let mut cfg = SystemConfig::new();
        cfg.buffer_count = 0;
        assert!(cfg.validate().is_err());
        cfg.buffer_count = MAX_BUFFER_COUNT + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let mut cfg = SystemConfig::new();
        cfg.align = 48;
        assert_eq!(
            cfg.validate(),
            Err(DisplayError::InvalidConfig("alignment must be a power of two"))
        );
    }

    #[test]
    fn test_layer_buffer_size() {
        assert_eq!(DEFAULT_LAYER_GEOMETRY[0].buffer_size(4), 720 * 1280 * 4);
    }
}
