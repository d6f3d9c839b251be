//! Vector rasterization engine interface.
//!
//! The engine itself is an external collaborator: it tessellates
//! paths and writes pixels into render targets. This module defines
//! the surface the layer subsystem consumes and the value types that
//! cross it.

use alloc::vec::Vec;

use crate::config::EngineConfig;
use crate::error::{DisplayError, EngineError, Result};
use crate::window::{BufferDescriptor, Rect};

/// Color in the engine's 0xAABBGGRR layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color((a as u32) << 24 | (b as u32) << 16 | (g as u32) << 8 | r as u32)
    }

    pub fn alpha(&self) -> u8 {
        (self.0 >> 24) as u8
    }
}

/// Path fill rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Porter-Duff blend applied while drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite the destination.
    None,
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    Multiply,
    Screen,
    Additive,
    Subtract,
}

/// Tessellation quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    High,
    Medium,
    Low,
}

/// Storage type of path coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFormat {
    S8,
    S16,
    S32,
    F32,
}

impl PathFormat {
    /// Bytes per coordinate.
    pub fn coordinate_size(&self) -> usize {
        match self {
            PathFormat::S8 => 1,
            PathFormat::S16 => 2,
            PathFormat::S32 | PathFormat::F32 => 4,
        }
    }
}

/// Path opcodes.
pub mod opcode {
    pub const END: u8 = 0;
    pub const CLOSE: u8 = 1;
    pub const MOVE: u8 = 2;
    pub const MOVE_REL: u8 = 3;
    pub const LINE: u8 = 4;
    pub const LINE_REL: u8 = 5;
}

/// A vector path in engine encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Left, top, right, bottom.
    pub bounds: [f32; 4],
    /// Tessellation quality.
    pub quality: Quality,
    /// Coordinate format.
    pub format: PathFormat,
    /// Set by the engine once the path is uploaded to its memory.
    pub uploaded: bool,
    /// Opcode stream.
    pub data: Vec<u8>,
}

impl Path {
    /// Build a path from signed 8-bit opcode data.
    pub fn from_s8(bounds: [f32; 4], quality: Quality, data: &[i8]) -> Self {
        Path {
            bounds,
            quality,
            format: PathFormat::S8,
            uploaded: false,
            data: data.iter().map(|&v| v as u8).collect(),
        }
    }

    /// Length of the opcode stream in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Count segments of an S8 path up to the END opcode.
    pub fn segment_count(&self) -> Option<usize> {
        if self.format != PathFormat::S8 {
            return None;
        }
        let mut count = 0;
        let mut i = 0;
        while i < self.data.len() {
            let args = match self.data[i] {
                opcode::END => return Some(count),
                opcode::CLOSE => 0,
                opcode::MOVE | opcode::MOVE_REL | opcode::LINE | opcode::LINE_REL => 2,
                _ => return None,
            };
            count += 1;
            i += 1 + args;
        }
        None
    }
}

/// 3x3 affine transform, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub m: [[f32; 3]; 3],
}

impl Matrix {
    pub const fn identity() -> Self {
        Matrix {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Reset to identity.
    pub fn load_identity(&mut self) {
        *self = Self::identity();
    }

    /// Post-multiply by a translation.
    pub fn translate(&mut self, x: f32, y: f32) {
        for row in self.m.iter_mut() {
            row[2] += row[0] * x + row[1] * y;
        }
    }

    /// Post-multiply by a scale.
    pub fn scale(&mut self, sx: f32, sy: f32) {
        for row in self.m.iter_mut() {
            row[0] *= sx;
            row[1] *= sy;
        }
    }

    /// Post-multiply by a rotation of `degrees`.
    pub fn rotate(&mut self, degrees: f32) {
        let rad = degrees * core::f32::consts::PI / 180.0;
        let (s, c) = (libm::sinf(rad), libm::cosf(rad));
        for row in self.m.iter_mut() {
            let (a, b) = (row[0], row[1]);
            row[0] = a * c + b * s;
            row[1] = b * c - a * s;
        }
    }

    /// Map a point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        (
            (m[0][0] * x + m[0][1] * y + m[0][2]) / w,
            (m[1][0] * x + m[1][1] * y + m[1][2]) / w,
        )
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// The rasterization engine.
pub trait RenderEngine {
    /// Initialize with a tessellation window of `width` x `height`.
    fn init(&mut self, width: u32, height: u32) -> core::result::Result<(), EngineError>;

    /// Size the command buffer.
    fn set_command_buffer_size(&mut self, bytes: u32) -> core::result::Result<(), EngineError>;

    /// Queue a path fill into `target`.
    fn draw_path(
        &mut self,
        target: &BufferDescriptor,
        path: &Path,
        fill: FillRule,
        transform: &Matrix,
        blend: BlendMode,
        color: Color,
    ) -> core::result::Result<(), EngineError>;

    /// Block until every queued command has completed, or fail with
    /// `EngineError::Timeout` after `timeout_ms`.
    fn finish(&mut self, timeout_ms: u32) -> core::result::Result<(), EngineError>;

    /// Queue a fill of `area` (whole buffer if `None`).
    fn clear(
        &mut self,
        target: &BufferDescriptor,
        area: Option<Rect>,
        color: Color,
    ) -> core::result::Result<(), EngineError>;

    /// Drop the engine-side copy of a path.
    fn release_path(&mut self, path: &mut Path);

    /// Release all engine resources.
    fn shutdown(&mut self);
}

/// Bring the engine up, shutting it down again if any step fails.
pub fn init_engine<E: RenderEngine>(engine: &mut E, config: &EngineConfig) -> Result<()> {
    if let Err(e) = engine.init(config.canvas_width, config.canvas_height) {
        log::error!("[layerfb] engine init failed: {}", e);
        engine.shutdown();
        return Err(DisplayError::EngineInit(e));
    }

    if let Err(e) = engine.set_command_buffer_size(config.command_buffer_size) {
        log::error!("[layerfb] command buffer size {} rejected: {}", config.command_buffer_size, e);
        engine.shutdown();
        return Err(DisplayError::EngineInit(e));
    }

    log::info!(
        "[layerfb] engine ready: canvas {}x{}, {} byte command buffer",
        config.canvas_width,
        config.canvas_height,
        config.command_buffer_size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimEngine;

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
    }

    #[test]
    fn test_translate_then_scale() {
        let mut m = Matrix::identity();
        m.translate(360.0, 640.0);
        m.scale(10.0, 10.0);
        assert!(close(m.apply(0.0, 0.0), (360.0, 640.0)));
        assert!(close(m.apply(-10.0, 5.0), (260.0, 690.0)));
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let mut m = Matrix::identity();
        m.rotate(90.0);
        assert!(close(m.apply(1.0, 0.0), (0.0, 1.0)));
    }

    #[test]
    fn test_color_layout() {
        assert_eq!(Color::rgba(0, 0, 0xFF, 0xFF), Color(0xFFFF_0000));
        assert_eq!(Color(0xFF00_00FF).alpha(), 0xFF);
    }

    #[test]
    fn test_segment_count() {
        let path = Path::from_s8([-1.0, -1.0, 1.0, 1.0], Quality::High, &[2, 0, 0, 4, 1, 1, 1, 0]);
        assert_eq!(path.segment_count(), Some(3));
        let broken = Path::from_s8([0.0; 4], Quality::Low, &[9]);
        assert_eq!(broken.segment_count(), None);
    }

    #[test]
    fn test_malformed_path_rejected() {
        let mut engine = SimEngine::new();
        engine.init(64, 64).unwrap();
        let target = BufferDescriptor {
            address: 0x1000,
            width: 8,
            height: 8,
            stride: 16,
            format: crate::format::BufferFormat::Rgb565,
            committed: false,
        };
        let broken = Path::from_s8([0.0; 4], Quality::Low, &[2, 0, 0, 9]);
        let empty = Path::from_s8([0.0; 4], Quality::Low, &[0]);
        for path in [&broken, &empty] {
            assert_eq!(
                engine.draw_path(
                    &target,
                    path,
                    FillRule::NonZero,
                    &Matrix::identity(),
                    BlendMode::None,
                    Color(0)
                ),
                Err(EngineError::InvalidArgument)
            );
        }
        assert_eq!(engine.draw_count(), 0);
    }

    #[test]
    fn test_init_failure_shuts_down() {
        let mut engine = SimEngine::new();
        engine.fail_init(EngineError::OutOfMemory);
        let err = init_engine(&mut engine, &EngineConfig::default()).unwrap_err();
        assert_eq!(err, DisplayError::EngineInit(EngineError::OutOfMemory));
        assert!(engine.is_shut_down());
    }

    #[test]
    fn test_command_buffer_failure_shuts_down() {
        let mut engine = SimEngine::new();
        let mut config = EngineConfig::default();
        config.command_buffer_size = 0;
        assert!(init_engine(&mut engine, &config).is_err());
        assert!(engine.is_shut_down());
    }

    #[test]
    fn test_init_success() {
        let mut engine = SimEngine::new();
        init_engine(&mut engine, &EngineConfig::default()).unwrap();
        assert!(engine.is_initialized());
    }
}
