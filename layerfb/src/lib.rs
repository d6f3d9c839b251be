//! Double-buffered hardware display layers
//!
//! This crate drives a small, fixed set of display controller layers,
//! each backed by two or three frame buffers, and hands those buffers
//! to a vector rasterization engine in turn.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             frame_loop (render task)          │
//! ├──────────────────────────────────────────────┤
//! │   manager: create / render_target / swap     │
//! │  ┌────────┐ ┌──────┐ ┌───────┐ ┌──────────┐  │
//! │  │ window │ │ pool │ │ blend │ │  format  │  │
//! │  └────────┘ └──────┘ └───────┘ └──────────┘  │
//! └──────┬───────────────────────────────┬───────┘
//!        │                               │
//!  DisplayController / LayerDevice   RenderEngine
//! ```
//!
//! # Modules
//!
//! - `format`: renderer and driver pixel formats, stride computation
//! - `pool`: frame buffer memory (bump arena or per-layer reservations)
//! - `display`: display device binding
//! - `window`: window and buffer descriptors
//! - `manager`: window lifecycle
//! - `blend`: per-layer alpha configuration
//! - `engine`: rasterization engine interface
//! - `frame_loop`: render loop and frame-rate counter
//! - `sim`: simulated controller and engine

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod blend;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod format;
pub mod frame_loop;
pub mod manager;
pub mod pool;
pub mod sim;
pub mod window;

// Re-exports for convenience
pub use blend::{AlphaMode, BlendConfig};
pub use config::{ClearPolicy, EnablePolicy, EngineConfig, LayerGeometry, SystemConfig};
pub use display::{DisplayController, DisplayId, LayerDevice, LayerId};
pub use engine::{init_engine, RenderEngine};
pub use error::{DisplayError, Result};
pub use format::{BufferFormat, VideoFormat};
pub use frame_loop::{Clock, FrameLoop, ReferenceScene, Scene};
pub use manager::WindowManager;
pub use pool::{BumpArena, FrameAllocator, LayerReservations};
pub use window::{BufferDescriptor, Rect, WindowId};

/// Bring up the engine and one full-size window per configured layer.
///
/// Any failure here is a startup failure; the engine is shut down if
/// it was the engine that failed.
pub fn init<C, E, A>(
    config: SystemConfig,
    engine_config: &EngineConfig,
    controller: C,
    mut engine: E,
    allocator: A,
    format: BufferFormat,
) -> Result<WindowManager<C, E, A>>
where
    C: DisplayController,
    E: RenderEngine,
    A: FrameAllocator,
{
    log::info!("[layerfb] Initializing {} layers...", config.geometry.len());

    init_engine(&mut engine, engine_config)?;
    let mut manager = WindowManager::new(config, controller, engine, allocator)?;

    for (i, geometry) in config.geometry.iter().enumerate() {
        let rect = Rect::new(0, 0, geometry.width, geometry.height);
        manager.create_window(DisplayId(i as u8), rect, format)?;
    }

    log::info!("[layerfb] Ready");
    Ok(manager)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::pool::alloc_frame_memory;
    use crate::sim::{SimController, SimEngine, SimTrace};

    static GEOMETRY: [LayerGeometry; 2] = [LayerGeometry::new(32, 16), LayerGeometry::new(16, 8)];

    #[test]
    fn test_init_creates_every_window() {
        let mut config = SystemConfig::new();
        config.geometry = &GEOMETRY;
        let trace = SimTrace::new();
        let arena = BumpArena::new(alloc_frame_memory(16 << 10, 64).unwrap(), 64).unwrap();

        let manager = init(
            config,
            &EngineConfig::default(),
            SimController::new(2, trace.clone()),
            SimEngine::with_trace(trace),
            arena,
            BufferFormat::Rgb565,
        )
        .unwrap();

        assert_eq!(manager.window_ids().count(), 2);
        assert!(manager.engine().is_initialized());
        assert_eq!(manager.window(WindowId(1)).unwrap().width(), 16);
    }

    #[test]
    fn test_init_engine_failure() {
        let mut config = SystemConfig::new();
        config.geometry = &GEOMETRY;
        let mut engine = SimEngine::new();
        engine.fail_init(EngineError::Io);
        let arena = BumpArena::new(alloc_frame_memory(16 << 10, 64).unwrap(), 64).unwrap();

        let err = init(
            config,
            &EngineConfig::default(),
            SimController::new(2, SimTrace::new()),
            engine,
            arena,
            BufferFormat::Rgb565,
        )
        .err();
        assert_eq!(err, Some(DisplayError::EngineInit(EngineError::Io)));
    }
}
