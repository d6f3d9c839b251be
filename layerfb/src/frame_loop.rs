//! Render loop.
//!
//! One task drives every window in turn: acquire a render target,
//! let the scene draw into it, present it. Frame rate is reported
//! through the log every [`REPORT_INTERVAL`] frames.

use alloc::vec::Vec;

use crate::display::DisplayController;
use crate::engine::{BlendMode, Color, FillRule, Matrix, Path, Quality, RenderEngine};
use crate::error::{EngineError, Result};
use crate::manager::WindowManager;
use crate::pool::FrameAllocator;
use crate::window::{BufferDescriptor, WindowId};

/// Frames between rate reports.
pub const REPORT_INTERVAL: u32 = 60;

/// Millisecond tick source.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Something that draws one frame into a render target.
pub trait Scene {
    fn draw<E: RenderEngine>(
        &mut self,
        engine: &mut E,
        target: &BufferDescriptor,
    ) -> core::result::Result<(), EngineError>;
}

/// Octagon with a notch on the right edge, in S8 coordinates.
static NOTCHED_OCTAGON: [i8; 28] = [
    2, -5, -10, // move
    4, 5, -10, // line
    4, 10, -5, //
    4, 0, 0, //
    4, 10, 5, //
    4, 5, 10, //
    4, -5, 10, //
    4, -10, 5, //
    4, -10, -5, //
    0, // end
];

/// The bring-up scene: a solid background and one filled path
/// centered in the window and scaled up tenfold.
pub struct ReferenceScene {
    path: Path,
    matrix: Matrix,
    background: Color,
    fill: Color,
}

impl ReferenceScene {
    pub fn new() -> Self {
        ReferenceScene {
            path: Path::from_s8([-10.0, -10.0, 10.0, 10.0], Quality::High, &NOTCHED_OCTAGON),
            matrix: Matrix::identity(),
            background: Color(0xFFFF_0000),
            fill: Color(0xFF00_00FF),
        }
    }

    /// The path being drawn.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transform used for the last frame.
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Hand the path back to the engine.
    pub fn release<E: RenderEngine>(&mut self, engine: &mut E) {
        engine.release_path(&mut self.path);
    }
}

impl Default for ReferenceScene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene for ReferenceScene {
    fn draw<E: RenderEngine>(
        &mut self,
        engine: &mut E,
        target: &BufferDescriptor,
    ) -> core::result::Result<(), EngineError> {
        self.matrix.load_identity();
        self.matrix
            .translate(target.width as f32 / 2.0, target.height as f32 / 2.0);
        self.matrix.scale(10.0, 10.0);

        engine.clear(target, None, self.background)?;
        engine.draw_path(
            target,
            &self.path,
            FillRule::EvenOdd,
            &self.matrix,
            BlendMode::None,
            self.fill,
        )
    }
}

/// Frame rate over one report interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub frames: u32,
    pub elapsed_ms: u32,
    pub fps: u32,
}

/// Counts frames and reports the rate once per interval.
pub struct FrameCounter {
    frames: u32,
    start_ms: u32,
    interval: u32,
}

impl FrameCounter {
    pub fn new(now_ms: u32) -> Self {
        Self::with_interval(now_ms, REPORT_INTERVAL)
    }

    pub fn with_interval(now_ms: u32, interval: u32) -> Self {
        FrameCounter {
            frames: 0,
            start_ms: now_ms,
            interval: interval.max(1),
        }
    }

    /// Record one frame finished at `now_ms`.
    pub fn tick(&mut self, now_ms: u32) -> Option<FrameRate> {
        self.frames += 1;
        if self.frames < self.interval {
            return None;
        }

        let elapsed_ms = now_ms.wrapping_sub(self.start_ms);
        let fps = if elapsed_ms == 0 {
            0
        } else {
            (self.frames as u64 * 1000 / elapsed_ms as u64) as u32
        };
        let rate = FrameRate {
            frames: self.frames,
            elapsed_ms,
            fps,
        };
        log::info!(
            "[layerfb] {} frames in {} seconds: {} fps",
            rate.frames,
            elapsed_ms / 1000,
            fps
        );

        self.frames = 0;
        self.start_ms = now_ms;
        Some(rate)
    }
}

/// Draws and presents one frame of `id`.
///
/// On failure after the render target was acquired the target is
/// released again so the next frame can start cleanly.
pub fn redraw<C, E, A, S>(
    manager: &mut WindowManager<C, E, A>,
    id: WindowId,
    scene: &mut S,
) -> Result<()>
where
    C: DisplayController,
    E: RenderEngine,
    A: FrameAllocator,
    S: Scene,
{
    let target = manager.render_target(id)?;

    if let Err(e) = scene.draw(manager.engine_mut(), &target) {
        log::error!("[layerfb] draw into {:#x} failed: {}", target.address, e);
        manager.cancel_render(id)?;
        return Err(e.into());
    }

    if let Err(e) = manager.swap_buffers(id) {
        manager.cancel_render(id)?;
        return Err(e);
    }
    Ok(())
}

/// Render loop over all windows of a manager.
pub struct FrameLoop<S: Scene, K: Clock> {
    scene: S,
    clock: K,
    counter: FrameCounter,
    dropped: u32,
}

impl<S: Scene, K: Clock> FrameLoop<S, K> {
    pub fn new(scene: S, clock: K) -> Self {
        let counter = FrameCounter::new(clock.now_ms());
        FrameLoop {
            scene,
            clock,
            counter,
            dropped: 0,
        }
    }

    /// Render one frame of every window, in layer order.
    ///
    /// Recoverable errors drop that window's frame; fatal ones are
    /// returned.
    pub fn run_frame<C, E, A>(&mut self, manager: &mut WindowManager<C, E, A>) -> Result<()>
    where
        C: DisplayController,
        E: RenderEngine,
        A: FrameAllocator,
    {
        let ids: Vec<WindowId> = manager.window_ids().collect();
        for id in ids {
            match redraw(manager, id, &mut self.scene) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("[layerfb] window {} dropped a frame: {}", id.0, e);
                    self.dropped += 1;
                }
            }
        }
        self.counter.tick(self.clock.now_ms());
        Ok(())
    }

    /// Render `frames` frames, or forever when `None`.
    pub fn run<C, E, A>(
        &mut self,
        manager: &mut WindowManager<C, E, A>,
        frames: Option<u32>,
    ) -> Result<()>
    where
        C: DisplayController,
        E: RenderEngine,
        A: FrameAllocator,
    {
        let mut rendered = 0;
        while frames.map_or(true, |limit| rendered < limit) {
            self.run_frame(manager)?;
            rendered += 1;
        }
        Ok(())
    }

    /// Frames dropped after recoverable errors.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    use crate::config::{LayerGeometry, SystemConfig};
    use crate::display::{DisplayId, LayerId};
    use crate::format::BufferFormat;
    use crate::pool::{alloc_frame_memory, BumpArena};
    use crate::sim::{SimController, SimEngine, SimEvent, SimTrace};
    use crate::window::Rect;

    static GEOMETRY: [LayerGeometry; 2] = [LayerGeometry::new(48, 32), LayerGeometry::new(16, 16)];

    struct StepClock(Cell<u32>);

    impl Clock for StepClock {
        fn now_ms(&self) -> u32 {
            let now = self.0.get();
            self.0.set(now + 10);
            now
        }
    }

    fn setup(trace: &SimTrace) -> (WindowManager<SimController, SimEngine, BumpArena>, SimController) {
        let mut config = SystemConfig::new();
        config.geometry = &GEOMETRY;
        let controller = SimController::new(2, trace.clone());
        let mut engine = SimEngine::with_trace(trace.clone());
        engine.init(64, 64).unwrap();
        let arena = BumpArena::new(alloc_frame_memory(32 << 10, 64).unwrap(), 64).unwrap();
        (
            WindowManager::new(config, controller.clone(), engine, arena).unwrap(),
            controller,
        )
    }

    #[test]
    fn test_counter_reports_every_interval() {
        let mut counter = FrameCounter::new(0);
        for i in 1..60 {
            assert_eq!(counter.tick(i * 16), None);
        }
        let rate = counter.tick(1000).unwrap();
        assert_eq!(rate, FrameRate { frames: 60, elapsed_ms: 1000, fps: 60 });
        assert_eq!(counter.tick(1016), None);
    }

    #[test]
    fn test_counter_zero_elapsed() {
        let mut counter = FrameCounter::with_interval(5, 1);
        assert_eq!(counter.tick(5).unwrap().fps, 0);
    }

    #[test]
    fn test_reference_scene_centers_path() {
        let trace = SimTrace::new();
        let (mut manager, _) = setup(&trace);
        let id = manager
            .create_window(DisplayId(0), Rect::new(0, 0, 48, 32), BufferFormat::Bgrx8888)
            .unwrap();

        let mut scene = ReferenceScene::new();
        assert_eq!(scene.path().segment_count(), Some(9));
        redraw(&mut manager, id, &mut scene).unwrap();

        let (x, y) = scene.matrix().apply(0.0, 0.0);
        assert_eq!((x, y), (24.0, 16.0));
        assert_eq!(scene.matrix().apply(1.0, 0.0), (34.0, 16.0));

        let target = manager.window(id).unwrap().current_buffer().copied().unwrap();
        let events = trace.events();
        let tail = &events[events.len() - 6..];
        assert_eq!(tail[0], SimEvent::Clear { address: target.address });
        assert_eq!(tail[1], SimEvent::Draw { address: target.address });
        assert_eq!(tail[2], SimEvent::Finish);
        assert!(target.committed);
    }

    #[test]
    fn test_loop_drives_all_windows() {
        let trace = SimTrace::new();
        let (mut manager, controller) = setup(&trace);
        manager
            .create_window(DisplayId(0), Rect::new(0, 0, 48, 32), BufferFormat::Rgb565)
            .unwrap();
        manager
            .create_window(DisplayId(1), Rect::new(4, 4, 16, 16), BufferFormat::Rgba4444)
            .unwrap();

        let mut frame_loop = FrameLoop::new(ReferenceScene::new(), StepClock(Cell::new(0)));
        frame_loop.run(&mut manager, Some(120)).unwrap();

        assert_eq!(manager.engine().draw_count(), 240);
        assert_eq!(frame_loop.dropped(), 0);
        for layer in 0..2 {
            let state = controller.layer(LayerId(layer)).unwrap();
            assert!(state.enabled);
            assert_eq!(state.flush_count, 1);
        }
    }

    #[test]
    fn test_loop_drops_stalled_frames() {
        let trace = SimTrace::new();
        let (mut manager, controller) = setup(&trace);
        let id = manager
            .create_window(DisplayId(0), Rect::new(0, 0, 48, 32), BufferFormat::Rgb565)
            .unwrap();
        let front = controller.layer(LayerId(0)).unwrap().current;

        let mut frame_loop = FrameLoop::new(ReferenceScene::new(), StepClock(Cell::new(0)));
        manager.engine_mut().set_stalled(true);
        frame_loop.run(&mut manager, Some(3)).unwrap();
        assert_eq!(frame_loop.dropped(), 3);
        assert_eq!(controller.layer(LayerId(0)).unwrap().current, front);

        manager.engine_mut().set_stalled(false);
        frame_loop.run_frame(&mut manager).unwrap();
        assert_ne!(controller.layer(LayerId(0)).unwrap().current, front);
        assert_eq!(manager.window(id).unwrap().phase(), crate::window::FramePhase::Idle);
    }

    #[test]
    fn test_release_clears_upload_marker() {
        let mut scene = ReferenceScene::new();
        scene.path.uploaded = true;
        let mut engine = SimEngine::new();
        scene.release(&mut engine);
        assert!(!scene.path().uploaded);
    }
}
