//! Simulated display controller and rendering engine.
//!
//! Host-side stand-ins for the hardware, used by the test suite and by
//! bring-up code running off-target. The controller models shadow
//! registers: blend and layout writes are staged and only become active
//! when the layer's enable path flushes them. Both devices append to a
//! shared [`SimTrace`] so call ordering can be checked.

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::blend::BlendConfig;
use crate::display::{BufferInfo, DisplayController, LayerDevice, LayerId};
use crate::engine::{BlendMode, Color, FillRule, Matrix, Path, PathFormat, RenderEngine};
use crate::error::{DeviceError, EngineError};
use crate::window::{BufferDescriptor, Rect};

/// Observable device and engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Clear { address: usize },
    Draw { address: usize },
    Finish,
    SetBufferInfo { layer: LayerId },
    SetCurrentBuffer { layer: LayerId, address: usize },
    SetLayerBlend { layer: LayerId },
    Flush { layer: LayerId },
}

/// Shared, ordered event log.
#[derive(Clone, Default)]
pub struct SimTrace(Arc<Mutex<Vec<SimEvent>>>);

impl SimTrace {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: SimEvent) {
        self.0.lock().push(event);
    }

    /// Copy of the log.
    pub fn events(&self) -> Vec<SimEvent> {
        self.0.lock().clone()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&SimEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|e| pred(e)).count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

bitflags::bitflags! {
    /// Shadow registers written but not yet flushed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ShadowRegs: u32 {
        /// Buffer layout.
        const LAYOUT = 0b0001;
        /// Scanout address.
        const ADDRESS = 0b0010;
        /// Alpha blend parameters.
        const BLEND = 0b0100;
    }
}

/// When a new scanout address takes effect on an enabled layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchMode {
    /// Immediately.
    Immediate,
    /// At the next `vsync()`.
    NextVsync,
}

/// Register state of one simulated layer.
#[derive(Debug, Clone)]
pub struct SimLayerState {
    pub opened: bool,
    pub info: BufferInfo,
    pub current: Option<usize>,
    pub pending: Option<usize>,
    pub enabled: bool,
    pub dirty: ShadowRegs,
    pub shadow_blend: Option<BlendConfig>,
    pub active_blend: Option<BlendConfig>,
    pub flush_count: u32,
    pub blend_writes: u32,
    pub address_writes: u32,
    pub reject_layout: bool,
}

impl SimLayerState {
    fn new() -> Self {
        SimLayerState {
            opened: false,
            info: BufferInfo::default(),
            current: None,
            pending: None,
            enabled: false,
            dirty: ShadowRegs::empty(),
            shadow_blend: None,
            active_blend: None,
            flush_count: 0,
            blend_writes: 0,
            address_writes: 0,
            reject_layout: false,
        }
    }
}

/// Simulated display controller. Clones share the same registers.
#[derive(Clone)]
pub struct SimController {
    layers: Arc<Vec<Mutex<SimLayerState>>>,
    latch: Arc<Mutex<LatchMode>>,
    trace: SimTrace,
}

impl SimController {
    /// Controller with `layer_count` hardware layers.
    pub fn new(layer_count: usize, trace: SimTrace) -> Self {
        SimController {
            layers: Arc::new((0..layer_count).map(|_| Mutex::new(SimLayerState::new())).collect()),
            latch: Arc::new(Mutex::new(LatchMode::Immediate)),
            trace,
        }
    }

    /// Change when address switches take effect.
    pub fn set_latch_mode(&self, mode: LatchMode) {
        *self.latch.lock() = mode;
    }

    /// Make the next layout push on `layer` fail.
    pub fn reject_layout(&self, layer: LayerId) {
        if let Some(state) = self.layers.get(layer.0 as usize) {
            state.lock().reject_layout = true;
        }
    }

    /// Vertical blank: latched addresses start scanning.
    pub fn vsync(&self) {
        for state in self.layers.iter() {
            let mut state = state.lock();
            if let Some(address) = state.pending.take() {
                state.current = Some(address);
            }
        }
    }

    /// Snapshot of a layer's registers.
    pub fn layer(&self, layer: LayerId) -> Option<SimLayerState> {
        self.layers.get(layer.0 as usize).map(|s| s.lock().clone())
    }
}

impl DisplayController for SimController {
    type Layer = SimLayer;

    fn open(&mut self, layer: LayerId) -> Result<SimLayer, DeviceError> {
        let state = self
            .layers
            .get(layer.0 as usize)
            .ok_or(DeviceError::InvalidLayer)?;
        state.lock().opened = true;

        Ok(SimLayer {
            layer,
            controller: self.clone(),
        })
    }

    fn set_layer_blend(&mut self, layer: LayerId, config: &BlendConfig) -> Result<(), DeviceError> {
        let mut state = self
            .layers
            .get(layer.0 as usize)
            .ok_or(DeviceError::InvalidLayer)?
            .lock();
        state.shadow_blend = Some(*config);
        state.dirty |= ShadowRegs::BLEND;
        state.blend_writes += 1;
        drop(state);

        self.trace.push(SimEvent::SetLayerBlend { layer });
        Ok(())
    }
}

/// One opened simulated layer.
pub struct SimLayer {
    layer: LayerId,
    controller: SimController,
}

impl SimLayer {
    fn with_state<T>(&self, f: impl FnOnce(&mut SimLayerState) -> T) -> T {
        // The layer was bounds-checked when it was opened.
        let mut state = self.controller.layers[self.layer.0 as usize].lock();
        f(&mut state)
    }
}

impl LayerDevice for SimLayer {
    fn buffer_info(&self) -> BufferInfo {
        self.with_state(|s| s.info)
    }

    fn set_buffer_info(&mut self, info: &BufferInfo) -> Result<(), DeviceError> {
        let layer = self.layer;
        self.with_state(|s| {
            if core::mem::take(&mut s.reject_layout) {
                return Err(DeviceError::Rejected);
            }
            if info.buffer_count == 0 || info.stride_bytes == 0 {
                return Err(DeviceError::Rejected);
            }
            s.info = *info;
            s.dirty |= ShadowRegs::LAYOUT;
            Ok(())
        })?;

        self.controller.trace.push(SimEvent::SetBufferInfo { layer });
        Ok(())
    }

    fn current_buffer(&self) -> Option<usize> {
        self.with_state(|s| s.current)
    }

    fn in_flight_buffer(&self) -> Option<usize> {
        self.with_state(|s| s.pending)
    }

    fn set_current_buffer(&mut self, address: usize) -> Result<(), DeviceError> {
        let latch = *self.controller.latch.lock();
        let layer = self.layer;
        self.with_state(|s| {
            if !s.info.addresses().contains(&address) {
                return Err(DeviceError::Rejected);
            }
            if s.pending.is_some() {
                return Err(DeviceError::Busy);
            }
            s.address_writes += 1;
            if s.enabled && latch == LatchMode::NextVsync {
                s.pending = Some(address);
            } else {
                s.current = Some(address);
                if !s.enabled {
                    s.dirty |= ShadowRegs::ADDRESS;
                }
            }
            Ok(())
        })?;

        self.controller
            .trace
            .push(SimEvent::SetCurrentBuffer { layer, address });
        Ok(())
    }

    fn enable(&mut self) -> Result<(), DeviceError> {
        let layer = self.layer;
        self.with_state(|s| {
            if let Some(blend) = s.shadow_blend {
                s.active_blend = Some(blend);
            }
            s.dirty = ShadowRegs::empty();
            s.enabled = true;
            s.flush_count += 1;
        });

        self.controller.trace.push(SimEvent::Flush { layer });
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.with_state(|s| s.enabled)
    }
}

/// Recording rendering engine.
pub struct SimEngine {
    initialized: bool,
    shut_down: bool,
    command_buffer_size: u32,
    /// Queued, not yet completed commands.
    pending: usize,
    stalled: bool,
    init_error: Option<EngineError>,
    draws: u32,
    finishes: u32,
    trace: SimTrace,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::with_trace(SimTrace::new())
    }

    pub fn with_trace(trace: SimTrace) -> Self {
        SimEngine {
            initialized: false,
            shut_down: false,
            command_buffer_size: 0,
            pending: 0,
            stalled: false,
            init_error: None,
            draws: 0,
            finishes: 0,
            trace,
        }
    }

    /// Make the next `init` fail with `error`.
    pub fn fail_init(&mut self, error: EngineError) {
        self.init_error = Some(error);
    }

    /// Stop completing work; `finish` then times out.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Commands queued since the last successful drain.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn draw_count(&self) -> u32 {
        self.draws
    }

    pub fn finish_count(&self) -> u32 {
        self.finishes
    }

    fn check_target(&self, target: &BufferDescriptor) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if target.address == 0 || target.stride < target.width * target.format.bytes_per_pixel() {
            return Err(EngineError::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for SimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine for SimEngine {
    fn init(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        if let Some(e) = self.init_error.take() {
            return Err(e);
        }
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidArgument);
        }
        self.initialized = true;
        self.shut_down = false;
        Ok(())
    }

    fn set_command_buffer_size(&mut self, bytes: u32) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if bytes == 0 || bytes % 64 != 0 {
            return Err(EngineError::InvalidArgument);
        }
        self.command_buffer_size = bytes;
        Ok(())
    }

    fn draw_path(
        &mut self,
        target: &BufferDescriptor,
        path: &Path,
        _fill: FillRule,
        _transform: &Matrix,
        _blend: BlendMode,
        _color: Color,
    ) -> Result<(), EngineError> {
        self.check_target(target)?;
        let malformed = match path.segment_count() {
            Some(segments) => segments == 0,
            None => path.format == PathFormat::S8,
        };
        if path.is_empty() || malformed {
            return Err(EngineError::InvalidArgument);
        }
        self.pending += 1;
        self.draws += 1;
        self.trace.push(SimEvent::Draw {
            address: target.address,
        });
        Ok(())
    }

    fn finish(&mut self, _timeout_ms: u32) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if self.stalled && self.pending > 0 {
            return Err(EngineError::Timeout);
        }
        self.pending = 0;
        self.finishes += 1;
        self.trace.push(SimEvent::Finish);
        Ok(())
    }

    fn clear(
        &mut self,
        target: &BufferDescriptor,
        _area: Option<Rect>,
        _color: Color,
    ) -> Result<(), EngineError> {
        self.check_target(target)?;
        self.pending += 1;
        self.trace.push(SimEvent::Clear {
            address: target.address,
        });
        Ok(())
    }

    fn release_path(&mut self, path: &mut Path) {
        path.uploaded = false;
    }

    fn shutdown(&mut self) {
        self.initialized = false;
        self.shut_down = true;
        self.pending = 0;
    }
}
