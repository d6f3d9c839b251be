//! Window lifecycle management.
//!
//! The window manager is the registry that owns every display binding,
//! every window, the frame buffer allocator and the rendering engine.
//! Windows go through
//!
//! ```text
//! create_window -> (render_target -> draw -> swap_buffers)*
//! ```
//!
//! `render_target` hands out a buffer the display is neither scanning
//! nor about to scan; `swap_buffers` drains the engine and only then
//! switches scanout to that buffer. The first swap of each layer also
//! programs its blend parameters and enables output.

use alloc::vec::Vec;

use crate::blend::{apply_blend_config, BlendConfig};
use crate::config::{ClearPolicy, EnablePolicy, SystemConfig};
use crate::display::{Display, DisplayController, DisplayId};
use crate::engine::RenderEngine;
use crate::error::{DisplayError, Result};
use crate::format::{compute_stride, has_scanout_equivalent, to_driver_format, BufferFormat};
use crate::pool::{FrameAllocator, FrameRegion};
use crate::window::{BufferDescriptor, FramePhase, Rect, Window, WindowId};

/// Owner of all displays and windows.
pub struct WindowManager<C: DisplayController, E: RenderEngine, A: FrameAllocator> {
    /// Static configuration.
    config: SystemConfig,
    /// Display controller.
    controller: C,
    /// Rendering engine.
    engine: E,
    /// Frame buffer memory.
    allocator: A,
    /// Bound displays, indexed by display ID.
    displays: Vec<Option<Display<C::Layer>>>,
    /// Windows, indexed by display ID.
    windows: Vec<Option<Window>>,
    /// Blend parameters per display.
    blend: Vec<BlendConfig>,
}

impl<C: DisplayController, E: RenderEngine, A: FrameAllocator> WindowManager<C, E, A> {
    /// Create a manager. No hardware is touched until the first window.
    pub fn new(config: SystemConfig, controller: C, engine: E, allocator: A) -> Result<Self> {
        config.validate()?;
        let layers = config.geometry.len();

        Ok(WindowManager {
            config,
            controller,
            engine,
            allocator,
            displays: (0..layers).map(|_| None).collect(),
            windows: (0..layers).map(|_| None).collect(),
            blend: (0..layers).map(|_| config.blend).collect(),
        })
    }

    /// Create the window of `display_id` covering `rect`.
    ///
    /// Frame memory taken before a failure is not returned to the pool,
    /// and the display may be left configured without a window. A failed
    /// create is a startup failure; retrying allocates fresh memory.
    pub fn create_window(
        &mut self,
        display_id: DisplayId,
        rect: Rect,
        format: BufferFormat,
    ) -> Result<WindowId> {
        let index = display_id.0 as usize;
        let geometry = *self
            .config
            .geometry
            .get(index)
            .ok_or(DisplayError::UnknownDisplay(display_id.0))?;
        if self.windows[index].is_some() {
            return Err(DisplayError::DisplayInUse(display_id.0));
        }

        let layer = display_id.layer();
        if rect.width == 0
            || rect.height == 0
            || rect.width > geometry.width
            || rect.height > geometry.height
        {
            log::error!(
                "[layerfb] {}x{} window does not fit layer {} ({}x{})",
                rect.width,
                rect.height,
                layer.0,
                geometry.width,
                geometry.height
            );
            return Err(DisplayError::InvalidGeometry { layer });
        }

        if self.displays[index].is_none() {
            self.displays[index] = Some(Display::open(&mut self.controller, display_id)?);
        }
        let display = self.displays[index]
            .as_mut()
            .ok_or(DisplayError::UnknownDisplay(display_id.0))?;

        // Rows are laid out at the layer's full width.
        let video_format = to_driver_format(format);
        if !has_scanout_equivalent(format) {
            log::warn!(
                "[layerfb] layer {}: {:?} has no scanout format, using {:?}",
                layer.0,
                format,
                video_format
            );
        }
        let stride = compute_stride(geometry.width, video_format);
        let size = stride as usize * rect.height as usize;

        let mut info = *display.info();
        info.format = video_format;
        info.start_x = rect.x;
        info.start_y = rect.y;
        info.width = rect.width;
        info.height = rect.height;
        info.stride_bytes = stride;
        info.buffer_count = self.config.buffer_count;

        let mut buffers = Vec::with_capacity(self.config.buffer_count);
        for slot in 0..self.config.buffer_count {
            let region = self.allocator.allocate(layer, size)?;
            if region.address % self.config.align != 0 {
                return Err(DisplayError::Misaligned {
                    address: region.address,
                    align: self.config.align,
                });
            }
            info.buffers[slot] = region.address;
            buffers.push(BufferDescriptor {
                address: region.address,
                width: rect.width,
                height: rect.height,
                stride,
                format,
                committed: false,
            });
        }

        if let Err(e) = display.configure(info) {
            log::error!("[layerfb] layer {} rejected buffer layout: {}", layer.0, e);
            return Err(e);
        }

        let front = buffers[0];
        let zero = match self.config.clear_policy {
            ClearPolicy::Auto => self.allocator.reuses_memory(),
            ClearPolicy::ZeroFirstBuffer => true,
            ClearPolicy::Preserve => false,
        };
        if zero {
            self.allocator.zero(&FrameRegion {
                layer,
                address: front.address,
                len: front.size_bytes(),
            })?;
        }
        display.show(front.address)?;

        let mut window = Window::new(display_id, rect, buffers);
        if self.config.enable_policy == EnablePolicy::OnCreate {
            enable_layer(&mut self.controller, display, &mut window, &self.blend[index])?;
        }

        log::info!(
            "[layerfb] window on layer {}: {}x{} at ({}, {}), {:?}, stride {}, {} buffers",
            layer.0,
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            format,
            stride,
            window.buffer_count()
        );

        self.windows[index] = Some(window);
        Ok(WindowId(display_id.0))
    }

    /// Select a buffer the display is not using and make it the render
    /// target of `id`.
    pub fn render_target(&mut self, id: WindowId) -> Result<BufferDescriptor> {
        let index = id.0 as usize;
        let window = self
            .windows
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(DisplayError::UnknownWindow)?;
        let display = self
            .displays
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(DisplayError::UnknownWindow)?;

        if window.phase == FramePhase::Rendering {
            log::warn!("[layerfb] layer {}: render target already held", index);
            return Err(DisplayError::OutOfOrder);
        }

        // Start after the last target so every buffer gets its turn.
        let count = window.buffers.len();
        let start = window.current.map_or(0, |c| c + 1);
        let slot = (0..count)
            .map(|i| (start + i) % count)
            .find(|&i| !display.is_busy(window.buffers[i].address));

        match slot {
            Some(slot) => {
                window.current = Some(slot);
                window.phase = FramePhase::Rendering;
                log::trace!(
                    "[layerfb] layer {}: render into slot {} ({:#x})",
                    index,
                    slot,
                    window.buffers[slot].address
                );
                Ok(window.buffers[slot])
            }
            None => {
                log::warn!(
                    "[layerfb] layer {}: no free buffer (front slot {:?})",
                    index,
                    display.front_buffer().and_then(|a| window.slot_of(a))
                );
                Err(DisplayError::RenderTargetUnavailable)
            }
        }
    }

    /// Present the render target of `id`.
    ///
    /// Returns `Ok(false)` without touching the display when no render
    /// target is held.
    pub fn swap_buffers(&mut self, id: WindowId) -> Result<bool> {
        let index = id.0 as usize;
        let window = self
            .windows
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(DisplayError::UnknownWindow)?;
        let display = self
            .displays
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(DisplayError::UnknownWindow)?;

        let slot = match (window.phase, window.current) {
            (FramePhase::Rendering, Some(slot)) if slot < window.buffers.len() => slot,
            _ => {
                log::warn!("[layerfb] layer {}: swap without render target", index);
                return Ok(false);
            }
        };

        // Scanout must never see a partially drawn frame.
        if let Err(e) = self.engine.finish(self.config.drain_timeout_ms) {
            log::error!("[layerfb] layer {}: engine drain failed: {}", index, e);
            return Err(e.into());
        }

        let address = window.buffers[slot].address;
        display.show(address)?;
        window.buffers[slot].committed = true;
        window.phase = FramePhase::Idle;
        log::trace!("[layerfb] layer {}: present {:#x}", index, address);

        if !window.blend_configured {
            enable_layer(&mut self.controller, display, window, &self.blend[index])?;
        }
        Ok(true)
    }

    /// Give up the render target of `id` without presenting it, after a
    /// failed draw or drain. The display is not touched.
    pub fn cancel_render(&mut self, id: WindowId) -> Result<()> {
        let window = self
            .windows
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(DisplayError::UnknownWindow)?;
        if window.phase == FramePhase::Rendering {
            log::debug!("[layerfb] layer {}: frame dropped", id.0);
            window.phase = FramePhase::Idle;
        }
        Ok(())
    }

    /// Release a window. Windows live for the whole process, so this
    /// does nothing and may be called any number of times.
    pub fn destroy_window(&mut self, id: WindowId) {
        log::debug!("[layerfb] destroy window {} ignored", id.0);
    }

    /// Override the blend parameters of a display before its layer is
    /// enabled.
    pub fn set_blend_config(&mut self, display_id: DisplayId, config: BlendConfig) -> Result<()> {
        let index = display_id.0 as usize;
        if index >= self.blend.len() {
            return Err(DisplayError::UnknownDisplay(display_id.0));
        }
        if let Some(window) = self.windows[index].as_ref() {
            if window.blend_configured {
                return Err(DisplayError::BlendLocked);
            }
        }
        self.blend[index] = config;
        Ok(())
    }

    /// Get a window.
    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// IDs of all created windows, in layer order.
    pub fn window_ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_some())
            .map(|(i, _)| WindowId(i as u8))
    }

    /// Get a bound display.
    pub fn display(&self, id: DisplayId) -> Option<&Display<C::Layer>> {
        self.displays.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Get the rendering engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Get the rendering engine for drawing.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Get the frame allocator.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Get the configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }
}

/// Flush blend parameters and enable the layer of `window`.
fn enable_layer<C: DisplayController>(
    controller: &mut C,
    display: &mut Display<C::Layer>,
    window: &mut Window,
    blend: &BlendConfig,
) -> Result<()> {
    apply_blend_config(controller, display.layer(), blend)?;
    display.enable()?;
    window.blend_configured = true;
    log::info!("[layerfb] layer {} enabled", display.layer().0);
    Ok(())
}
