//! Display device binding.
//!
//! The frame buffer driver is consumed through two traits: the
//! controller, which owns the mixer and hands out per-layer devices,
//! and the layer device, which scans one buffer out at a time.

use crate::blend::BlendConfig;
use crate::config::MAX_BUFFER_COUNT;
use crate::error::{DeviceError, DisplayError, Result};
use crate::format::VideoFormat;

/// Hardware layer index on the display controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u8);

/// Application-facing display identifier. Display `n` drives layer `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DisplayId(pub u8);

impl DisplayId {
    /// The hardware layer behind this display.
    pub fn layer(&self) -> LayerId {
        LayerId(self.0)
    }
}

/// Buffer layout record exchanged with the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Scanout pixel format.
    pub format: VideoFormat,
    /// Layer origin X on the panel.
    pub start_x: u32,
    /// Layer origin Y on the panel.
    pub start_y: u32,
    /// Visible width in pixels.
    pub width: u32,
    /// Visible height in pixels.
    pub height: u32,
    /// Row stride in bytes.
    pub stride_bytes: u32,
    /// Number of valid entries in `buffers`.
    pub buffer_count: usize,
    /// Buffer base addresses.
    pub buffers: [usize; MAX_BUFFER_COUNT],
}

impl BufferInfo {
    /// Valid buffer addresses.
    pub fn addresses(&self) -> &[usize] {
        &self.buffers[..self.buffer_count.min(MAX_BUFFER_COUNT)]
    }
}

impl Default for BufferInfo {
    fn default() -> Self {
        BufferInfo {
            format: VideoFormat::Rgb565,
            start_x: 0,
            start_y: 0,
            width: 0,
            height: 0,
            stride_bytes: 0,
            buffer_count: 0,
            buffers: [0; MAX_BUFFER_COUNT],
        }
    }
}

/// One opened hardware layer.
pub trait LayerDevice {
    /// Currently programmed buffer layout.
    fn buffer_info(&self) -> BufferInfo;

    /// Program a new buffer layout.
    fn set_buffer_info(&mut self, info: &BufferInfo) -> core::result::Result<(), DeviceError>;

    /// Address the layer is scanning out, if any.
    fn current_buffer(&self) -> Option<usize>;

    /// Address latched for the next frame but not yet scanning.
    ///
    /// Devices that switch immediately report `None`.
    fn in_flight_buffer(&self) -> Option<usize> {
        None
    }

    /// Switch scanout to `address`.
    fn set_current_buffer(&mut self, address: usize) -> core::result::Result<(), DeviceError>;

    /// Enable output, flushing shadow registers.
    fn enable(&mut self) -> core::result::Result<(), DeviceError>;

    /// Whether output is enabled.
    fn is_enabled(&self) -> bool;
}

/// The display controller that owns the hardware layers.
pub trait DisplayController {
    /// Device type for one layer.
    type Layer: LayerDevice;

    /// Open a layer.
    fn open(&mut self, layer: LayerId) -> core::result::Result<Self::Layer, DeviceError>;

    /// Write blend parameters for a layer into its shadow registers.
    fn set_layer_blend(
        &mut self,
        layer: LayerId,
        config: &BlendConfig,
    ) -> core::result::Result<(), DeviceError>;
}

/// A bound physical output.
pub struct Display<L: LayerDevice> {
    /// Display ID.
    id: DisplayId,
    /// Opened layer device.
    device: L,
    /// Last buffer-info record pushed to the device.
    info: BufferInfo,
}

impl<L: LayerDevice> Display<L> {
    /// Open the layer behind `id`.
    pub fn open<C>(controller: &mut C, id: DisplayId) -> Result<Self>
    where
        C: DisplayController<Layer = L>,
    {
        let layer = id.layer();
        let device = controller
            .open(layer)
            .map_err(|cause| DisplayError::DeviceRejected { layer, cause })?;
        let info = device.buffer_info();

        Ok(Display { id, device, info })
    }

    /// Get the hardware layer.
    pub fn layer(&self) -> LayerId {
        self.id.layer()
    }

    /// Get the programmed buffer info.
    pub fn info(&self) -> &BufferInfo {
        &self.info
    }

    /// Push a buffer layout to the device.
    pub fn configure(&mut self, info: BufferInfo) -> Result<()> {
        let layer = self.layer();
        self.device
            .set_buffer_info(&info)
            .map_err(|cause| DisplayError::DeviceRejected { layer, cause })?;
        self.info = info;
        Ok(())
    }

    /// Address on screen.
    pub fn front_buffer(&self) -> Option<usize> {
        self.device.current_buffer()
    }

    /// Whether `address` is scanning or latched for scanout.
    pub fn is_busy(&self, address: usize) -> bool {
        self.device.current_buffer() == Some(address) || self.device.in_flight_buffer() == Some(address)
    }

    /// Switch scanout to `address`.
    ///
    /// A device still holding a latched switch reports `DisplayBusy`.
    pub fn show(&mut self, address: usize) -> Result<()> {
        let layer = self.layer();
        self.device.set_current_buffer(address).map_err(|cause| match cause {
            DeviceError::Busy => DisplayError::DisplayBusy { layer },
            cause => DisplayError::DeviceRejected { layer, cause },
        })
    }

    /// Enable output.
    pub fn enable(&mut self) -> Result<()> {
        let layer = self.layer();
        self.device
            .enable()
            .map_err(|cause| DisplayError::DeviceRejected { layer, cause })
    }

    /// Whether output is enabled.
    pub fn is_enabled(&self) -> bool {
        self.device.is_enabled()
    }
}
