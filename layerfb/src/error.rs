//! Error types for the layer subsystem.
//!
//! Three families are kept apart: failures reported by the display
//! device binding (`DeviceError`), failures reported by the rendering
//! engine (`EngineError`), and the crate-level `DisplayError` that the
//! window manager returns to the application.

use core::fmt;

use crate::display::LayerId;

/// Crate result type.
pub type Result<T> = core::result::Result<T, DisplayError>;

/// Display device binding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The device refused the buffer-info record.
    Rejected,
    /// No such hardware layer.
    InvalidLayer,
    /// The device cannot accept the request right now.
    Busy,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Rejected => write!(f, "configuration rejected"),
            DeviceError::InvalidLayer => write!(f, "invalid layer"),
            DeviceError::Busy => write!(f, "device busy"),
        }
    }
}

/// Rendering engine error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// An argument was out of range.
    InvalidArgument,
    /// The engine ran out of command or tessellation memory.
    OutOfMemory,
    /// The operation is not supported by this engine.
    NotSupported,
    /// Pending work did not complete in time.
    Timeout,
    /// The engine has not been initialized.
    NotInitialized,
    /// Low-level I/O with the engine failed.
    Io,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidArgument => write!(f, "invalid argument"),
            EngineError::OutOfMemory => write!(f, "out of memory"),
            EngineError::NotSupported => write!(f, "not supported"),
            EngineError::Timeout => write!(f, "timeout"),
            EngineError::NotInitialized => write!(f, "not initialized"),
            EngineError::Io => write!(f, "I/O error"),
        }
    }
}

/// Layer subsystem error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The device binding rejected a configuration push.
    DeviceRejected {
        layer: LayerId,
        cause: DeviceError,
    },
    /// The rendering engine failed to initialize.
    EngineInit(EngineError),
    /// The rendering engine failed during a frame.
    Engine(EngineError),
    /// The engine did not drain its queue within the timeout.
    EngineStall,
    /// No buffer of the window is free to render into.
    RenderTargetUnavailable,
    /// A render target is already held; present it first.
    OutOfOrder,
    /// Frame buffer memory exhausted.
    OutOfMemory { requested: usize, available: usize },
    /// Backing memory is not aligned to the required boundary.
    Misaligned { address: usize, align: usize },
    /// The requested rectangle does not fit the layer.
    InvalidGeometry { layer: LayerId },
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
    /// No display with this id.
    UnknownDisplay(u8),
    /// No window with this id.
    UnknownWindow,
    /// The display already has a window.
    DisplayInUse(u8),
    /// Blend parameters cannot change once the layer is enabled.
    BlendLocked,
    /// The layer still has a scanout switch latched; retry after vsync.
    DisplayBusy { layer: LayerId },
}

impl DisplayError {
    /// Whether this error indicates a build-time or hardware mismatch
    /// that cannot be resolved while running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DisplayError::DeviceRejected { .. }
                | DisplayError::EngineInit(_)
                | DisplayError::OutOfMemory { .. }
                | DisplayError::Misaligned { .. }
                | DisplayError::InvalidGeometry { .. }
                | DisplayError::InvalidConfig(_)
        )
    }
}

impl From<EngineError> for DisplayError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Timeout => DisplayError::EngineStall,
            other => DisplayError::Engine(other),
        }
    }
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::DeviceRejected { layer, cause } => {
                write!(f, "layer {} rejected configuration: {}", layer.0, cause)
            }
            DisplayError::EngineInit(e) => write!(f, "engine init failed: {}", e),
            DisplayError::Engine(e) => write!(f, "engine error: {}", e),
            DisplayError::EngineStall => write!(f, "engine did not finish pending work"),
            DisplayError::RenderTargetUnavailable => write!(f, "no render target available"),
            DisplayError::OutOfOrder => write!(f, "render target already acquired"),
            DisplayError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "frame buffer memory exhausted: requested={}, available={}",
                requested, available
            ),
            DisplayError::Misaligned { address, align } => {
                write!(f, "address {:#x} not aligned to {}", address, align)
            }
            DisplayError::InvalidGeometry { layer } => {
                write!(f, "window does not fit layer {}", layer.0)
            }
            DisplayError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            DisplayError::UnknownDisplay(id) => write!(f, "unknown display {}", id),
            DisplayError::UnknownWindow => write!(f, "unknown window"),
            DisplayError::DisplayInUse(id) => write!(f, "display {} already has a window", id),
            DisplayError::BlendLocked => write!(f, "blend configuration locked"),
            DisplayError::DisplayBusy { layer } => {
                write!(f, "layer {} has a buffer switch pending", layer.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_timeout_is_stall() {
        assert_eq!(DisplayError::from(EngineError::Timeout), DisplayError::EngineStall);
        assert_eq!(
            DisplayError::from(EngineError::OutOfMemory),
            DisplayError::Engine(EngineError::OutOfMemory)
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DisplayError::EngineInit(EngineError::Io).is_fatal());
        assert!(DisplayError::DeviceRejected {
            layer: LayerId(0),
            cause: DeviceError::Rejected,
        }
        .is_fatal());
        assert!(!DisplayError::RenderTargetUnavailable.is_fatal());
        assert!(!DisplayError::EngineStall.is_fatal());
        assert!(!DisplayError::DisplayBusy { layer: LayerId(0) }.is_fatal());
    }
}
