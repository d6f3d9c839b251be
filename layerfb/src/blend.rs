//! Per-layer alpha compositing.
//!
//! The display controller latches blend parameters in shadow registers;
//! they only reach the mixer when the layer's enable path runs. The
//! window manager therefore programs them exactly once, right before
//! the first enable of each layer.

use crate::display::{DisplayController, LayerId};
use crate::error::{DisplayError, Result};

/// How a layer's alpha is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    /// Use the alpha channel stored in each pixel.
    Embedded,
    /// Replace every pixel's alpha with the global alpha.
    Override,
    /// Multiply pixel alpha by the global alpha.
    Multiply,
}

/// Layer blend parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendConfig {
    /// Alpha source.
    pub alpha_mode: AlphaMode,
    /// Global alpha, 0 (transparent) to 255 (opaque).
    pub global_alpha: u8,
}

impl BlendConfig {
    pub const fn new() -> Self {
        BlendConfig {
            alpha_mode: AlphaMode::Embedded,
            global_alpha: 0xFF,
        }
    }

    pub const fn with_global_alpha(alpha_mode: AlphaMode, global_alpha: u8) -> Self {
        BlendConfig {
            alpha_mode,
            global_alpha,
        }
    }
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Program `config` into the shadow registers of `layer`.
pub fn apply_blend_config<C: DisplayController>(
    controller: &mut C,
    layer: LayerId,
    config: &BlendConfig,
) -> Result<()> {
    log::debug!(
        "[layerfb] layer {} blend {:?} alpha={}",
        layer.0,
        config.alpha_mode,
        config.global_alpha
    );
    controller
        .set_layer_blend(layer, config)
        .map_err(|cause| DisplayError::DeviceRejected { layer, cause })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::LayerDevice;
    use crate::error::DeviceError;
    use crate::sim::{ShadowRegs, SimController, SimTrace};

    #[test]
    fn test_blend_staged_until_enable() {
        let trace = SimTrace::new();
        let mut controller = SimController::new(2, trace.clone());
        let mut layer = controller.open(LayerId(1)).unwrap();
        let cfg = BlendConfig::with_global_alpha(AlphaMode::Multiply, 0x40);

        apply_blend_config(&mut controller, LayerId(1), &cfg).unwrap();
        let state = controller.layer(LayerId(1)).unwrap();
        assert_eq!(state.shadow_blend, Some(cfg));
        assert!(state.dirty.contains(ShadowRegs::BLEND));
        assert_eq!(state.active_blend, None);

        layer.enable().unwrap();
        let state = controller.layer(LayerId(1)).unwrap();
        assert_eq!(state.active_blend, Some(cfg));
        assert!(state.dirty.is_empty());
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let mut controller = SimController::new(1, SimTrace::new());
        assert_eq!(
            apply_blend_config(&mut controller, LayerId(3), &BlendConfig::new()),
            Err(DisplayError::DeviceRejected {
                layer: LayerId(3),
                cause: DeviceError::InvalidLayer,
            })
        );
    }
}
