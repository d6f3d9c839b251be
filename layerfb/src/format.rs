//! Pixel format adaptation between the rendering engine and the display.
//!
//! The rendering engine names components in memory order starting from
//! the lowest byte, while the display driver names them from the most
//! significant bit. The same 32-bit pixel is therefore `Bgrx8888` to the
//! engine and `Xrgb8888` to the driver.
//!
//! Both conversions are total: anything without a counterpart falls back
//! to the 16-bit RGB565 layout of the other side.

/// Render target formats understood by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    Rgb565,
    Bgr565,
    Rgba8888,
    Bgra8888,
    Rgbx8888,
    Bgrx8888,
    Rgba4444,
    Bgra4444,
    Rgba5551,
    Bgra5551,
    /// 8-bit alpha only.
    A8,
    /// 8-bit luminance.
    L8,
}

impl BufferFormat {
    /// All engine formats.
    pub const ALL: [BufferFormat; 12] = [
        BufferFormat::Rgb565,
        BufferFormat::Bgr565,
        BufferFormat::Rgba8888,
        BufferFormat::Bgra8888,
        BufferFormat::Rgbx8888,
        BufferFormat::Bgrx8888,
        BufferFormat::Rgba4444,
        BufferFormat::Bgra4444,
        BufferFormat::Rgba5551,
        BufferFormat::Bgra5551,
        BufferFormat::A8,
        BufferFormat::L8,
    ];

    /// Get bytes per pixel.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            BufferFormat::Rgba8888
            | BufferFormat::Bgra8888
            | BufferFormat::Rgbx8888
            | BufferFormat::Bgrx8888 => 4,
            BufferFormat::A8 | BufferFormat::L8 => 1,
            _ => 2,
        }
    }
}

/// Scanout formats understood by the display driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoFormat {
    Xrgb8888,
    Rgbx8888,
    Xbgr8888,
    Bgrx8888,
    Rgb888,
    Bgr888,
    Rgb565,
    Bgr565,
    Xrgb1555,
    Rgbx5551,
    Xbgr1555,
    Bgrx5551,
    Xrgb4444,
    Rgbx4444,
    Xbgr4444,
    Bgrx4444,
    /// 8-bit palette index.
    Lut8,
    /// 8-bit monochrome.
    Mono8,
}

impl VideoFormat {
    /// All driver formats.
    pub const ALL: [VideoFormat; 18] = [
        VideoFormat::Xrgb8888,
        VideoFormat::Rgbx8888,
        VideoFormat::Xbgr8888,
        VideoFormat::Bgrx8888,
        VideoFormat::Rgb888,
        VideoFormat::Bgr888,
        VideoFormat::Rgb565,
        VideoFormat::Bgr565,
        VideoFormat::Xrgb1555,
        VideoFormat::Rgbx5551,
        VideoFormat::Xbgr1555,
        VideoFormat::Bgrx5551,
        VideoFormat::Xrgb4444,
        VideoFormat::Rgbx4444,
        VideoFormat::Xbgr4444,
        VideoFormat::Bgrx4444,
        VideoFormat::Lut8,
        VideoFormat::Mono8,
    ];

    /// Get bytes per pixel.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            VideoFormat::Xrgb8888
            | VideoFormat::Rgbx8888
            | VideoFormat::Xbgr8888
            | VideoFormat::Bgrx8888 => 4,
            VideoFormat::Rgb888 | VideoFormat::Bgr888 => 3,
            VideoFormat::Lut8 | VideoFormat::Mono8 => 1,
            _ => 2,
        }
    }
}

/// Map an engine format to the driver format describing the same memory.
pub fn to_driver_format(format: BufferFormat) -> VideoFormat {
    match format {
        BufferFormat::Bgr565 => VideoFormat::Rgb565,
        BufferFormat::Rgb565 => VideoFormat::Bgr565,
        BufferFormat::Bgrx8888 | BufferFormat::Bgra8888 => VideoFormat::Xrgb8888,
        BufferFormat::Rgbx8888 | BufferFormat::Rgba8888 => VideoFormat::Xbgr8888,
        BufferFormat::Bgra4444 => VideoFormat::Xrgb4444,
        BufferFormat::Rgba4444 => VideoFormat::Xbgr4444,
        BufferFormat::Bgra5551 => VideoFormat::Xrgb1555,
        BufferFormat::Rgba5551 => VideoFormat::Xbgr1555,
        BufferFormat::A8 | BufferFormat::L8 => VideoFormat::Rgb565,
    }
}

/// Map a driver format to the engine format describing the same memory.
pub fn to_renderer_format(format: VideoFormat) -> BufferFormat {
    match format {
        VideoFormat::Rgb565 => BufferFormat::Bgr565,
        VideoFormat::Bgr565 => BufferFormat::Rgb565,
        VideoFormat::Xrgb8888 => BufferFormat::Bgrx8888,
        VideoFormat::Xbgr8888 => BufferFormat::Rgbx8888,
        VideoFormat::Xrgb4444 => BufferFormat::Bgra4444,
        VideoFormat::Xbgr4444 => BufferFormat::Rgba4444,
        VideoFormat::Xrgb1555 => BufferFormat::Bgra5551,
        VideoFormat::Xbgr1555 => BufferFormat::Rgba5551,
        _ => BufferFormat::Rgb565,
    }
}

/// Whether the driver scans `format` out at its own pixel size, rather
/// than through the RGB565 fallback.
pub fn has_scanout_equivalent(format: BufferFormat) -> bool {
    format.bytes_per_pixel() == to_driver_format(format).bytes_per_pixel()
}

/// Row stride in bytes for `width` pixels of `format`.
pub fn compute_stride(width: u32, format: VideoFormat) -> u32 {
    width * format.bytes_per_pixel()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE_BIJECTIVE: [BufferFormat; 8] = [
        BufferFormat::Bgr565,
        BufferFormat::Rgb565,
        BufferFormat::Bgrx8888,
        BufferFormat::Rgbx8888,
        BufferFormat::Bgra4444,
        BufferFormat::Rgba4444,
        BufferFormat::Bgra5551,
        BufferFormat::Rgba5551,
    ];

    #[test]
    fn test_round_trip_both_directions() {
        for f in ENGINE_BIJECTIVE {
            let driver = to_driver_format(f);
            assert_eq!(to_renderer_format(driver), f);
            assert_eq!(to_driver_format(to_renderer_format(driver)), driver);
        }
    }

    #[test]
    fn test_alpha_variants_share_scanout_format() {
        assert_eq!(to_driver_format(BufferFormat::Bgra8888), VideoFormat::Xrgb8888);
        assert_eq!(to_driver_format(BufferFormat::Rgba8888), VideoFormat::Xbgr8888);
    }

    #[test]
    fn test_unknown_falls_back_to_rgb565() {
        assert_eq!(to_driver_format(BufferFormat::A8), VideoFormat::Rgb565);
        assert_eq!(to_renderer_format(VideoFormat::Lut8), BufferFormat::Rgb565);
        assert_eq!(to_renderer_format(VideoFormat::Rgb888), BufferFormat::Rgb565);
    }

    #[test]
    fn test_stride_table() {
        assert_eq!(compute_stride(720, VideoFormat::Xrgb8888), 2880);
        assert_eq!(compute_stride(10, VideoFormat::Bgr888), 30);
        assert_eq!(compute_stride(10, VideoFormat::Lut8), 10);
        assert_eq!(compute_stride(10, VideoFormat::Xrgb4444), 20);

        for f in VideoFormat::ALL {
            for width in [0u32, 1, 7, 320, 1280] {
                assert!(compute_stride(width, f) >= width * f.bytes_per_pixel());
            }
        }
    }

    #[test]
    fn test_engine_and_driver_sizes_agree() {
        for f in BufferFormat::ALL {
            let fallback = matches!(f, BufferFormat::A8 | BufferFormat::L8);
            assert_eq!(has_scanout_equivalent(f), !fallback);
        }
    }
}
