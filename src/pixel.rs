/// Sample layout of an interleaved pixel buffer.
///
/// Buffers are row-major, top-down, with components interleaved per pixel.
/// Each sample occupies [`bytes_per_sample`](Self::bytes_per_sample) bytes;
/// multi-byte samples are little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelDescriptor {
    pub components: u16,
    pub bit_depth: u8,
    pub signed: bool,
}

impl PixelDescriptor {
    pub const GRAY8: Self = Self::new(1, 8);
    pub const RGB8: Self = Self::new(3, 8);
    pub const RGBA8: Self = Self::new(4, 8);
    pub const RGB16: Self = Self::new(3, 16);

    pub const fn new(components: u16, bit_depth: u8) -> Self {
        Self {
            components,
            bit_depth,
            signed: false,
        }
    }

    /// Storage bytes for one sample: 1, 2, 4 or 8.
    pub fn bytes_per_sample(&self) -> usize {
        match self.bit_depth {
            0..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            _ => 8,
        }
    }

    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_sample() * self.components as usize
    }

    /// Bytes of one unpadded row.
    pub fn row_bytes(&self, width: u32) -> Option<usize> {
        (width as usize).checked_mul(self.bytes_per_pixel())
    }

    /// Bytes of a full `width` x `height` buffer, or `None` on overflow.
    pub fn buffer_len(&self, width: u32, height: u32) -> Option<usize> {
        self.row_bytes(width)?.checked_mul(height as usize)
    }
}

#[cfg(feature = "rgb")]
mod typed {
    use super::PixelDescriptor;

    /// Pixel types that can view an 8-bit decoded buffer without copying.
    pub trait DecodePixel: Copy + 'static {
        fn descriptor() -> PixelDescriptor;
    }

    impl DecodePixel for rgb::RGB8 {
        fn descriptor() -> PixelDescriptor {
            PixelDescriptor::RGB8
        }
    }

    impl DecodePixel for rgb::RGBA8 {
        fn descriptor() -> PixelDescriptor {
            PixelDescriptor::RGBA8
        }
    }
}

#[cfg(feature = "rgb")]
pub use typed::DecodePixel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_widths() {
        assert_eq!(PixelDescriptor::new(1, 1).bytes_per_sample(), 1);
        assert_eq!(PixelDescriptor::new(3, 10).bytes_per_pixel(), 6);
        assert_eq!(PixelDescriptor::new(2, 32).bytes_per_pixel(), 8);
        assert_eq!(PixelDescriptor::new(1, 38).bytes_per_sample(), 8);
    }

    #[test]
    fn buffer_len_overflow_is_none() {
        let d = PixelDescriptor::new(16384, 38);
        assert!(d.buffer_len(u32::MAX, u32::MAX).is_none());
        assert_eq!(PixelDescriptor::RGB8.buffer_len(4, 3), Some(36));
    }
}
