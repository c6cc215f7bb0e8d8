use super::BaseMetadata;

/// BMP `biCompression` values supported by this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BmpCompression {
    #[default]
    Rgb,
    Rle8,
    Rle4,
}

impl BmpCompression {
    pub(crate) fn code(self) -> u32 {
        match self {
            Self::Rgb => 0,
            Self::Rle8 => 1,
            Self::Rle4 => 2,
        }
    }

    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Rgb),
            1 => Some(Self::Rle8),
            2 => Some(Self::Rle4),
            _ => None,
        }
    }
}

/// BMP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct BmpMetadata {
    pub base: BaseMetadata,
    pub compression: BmpCompression,
    /// Horizontal and vertical resolution.
    pub pixels_per_meter: (i32, i32),
}

impl BmpMetadata {
    pub fn new(width: u32, height: u32, bit_depth: u8) -> Self {
        Self {
            base: BaseMetadata::new(width, height, bit_depth),
            compression: BmpCompression::Rgb,
            // 72 DPI
            pixels_per_meter: (2835, 2835),
        }
    }
}
