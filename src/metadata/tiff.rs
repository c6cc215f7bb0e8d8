use super::BaseMetadata;

/// TIFF `Compression` tag values supported by this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TiffCompression {
    #[default]
    None,
    Lzw,
    Deflate,
    PackBits,
}

impl TiffCompression {
    pub(crate) fn tag_value(self) -> u16 {
        match self {
            Self::None => 1,
            Self::Lzw => 5,
            Self::Deflate => 8,
            Self::PackBits => 32773,
        }
    }

    pub(crate) fn from_tag_value(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::None),
            5 => Some(Self::Lzw),
            8 | 32946 => Some(Self::Deflate),
            32773 => Some(Self::PackBits),
            _ => None,
        }
    }
}

/// TIFF layout parameters. Output is organised in full-width strips.
#[derive(Clone, Debug, PartialEq)]
pub struct TiffMetadata {
    pub base: BaseMetadata,
    pub compression: TiffCompression,
    /// `None` writes a single strip.
    pub rows_per_strip: Option<u32>,
}

impl TiffMetadata {
    pub fn new(width: u32, height: u32, bit_depth: u8) -> Self {
        Self {
            base: BaseMetadata::new(width, height, bit_depth),
            compression: TiffCompression::None,
            rows_per_strip: None,
        }
    }
}
