use super::BaseMetadata;

/// Chroma subsampling of the AV1 payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChromaSubsampling {
    #[default]
    Yuv444,
    Yuv422,
    Yuv420,
    /// Monochrome.
    Yuv400,
}

impl ChromaSubsampling {
    /// (subsampling_x, subsampling_y, monochrome) as stored in `av1C`.
    pub(crate) fn av1c_flags(self) -> (bool, bool, bool) {
        match self {
            Self::Yuv444 => (false, false, false),
            Self::Yuv422 => (true, false, false),
            Self::Yuv420 => (true, true, false),
            Self::Yuv400 => (true, true, true),
        }
    }

    pub(crate) fn from_av1c_flags(x: bool, y: bool, mono: bool) -> Self {
        match (x, y, mono) {
            (_, _, true) => Self::Yuv400,
            (true, true, false) => Self::Yuv420,
            (true, false, false) => Self::Yuv422,
            _ => Self::Yuv444,
        }
    }
}

/// AVIF coding parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AvifMetadata {
    pub base: BaseMetadata,
    pub subsampling: ChromaSubsampling,
    /// Target ratio of raw size to payload size (lossy only).
    pub compression_ratio: Option<f32>,
    /// Encoder speed hint, 0 (slowest) to 10.
    pub speed: u8,
}

impl AvifMetadata {
    pub fn new(width: u32, height: u32, bit_depth: u8) -> Self {
        Self {
            base: BaseMetadata::new(width, height, bit_depth),
            subsampling: ChromaSubsampling::Yuv444,
            compression_ratio: None,
            speed: 6,
        }
    }
}
