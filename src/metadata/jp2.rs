use super::BaseMetadata;
use crate::planner::{ProgressionOrder, RegionOfInterest, ResolutionPyramid, TileSize};

/// Wavelet transform kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WaveletTransform {
    /// 5/3 reversible (Le Gall) - required for lossless coding.
    #[default]
    Reversible53,
    /// 9/7 irreversible (CDF) - lossy only.
    Irreversible97,
}

impl WaveletTransform {
    /// Transform byte of the COD marker segment.
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Irreversible97 => 0,
            Self::Reversible53 => 1,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Irreversible97),
            1 => Some(Self::Reversible53),
            _ => None,
        }
    }
}

/// JPEG 2000 (JP2) coding parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Jp2Metadata {
    pub base: BaseMetadata,
    pub transform: WaveletTransform,
    /// Target ratio of raw size to codestream size (lossy only).
    pub compression_ratio: Option<f32>,
    /// `None` codes the whole image as one tile.
    pub tile_size: Option<TileSize>,
    pub decomposition_levels: u8,
    pub quality_layers: u16,
    pub progression: ProgressionOrder,
    pub roi: Option<RegionOfInterest>,
}

impl Jp2Metadata {
    /// Lossless defaults: 5/3 transform, one layer, LRCP, and up to five
    /// decomposition levels (fewer when the image is small).
    pub fn new(width: u32, height: u32, bit_depth: u8) -> Self {
        Self {
            base: BaseMetadata::new(width, height, bit_depth),
            transform: WaveletTransform::Reversible53,
            compression_ratio: None,
            tile_size: None,
            decomposition_levels: ResolutionPyramid::soft_level_ceiling(width, height).min(5),
            quality_layers: 1,
            progression: ProgressionOrder::Lrcp,
            roi: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_levels_respect_soft_ceiling() {
        assert_eq!(Jp2Metadata::new(4096, 4096, 8).decomposition_levels, 5);
        assert_eq!(Jp2Metadata::new(512, 512, 8).decomposition_levels, 4);
        assert_eq!(Jp2Metadata::new(16, 16, 8).decomposition_levels, 0);
    }

    #[test]
    fn transform_codes() {
        assert_eq!(WaveletTransform::from_code(1), Some(WaveletTransform::Reversible53));
        assert_eq!(WaveletTransform::Irreversible97.code(), 0);
        assert_eq!(WaveletTransform::from_code(2), None);
    }
}
