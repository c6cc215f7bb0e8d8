//! Per-format metadata records.
//!
//! Every format record embeds a [`BaseMetadata`] that mirrors the owning
//! image's width, height and bit depth and carries the shared color and blob
//! fields. [`FormatMetadata`] is the tagged variant over the four formats.

mod avif;
mod bmp;
mod geo;
mod jp2;
mod teardown;
mod tiff;

pub use avif::{AvifMetadata, ChromaSubsampling};
pub use bmp::{BmpCompression, BmpMetadata};
pub use geo::GeoReference;
pub use jp2::{Jp2Metadata, WaveletTransform};
pub use teardown::{STAGED_TEARDOWN_THRESHOLD, TeardownReport};
pub use tiff::{TiffCompression, TiffMetadata};

use chrono::{DateTime, Utc};

use crate::info::FormatKind;

/// Color space tag.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    #[default]
    Unspecified,
    Gray,
    Srgb,
    /// sYCC.
    Ycc,
    Bt709,
    DisplayP3,
    /// BT.2100 perceptual quantizer.
    Bt2100Pq,
    /// BT.2100 hybrid log-gamma.
    Bt2100Hlg,
    Cmyk,
}

impl ColorSpace {
    pub fn is_hdr(self) -> bool {
        matches!(self, Self::Bt2100Pq | Self::Bt2100Hlg)
    }

    /// Coding-independent code points: (primaries, transfer, matrix).
    pub(crate) fn cicp(self) -> (u16, u16, u16) {
        match self {
            Self::Unspecified => (2, 2, 2),
            Self::Gray | Self::Srgb | Self::Cmyk => (1, 13, 6),
            Self::Ycc => (1, 13, 5),
            Self::Bt709 => (1, 1, 1),
            Self::DisplayP3 => (12, 13, 6),
            Self::Bt2100Pq => (9, 16, 9),
            Self::Bt2100Hlg => (9, 18, 9),
        }
    }

    pub(crate) fn from_cicp(primaries: u16, transfer: u16, matrix: u16, components: u16) -> Self {
        match (primaries, transfer, matrix) {
            (1, 13, 5) => Self::Ycc,
            (1, 13, _) if components == 1 => Self::Gray,
            (1, 13, _) => Self::Srgb,
            (1, 1, _) => Self::Bt709,
            (12, 13, _) => Self::DisplayP3,
            (9, 16, _) => Self::Bt2100Pq,
            (9, 18, _) => Self::Bt2100Hlg,
            _ => Self::Unspecified,
        }
    }
}

/// HDR mastering and content light level information.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HdrMetadata {
    /// Maximum mastering display luminance in cd/m².
    pub max_luminance: f64,
    /// Minimum mastering display luminance in cd/m².
    pub min_luminance: f64,
    /// Maximum content light level in cd/m².
    pub max_content_light_level: u16,
    /// Maximum frame-average light level in cd/m².
    pub max_frame_average_light_level: u16,
}

/// Fields shared by every format record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BaseMetadata {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_space: ColorSpace,
    pub icc_profile: Option<Vec<u8>>,
    pub exif: Option<Vec<u8>>,
    pub xmp: Option<Vec<u8>>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub hdr: Option<HdrMetadata>,
    pub geo: Option<GeoReference>,
}

impl BaseMetadata {
    pub fn new(width: u32, height: u32, bit_depth: u8) -> Self {
        Self {
            width,
            height,
            bit_depth,
            ..Default::default()
        }
    }

    /// Bytes held in ICC, EXIF, XMP and geotag buffers.
    pub fn blob_bytes(&self) -> usize {
        let len = |b: &Option<Vec<u8>>| b.as_ref().map_or(0, Vec::len);
        len(&self.icc_profile)
            + len(&self.exif)
            + len(&self.xmp)
            + self.geo.as_ref().map_or(0, GeoReference::blob_bytes)
    }

    /// Advisory estimate of the serialized metadata size.
    pub fn estimated_size(&self) -> usize {
        const FIXED_OVERHEAD: usize = 256;
        FIXED_OVERHEAD + self.blob_bytes() + self.geo.as_ref().map_or(0, GeoReference::estimated_size)
    }
}

/// Format-specific metadata, one variant per supported format.
#[derive(Clone, Debug, PartialEq)]
pub enum FormatMetadata {
    Jpeg2000(Jp2Metadata),
    Avif(AvifMetadata),
    Tiff(TiffMetadata),
    Bmp(BmpMetadata),
}

impl FormatMetadata {
    /// Default record for `format`.
    pub fn new(format: FormatKind, width: u32, height: u32, bit_depth: u8) -> Self {
        match format {
            FormatKind::Jpeg2000 => Self::Jpeg2000(Jp2Metadata::new(width, height, bit_depth)),
            FormatKind::Avif => Self::Avif(AvifMetadata::new(width, height, bit_depth)),
            FormatKind::Tiff => Self::Tiff(TiffMetadata::new(width, height, bit_depth)),
            FormatKind::Bmp => Self::Bmp(BmpMetadata::new(width, height, bit_depth)),
        }
    }

    pub fn format(&self) -> FormatKind {
        match self {
            Self::Jpeg2000(_) => FormatKind::Jpeg2000,
            Self::Avif(_) => FormatKind::Avif,
            Self::Tiff(_) => FormatKind::Tiff,
            Self::Bmp(_) => FormatKind::Bmp,
        }
    }

    pub fn base(&self) -> &BaseMetadata {
        match self {
            Self::Jpeg2000(m) => &m.base,
            Self::Avif(m) => &m.base,
            Self::Tiff(m) => &m.base,
            Self::Bmp(m) => &m.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseMetadata {
        match self {
            Self::Jpeg2000(m) => &mut m.base,
            Self::Avif(m) => &mut m.base,
            Self::Tiff(m) => &mut m.base,
            Self::Bmp(m) => &mut m.base,
        }
    }

    /// Explicit target compression ratio, for formats that have one.
    pub fn compression_ratio(&self) -> Option<f32> {
        match self {
            Self::Jpeg2000(m) => m.compression_ratio,
            Self::Avif(m) => m.compression_ratio,
            Self::Tiff(_) | Self::Bmp(_) => None,
        }
    }

    pub fn as_jp2(&self) -> Option<&Jp2Metadata> {
        match self {
            Self::Jpeg2000(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_jp2_mut(&mut self) -> Option<&mut Jp2Metadata> {
        match self {
            Self::Jpeg2000(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_avif_mut(&mut self) -> Option<&mut AvifMetadata> {
        match self {
            Self::Avif(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_tiff_mut(&mut self) -> Option<&mut TiffMetadata> {
        match self {
            Self::Tiff(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bmp_mut(&mut self) -> Option<&mut BmpMetadata> {
        match self {
            Self::Bmp(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_duplicates_buffers() {
        let mut meta = FormatMetadata::new(FormatKind::Jpeg2000, 64, 64, 8);
        meta.base_mut().icc_profile = Some(vec![7; 200]);
        let mut copy = meta.clone();
        copy.base_mut().icc_profile.as_mut().unwrap()[0] = 1;
        assert_eq!(meta.base().icc_profile.as_ref().unwrap()[0], 7);
        assert_ne!(
            meta.base().icc_profile.as_ref().unwrap().as_ptr(),
            copy.base().icc_profile.as_ref().unwrap().as_ptr()
        );
    }

    #[test]
    fn format_tag_follows_variant() {
        for kind in FormatKind::ALL {
            assert_eq!(FormatMetadata::new(kind, 8, 8, 8).format(), kind);
        }
    }

    #[test]
    fn cicp_round_trip_for_named_spaces() {
        for cs in [
            ColorSpace::Srgb,
            ColorSpace::Ycc,
            ColorSpace::Bt709,
            ColorSpace::DisplayP3,
            ColorSpace::Bt2100Pq,
            ColorSpace::Bt2100Hlg,
        ] {
            let (p, t, m) = cs.cicp();
            assert_eq!(ColorSpace::from_cicp(p, t, m, 3), cs);
        }
        let (p, t, m) = ColorSpace::Gray.cicp();
        assert_eq!(ColorSpace::from_cicp(p, t, m, 1), ColorSpace::Gray);
    }

    #[test]
    fn blob_bytes_counts_all_buffers() {
        let mut base = BaseMetadata::new(1, 1, 8);
        base.icc_profile = Some(vec![0; 10]);
        base.xmp = Some(vec![0; 5]);
        base.geo = Some(GeoReference {
            geotag: Some(vec![0; 4]),
            ..GeoReference::from_affine([0.0, 1.0, 0.0, 0.0, 0.0, -1.0])
        });
        assert_eq!(base.blob_bytes(), 19);
    }
}
