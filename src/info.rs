use crate::container::JP2_SIGNATURE;
use crate::error::RasterError;

/// Supported container formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// JP2 wrapper around a JPEG 2000 codestream.
    Jpeg2000,
    /// AVIF still image (HEIF box structure).
    Avif,
    Tiff,
    Bmp,
}

/// Structural bounds of a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_components: u16,
    /// Accepted bit depths, inclusive range. Formats with a sparse set
    /// further restrict it through [`FormatKind::supports_bit_depth`].
    pub min_bit_depth: u8,
    pub max_bit_depth: u8,
}

impl FormatKind {
    pub const ALL: [FormatKind; 4] = [Self::Jpeg2000, Self::Avif, Self::Tiff, Self::Bmp];

    pub fn limits(self) -> FormatLimits {
        match self {
            Self::Jpeg2000 => FormatLimits {
                max_width: u32::MAX,
                max_height: u32::MAX,
                max_components: 16384,
                min_bit_depth: 1,
                max_bit_depth: 38,
            },
            Self::Avif => FormatLimits {
                max_width: 65536,
                max_height: 65536,
                max_components: 4,
                min_bit_depth: 8,
                max_bit_depth: 12,
            },
            Self::Tiff => FormatLimits {
                max_width: u32::MAX,
                max_height: u32::MAX,
                max_components: 16,
                min_bit_depth: 1,
                max_bit_depth: 32,
            },
            Self::Bmp => FormatLimits {
                max_width: i32::MAX as u32,
                max_height: i32::MAX as u32,
                max_components: 4,
                min_bit_depth: 8,
                max_bit_depth: 8,
            },
        }
    }

    pub fn supports_bit_depth(self, bit_depth: u8) -> bool {
        match self {
            Self::Jpeg2000 => (1..=38).contains(&bit_depth),
            Self::Avif => matches!(bit_depth, 8 | 10 | 12),
            Self::Tiff => matches!(bit_depth, 1 | 8 | 16 | 32),
            Self::Bmp => bit_depth == 8,
        }
    }

    pub fn supports_components(self, components: u16) -> bool {
        match self {
            Self::Bmp => matches!(components, 1 | 3 | 4),
            _ => (1..=self.limits().max_components).contains(&components),
        }
    }

    pub fn supports_signed(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Tiff)
    }

    pub fn supports_lossy(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Avif)
    }

    /// Rectangular tile grids (TIFF uses full-width strips).
    pub fn supports_tiling(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Tiff)
    }

    /// Wavelet decomposition, quality layers and progression orders.
    pub fn supports_wavelet(self) -> bool {
        self == Self::Jpeg2000
    }

    pub fn supports_hdr(self) -> bool {
        matches!(self, Self::Avif | Self::Jpeg2000)
    }

    pub fn supports_exif(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Avif)
    }

    pub fn supports_xmp(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Avif | Self::Tiff)
    }

    pub fn supports_geo(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Tiff)
    }

    /// Whether the container is made of size-prefixed boxes.
    pub fn is_box_based(self) -> bool {
        matches!(self, Self::Jpeg2000 | Self::Avif)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg2000 => "jp2",
            Self::Avif => "avif",
            Self::Tiff => "tif",
            Self::Bmp => "bmp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg2000 => "image/jp2",
            Self::Avif => "image/avif",
            Self::Tiff => "image/tiff",
            Self::Bmp => "image/bmp",
        }
    }
}

impl core::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Jpeg2000 => "JPEG 2000",
            Self::Avif => "AVIF",
            Self::Tiff => "TIFF",
            Self::Bmp => "BMP",
        })
    }
}

/// Identify the container format from leading bytes.
///
/// Box-based formats are recognised from their first box only: JP2 by its
/// exact 12-byte signature box, AVIF by a leading `ftyp` whose major or
/// compatible brands include `avif` or `avis`. Never panics.
pub fn detect(data: &[u8]) -> Option<FormatKind> {
    if data.starts_with(&JP2_SIGNATURE) {
        return Some(FormatKind::Jpeg2000);
    }
    if is_avif_ftyp(data) {
        return Some(FormatKind::Avif);
    }
    if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        return Some(FormatKind::Tiff);
    }
    if data.starts_with(b"BM") {
        return Some(FormatKind::Bmp);
    }
    None
}

fn is_avif_ftyp(data: &[u8]) -> bool {
    if data.len() < 16 || &data[4..8] != b"ftyp" {
        return false;
    }
    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if size < 16 {
        return false;
    }
    let end = size.min(data.len());
    let is_avif_brand = |b: &[u8]| b == b"avif" || b == b"avis";
    // major brand, minor version, then compatible brands
    is_avif_brand(&data[8..12]) || data[16..end].chunks_exact(4).any(is_avif_brand)
}

/// Header summary, obtained without decompressing any payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    pub format: FormatKind,
    pub width: u32,
    pub height: u32,
    pub components: u16,
    pub bit_depth: u8,
    pub signed: bool,
    /// Decodable resolution levels (decomposition levels + 1).
    pub resolution_levels: u8,
    pub quality_layers: u16,
    pub tile_count: u32,
}

impl ImageInfo {
    /// Probe a container without decoding pixel data.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RasterError> {
        let parsed = crate::decode::parse_container(data)?;
        let image = &parsed.image;
        let layout = crate::planner::Layout::plan(image)?;
        Ok(Self {
            format: image.format(),
            width: image.width(),
            height: image.height(),
            components: image.components(),
            bit_depth: image.bit_depth(),
            signed: image.is_signed(),
            resolution_levels: layout.pyramid.levels() + 1,
            quality_layers: layout.layers.count(),
            tile_count: layout.grid.tile_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_signatures() {
        assert_eq!(detect(&JP2_SIGNATURE), Some(FormatKind::Jpeg2000));
        assert_eq!(detect(b"II*\0\x08\0\0\0"), Some(FormatKind::Tiff));
        assert_eq!(detect(b"MM\0*\0\0\0\x08"), Some(FormatKind::Tiff));
        assert_eq!(detect(b"BM\0\0"), Some(FormatKind::Bmp));
        assert_eq!(detect(b""), None);
        assert_eq!(detect(b"\x89PNG\r\n\x1a\n"), None);
    }

    #[test]
    fn jp2_signature_must_match_exactly() {
        let mut sig = JP2_SIGNATURE;
        sig[11] ^= 1;
        assert_eq!(detect(&sig), None);
        assert_eq!(detect(&JP2_SIGNATURE[..11]), None);
    }

    #[test]
    fn avif_brand_in_compatible_list() {
        let mut ftyp = Vec::new();
        ftyp.extend_from_slice(&24u32.to_be_bytes());
        ftyp.extend_from_slice(b"ftypmif1\0\0\0\0miafavif");
        assert_eq!(detect(&ftyp), Some(FormatKind::Avif));

        let mut heic = ftyp.clone();
        heic[20..24].copy_from_slice(b"heic");
        assert_eq!(detect(&heic), None);
    }

    #[test]
    fn sparse_bit_depths() {
        assert!(FormatKind::Avif.supports_bit_depth(10));
        assert!(!FormatKind::Avif.supports_bit_depth(9));
        assert!(FormatKind::Tiff.supports_bit_depth(1));
        assert!(!FormatKind::Tiff.supports_bit_depth(12));
        assert!(!FormatKind::Bmp.supports_components(2));
    }
}
