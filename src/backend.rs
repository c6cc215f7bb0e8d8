//! Codec backend boundary.
//!
//! The engine validates, plans and assembles containers; turning samples into
//! compressed payloads is delegated to a [`CodecBackend`], one coding unit
//! (tile or strip) at a time.

use enough::Stop;

use crate::error::RasterError;
use crate::image::{CompressionMode, RasterImage};
use crate::info::FormatKind;
use crate::metadata::{BmpCompression, ChromaSubsampling, FormatMetadata, TiffCompression, WaveletTransform};
use crate::pixel::PixelDescriptor;
use crate::planner::{Layout, ProgressionOrder, Rect, RoiWeight};

/// Format-specific coding scheme handed to the backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CodecScheme {
    Wavelet {
        transform: WaveletTransform,
        levels: u8,
        layers: u16,
        progression: ProgressionOrder,
    },
    Av1 {
        subsampling: ChromaSubsampling,
        speed: u8,
    },
    Tiff(TiffCompression),
    Bmp(BmpCompression),
}

/// Coding parameters shared by every unit of one encode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CodecOptions {
    pub mode: CompressionMode,
    /// Target raw-to-compressed ratio (lossy only).
    pub compression_ratio: Option<f32>,
    pub scheme: CodecScheme,
}

impl CodecOptions {
    pub(crate) fn from_metadata(mode: CompressionMode, metadata: &FormatMetadata) -> Self {
        let scheme = match metadata {
            FormatMetadata::Jpeg2000(m) => CodecScheme::Wavelet {
                transform: m.transform,
                levels: m.decomposition_levels,
                layers: m.quality_layers,
                progression: m.progression,
            },
            FormatMetadata::Avif(m) => CodecScheme::Av1 {
                subsampling: m.subsampling,
                speed: m.speed,
            },
            FormatMetadata::Tiff(m) => CodecScheme::Tiff(m.compression),
            FormatMetadata::Bmp(m) => CodecScheme::Bmp(m.compression),
        };
        Self {
            mode,
            compression_ratio: match mode {
                CompressionMode::Lossy => metadata.compression_ratio(),
                CompressionMode::Lossless => None,
            },
            scheme,
        }
    }
}

/// One independently coded rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CodingUnit {
    pub format: FormatKind,
    pub index: u32,
    /// Full-resolution bounds in image coordinates.
    pub bounds: Rect,
    pub descriptor: PixelDescriptor,
    pub roi: RoiWeight,
}

impl CodingUnit {
    pub(crate) fn for_tile(image: &RasterImage, layout: &Layout, index: u32) -> Option<Self> {
        Some(Self {
            format: image.format(),
            index,
            bounds: layout.grid.tile_bounds(index)?,
            descriptor: image.descriptor(),
            roi: layout.roi_weight(index),
        })
    }

    /// Bytes of the unit's uncompressed samples at full resolution.
    pub fn raw_len(&self) -> usize {
        self.descriptor.bytes_per_pixel() * self.bounds.area() as usize
    }
}

/// What a decode asks of one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeTarget {
    pub level: u8,
    /// Highest quality layer to include (cumulative).
    pub layer: u16,
    /// Requested rectangle in absolute coordinates of `level`, within the
    /// unit's bounds at that level.
    pub region: Rect,
}

/// Compression backend.
pub trait CodecBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Reject images this backend cannot code. Called before any unit.
    fn check_support(&self, image: &RasterImage) -> Result<(), RasterError> {
        let _ = image;
        Ok(())
    }

    /// Compress the unit's samples (interleaved, row-major, tightly packed).
    fn compress(&self, pixels: &[u8], unit: &CodingUnit, options: &CodecOptions) -> Result<Vec<u8>, RasterError>;

    /// Reconstruct `target.region` from a payload produced by `compress`.
    fn decompress(&self, data: &[u8], unit: &CodingUnit, target: &DecodeTarget) -> Result<Vec<u8>, RasterError>;
}

/// Run `f` for every unit index, checking `stop` before each call. Results
/// keep the order of `indices`.
#[cfg(feature = "rayon")]
pub(crate) fn map_units<T, F>(indices: &[u32], stop: &dyn Stop, f: F) -> Result<Vec<T>, RasterError>
where
    T: Send,
    F: Fn(u32) -> Result<T, RasterError> + Sync + Send,
{
    use rayon::prelude::*;
    indices
        .par_iter()
        .map(|&index| {
            stop.check()?;
            f(index)
        })
        .collect()
}

/// Run `f` for every unit index, checking `stop` before each call.
#[cfg(not(feature = "rayon"))]
pub(crate) fn map_units<T, F>(indices: &[u32], stop: &dyn Stop, f: F) -> Result<Vec<T>, RasterError>
where
    F: Fn(u32) -> Result<T, RasterError>,
{
    indices
        .iter()
        .map(|&index| {
            stop.check()?;
            f(index)
        })
        .collect()
}

/// Reference backend that stores samples verbatim.
///
/// 1-bit TIFF samples are bit-packed per row, MSB first, so the output is a
/// readable uncompressed TIFF. Reduced resolutions are point-sampled.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughBackend;

impl PassthroughBackend {
    fn packs_bits(unit: &CodingUnit) -> bool {
        unit.format == FormatKind::Tiff && unit.descriptor.bit_depth == 1
    }
}

impl CodecBackend for PassthroughBackend {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn check_support(&self, image: &RasterImage) -> Result<(), RasterError> {
        match image.metadata() {
            FormatMetadata::Bmp(m) if m.compression != BmpCompression::Rgb => Err(
                RasterError::UnsupportedFeature(format!("{} cannot produce {:?} BMP data", self.name(), m.compression)),
            ),
            FormatMetadata::Tiff(m) if m.compression != TiffCompression::None => Err(
                RasterError::UnsupportedFeature(format!("{} cannot produce {:?} TIFF data", self.name(), m.compression)),
            ),
            _ => Ok(()),
        }
    }

    fn compress(&self, pixels: &[u8], unit: &CodingUnit, _options: &CodecOptions) -> Result<Vec<u8>, RasterError> {
        let needed = unit.raw_len();
        if pixels.len() < needed {
            return Err(RasterError::BufferTooSmall {
                needed,
                actual: pixels.len(),
            });
        }
        let pixels = &pixels[..needed];
        if Self::packs_bits(unit) {
            return Ok(pack_rows(pixels, unit.bounds.width as usize * usize::from(unit.descriptor.components)));
        }
        Ok(pixels.to_vec())
    }

    fn decompress(&self, data: &[u8], unit: &CodingUnit, target: &DecodeTarget) -> Result<Vec<u8>, RasterError> {
        let row_samples = unit.bounds.width as usize * usize::from(unit.descriptor.components);
        let unpacked;
        let samples = if Self::packs_bits(unit) {
            unpacked = unpack_rows(data, row_samples, unit.bounds.height as usize)?;
            &unpacked[..]
        } else {
            let needed = unit.raw_len();
            if data.len() < needed {
                return Err(RasterError::UnsupportedFeature(format!(
                    "payload of unit {} holds {} bytes, {needed} expected for stored samples",
                    unit.index,
                    data.len()
                )));
            }
            &data[..needed]
        };
        Ok(sample_region(samples, unit, target))
    }
}

/// Point-sample `target.region` out of a unit's full-resolution samples.
fn sample_region(samples: &[u8], unit: &CodingUnit, target: &DecodeTarget) -> Vec<u8> {
    let bpp = unit.descriptor.bytes_per_pixel();
    let stride = unit.bounds.width as usize * bpp;
    let region = target.region;
    let shift = u32::from(target.level);
    let last_x = u64::from(unit.bounds.width - 1);
    let last_y = u64::from(unit.bounds.height - 1);
    let to_local = |level_coord: u32, origin: u32, last: u64| -> usize {
        let full = u64::from(level_coord) << shift;
        full.saturating_sub(u64::from(origin)).min(last) as usize
    };

    let mut out = Vec::with_capacity(region.area() as usize * bpp);
    for y in region.y..region.y + region.height {
        let row = to_local(y, unit.bounds.y, last_y) * stride;
        if shift == 0 {
            let x0 = to_local(region.x, unit.bounds.x, last_x) * bpp;
            out.extend_from_slice(&samples[row + x0..row + x0 + region.width as usize * bpp]);
            continue;
        }
        for x in region.x..region.x + region.width {
            let px = row + to_local(x, unit.bounds.x, last_x) * bpp;
            out.extend_from_slice(&samples[px..px + bpp]);
        }
    }
    out
}

fn pack_rows(samples: &[u8], row_samples: usize) -> Vec<u8> {
    if row_samples == 0 {
        return Vec::new();
    }
    let row_bytes = row_samples.div_ceil(8);
    let mut out = Vec::with_capacity(samples.len() / row_samples * row_bytes);
    for row in samples.chunks_exact(row_samples) {
        for chunk in row.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &s)| acc | (u8::from(s != 0) << (7 - i)));
            out.push(byte);
        }
    }
    out
}

fn unpack_rows(data: &[u8], row_samples: usize, rows: usize) -> Result<Vec<u8>, RasterError> {
    let row_bytes = row_samples.div_ceil(8);
    let needed = row_bytes * rows;
    if data.len() < needed {
        return Err(RasterError::UnsupportedFeature(format!(
            "bilevel payload holds {} bytes, {needed} expected",
            data.len()
        )));
    }
    let mut out = Vec::with_capacity(row_samples * rows);
    for row in data[..needed].chunks_exact(row_bytes.max(1)).take(rows) {
        out.extend((0..row_samples).map(|i| (row[i / 8] >> (7 - i % 8)) & 1));
    }
    Ok(out)
}
