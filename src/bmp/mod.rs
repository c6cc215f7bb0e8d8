//! BMP envelope: file header, BITMAPV5HEADER, optional palette, pixel rows
//! and an embedded ICC profile.
//!
//! Samples are BMP-native: 3- and 4-component pixels are stored B, G, R(, A).
//! Uncompressed rows are written top-down and padded to 4 bytes; RLE
//! payloads are stored as produced by the backend, bottom-up as the format
//! requires.

mod header;

use std::borrow::Cow;

use tracing::trace;

use self::header::*;
use crate::decode::ParsedContainer;
use crate::error::RasterError;
use crate::image::{CompressionMode, RasterImage};
use crate::metadata::{BaseMetadata, BmpCompression, BmpMetadata, ColorSpace, FormatMetadata};
use crate::planner::Layout;

fn padded_row(width: u32, bytes_per_pixel: usize) -> Option<usize> {
    (width as usize)
        .checked_mul(bytes_per_pixel)?
        .checked_add(3)
        .map(|r| r & !3)
}

fn gray_palette(entries: usize) -> Vec<u8> {
    let step = 255 / (entries - 1).max(1);
    (0..entries)
        .flat_map(|i| {
            let v = (i * step) as u8;
            [v, v, v, 0]
        })
        .collect()
}

/// Assemble a BMP around the single coded unit.
pub(crate) fn write(image: &RasterImage, layout: &Layout, units: &[Vec<u8>]) -> Result<Vec<u8>, RasterError> {
    let FormatMetadata::Bmp(meta) = image.metadata() else {
        return Err(RasterError::Configuration("BMP envelope needs BMP metadata".into()));
    };
    if layout.grid.tile_count() != 1 || units.len() != 1 {
        return Err(RasterError::Configuration(format!(
            "BMP stores one coded unit, {} given",
            units.len()
        )));
    }
    let payload = &units[0];
    let base = &meta.base;
    let width = image.width();
    let height = image.height();
    let components = usize::from(image.components());
    let too_large = || RasterError::ResourceExhaustion(format!("{width}x{height} BMP exceeds 4 GiB"));

    let (bit_count, palette_entries) = match meta.compression {
        BmpCompression::Rgb => match components {
            1 => (8, 256),
            3 => (24, 0),
            _ => (32, 0),
        },
        BmpCompression::Rle8 => (8, 256),
        BmpCompression::Rle4 => (4, 16),
    };
    let compression = if bit_count == 32 { BI_BITFIELDS } else { meta.compression.code() };

    let pixel_data = match meta.compression {
        BmpCompression::Rgb => {
            let row = width as usize * components;
            let stride = padded_row(width, components).ok_or_else(too_large)?;
            let needed = row * height as usize;
            if payload.len() < needed {
                return Err(RasterError::BufferTooSmall {
                    needed,
                    actual: payload.len(),
                });
            }
            if stride == row {
                Cow::Borrowed(&payload[..needed])
            } else {
                let mut padded = Vec::with_capacity(stride * height as usize);
                for src in payload[..needed].chunks_exact(row) {
                    padded.extend_from_slice(src);
                    padded.resize(padded.len() + stride - row, 0);
                }
                Cow::Owned(padded)
            }
        }
        BmpCompression::Rle8 | BmpCompression::Rle4 => Cow::Borrowed(&payload[..]),
    };

    let palette = if palette_entries > 0 { gray_palette(palette_entries) } else { Vec::new() };
    let data_offset = FILE_HEADER_LEN + V5_HEADER_LEN + palette.len();
    let profile_offset = data_offset + pixel_data.len();
    let icc = base.icc_profile.as_deref().unwrap_or_default();
    let file_size = u32::try_from(profile_offset + icc.len()).map_err(|_| too_large())?;

    let cs_type = match (&base.icc_profile, base.color_space) {
        (Some(_), _) => PROFILE_EMBEDDED,
        (None, ColorSpace::Srgb | ColorSpace::Gray) => LCS_SRGB,
        (None, _) => LCS_CALIBRATED_RGB,
    };
    let info = InfoHeader {
        header_len: V5_HEADER_LEN as u32,
        width: i32::try_from(width).map_err(|_| too_large())?,
        height: match meta.compression {
            BmpCompression::Rgb => -(height as i32),
            _ => height as i32,
        },
        bit_count,
        compression,
        image_size: pixel_data.len() as u32,
        pixels_per_meter: meta.pixels_per_meter,
        colors_used: palette_entries as u32,
        masks: (compression == BI_BITFIELDS).then_some(BGRA_MASKS),
        cs_type: Some(cs_type),
        profile: base
            .icc_profile
            .as_ref()
            .map(|icc| ((profile_offset - FILE_HEADER_LEN) as u32, icc.len() as u32)),
    };

    let mut out = Vec::with_capacity(file_size as usize);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(data_offset as u32).to_le_bytes());
    info.write(&mut out);
    out.extend_from_slice(&palette);
    out.extend_from_slice(&pixel_data);
    out.extend_from_slice(icc);
    trace!(bytes = out.len(), bit_count, compression, "assembled BMP");
    Ok(out)
}

fn is_gray_palette(palette: &[u8]) -> bool {
    let expected = gray_palette(palette.len() / 4);
    palette
        .chunks_exact(4)
        .zip(expected.chunks_exact(4))
        .all(|(got, want)| got[..3] == want[..3])
}

/// Parse a BMP into its image description and its single payload.
pub(crate) fn parse(data: &[u8]) -> Result<ParsedContainer<'_>, RasterError> {
    if data.len() < FILE_HEADER_LEN || &data[..2] != b"BM" {
        return Err(RasterError::violation(0, "missing BM file header"));
    }
    let data_offset = u32::from_le_bytes([data[10], data[11], data[12], data[13]]) as usize;
    let info = InfoHeader::read(data)?;
    let width = info.width as u32;
    let height = info.rows();

    let (compression, components) = match (BmpCompression::from_code(info.compression), info.bit_count) {
        (Some(BmpCompression::Rgb), 8) => (BmpCompression::Rgb, 1),
        (Some(BmpCompression::Rgb), 24) => (BmpCompression::Rgb, 3),
        (Some(BmpCompression::Rgb), 32) => (BmpCompression::Rgb, 4),
        (None, 32)
            if info.compression == BI_BITFIELDS
                && matches!(info.masks, Some([r, g, b, _]) if [r, g, b] == BGRA_MASKS[..3]) =>
        {
            (BmpCompression::Rgb, 4)
        }
        (Some(rle @ BmpCompression::Rle8), 8) | (Some(rle @ BmpCompression::Rle4), 4) => (rle, 1),
        (_, bits) => {
            let compression = info.compression;
            return Err(RasterError::UnsupportedFeature(format!(
                "{bits}-bit BMP with compression {compression}"
            )));
        }
    };

    if info.bit_count <= 8 {
        let entries = match info.colors_used {
            0 => 1usize << info.bit_count,
            n if n > 1 << info.bit_count => {
                return Err(RasterError::violation(FILE_HEADER_LEN + 32, format!("{n} palette entries for {} bits", info.bit_count)));
            }
            n => n as usize,
        };
        let start = FILE_HEADER_LEN + info.header_len as usize
            + if info.compression == BI_BITFIELDS && info.header_len < 56 { 12 } else { 0 };
        let palette = data
            .get(start..start.saturating_add(entries * 4))
            .ok_or_else(|| RasterError::violation(start, "palette runs past the end of the file"))?;
        if !is_gray_palette(palette) {
            return Err(RasterError::UnsupportedFeature("BMP with a colour palette".into()));
        }
    }

    let pixels = data
        .get(data_offset..)
        .ok_or_else(|| RasterError::violation(10, format!("pixel data offset {data_offset} is past the end")))?;
    let unit = match compression {
        BmpCompression::Rgb => {
            let row = width as usize * components;
            let stride = padded_row(width, components)
                .ok_or_else(|| RasterError::ResourceExhaustion(format!("{width}-pixel BMP rows overflow")))?;
            let needed = stride
                .checked_mul(height as usize)
                .ok_or_else(|| RasterError::ResourceExhaustion(format!("{width}x{height} BMP overflows")))?;
            if pixels.len() < needed {
                return Err(RasterError::violation(
                    data.len(),
                    format!("BMP pixel data holds {} bytes, {needed} expected", pixels.len()),
                ));
            }
            let pixels = &pixels[..needed];
            if info.top_down() && stride == row {
                Cow::Borrowed(pixels)
            } else {
                let mut rows: Vec<&[u8]> = pixels.chunks_exact(stride).map(|r| &r[..row]).collect();
                if !info.top_down() {
                    rows.reverse();
                }
                Cow::Owned(rows.concat())
            }
        }
        BmpCompression::Rle8 | BmpCompression::Rle4 => {
            let len = match info.image_size {
                0 => pixels.len(),
                n => n as usize,
            };
            let stream = pixels
                .get(..len)
                .ok_or_else(|| RasterError::violation(data_offset, "RLE data runs past the end of the file"))?;
            Cow::Borrowed(stream)
        }
    };

    let mut base = BaseMetadata::new(width, height, 8);
    base.color_space = match info.cs_type {
        None | Some(LCS_SRGB | LCS_WINDOWS | PROFILE_EMBEDDED) if components == 1 => ColorSpace::Gray,
        None | Some(LCS_SRGB | LCS_WINDOWS | PROFILE_EMBEDDED) => ColorSpace::Srgb,
        Some(_) => ColorSpace::Unspecified,
    };
    if let (Some(PROFILE_EMBEDDED), Some((offset, size))) = (info.cs_type, info.profile) {
        let start = FILE_HEADER_LEN + offset as usize;
        let icc = data
            .get(start..start.saturating_add(size as usize))
            .ok_or_else(|| RasterError::violation(start, "embedded ICC profile runs past the end of the file"))?;
        base.icc_profile = Some(icc.to_vec());
        base.color_space = ColorSpace::Unspecified;
    }

    let meta = BmpMetadata {
        base,
        compression,
        pixels_per_meter: info.pixels_per_meter,
    };
    Ok(ParsedContainer {
        image: RasterImage::from_parts(components as u16, false, CompressionMode::Lossless, FormatMetadata::Bmp(meta)),
        units: vec![unit],
    })
}
