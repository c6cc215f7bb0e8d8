//! TIFF envelope: classic little-endian TIFF with full-width strips.
//!
//! Reading accepts either byte order. BigTIFF, tiled layouts, planar
//! configuration 2 and floating-point samples are reported as unsupported.

mod ifd;

use std::borrow::Cow;

use chrono::NaiveDateTime;
use tracing::trace;

use self::ifd::*;
use crate::decode::ParsedContainer;
use crate::error::RasterError;
use crate::image::{CompressionMode, RasterImage};
use crate::metadata::{BaseMetadata, ColorSpace, FormatMetadata, GeoReference, TiffCompression, TiffMetadata};
use crate::planner::Layout;

const DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

fn photometric(color_space: ColorSpace, components: u16) -> u16 {
    match (color_space, components) {
        (ColorSpace::Cmyk, 4..) => 5,
        (_, 1 | 2) => 1,
        _ => 2,
    }
}

fn color_space_of(photometric: u64) -> ColorSpace {
    match photometric {
        0 | 1 => ColorSpace::Gray,
        2 => ColorSpace::Srgb,
        5 => ColorSpace::Cmyk,
        6 => ColorSpace::Ycc,
        _ => ColorSpace::Unspecified,
    }
}

/// Assemble a TIFF from one payload per strip.
pub(crate) fn write(image: &RasterImage, layout: &Layout, strips: &[Vec<u8>]) -> Result<Vec<u8>, RasterError> {
    let FormatMetadata::Tiff(meta) = image.metadata() else {
        return Err(RasterError::Configuration("TIFF envelope needs TIFF metadata".into()));
    };
    let base = &meta.base;
    let components = image.components();
    let photometric = photometric(base.color_space, components);

    let mut ifd = IfdBuilder::default();
    ifd.long(IMAGE_WIDTH, &[image.width()]);
    ifd.long(IMAGE_LENGTH, &[image.height()]);
    ifd.short(BITS_PER_SAMPLE, &vec![u16::from(image.bit_depth()); usize::from(components)]);
    ifd.short(COMPRESSION, &[meta.compression.tag_value()]);
    ifd.short(PHOTOMETRIC, &[photometric]);
    ifd.short(SAMPLES_PER_PIXEL, &[components]);
    ifd.long(ROWS_PER_STRIP, &[layout.grid.tile_size().height]);
    ifd.rational(X_RESOLUTION, 72, 1);
    ifd.rational(Y_RESOLUTION, 72, 1);
    ifd.short(RESOLUTION_UNIT, &[2]);
    ifd.short(PLANAR_CONFIG, &[1]);

    let color_channels = match photometric {
        1 => 1,
        5 => 4,
        _ => 3,
    };
    if components > color_channels {
        let mut extra = vec![0u16; usize::from(components - color_channels)];
        if matches!(components, 2 | 4) && photometric != 5 {
            // unassociated alpha
            extra[0] = 2;
        }
        ifd.short(EXTRA_SAMPLES, &extra);
    }
    if image.is_signed() {
        ifd.short(SAMPLE_FORMAT, &vec![2; usize::from(components)]);
    }
    if let Some(modified) = base.modified {
        ifd.ascii(DATE_TIME, &modified.format(DATE_FORMAT).to_string());
    }
    if let Some(xmp) = &base.xmp {
        ifd.bytes(XMP, FieldType::Byte, xmp);
    }
    if let Some(icc) = &base.icc_profile {
        ifd.bytes(ICC_PROFILE, FieldType::Undefined, icc);
    }
    if let Some(geo) = &base.geo {
        write_geo(&mut ifd, geo);
    }

    let counts = strips
        .iter()
        .map(|s| u32::try_from(s.len()))
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|_| RasterError::ResourceExhaustion("TIFF strip exceeds 4 GiB".into()))?;
    ifd.long(STRIP_BYTE_COUNTS, &counts);

    let header = ifd.finish(|start| {
        let mut offset = start;
        let offsets = counts
            .iter()
            .map(|&len| {
                let at = offset;
                offset = offset.wrapping_add(len);
                at
            })
            .collect();
        vec![(STRIP_OFFSETS, offsets)]
    })?;

    let total = header.len() as u64 + counts.iter().map(|&c| u64::from(c)).sum::<u64>();
    if total > u64::from(u32::MAX) {
        return Err(RasterError::ResourceExhaustion(format!(
            "{total} bytes exceed the classic TIFF limit of 4 GiB"
        )));
    }
    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&header);
    for strip in strips {
        out.extend_from_slice(strip);
    }
    trace!(strips = strips.len(), bytes = out.len(), "assembled TIFF");
    Ok(out)
}

/// Parse a TIFF into its image description and strip payloads.
pub(crate) fn parse(data: &[u8]) -> Result<ParsedContainer<'_>, RasterError> {
    let dir = Directory::parse(data)?;
    let required = |tag: u16, name: &str| {
        dir.get(tag)
            .and_then(|e| e.first_unsigned())
            .ok_or_else(|| RasterError::violation(4, format!("TIFF is missing the {name} tag")))
    };
    let dimension = |v: u64, name: &str| {
        u32::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .ok_or_else(|| RasterError::violation(4, format!("TIFF {name} {v} is invalid")))
    };
    let width = dimension(required(IMAGE_WIDTH, "ImageWidth")?, "width")?;
    let height = dimension(required(IMAGE_LENGTH, "ImageLength")?, "height")?;

    if dir.get(TILE_WIDTH).is_some() {
        return Err(RasterError::UnsupportedFeature("tiled TIFF layout".into()));
    }
    if dir.get(PLANAR_CONFIG).and_then(|e| e.first_unsigned()).unwrap_or(1) != 1 {
        return Err(RasterError::UnsupportedFeature("planar TIFF sample layout".into()));
    }

    let components = dir.get(SAMPLES_PER_PIXEL).and_then(|e| e.first_unsigned()).unwrap_or(1);
    let components = u16::try_from(components)
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| RasterError::violation(4, format!("TIFF samples per pixel {components} is invalid")))?;
    let bits = dir.get(BITS_PER_SAMPLE).and_then(|e| e.unsigned()).unwrap_or_else(|| vec![1]);
    let depth = bits.first().copied().unwrap_or(1);
    if bits.iter().any(|&b| b != depth) {
        return Err(RasterError::UnsupportedFeature("mixed TIFF bits per sample".into()));
    }
    let bit_depth = u8::try_from(depth)
        .ok()
        .filter(|&d| (1..=64).contains(&d))
        .ok_or_else(|| RasterError::violation(4, format!("TIFF bits per sample {depth} is invalid")))?;

    let compression_code = dir.get(COMPRESSION).and_then(|e| e.first_unsigned()).unwrap_or(1);
    let compression = u16::try_from(compression_code)
        .ok()
        .and_then(TiffCompression::from_tag_value)
        .ok_or_else(|| RasterError::UnsupportedFeature(format!("TIFF compression {compression_code}")))?;

    let signed = match dir.get(SAMPLE_FORMAT).and_then(|e| e.first_unsigned()).unwrap_or(1) {
        1 | 4 => false,
        2 => true,
        other => return Err(RasterError::UnsupportedFeature(format!("TIFF sample format {other}"))),
    };

    let rows = dir
        .get(ROWS_PER_STRIP)
        .and_then(|e| e.first_unsigned())
        .unwrap_or(u64::from(height))
        .min(u64::from(height)) as u32;
    if rows == 0 {
        return Err(RasterError::violation(4, "TIFF rows per strip is zero"));
    }

    let offsets = dir.get(STRIP_OFFSETS).and_then(|e| e.unsigned()).unwrap_or_default();
    let counts = dir.get(STRIP_BYTE_COUNTS).and_then(|e| e.unsigned()).unwrap_or_default();
    let expected = height.div_ceil(rows) as usize;
    if offsets.len() != expected || counts.len() != expected {
        return Err(RasterError::violation(
            4,
            format!(
                "TIFF declares {} strip offsets and {} byte counts, {expected} expected",
                offsets.len(),
                counts.len()
            ),
        ));
    }

    let swap = dir.order == ByteOrder::Big && compression == TiffCompression::None && bit_depth > 8;
    let sample_bytes = match bit_depth {
        0..=8 => 1,
        9..=16 => 2,
        17..=32 => 4,
        _ => 8,
    };
    let mut strips = Vec::with_capacity(expected);
    for (&offset, &count) in offsets.iter().zip(&counts) {
        let strip = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(count).ok())
            .and_then(|(o, c)| data.get(o..o.checked_add(c)?))
            .ok_or_else(|| {
                RasterError::violation(offset as usize, format!("TIFF strip of {count} bytes lies outside the file"))
            })?;
        strips.push(if swap {
            Cow::Owned(strip.chunks(sample_bytes).flat_map(|s| s.iter().rev().copied()).collect())
        } else {
            Cow::Borrowed(strip)
        });
    }

    let photometric = dir.get(PHOTOMETRIC).and_then(|e| e.first_unsigned()).unwrap_or(1);
    let mut base = BaseMetadata::new(width, height, bit_depth);
    base.color_space = color_space_of(photometric);
    base.icc_profile = dir.get(ICC_PROFILE).map(|e| e.value.to_vec());
    base.xmp = dir.get(XMP).map(|e| e.value.to_vec());
    base.modified = dir
        .get(DATE_TIME)
        .and_then(|e| e.ascii())
        .and_then(|s| NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).ok())
        .map(|t| t.and_utc());
    base.geo = read_geo(&dir);

    let meta = TiffMetadata {
        base,
        compression,
        rows_per_strip: (rows < height).then_some(rows),
    };
    Ok(ParsedContainer {
        image: RasterImage::from_parts(components, signed, CompressionMode::Lossless, FormatMetadata::Tiff(meta)),
        units: strips,
    })
}

/// Write GeoTIFF tags. North-up transforms use pixel scale + tiepoint,
/// anything with skew uses the full model transformation.
pub(crate) fn write_geo(ifd: &mut IfdBuilder, geo: &GeoReference) {
    if let Some([x0, sx, kx, y0, ky, sy]) = geo.coefficients() {
        if kx == 0.0 && ky == 0.0 {
            ifd.double(MODEL_PIXEL_SCALE, &[sx, -sy, 0.0]);
            ifd.double(MODEL_TIEPOINT, &[0.0, 0.0, 0.0, x0, y0, 0.0]);
        } else {
            let matrix = [
                sx, kx, 0.0, x0, ky, sy, 0.0, y0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ];
            ifd.double(MODEL_TRANSFORMATION, &matrix);
        }
    }
    if let Some(tag) = &geo.geotag {
        let keys: Vec<u16> = tag.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        ifd.short(GEO_KEY_DIRECTORY, &keys);
    }
    if let Some(crs) = &geo.crs {
        ifd.ascii(GEO_ASCII_PARAMS, &format!("{crs}|"));
    }
}

pub(crate) fn read_geo(dir: &Directory<'_>) -> Option<GeoReference> {
    let doubles = |tag: u16, min: usize| dir.get(tag).and_then(|e| e.doubles()).filter(|v| v.len() >= min);
    let transform = if let Some(m) = doubles(MODEL_TRANSFORMATION, 16) {
        vec![m[3], m[0], m[1], m[7], m[4], m[5]]
    } else if let (Some(scale), Some(tie)) = (doubles(MODEL_PIXEL_SCALE, 3), doubles(MODEL_TIEPOINT, 6)) {
        let (sx, sy) = (scale[0], -scale[1]);
        vec![tie[3] - tie[0] * sx, sx, 0.0, tie[4] - tie[1] * sy, 0.0, sy]
    } else {
        Vec::new()
    };
    let geotag = dir.get(GEO_KEY_DIRECTORY).and_then(|e| e.shorts_le());
    let crs = dir
        .get(GEO_ASCII_PARAMS)
        .and_then(|e| e.ascii())
        .map(|s| s.trim_end_matches('|').to_owned())
        .filter(|s| !s.is_empty());
    if transform.is_empty() && geotag.is_none() && crs.is_none() {
        return None;
    }
    Some(GeoReference {
        transform,
        crs,
        geotag,
    })
}

/// Minimal 1x1 GeoTIFF carrying only georeferencing, as embedded in GeoJP2.
pub(crate) fn geo_stub(geo: &GeoReference) -> Result<Vec<u8>, RasterError> {
    let mut ifd = IfdBuilder::default();
    ifd.long(IMAGE_WIDTH, &[1]);
    ifd.long(IMAGE_LENGTH, &[1]);
    ifd.short(BITS_PER_SAMPLE, &[8]);
    ifd.short(COMPRESSION, &[1]);
    ifd.short(PHOTOMETRIC, &[1]);
    ifd.short(SAMPLES_PER_PIXEL, &[1]);
    ifd.long(ROWS_PER_STRIP, &[1]);
    ifd.long(STRIP_BYTE_COUNTS, &[1]);
    write_geo(&mut ifd, geo);
    let mut out = ifd.finish(|start| vec![(STRIP_OFFSETS, vec![start])])?;
    out.push(0);
    Ok(out)
}

pub(crate) fn read_geo_stub(data: &[u8]) -> Result<Option<GeoReference>, RasterError> {
    Directory::parse(data).map(|dir| read_geo(&dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn north_up_transform_round_trips() {
        let geo = GeoReference::from_affine([500_000.0, 30.0, 0.0, 4_600_000.0, 0.0, -30.0]).with_crs("EPSG:32633");
        let stub = geo_stub(&geo).unwrap();
        assert_eq!(read_geo_stub(&stub).unwrap(), Some(geo));
    }

    #[test]
    fn skewed_transform_round_trips() {
        let geo = GeoReference {
            geotag: Some(vec![1, 0, 1, 0, 0, 0, 1, 0]),
            ..GeoReference::from_affine([10.0, 2.0, 0.5, 20.0, 0.25, -2.0])
        };
        let stub = geo_stub(&geo).unwrap();
        assert_eq!(read_geo_stub(&stub).unwrap(), Some(geo));
    }

    #[test]
    fn zero_width_is_a_violation() {
        let mut ifd = IfdBuilder::default();
        ifd.long(IMAGE_WIDTH, &[0]);
        ifd.long(IMAGE_LENGTH, &[4]);
        ifd.long(STRIP_BYTE_COUNTS, &[4]);
        let bytes = ifd.finish(|start| vec![(STRIP_OFFSETS, vec![start])]).unwrap();
        assert!(matches!(parse(&bytes), Err(RasterError::FormatViolation { .. })));
    }

    #[test]
    fn missing_strips_are_a_violation() {
        let mut ifd = IfdBuilder::default();
        ifd.long(IMAGE_WIDTH, &[4]);
        ifd.long(IMAGE_LENGTH, &[4]);
        let bytes = ifd.finish(|_| Vec::new()).unwrap();
        assert!(matches!(parse(&bytes), Err(RasterError::FormatViolation { .. })));
    }
}
