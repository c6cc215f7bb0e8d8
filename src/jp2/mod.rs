//! JP2 envelope: signature, file type, header boxes, metadata `uuid` boxes
//! and the `jp2c` codestream.

mod codestream;

use tracing::trace;

use self::codestream::{Cod, Siz};
use crate::container::{
    BoxType, BoxWriter, ContainerBox, EXIF_UUID, JP2_SIGNATURE, XMP_UUID, find_box, read_boxes, uuid_payload,
};
use crate::decode::ParsedContainer;
use crate::error::RasterError;
use crate::image::{CompressionMode, RasterImage};
use crate::metadata::{BaseMetadata, ColorSpace, FormatMetadata, Jp2Metadata, WaveletTransform};
use crate::planner::{Layout, TileSize};

const BRAND: [u8; 4] = *b"jp2 ";

/// GeoJP2: degenerate GeoTIFF carrying georeferencing.
const GEOJP2_UUID: [u8; 16] = [
    0xB1, 0x4B, 0xF8, 0xBD, 0x08, 0x3D, 0x4B, 0x43, 0xA5, 0xAE, 0x8C, 0xD7, 0xD5, 0xA6, 0xCE, 0x03,
];

const ENUM_SRGB: u32 = 16;
const ENUM_GREYSCALE: u32 = 17;
const ENUM_SYCC: u32 = 18;
const ENUM_CMYK: u32 = 12;

fn enumerated(color_space: ColorSpace) -> Option<u32> {
    match color_space {
        ColorSpace::Srgb => Some(ENUM_SRGB),
        ColorSpace::Gray => Some(ENUM_GREYSCALE),
        ColorSpace::Ycc => Some(ENUM_SYCC),
        ColorSpace::Cmyk => Some(ENUM_CMYK),
        _ => None,
    }
}

fn from_enumerated(code: u32) -> ColorSpace {
    match code {
        ENUM_SRGB => ColorSpace::Srgb,
        ENUM_GREYSCALE => ColorSpace::Gray,
        ENUM_SYCC => ColorSpace::Ycc,
        ENUM_CMYK => ColorSpace::Cmyk,
        _ => ColorSpace::Unspecified,
    }
}

/// `colr` payloads: ICC first when present, then the color space.
fn colour_boxes(base: &BaseMetadata) -> Vec<Vec<u8>> {
    let mut boxes = Vec::new();
    if let Some(icc) = &base.icc_profile {
        let mut b = vec![2, 0, 0];
        b.extend_from_slice(icc);
        boxes.push(b);
    }
    if let Some(code) = enumerated(base.color_space) {
        let mut b = vec![1, 0, 0];
        b.extend_from_slice(&code.to_be_bytes());
        boxes.push(b);
    } else if base.color_space != ColorSpace::Unspecified || boxes.is_empty() {
        let (primaries, transfer, matrix) = base.color_space.cicp();
        let mut b = vec![5, 0, 0];
        b.extend_from_slice(&primaries.to_be_bytes());
        b.extend_from_slice(&transfer.to_be_bytes());
        b.extend_from_slice(&matrix.to_be_bytes());
        b.push(0x80);
        boxes.push(b);
    }
    boxes
}

/// Assemble a JP2 file from one payload per tile.
pub(crate) fn write(image: &RasterImage, layout: &Layout, tiles: &[Vec<u8>]) -> Result<Vec<u8>, RasterError> {
    let FormatMetadata::Jpeg2000(meta) = image.metadata() else {
        return Err(RasterError::Configuration("JP2 envelope needs JPEG 2000 metadata".into()));
    };
    let base = &meta.base;
    let tile = layout.grid.tile_size();
    let siz = Siz {
        width: image.width(),
        height: image.height(),
        tile_width: tile.width,
        tile_height: tile.height,
        components: image.components(),
        bit_depth: image.bit_depth(),
        signed: image.is_signed(),
    };
    let cod = Cod {
        progression: layout.progression,
        layers: layout.layers.count(),
        levels: layout.pyramid.levels(),
        transform: meta.transform,
    };
    let codestream = codestream::write(&siz, &cod, layout, tiles)?;

    let mut w = BoxWriter::with_capacity(codestream.len() + base.blob_bytes() + 512);
    w.extend(&JP2_SIGNATURE);
    let mut ftyp = BRAND.to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(&BRAND);
    w.write_box(BoxType::FILE_TYPE, &ftyp);

    let header = w.begin(BoxType::JP2_HEADER);
    let mut ihdr = Vec::with_capacity(14);
    ihdr.extend_from_slice(&siz.height.to_be_bytes());
    ihdr.extend_from_slice(&siz.width.to_be_bytes());
    ihdr.extend_from_slice(&siz.components.to_be_bytes());
    ihdr.push((siz.bit_depth - 1) | if siz.signed { 0x80 } else { 0 });
    // compression type 7, colour space known, no IPR
    ihdr.extend_from_slice(&[7, u8::from(base.color_space == ColorSpace::Unspecified), 0]);
    w.write_box(BoxType::IMAGE_HEADER, &ihdr);
    for colr in colour_boxes(base) {
        w.write_box(BoxType::COLOUR, &colr);
    }
    w.end(header);

    if let Some(xmp) = &base.xmp {
        w.write_box(BoxType::UUID, &uuid_payload(&XMP_UUID, xmp));
    }
    if let Some(exif) = &base.exif {
        w.write_box(BoxType::UUID, &uuid_payload(&EXIF_UUID, exif));
    }
    if let Some(geo) = &base.geo {
        w.write_box(BoxType::UUID, &uuid_payload(&GEOJP2_UUID, &crate::tiff::geo_stub(geo)?));
    }
    w.write_box(BoxType::CODESTREAM, &codestream);
    trace!(tiles = tiles.len(), codestream = codestream.len(), "assembled JP2");
    Ok(w.into_inner())
}

fn ihdr_fields(ihdr: &ContainerBox<'_>) -> Result<(u32, u32, u16, u8), RasterError> {
    let p = ihdr.payload;
    if p.len() < 14 {
        return Err(RasterError::violation(ihdr.offset as usize, "ihdr box shorter than 14 bytes"));
    }
    let height = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let width = u32::from_be_bytes([p[4], p[5], p[6], p[7]]);
    let components = u16::from_be_bytes([p[8], p[9]]);
    Ok((width, height, components, p[10]))
}

/// Parse a JP2 file into its image description and tile payloads.
pub(crate) fn parse(data: &[u8]) -> Result<ParsedContainer<'_>, RasterError> {
    let boxes = read_boxes(data)?;
    match boxes.first() {
        Some(b) if b.box_type == BoxType::SIGNATURE && b.payload == &JP2_SIGNATURE[8..] => {}
        _ => return Err(RasterError::violation(0, "missing JP2 signature box")),
    }
    match boxes.get(1) {
        Some(b) if b.box_type == BoxType::FILE_TYPE && b.payload.len() >= 8 => {
            let brands = std::iter::once(&b.payload[..4]).chain(b.payload[8..].chunks_exact(4));
            if !brands.into_iter().any(|brand| brand == BRAND) {
                return Err(RasterError::violation(b.offset as usize, "file type box lacks the jp2 brand"));
            }
        }
        _ => return Err(RasterError::violation(12, "JP2 signature is not followed by a file type box")),
    }

    let header = find_box(&boxes, BoxType::JP2_HEADER)
        .ok_or_else(|| RasterError::violation(data.len(), "missing jp2h header box"))?;
    let ihdr = header
        .child(BoxType::IMAGE_HEADER)
        .ok_or_else(|| RasterError::violation(header.offset as usize, "jp2h has no ihdr box"))?;
    let (width, height, components, bpc) = ihdr_fields(ihdr)?;

    let mut base = BaseMetadata::new(width, height, (bpc & 0x7F) + 1);
    for colr in header.children.iter().filter(|b| b.box_type == BoxType::COLOUR) {
        let p = colr.payload;
        match p.first() {
            Some(1) if p.len() >= 7 => {
                base.color_space = from_enumerated(u32::from_be_bytes([p[3], p[4], p[5], p[6]]));
            }
            Some(2 | 3) if base.icc_profile.is_none() => base.icc_profile = Some(p[3..].to_vec()),
            Some(5) if p.len() >= 9 => {
                let prim = u16::from_be_bytes([p[3], p[4]]);
                let transfer = u16::from_be_bytes([p[5], p[6]]);
                let matrix = u16::from_be_bytes([p[7], p[8]]);
                base.color_space = ColorSpace::from_cicp(prim, transfer, matrix, components);
            }
            _ => {}
        }
    }
    for uuid in boxes.iter().filter(|b| b.box_type == BoxType::UUID && b.payload.len() >= 16) {
        let (id, body) = uuid.payload.split_at(16);
        if id == XMP_UUID {
            base.xmp = Some(body.to_vec());
        } else if id == EXIF_UUID {
            base.exif = Some(body.to_vec());
        } else if id == GEOJP2_UUID {
            base.geo = crate::tiff::read_geo_stub(body)?;
        }
    }

    let jp2c = find_box(&boxes, BoxType::CODESTREAM)
        .ok_or_else(|| RasterError::violation(data.len(), "missing jp2c codestream box"))?;
    let stream = codestream::parse(jp2c.payload, jp2c.payload_offset() as usize)?;
    let siz = &stream.siz;
    let signed = bpc & 0x80 != 0;
    if (siz.width, siz.height, siz.components, siz.bit_depth, siz.signed)
        != (width, height, components, base.bit_depth, signed)
    {
        return Err(RasterError::violation(
            ihdr.offset as usize,
            format!(
                "ihdr {width}x{height}x{components} at {} bits disagrees with SIZ {}x{}x{} at {} bits",
                base.bit_depth, siz.width, siz.height, siz.components, siz.bit_depth
            ),
        ));
    }

    let cod = &stream.cod;
    let compression = match cod.transform {
        WaveletTransform::Irreversible97 => CompressionMode::Lossy,
        WaveletTransform::Reversible53 => CompressionMode::Lossless,
    };
    let compression_ratio = match compression {
        CompressionMode::Lossy => {
            let raw = u64::from(width) * u64::from(height) * u64::from(components) * u64::from(base.bit_depth).div_ceil(8);
            let ratio = raw as f64 / jp2c.payload.len().max(1) as f64;
            (ratio > 1.0).then_some(ratio as f32)
        }
        CompressionMode::Lossless => None,
    };
    let tile_size = (siz.tile_width < width || siz.tile_height < height)
        .then(|| TileSize::new(siz.tile_width.min(width), siz.tile_height.min(height)));

    let meta = Jp2Metadata {
        base,
        transform: cod.transform,
        compression_ratio,
        tile_size,
        decomposition_levels: cod.levels,
        quality_layers: cod.layers,
        progression: cod.progression,
        roi: None,
    };
    Ok(ParsedContainer {
        image: RasterImage::from_parts(components, signed, compression, FormatMetadata::Jpeg2000(meta)),
        units: stream.tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{FormatKind, detect};

    fn image() -> RasterImage {
        RasterImage::new(FormatKind::Jpeg2000, 64, 32, 3, 8).unwrap()
    }

    fn encode(image: &RasterImage) -> Vec<u8> {
        let layout = Layout::plan(image).unwrap();
        let tiles: Vec<Vec<u8>> = layout.grid.tiles().map(|t| vec![0; t.bounds.area() as usize * 3]).collect();
        write(image, &layout, &tiles).unwrap()
    }

    #[test]
    fn output_starts_with_signature() {
        let bytes = encode(&image());
        assert!(bytes.starts_with(&JP2_SIGNATURE));
        assert_eq!(detect(&bytes), Some(FormatKind::Jpeg2000));
    }

    #[test]
    fn blobs_and_colour_round_trip() {
        let mut image = image();
        let base = image.metadata_mut().base_mut();
        base.color_space = ColorSpace::Bt2100Pq;
        base.icc_profile = Some(vec![3; 200]);
        base.xmp = Some(b"<x:xmpmeta/>".to_vec());
        base.exif = Some(b"MM\0*".to_vec());
        let encoded = encode(&image);
        let parsed = parse(&encoded).unwrap();
        assert_eq!(parsed.image.metadata().base(), image.metadata().base());
    }

    #[test]
    fn ihdr_siz_mismatch_is_a_violation() {
        let mut bytes = encode(&image());
        // ihdr height lives right after signature (12), ftyp (20) and the jp2h and ihdr headers (16)
        bytes[48 + 3] ^= 1;
        assert!(matches!(parse(&bytes), Err(RasterError::FormatViolation { .. })));
    }

    #[test]
    fn tiled_layout_is_recovered() {
        let mut image = RasterImage::new(FormatKind::Jpeg2000, 300, 200, 1, 8).unwrap();
        let m = image.metadata_mut().as_jp2_mut().unwrap();
        m.tile_size = Some(TileSize::square(128));
        m.quality_layers = 4;
        let encoded = encode(&image);
        let parsed = parse(&encoded).unwrap();
        assert_eq!(parsed.units.len(), 6);
        let jp2 = parsed.image.metadata().as_jp2().unwrap();
        assert_eq!(jp2.tile_size, Some(TileSize::square(128)));
        assert_eq!(jp2.quality_layers, 4);
    }
}
