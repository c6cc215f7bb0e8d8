//! AVIF envelope: ISOBMFF `ftyp`, a `meta` box describing one `av01` item,
//! and the item payload in `mdat`.
//!
//! Only still images with a single primary item are produced or read. The
//! payload is whatever the backend returned for the one coding unit.

use std::borrow::Cow;

use tracing::trace;

use crate::container::{
    BoxType, BoxWriter, ContainerBox, EXIF_UUID, HEADER_LEN, XMP_UUID, find_box, read_boxes, read_boxes_at,
    uuid_payload, write_box,
};
use crate::cursor::Cursor;
use crate::decode::ParsedContainer;
use crate::error::RasterError;
use crate::image::{CompressionMode, RasterImage};
use crate::metadata::{AvifMetadata, BaseMetadata, ChromaSubsampling, ColorSpace, FormatMetadata, HdrMetadata};
use crate::planner::Layout;

const MAJOR_BRAND: [u8; 4] = *b"avif";
const COMPATIBLE_BRANDS: [[u8; 4]; 3] = [*b"mif1", *b"avif", *b"miaf"];
const ITEM_TYPE: [u8; 4] = *b"av01";
const HANDLER_TYPE: [u8; 4] = *b"pict";
const PRIMARY_ITEM_ID: u16 = 1;

/// Identity matrix coefficients mark a lossless (RGB-coded) payload.
const MATRIX_IDENTITY: u16 = 0;

/// BT.2020 primaries (G, B, R) and D65 white in 0.00002 units.
const BT2020_PRIMARIES: [(u16, u16); 3] = [(8500, 39850), (6550, 2300), (35400, 14600)];
const D65_WHITE: (u16, u16) = (15635, 16450);
const LUMINANCE_SCALE: f64 = 10_000.0;

fn full_box(version: u8, flags: u32) -> Vec<u8> {
    let mut out = flags.to_be_bytes().to_vec();
    out[0] = version;
    out
}

fn av1c(bit_depth: u8, subsampling: ChromaSubsampling) -> [u8; 4] {
    let profile: u8 = match subsampling {
        _ if bit_depth == 12 => 2,
        ChromaSubsampling::Yuv422 => 2,
        ChromaSubsampling::Yuv444 => 1,
        ChromaSubsampling::Yuv420 | ChromaSubsampling::Yuv400 => 0,
    };
    let (sub_x, sub_y, mono) = subsampling.av1c_flags();
    let flags = u8::from(bit_depth > 8) << 6
        | u8::from(bit_depth == 12) << 5
        | u8::from(mono) << 4
        | u8::from(sub_x) << 3
        | u8::from(sub_y) << 2;
    // marker + version 1, then level 31 (unconstrained)
    [0x81, profile << 5 | 31, flags, 0]
}

fn luminance(cd_m2: f64) -> u32 {
    (cd_m2 * LUMINANCE_SCALE).round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Property boxes in `ipco` order. The boolean marks essential properties.
fn properties(image: &RasterImage, meta: &AvifMetadata) -> Vec<(Vec<u8>, bool)> {
    let base = &meta.base;
    let mut props = Vec::with_capacity(7);

    let mut ispe = full_box(0, 0);
    ispe.extend_from_slice(&image.width().to_be_bytes());
    ispe.extend_from_slice(&image.height().to_be_bytes());
    props.push((write_box(BoxType::SPATIAL_EXTENT, &ispe, &[]), false));

    let mut pixi = full_box(0, 0);
    pixi.push(image.components() as u8);
    pixi.extend(std::iter::repeat_n(image.bit_depth(), usize::from(image.components())));
    props.push((write_box(BoxType::PIXEL_INFO, &pixi, &[]), false));

    let (primaries, transfer, mut matrix) = base.color_space.cicp();
    if image.compression() == CompressionMode::Lossless {
        matrix = MATRIX_IDENTITY;
    }
    let mut nclx = b"nclx".to_vec();
    nclx.extend_from_slice(&primaries.to_be_bytes());
    nclx.extend_from_slice(&transfer.to_be_bytes());
    nclx.extend_from_slice(&matrix.to_be_bytes());
    nclx.push(0x80);
    props.push((write_box(BoxType::COLOUR, &nclx, &[]), false));
    if let Some(icc) = &base.icc_profile {
        let mut prof = b"prof".to_vec();
        prof.extend_from_slice(icc);
        props.push((write_box(BoxType::COLOUR, &prof, &[]), false));
    }

    props.push((write_box(BoxType::AV1_CONFIG, &av1c(image.bit_depth(), meta.subsampling), &[]), true));

    if let Some(hdr) = &base.hdr {
        let mut clli = hdr.max_content_light_level.to_be_bytes().to_vec();
        clli.extend_from_slice(&hdr.max_frame_average_light_level.to_be_bytes());
        props.push((write_box(BoxType::CONTENT_LIGHT_LEVEL, &clli, &[]), false));

        let mut mdcv = Vec::with_capacity(24);
        for (x, y) in BT2020_PRIMARIES.iter().chain(std::iter::once(&D65_WHITE)) {
            mdcv.extend_from_slice(&x.to_be_bytes());
            mdcv.extend_from_slice(&y.to_be_bytes());
        }
        mdcv.extend_from_slice(&luminance(hdr.max_luminance).to_be_bytes());
        mdcv.extend_from_slice(&luminance(hdr.min_luminance).to_be_bytes());
        props.push((write_box(BoxType::MASTERING_DISPLAY, &mdcv, &[]), false));
    }
    props
}

fn meta_box(props: &[(Vec<u8>, bool)], extent_offset: u32, extent_length: u32) -> Vec<u8> {
    let mut w = BoxWriter::new();
    let meta = w.begin(BoxType::META);
    w.extend(&full_box(0, 0));

    let mut hdlr = full_box(0, 0);
    hdlr.extend_from_slice(&[0; 4]);
    hdlr.extend_from_slice(&HANDLER_TYPE);
    hdlr.extend_from_slice(&[0; 12]);
    hdlr.push(0);
    w.write_box(BoxType::HANDLER, &hdlr);

    let mut pitm = full_box(0, 0);
    pitm.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
    w.write_box(BoxType::PRIMARY_ITEM, &pitm);

    let mut infe = full_box(2, 0);
    infe.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
    infe.extend_from_slice(&0u16.to_be_bytes());
    infe.extend_from_slice(&ITEM_TYPE);
    infe.push(0);
    let mut iinf = full_box(0, 0);
    iinf.extend_from_slice(&1u16.to_be_bytes());
    w.write_box(BoxType::ITEM_INFO, &[iinf, write_box(BoxType::ITEM_INFO_ENTRY, &infe, &[])].concat());

    // 4-byte offsets and lengths, no base offset
    let mut iloc = full_box(0, 0);
    iloc.extend_from_slice(&[0x44, 0x00]);
    iloc.extend_from_slice(&1u16.to_be_bytes());
    iloc.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
    iloc.extend_from_slice(&0u16.to_be_bytes());
    iloc.extend_from_slice(&1u16.to_be_bytes());
    iloc.extend_from_slice(&extent_offset.to_be_bytes());
    iloc.extend_from_slice(&extent_length.to_be_bytes());
    w.write_box(BoxType::ITEM_LOCATION, &iloc);

    let iprp = w.begin(BoxType::ITEM_PROPERTIES);
    let ipco = w.begin(BoxType::PROPERTY_CONTAINER);
    for (prop, _) in props {
        w.extend(prop);
    }
    w.end(ipco);
    let mut ipma = full_box(0, 0);
    ipma.extend_from_slice(&1u32.to_be_bytes());
    ipma.extend_from_slice(&PRIMARY_ITEM_ID.to_be_bytes());
    ipma.push(props.len() as u8);
    for (i, (_, essential)) in props.iter().enumerate() {
        ipma.push(u8::from(*essential) << 7 | (i as u8 + 1));
    }
    w.write_box(BoxType::ITEM_PROPERTY_ASSOCIATION, &ipma);
    w.end(iprp);

    w.end(meta);
    w.into_inner()
}

/// Assemble an AVIF file around the single coded unit.
pub(crate) fn write(image: &RasterImage, layout: &Layout, units: &[Vec<u8>]) -> Result<Vec<u8>, RasterError> {
    let FormatMetadata::Avif(meta) = image.metadata() else {
        return Err(RasterError::Configuration("AVIF envelope needs AVIF metadata".into()));
    };
    if layout.grid.tile_count() != 1 || units.len() != 1 {
        return Err(RasterError::Configuration(format!(
            "AVIF stores one coded unit, {} given",
            units.len()
        )));
    }
    let payload = &units[0];
    let base = &meta.base;

    let mut ftyp = MAJOR_BRAND.to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    for brand in COMPATIBLE_BRANDS {
        ftyp.extend_from_slice(&brand);
    }
    let ftyp = write_box(BoxType::FILE_TYPE, &ftyp, &[]);

    let mut trailer = BoxWriter::new();
    if let Some(xmp) = &base.xmp {
        trailer.write_box(BoxType::UUID, &uuid_payload(&XMP_UUID, xmp));
    }
    if let Some(exif) = &base.exif {
        trailer.write_box(BoxType::UUID, &uuid_payload(&EXIF_UUID, exif));
    }
    let trailer = trailer.into_inner();

    let extent_length = u32::try_from(payload.len()).map_err(|_| {
        RasterError::ResourceExhaustion(format!("AV1 payload of {} bytes exceeds 4 GiB", payload.len()))
    })?;
    let props = properties(image, meta);
    // The meta box has a fixed size, so the second pass only patches the offset.
    let meta_len = meta_box(&props, 0, extent_length).len();
    let mdat_header = if payload.len() + HEADER_LEN > u32::MAX as usize { 16 } else { HEADER_LEN };
    let extent_offset = ftyp.len() + meta_len + trailer.len() + mdat_header;
    let extent_offset = u32::try_from(extent_offset)
        .map_err(|_| RasterError::ResourceExhaustion("AVIF metadata exceeds 4 GiB".into()))?;
    let meta_bytes = meta_box(&props, extent_offset, extent_length);

    let mut w = BoxWriter::with_capacity(extent_offset as usize + payload.len());
    w.extend(&ftyp);
    w.extend(&meta_bytes);
    w.extend(&trailer);
    w.write_box(BoxType::MEDIA_DATA, payload);
    trace!(payload = payload.len(), properties = props.len(), "assembled AVIF");
    Ok(w.into_inner())
}

fn full_box_header<'a>(b: &ContainerBox<'a>) -> Result<(u8, Cursor<'a>), RasterError> {
    let mut cursor = Cursor::at_base(b.payload, b.payload_offset() as usize);
    let version = cursor.u8()?;
    cursor.skip(3)?;
    Ok((version, cursor))
}

fn primary_item_id(meta: &ContainerBox<'_>) -> Result<u32, RasterError> {
    let Some(pitm) = meta.child(BoxType::PRIMARY_ITEM) else {
        return Ok(u32::from(PRIMARY_ITEM_ID));
    };
    let (version, mut c) = full_box_header(pitm)?;
    if version == 0 { Ok(u32::from(c.u16_be()?)) } else { c.u32_be() }
}

fn check_item_type(meta: &ContainerBox<'_>, item_id: u32) -> Result<(), RasterError> {
    let Some(iinf) = meta.child(BoxType::ITEM_INFO) else {
        return Ok(());
    };
    let (version, mut c) = full_box_header(iinf)?;
    if version == 0 {
        c.u16_be()?;
    } else {
        c.u32_be()?;
    }
    let base = c.position();
    for infe in read_boxes_at(c.rest(), base)? {
        if infe.box_type != BoxType::ITEM_INFO_ENTRY {
            continue;
        }
        let (version, mut c) = full_box_header(&infe)?;
        let id = match version {
            2 => u32::from(c.u16_be()?),
            3 => c.u32_be()?,
            _ => continue,
        };
        c.u16_be()?;
        let item_type: [u8; 4] = c.read_fixed()?;
        if id == item_id && item_type != ITEM_TYPE {
            return Err(RasterError::UnsupportedFeature(format!(
                "primary item type {} is not av01",
                BoxType(item_type)
            )));
        }
    }
    Ok(())
}

fn read_sized(c: &mut Cursor<'_>, size: u8) -> Result<u64, RasterError> {
    match size {
        0 => Ok(0),
        4 => c.u32_be().map(u64::from),
        8 => c.u64_be(),
        other => Err(c.violation(format!("iloc field size {other} is not 0, 4 or 8"))),
    }
}

/// Extents (absolute offset, length) of `item_id`. A zero length means the
/// extent runs to the end of the file.
fn item_extents(iloc: &ContainerBox<'_>, item_id: u32) -> Result<Vec<(u64, u64)>, RasterError> {
    let (version, mut c) = full_box_header(iloc)?;
    if version > 2 {
        return Err(c.violation(format!("iloc version {version} is unknown")));
    }
    let sizes = c.u8()?;
    let (offset_size, length_size) = (sizes >> 4, sizes & 0x0F);
    let sizes = c.u8()?;
    let base_offset_size = sizes >> 4;
    let index_size = if version == 0 { 0 } else { sizes & 0x0F };
    let count = if version < 2 { u32::from(c.u16_be()?) } else { c.u32_be()? };

    for _ in 0..count {
        let id = if version < 2 { u32::from(c.u16_be()?) } else { c.u32_be()? };
        let method = if version == 0 { 0 } else { c.u16_be()? & 0x0F };
        let data_reference = c.u16_be()?;
        let base_offset = read_sized(&mut c, base_offset_size)?;
        let extent_count = c.u16_be()?;
        let mut extents = Vec::with_capacity(usize::from(extent_count));
        for _ in 0..extent_count {
            read_sized(&mut c, index_size)?;
            let offset = read_sized(&mut c, offset_size)?;
            let length = read_sized(&mut c, length_size)?;
            extents.push((base_offset.saturating_add(offset), length));
        }
        if id != item_id {
            continue;
        }
        if method != 0 || data_reference != 0 {
            return Err(RasterError::UnsupportedFeature(format!(
                "item {id} is stored with construction method {method}, data reference {data_reference}"
            )));
        }
        return Ok(extents);
    }
    Err(RasterError::violation(
        iloc.offset as usize,
        format!("iloc has no entry for primary item {item_id}"),
    ))
}

fn item_payload<'a>(data: &'a [u8], extents: &[(u64, u64)], at: usize) -> Result<Cow<'a, [u8]>, RasterError> {
    let slice = |&(offset, length): &(u64, u64)| -> Result<&'a [u8], RasterError> {
        let start = usize::try_from(offset).ok().filter(|&s| s <= data.len());
        let Some(start) = start else {
            return Err(RasterError::violation(at, format!("extent offset {offset} is past the end of the file")));
        };
        let end = if length == 0 {
            data.len()
        } else {
            usize::try_from(offset.saturating_add(length))
                .ok()
                .filter(|&e| e <= data.len())
                .ok_or_else(|| RasterError::violation(at, format!("extent {offset}+{length} is past the end of the file")))?
        };
        Ok(&data[start..end])
    };
    match extents {
        [] => Err(RasterError::violation(at, "primary item has no extents")),
        [one] => slice(one).map(Cow::Borrowed),
        many => {
            let mut joined = Vec::new();
            for extent in many {
                joined.extend_from_slice(slice(extent)?);
            }
            Ok(Cow::Owned(joined))
        }
    }
}

/// Property boxes associated with `item_id`, in association order.
fn associated<'b, 'a>(iprp: &'b ContainerBox<'a>, item_id: u32) -> Result<Vec<&'b ContainerBox<'a>>, RasterError> {
    let Some(ipco) = iprp.child(BoxType::PROPERTY_CONTAINER) else {
        return Ok(Vec::new());
    };
    let Some(ipma) = iprp.child(BoxType::ITEM_PROPERTY_ASSOCIATION) else {
        return Ok(ipco.children.iter().collect());
    };
    let (version, mut c) = full_box_header(ipma)?;
    let wide_index = ipma.payload.get(3).is_some_and(|flags| flags & 1 != 0);
    let entries = c.u32_be()?;
    for _ in 0..entries {
        let id = if version < 1 { u32::from(c.u16_be()?) } else { c.u32_be()? };
        let count = c.u8()?;
        let mut props = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let index = if wide_index { c.u16_be()? & 0x7FFF } else { u16::from(c.u8()? & 0x7F) };
            if index == 0 {
                continue;
            }
            let prop = ipco
                .children
                .get(usize::from(index) - 1)
                .ok_or_else(|| c.violation(format!("property index {index} is out of range")))?;
            props.push(prop);
        }
        if id == item_id {
            return Ok(props);
        }
    }
    Ok(Vec::new())
}

/// Parse an AVIF file into its image description and the single payload.
pub(crate) fn parse(data: &[u8]) -> Result<ParsedContainer<'_>, RasterError> {
    let boxes = read_boxes(data)?;
    match boxes.first() {
        Some(b) if b.box_type == BoxType::FILE_TYPE && b.payload.len() >= 8 => {
            let brands = std::iter::once(&b.payload[..4]).chain(b.payload[8..].chunks_exact(4));
            if !brands.into_iter().any(|brand| brand == b"avif" || brand == b"avis") {
                return Err(RasterError::violation(0, "file type box lacks an AVIF brand"));
            }
        }
        _ => return Err(RasterError::violation(0, "AVIF data does not start with a file type box")),
    }
    let meta = find_box(&boxes, BoxType::META)
        .ok_or_else(|| RasterError::violation(data.len(), "missing meta box"))?;
    match meta.child(BoxType::HANDLER) {
        Some(hdlr) if hdlr.payload.get(8..12) == Some(&HANDLER_TYPE[..]) => {}
        Some(hdlr) => return Err(RasterError::violation(hdlr.offset as usize, "meta handler is not pict")),
        None => return Err(RasterError::violation(meta.offset as usize, "meta box has no handler")),
    }

    let item_id = primary_item_id(meta)?;
    check_item_type(meta, item_id)?;
    let iloc = meta
        .child(BoxType::ITEM_LOCATION)
        .ok_or_else(|| RasterError::violation(meta.offset as usize, "meta box has no iloc"))?;
    let payload = item_payload(data, &item_extents(iloc, item_id)?, iloc.offset as usize)?;

    let iprp = meta
        .child(BoxType::ITEM_PROPERTIES)
        .ok_or_else(|| RasterError::violation(meta.offset as usize, "meta box has no iprp"))?;
    let props = associated(iprp, item_id)?;
    let prop = |t: BoxType| props.iter().copied().find(|b| b.box_type == t);

    let ispe = prop(BoxType::SPATIAL_EXTENT)
        .ok_or_else(|| RasterError::violation(iprp.offset as usize, "primary item has no ispe property"))?;
    let (_, mut c) = full_box_header(ispe)?;
    let (width, height) = (c.u32_be()?, c.u32_be()?);
    if width == 0 || height == 0 {
        return Err(RasterError::violation(
            ispe.offset as usize,
            format!("ispe declares a {width}x{height} image"),
        ));
    }

    let mut subsampling = ChromaSubsampling::Yuv444;
    let mut bit_depth = 8;
    let mut components = 3;
    if let Some(av1c) = prop(BoxType::AV1_CONFIG) {
        let flags = *av1c
            .payload
            .get(2)
            .ok_or_else(|| RasterError::violation(av1c.offset as usize, "av1C box shorter than 3 bytes"))?;
        let mono = flags & 0x10 != 0;
        subsampling = ChromaSubsampling::from_av1c_flags(flags & 0x08 != 0, flags & 0x04 != 0, mono);
        bit_depth = match (flags & 0x40 != 0, flags & 0x20 != 0) {
            (true, true) => 12,
            (true, false) => 10,
            _ => 8,
        };
        components = if mono { 1 } else { 3 };
    }
    if let Some(pixi) = prop(BoxType::PIXEL_INFO) {
        let (_, mut c) = full_box_header(pixi)?;
        let channels = c.u8()?;
        let depths = c.take(usize::from(channels))?;
        if let Some((&first, rest)) = depths.split_first() {
            if rest.iter().any(|&d| d != first) {
                return Err(RasterError::UnsupportedFeature("AVIF channels with mixed bit depths".into()));
            }
            bit_depth = first;
            components = u16::from(channels);
        }
    }
    if !matches!(bit_depth, 8 | 10 | 12) {
        return Err(RasterError::UnsupportedFeature(format!("{bit_depth}-bit AVIF samples")));
    }

    let mut base = BaseMetadata::new(width, height, bit_depth);
    let mut compression = CompressionMode::Lossy;
    for colr in props.iter().filter(|b| b.box_type == BoxType::COLOUR) {
        let p = colr.payload;
        match p.get(..4) {
            Some(b"nclx") if p.len() >= 10 => {
                let primaries = u16::from_be_bytes([p[4], p[5]]);
                let transfer = u16::from_be_bytes([p[6], p[7]]);
                let matrix = u16::from_be_bytes([p[8], p[9]]);
                base.color_space = ColorSpace::from_cicp(primaries, transfer, matrix, components);
                if matrix == MATRIX_IDENTITY {
                    compression = CompressionMode::Lossless;
                }
            }
            Some(b"prof" | b"rICC") if base.icc_profile.is_none() => base.icc_profile = Some(p[4..].to_vec()),
            _ => {}
        }
    }

    let clli = prop(BoxType::CONTENT_LIGHT_LEVEL).map(|b| b.payload).filter(|p| p.len() >= 4);
    let mdcv = prop(BoxType::MASTERING_DISPLAY).map(|b| b.payload).filter(|p| p.len() >= 24);
    if clli.is_some() || mdcv.is_some() {
        let level = |p: Option<&[u8]>, at: usize| p.map_or(0, |p| u16::from_be_bytes([p[at], p[at + 1]]));
        let lum = |p: Option<&[u8]>, at: usize| {
            p.map_or(0.0, |p| f64::from(u32::from_be_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])) / LUMINANCE_SCALE)
        };
        base.hdr = Some(HdrMetadata {
            max_luminance: lum(mdcv, 16),
            min_luminance: lum(mdcv, 20),
            max_content_light_level: level(clli, 0),
            max_frame_average_light_level: level(clli, 2),
        });
    }

    for uuid in boxes.iter().filter(|b| b.box_type == BoxType::UUID && b.payload.len() >= 16) {
        let (id, body) = uuid.payload.split_at(16);
        if id == XMP_UUID {
            base.xmp = Some(body.to_vec());
        } else if id == EXIF_UUID {
            base.exif = Some(body.to_vec());
        }
    }

    let compression_ratio = match compression {
        CompressionMode::Lossy => {
            let raw = u64::from(width) * u64::from(height) * u64::from(components) * u64::from(bit_depth).div_ceil(8);
            let ratio = raw as f64 / payload.len().max(1) as f64;
            (ratio > 1.0).then_some(ratio as f32)
        }
        CompressionMode::Lossless => None,
    };
    let meta = AvifMetadata {
        base,
        subsampling,
        compression_ratio,
        ..AvifMetadata::new(width, height, bit_depth)
    };
    Ok(ParsedContainer {
        image: RasterImage::from_parts(components, false, compression, FormatMetadata::Avif(meta)),
        units: vec![payload],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{FormatKind, detect};

    fn encode(image: &RasterImage, payload: Vec<u8>) -> Vec<u8> {
        let layout = Layout::plan(image).unwrap();
        write(image, &layout, &[payload]).unwrap()
    }

    #[test]
    fn detected_and_payload_located() {
        let image = RasterImage::new(FormatKind::Avif, 16, 8, 3, 8).unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        let bytes = encode(&image, payload.clone());
        assert_eq!(detect(&bytes), Some(FormatKind::Avif));
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.units.len(), 1);
        assert_eq!(&parsed.units[0][..], &payload[..]);
        assert_eq!((parsed.image.width(), parsed.image.height()), (16, 8));
        assert_eq!(parsed.image.compression(), CompressionMode::Lossless);
    }

    #[test]
    fn hdr_and_blobs_round_trip() {
        let mut image = RasterImage::new(FormatKind::Avif, 64, 64, 3, 10).unwrap();
        image.set_compression(CompressionMode::Lossy);
        let meta = image.metadata_mut().as_avif_mut().unwrap();
        meta.subsampling = ChromaSubsampling::Yuv420;
        meta.base.color_space = ColorSpace::Bt2100Pq;
        meta.base.icc_profile = Some(vec![1; 300]);
        meta.base.xmp = Some(b"<x:xmpmeta/>".to_vec());
        meta.base.hdr = Some(HdrMetadata {
            max_luminance: 1000.0,
            min_luminance: 0.005,
            max_content_light_level: 800,
            max_frame_average_light_level: 400,
        });
        let encoded = encode(&image, vec![0; 1000]);
        let parsed = parse(&encoded).unwrap();
        assert_eq!(parsed.image.compression(), CompressionMode::Lossy);
        assert_eq!(parsed.image.bit_depth(), 10);
        let FormatMetadata::Avif(got) = parsed.image.metadata() else {
            panic!("not AVIF metadata");
        };
        assert_eq!(got.subsampling, ChromaSubsampling::Yuv420);
        assert_eq!(got.base.color_space, ColorSpace::Bt2100Pq);
        assert_eq!(got.base.icc_profile, image.metadata().base().icc_profile);
        assert_eq!(got.base.xmp, image.metadata().base().xmp);
        assert_eq!(got.base.hdr, image.metadata().base().hdr);
        assert!(got.compression_ratio.unwrap() > 1.0);
    }

    #[test]
    fn monochrome_reads_one_component() {
        let mut image = RasterImage::new(FormatKind::Avif, 8, 8, 1, 8).unwrap();
        image.metadata_mut().as_avif_mut().unwrap().subsampling = ChromaSubsampling::Yuv400;
        let encoded = encode(&image, vec![0; 10]);
        let parsed = parse(&encoded).unwrap();
        assert_eq!(parsed.image.components(), 1);
        assert_eq!(parsed.image.metadata().base().color_space, ColorSpace::Unspecified);
    }

    #[test]
    fn av1c_profiles() {
        assert_eq!(av1c(8, ChromaSubsampling::Yuv420)[1] >> 5, 0);
        assert_eq!(av1c(10, ChromaSubsampling::Yuv444)[1] >> 5, 1);
        assert_eq!(av1c(12, ChromaSubsampling::Yuv420)[1] >> 5, 2);
        assert_eq!(av1c(12, ChromaSubsampling::Yuv420)[2] & 0x60, 0x60);
    }

    #[test]
    fn zero_extent_is_a_violation() {
        let image = RasterImage::new(FormatKind::Avif, 8, 8, 3, 8).unwrap();
        let mut bytes = encode(&image, vec![0; 16]);
        let at = bytes.windows(4).position(|w| w == b"ispe").unwrap();
        // type, then version and flags, then width and height
        bytes[at + 8..at + 16].fill(0);
        assert!(matches!(parse(&bytes), Err(RasterError::FormatViolation { .. })));
    }

    #[test]
    fn missing_meta_is_a_violation() {
        let ftyp = write_box(BoxType::FILE_TYPE, b"avif\0\0\0\0mif1", &[]);
        assert!(matches!(parse(&ftyp), Err(RasterError::FormatViolation { .. })));
    }

    #[test]
    fn truncated_mdat_is_rejected() {
        let image = RasterImage::new(FormatKind::Avif, 16, 8, 3, 8).unwrap();
        let bytes = encode(&image, vec![7; 64]);
        assert!(parse(&bytes[..bytes.len() - 10]).is_err());
    }
}
