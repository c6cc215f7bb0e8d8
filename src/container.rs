//! Nested length-prefixed box codec shared by JP2 and ISOBMFF (AVIF).
//!
//! A box header is a 4-byte big-endian size followed by a 4-byte type. A size
//! of 1 means an 8-byte extended size follows the header; a size of 0 means the
//! box runs to the end of the enclosing stream. Boxes whose type is on the
//! container allow-list are parsed recursively.

use core::fmt;

use crate::cursor::Cursor;
use crate::error::RasterError;

/// Compact header: size + type.
pub const HEADER_LEN: usize = 8;
/// Extended header: size(=1) + type + 64-bit size.
pub const EXTENDED_HEADER_LEN: usize = 16;

const MAX_DEPTH: usize = 32;

/// The JP2 signature box: size 12, type `jP  `, magic `<CR><LF><0x87><LF>`.
pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A,
];

/// `uuid` box identifier of an XMP packet.
pub(crate) const XMP_UUID: [u8; 16] = [
    0xBE, 0x7A, 0xCF, 0xCB, 0x97, 0xA9, 0x42, 0xE8, 0x9C, 0x71, 0x99, 0x94, 0x91, 0xE3, 0xAF, 0xAC,
];
/// `uuid` box identifier of an EXIF block.
pub(crate) const EXIF_UUID: [u8; 16] = *b"JpgTiffExif->JP2";

/// Four-character box type tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const SIGNATURE: Self = Self(*b"jP  ");
    pub const FILE_TYPE: Self = Self(*b"ftyp");
    pub const JP2_HEADER: Self = Self(*b"jp2h");
    pub const IMAGE_HEADER: Self = Self(*b"ihdr");
    pub const BITS_PER_COMPONENT: Self = Self(*b"bpcc");
    pub const COLOUR: Self = Self(*b"colr");
    pub const RESOLUTION: Self = Self(*b"res ");
    pub const CODESTREAM: Self = Self(*b"jp2c");
    pub const XML: Self = Self(*b"xml ");
    pub const UUID: Self = Self(*b"uuid");
    pub const UUID_INFO: Self = Self(*b"uinf");
    pub const META: Self = Self(*b"meta");
    pub const HANDLER: Self = Self(*b"hdlr");
    pub const PRIMARY_ITEM: Self = Self(*b"pitm");
    pub const ITEM_LOCATION: Self = Self(*b"iloc");
    pub const ITEM_PROPERTIES: Self = Self(*b"iprp");
    pub const PROPERTY_CONTAINER: Self = Self(*b"ipco");
    pub const SPATIAL_EXTENT: Self = Self(*b"ispe");
    pub const PIXEL_INFO: Self = Self(*b"pixi");
    pub const AV1_CONFIG: Self = Self(*b"av1C");
    pub const CONTENT_LIGHT_LEVEL: Self = Self(*b"clli");
    pub const MASTERING_DISPLAY: Self = Self(*b"mdcv");
    pub const DATA_INFORMATION: Self = Self(*b"dinf");
    pub const MEDIA_DATA: Self = Self(*b"mdat");
    pub const ITEM_INFO: Self = Self(*b"iinf");
    pub const ITEM_INFO_ENTRY: Self = Self(*b"infe");
    pub const ITEM_PROPERTY_ASSOCIATION: Self = Self(*b"ipma");

    const CONTAINERS: [Self; 7] = [
        Self::JP2_HEADER,
        Self::RESOLUTION,
        Self::UUID_INFO,
        Self::META,
        Self::ITEM_PROPERTIES,
        Self::PROPERTY_CONTAINER,
        Self::DATA_INFORMATION,
    ];

    /// Whether boxes of this type hold child boxes rather than an opaque payload.
    pub fn is_container(self) -> bool {
        Self::CONTAINERS.contains(&self)
    }

    /// Bytes between the header and the first child (full-box version/flags).
    pub fn children_offset(self) -> usize {
        if self == Self::META { 4 } else { 0 }
    }

    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    fn is_printable(self) -> bool {
        self.0.iter().all(|b| (0x20..=0x7E).contains(b))
    }
}

impl fmt::Debug for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxType({self})")
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if (0x20..=0x7E).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// How a box declared its size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeField {
    /// Ordinary 32-bit size.
    Compact(u32),
    /// 32-bit field was 1; the 64-bit extended size is authoritative.
    Extended(u64),
    /// 32-bit field was 0; the box runs to the end of the enclosing stream.
    ToEnd,
}

/// A parsed box. Payloads borrow from the input buffer.
#[derive(Clone, Debug)]
pub struct ContainerBox<'a> {
    pub box_type: BoxType,
    pub size_field: SizeField,
    /// Absolute byte offset of the box header.
    pub offset: u64,
    /// Resolved total size including the header.
    pub size: u64,
    pub header_len: usize,
    /// Everything after the header (children included for containers).
    pub payload: &'a [u8],
    pub children: Vec<ContainerBox<'a>>,
}

impl<'a> ContainerBox<'a> {
    /// First direct child of the given type.
    pub fn child(&self, box_type: BoxType) -> Option<&ContainerBox<'a>> {
        find_box(&self.children, box_type)
    }

    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_len as u64
    }
}

/// First box of the given type in a sibling list.
pub fn find_box<'b, 'a>(boxes: &'b [ContainerBox<'a>], box_type: BoxType) -> Option<&'b ContainerBox<'a>> {
    boxes.iter().find(|b| b.box_type == box_type)
}

/// Parse a complete box stream.
///
/// Fails with [`RasterError::FormatViolation`] on any size inconsistency;
/// never returns a partial tree.
pub fn read_boxes(data: &[u8]) -> Result<Vec<ContainerBox<'_>>, RasterError> {
    read_level(data, 0, 0)
}

/// Parse a box stream that starts at absolute offset `base` of a larger
/// buffer, so reported offsets stay absolute.
pub(crate) fn read_boxes_at(data: &[u8], base: usize) -> Result<Vec<ContainerBox<'_>>, RasterError> {
    read_level(data, base, 0)
}

fn read_level(data: &[u8], base: usize, depth: usize) -> Result<Vec<ContainerBox<'_>>, RasterError> {
    if depth > MAX_DEPTH {
        return Err(RasterError::violation(base, "box nesting too deep"));
    }
    let mut boxes = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (parsed, next) = read_box_at(data, pos, base, depth)?;
        boxes.push(parsed);
        pos = next;
    }
    Ok(boxes)
}

/// Parse the box starting at `pos`; returns it and the position after it.
fn read_box_at(
    data: &[u8],
    pos: usize,
    base: usize,
    depth: usize,
) -> Result<(ContainerBox<'_>, usize), RasterError> {
    let mut cursor = Cursor::at_base(&data[pos..], base + pos);
    let size32 = cursor.u32_be()?;
    let box_type = BoxType(cursor.read_fixed()?);
    if !box_type.is_printable() {
        return Err(RasterError::violation(
            base + pos + 4,
            format!("box type {box_type} is not printable"),
        ));
    }
    let remaining = (data.len() - pos) as u64;
    let (size_field, size, header_len) = match size32 {
        0 => (SizeField::ToEnd, remaining, HEADER_LEN),
        1 => {
            let size64 = cursor.u64_be()?;
            (SizeField::Extended(size64), size64, EXTENDED_HEADER_LEN)
        }
        n => (SizeField::Compact(n), u64::from(n), HEADER_LEN),
    };
    if size < header_len as u64 {
        return Err(RasterError::violation(
            base + pos,
            format!("{box_type} box size {size} is smaller than its {header_len}-byte header"),
        ));
    }
    if size > remaining {
        return Err(RasterError::violation(
            base + pos,
            format!("{box_type} box size {size} exceeds the {remaining} bytes remaining"),
        ));
    }
    let end = pos + size as usize;
    let payload_start = pos + header_len;
    let payload = &data[payload_start..end];

    let children = if box_type.is_container() {
        let skip = box_type.children_offset();
        if payload.len() < skip {
            return Err(RasterError::violation(
                base + payload_start,
                format!("{box_type} box too short for its version/flags"),
            ));
        }
        read_level(&payload[skip..], base + payload_start + skip, depth + 1)?
    } else {
        Vec::new()
    };

    Ok((
        ContainerBox {
            box_type,
            size_field,
            offset: (base + pos) as u64,
            size,
            header_len,
            payload,
            children,
        },
        end,
    ))
}

/// Serialize one box: header, payload, then already-encoded children.
///
/// The extended 64-bit size form is used only when the total exceeds
/// `u32::MAX`.
pub fn write_box(box_type: BoxType, payload: &[u8], children: &[&[u8]]) -> Vec<u8> {
    let body_len = payload.len() + children.iter().map(|c| c.len()).sum::<usize>();
    let mut out = Vec::with_capacity(body_len + EXTENDED_HEADER_LEN);
    write_header(&mut out, box_type, body_len);
    out.extend_from_slice(payload);
    for child in children {
        out.extend_from_slice(child);
    }
    out
}

fn write_header(out: &mut Vec<u8>, box_type: BoxType, body_len: usize) {
    let compact = (body_len + HEADER_LEN) as u64;
    if compact <= u64::from(u32::MAX) {
        out.extend_from_slice(&(compact as u32).to_be_bytes());
        out.extend_from_slice(&box_type.0);
    } else {
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&box_type.0);
        out.extend_from_slice(&((body_len + EXTENDED_HEADER_LEN) as u64).to_be_bytes());
    }
}

/// Payload of a `uuid` box: the 16-byte identifier, then the body.
pub(crate) fn uuid_payload(uuid: &[u8; 16], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + body.len());
    out.extend_from_slice(uuid);
    out.extend_from_slice(body);
    out
}

/// An open box in a [`BoxWriter`].
#[must_use = "an open box must be closed with BoxWriter::end"]
#[derive(Debug)]
pub struct BoxMark {
    start: usize,
}

/// Single-writer box assembler with size backpatching.
///
/// Boxes are opened with [`begin`](Self::begin), filled, and closed with
/// [`end`](Self::end), which patches the size field once the body length is
/// known.
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: Vec<u8>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn begin(&mut self, box_type: BoxType) -> BoxMark {
        let start = self.buf.len();
        self.buf.extend_from_slice(&0u32.to_be_bytes());
        self.buf.extend_from_slice(&box_type.0);
        BoxMark { start }
    }

    pub fn end(&mut self, mark: BoxMark) {
        let size = (self.buf.len() - mark.start) as u64;
        if size <= u64::from(u32::MAX) {
            self.buf[mark.start..mark.start + 4].copy_from_slice(&(size as u32).to_be_bytes());
        } else {
            // Promote to the extended form: size field 1, then 64-bit size.
            let extended = size + 8;
            self.buf[mark.start..mark.start + 4].copy_from_slice(&1u32.to_be_bytes());
            let tail = self.buf.split_off(mark.start + HEADER_LEN);
            self.buf.extend_from_slice(&extended.to_be_bytes());
            self.buf.extend_from_slice(&tail);
        }
    }

    /// Append a complete box.
    pub fn write_box(&mut self, box_type: BoxType, payload: &[u8]) {
        write_header(&mut self.buf, box_type, payload.len());
        self.buf.extend_from_slice(payload);
    }

    /// Append raw bytes inside the currently open box.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
