//! Image file directory model shared by the TIFF envelope and the GeoJP2 box.

use crate::error::RasterError;

pub(crate) const IMAGE_WIDTH: u16 = 256;
pub(crate) const IMAGE_LENGTH: u16 = 257;
pub(crate) const BITS_PER_SAMPLE: u16 = 258;
pub(crate) const COMPRESSION: u16 = 259;
pub(crate) const PHOTOMETRIC: u16 = 262;
pub(crate) const STRIP_OFFSETS: u16 = 273;
pub(crate) const SAMPLES_PER_PIXEL: u16 = 277;
pub(crate) const ROWS_PER_STRIP: u16 = 278;
pub(crate) const STRIP_BYTE_COUNTS: u16 = 279;
pub(crate) const X_RESOLUTION: u16 = 282;
pub(crate) const Y_RESOLUTION: u16 = 283;
pub(crate) const PLANAR_CONFIG: u16 = 284;
pub(crate) const RESOLUTION_UNIT: u16 = 296;
pub(crate) const DATE_TIME: u16 = 306;
pub(crate) const TILE_WIDTH: u16 = 322;
pub(crate) const EXTRA_SAMPLES: u16 = 338;
pub(crate) const SAMPLE_FORMAT: u16 = 339;
pub(crate) const XMP: u16 = 700;
pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const MODEL_TRANSFORMATION: u16 = 34264;
pub(crate) const ICC_PROFILE: u16 = 34675;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;

/// TIFF field types used here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    Undefined,
    Double,
    Other(u16),
}

impl FieldType {
    fn code(self) -> u16 {
        match self {
            Self::Byte => 1,
            Self::Ascii => 2,
            Self::Short => 3,
            Self::Long => 4,
            Self::Rational => 5,
            Self::Undefined => 7,
            Self::Double => 12,
            Self::Other(c) => c,
        }
    }

    fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Byte,
            2 => Self::Ascii,
            3 => Self::Short,
            4 => Self::Long,
            5 => Self::Rational,
            7 => Self::Undefined,
            12 => Self::Double,
            c => Self::Other(c),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Byte | Self::Ascii | Self::Undefined => 1,
            Self::Short => 2,
            Self::Long => 4,
            Self::Rational | Self::Double => 8,
            // SBYTE, SSHORT, SLONG, SRATIONAL, FLOAT
            Self::Other(6) => 1,
            Self::Other(8) => 2,
            Self::Other(9 | 11) => 4,
            Self::Other(_) => 8,
        }
    }
}

/// Byte order of a TIFF stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub(crate) fn u16(self, b: &[u8]) -> u16 {
        let b = [b[0], b[1]];
        match self {
            Self::Little => u16::from_le_bytes(b),
            Self::Big => u16::from_be_bytes(b),
        }
    }

    pub(crate) fn u32(self, b: &[u8]) -> u32 {
        let b = [b[0], b[1], b[2], b[3]];
        match self {
            Self::Little => u32::from_le_bytes(b),
            Self::Big => u32::from_be_bytes(b),
        }
    }

    fn f64(self, b: &[u8]) -> f64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        match self {
            Self::Little => f64::from_le_bytes(a),
            Self::Big => f64::from_be_bytes(a),
        }
    }
}

/// One directory entry with its value bytes in file byte order.
#[derive(Clone, Debug)]
pub(crate) struct Entry<'a> {
    pub tag: u16,
    pub field_type: FieldType,
    /// Declared count times the type size, bounds-checked against the file.
    pub value: &'a [u8],
    order: ByteOrder,
}

impl Entry<'_> {
    /// Integer values of a BYTE, SHORT or LONG entry.
    pub(crate) fn unsigned(&self) -> Option<Vec<u64>> {
        let size = self.field_type.size();
        match self.field_type {
            FieldType::Byte | FieldType::Undefined => Some(self.value.iter().map(|&b| u64::from(b)).collect()),
            FieldType::Short => Some(self.value.chunks_exact(size).map(|c| u64::from(self.order.u16(c))).collect()),
            FieldType::Long => Some(self.value.chunks_exact(size).map(|c| u64::from(self.order.u32(c))).collect()),
            _ => None,
        }
    }

    pub(crate) fn first_unsigned(&self) -> Option<u64> {
        self.unsigned()?.first().copied()
    }

    pub(crate) fn doubles(&self) -> Option<Vec<f64>> {
        (self.field_type == FieldType::Double)
            .then(|| self.value.chunks_exact(8).map(|c| self.order.f64(c)).collect())
    }

    /// ASCII value up to the first NUL.
    pub(crate) fn ascii(&self) -> Option<String> {
        if self.field_type != FieldType::Ascii {
            return None;
        }
        let end = self.value.iter().position(|&b| b == 0).unwrap_or(self.value.len());
        Some(String::from_utf8_lossy(&self.value[..end]).into_owned())
    }

    /// SHORT values re-encoded little-endian.
    pub(crate) fn shorts_le(&self) -> Option<Vec<u8>> {
        (self.field_type == FieldType::Short).then(|| {
            self.value
                .chunks_exact(2)
                .flat_map(|c| self.order.u16(c).to_le_bytes())
                .collect()
        })
    }
}

/// A parsed classic TIFF directory.
pub(crate) struct Directory<'a> {
    pub order: ByteOrder,
    pub entries: Vec<Entry<'a>>,
}

impl<'a> Directory<'a> {
    pub(crate) fn get(&self, tag: u16) -> Option<&Entry<'a>> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Parse the header and first IFD of a classic TIFF stream.
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self, RasterError> {
        if data.len() < 8 {
            return Err(RasterError::violation(data.len(), "TIFF header truncated"));
        }
        let order = match &data[..2] {
            b"II" => ByteOrder::Little,
            b"MM" => ByteOrder::Big,
            _ => return Err(RasterError::violation(0, "missing TIFF byte-order mark")),
        };
        match order.u16(&data[2..4]) {
            42 => {}
            43 => return Err(RasterError::UnsupportedFeature("BigTIFF".into())),
            v => return Err(RasterError::violation(2, format!("TIFF version {v} is not 42"))),
        }
        let ifd = order.u32(&data[4..8]) as usize;
        let count_end = ifd
            .checked_add(2)
            .filter(|&e| e <= data.len())
            .ok_or_else(|| RasterError::violation(4, format!("IFD offset {ifd} is outside the file")))?;
        let count = usize::from(order.u16(&data[ifd..count_end]));
        let table_end = count_end + count * 12;
        if table_end > data.len() {
            return Err(RasterError::violation(ifd, format!("IFD with {count} entries is truncated")));
        }

        let mut entries = Vec::with_capacity(count);
        for (i, raw) in data[count_end..table_end].chunks_exact(12).enumerate() {
            let entry_offset = count_end + i * 12;
            let tag = order.u16(&raw[0..2]);
            let field_type = FieldType::from_code(order.u16(&raw[2..4]));
            let count = order.u32(&raw[4..8]);
            let len = (count as usize)
                .checked_mul(field_type.size())
                .ok_or_else(|| RasterError::violation(entry_offset, format!("tag {tag} count overflows")))?;
            let value = if len <= 4 {
                &raw[8..8 + len]
            } else {
                let offset = order.u32(&raw[8..12]) as usize;
                offset
                    .checked_add(len)
                    .filter(|&end| end <= data.len())
                    .map(|end| &data[offset..end])
                    .ok_or_else(|| {
                        RasterError::violation(entry_offset, format!("tag {tag} value lies outside the file"))
                    })?
            };
            entries.push(Entry {
                tag,
                field_type,
                value,
                order,
            });
        }
        Ok(Self { order, entries })
    }
}

/// Little-endian IFD builder. Entries are kept sorted by tag.
#[derive(Default)]
pub(crate) struct IfdBuilder {
    entries: Vec<(u16, FieldType, u32, Vec<u8>)>,
}

impl IfdBuilder {
    pub(crate) fn put(&mut self, tag: u16, field_type: FieldType, count: u32, value: Vec<u8>) {
        self.entries.retain(|e| e.0 != tag);
        let at = self.entries.partition_point(|e| e.0 < tag);
        self.entries.insert(at, (tag, field_type, count, value));
    }

    pub(crate) fn short(&mut self, tag: u16, values: &[u16]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.put(tag, FieldType::Short, values.len() as u32, bytes);
    }

    pub(crate) fn long(&mut self, tag: u16, values: &[u32]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.put(tag, FieldType::Long, values.len() as u32, bytes);
    }

    pub(crate) fn rational(&mut self, tag: u16, numerator: u32, denominator: u32) {
        let mut bytes = numerator.to_le_bytes().to_vec();
        bytes.extend_from_slice(&denominator.to_le_bytes());
        self.put(tag, FieldType::Rational, 1, bytes);
    }

    pub(crate) fn double(&mut self, tag: u16, values: &[f64]) {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.put(tag, FieldType::Double, values.len() as u32, bytes);
    }

    pub(crate) fn ascii(&mut self, tag: u16, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.put(tag, FieldType::Ascii, bytes.len() as u32, bytes);
    }

    pub(crate) fn bytes(&mut self, tag: u16, field_type: FieldType, value: &[u8]) {
        self.put(tag, field_type, value.len() as u32, value.to_vec());
    }

    /// Bytes of the IFD table plus its out-of-line values.
    fn encoded_len(&self) -> usize {
        let table = 2 + self.entries.len() * 12 + 4;
        table + self.entries.iter().map(|e| out_of_line(&e.3)).sum::<usize>()
    }

    /// Serialize header, IFD and values. Image data is appended by the
    /// caller; `data_offsets` maps the offset where that data starts to the
    /// LONG entries that point into it. It is called once with 0 to size the
    /// directory, then with the real offset.
    pub(crate) fn finish(
        mut self,
        data_offsets: impl Fn(u32) -> Vec<(u16, Vec<u32>)>,
    ) -> Result<Vec<u8>, RasterError> {
        for (tag, values) in data_offsets(0) {
            self.long(tag, &values);
        }
        let data_start = u32::try_from(8 + self.encoded_len())
            .map_err(|_| RasterError::ResourceExhaustion("TIFF directory exceeds 4 GiB".into()))?;
        for (tag, values) in data_offsets(data_start) {
            self.long(tag, &values);
        }

        let mut out = Vec::with_capacity(data_start as usize);
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());

        let mut values_at = 8 + 2 + self.entries.len() * 12 + 4;
        let mut values = Vec::new();
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for (tag, field_type, count, value) in &self.entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.code().to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            if value.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..value.len()].copy_from_slice(value);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(values_at as u32).to_le_bytes());
                values.extend_from_slice(value);
                if value.len() % 2 == 1 {
                    values.push(0);
                }
                values_at += out_of_line(value);
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&values);
        Ok(out)
    }
}

/// Out-of-line storage of a value, padded to a word boundary.
fn out_of_line(value: &[u8]) -> usize {
    if value.len() <= 4 { 0 } else { value.len() + value.len() % 2 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_output_parses_back() {
        let mut ifd = IfdBuilder::default();
        ifd.long(IMAGE_WIDTH, &[7]);
        ifd.short(BITS_PER_SAMPLE, &[8, 8, 8]);
        ifd.ascii(GEO_ASCII_PARAMS, "EPSG:4326|");
        ifd.double(MODEL_PIXEL_SCALE, &[0.5, 0.25, 0.0]);
        let bytes = ifd.finish(|start| vec![(STRIP_OFFSETS, vec![start])]).unwrap();

        let dir = Directory::parse(&bytes).unwrap();
        assert_eq!(dir.order, ByteOrder::Little);
        assert_eq!(dir.get(IMAGE_WIDTH).unwrap().first_unsigned(), Some(7));
        assert_eq!(dir.get(BITS_PER_SAMPLE).unwrap().unsigned(), Some(vec![8, 8, 8]));
        assert_eq!(dir.get(GEO_ASCII_PARAMS).unwrap().ascii().as_deref(), Some("EPSG:4326|"));
        assert_eq!(dir.get(MODEL_PIXEL_SCALE).unwrap().doubles(), Some(vec![0.5, 0.25, 0.0]));
        assert_eq!(dir.get(STRIP_OFFSETS).unwrap().first_unsigned(), Some(bytes.len() as u64));
    }

    #[test]
    fn big_endian_directory() {
        let mut data = b"MM\0\x2a\0\0\0\x08".to_vec();
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&IMAGE_WIDTH.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0x01, 0x02, 0, 0]);
        data.extend_from_slice(&0u32.to_be_bytes());
        let dir = Directory::parse(&data).unwrap();
        assert_eq!(dir.get(IMAGE_WIDTH).unwrap().first_unsigned(), Some(0x0102));
    }

    #[test]
    fn value_length_follows_count() {
        let mut ifd = IfdBuilder::default();
        ifd.short(PHOTOMETRIC, &[1]);
        ifd.short(BITS_PER_SAMPLE, &[8, 8, 8]);
        let bytes = ifd.finish(|_| Vec::new()).unwrap();
        let dir = Directory::parse(&bytes).unwrap();
        // inline values are trimmed to the declared count
        assert_eq!(dir.get(PHOTOMETRIC).unwrap().value.len(), 2);
        assert_eq!(dir.get(BITS_PER_SAMPLE).unwrap().value.len(), 6);
    }

    #[test]
    fn bigtiff_is_unsupported() {
        assert!(matches!(
            Directory::parse(b"II\x2b\0\x08\0\0\0"),
            Err(RasterError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn out_of_file_value_is_a_violation() {
        let mut data = b"II\x2a\0\x08\0\0\0".to_vec();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            Directory::parse(&data),
            Err(RasterError::FormatViolation { .. })
        ));
    }
}
