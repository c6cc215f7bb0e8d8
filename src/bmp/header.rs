//! BMP file header and BITMAPV5HEADER.

use crate::cursor::Cursor;
use crate::error::RasterError;

pub(super) const FILE_HEADER_LEN: usize = 14;
pub(super) const V5_HEADER_LEN: usize = 124;
const CORE_INFO_LEN: u32 = 40;

pub(super) const BI_BITFIELDS: u32 = 3;

/// 'sRGB'
pub(super) const LCS_SRGB: u32 = 0x7352_4742;
/// 'Win '
pub(super) const LCS_WINDOWS: u32 = 0x5769_6E20;
/// 'MBED': ICC profile embedded after the pixel data.
pub(super) const PROFILE_EMBEDDED: u32 = 0x4D42_4544;
pub(super) const LCS_CALIBRATED_RGB: u32 = 0;

/// BGRA channel masks (red, green, blue, alpha).
pub(super) const BGRA_MASKS: [u32; 4] = [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000];

/// Fields of the info header this crate reads and writes.
#[derive(Clone, Debug, PartialEq)]
pub(super) struct InfoHeader {
    pub header_len: u32,
    pub width: i32,
    /// Negative for top-down row order.
    pub height: i32,
    pub bit_count: u16,
    pub compression: u32,
    pub image_size: u32,
    pub pixels_per_meter: (i32, i32),
    pub colors_used: u32,
    /// Present only when the header carries them (BITFIELDS or V4+).
    pub masks: Option<[u32; 4]>,
    /// Present only for V4+ headers.
    pub cs_type: Option<u32>,
    /// Profile (offset from the info header start, size), V5 only.
    pub profile: Option<(u32, u32)>,
}

impl InfoHeader {
    pub fn top_down(&self) -> bool {
        self.height < 0
    }

    pub fn rows(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Always a V5 header.
    pub fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.extend_from_slice(&(V5_HEADER_LEN as u32).to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // planes
        out.extend_from_slice(&self.bit_count.to_le_bytes());
        out.extend_from_slice(&self.compression.to_le_bytes());
        out.extend_from_slice(&self.image_size.to_le_bytes());
        out.extend_from_slice(&self.pixels_per_meter.0.to_le_bytes());
        out.extend_from_slice(&self.pixels_per_meter.1.to_le_bytes());
        out.extend_from_slice(&self.colors_used.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // important colors
        for mask in self.masks.unwrap_or([0; 4]) {
            out.extend_from_slice(&mask.to_le_bytes());
        }
        out.extend_from_slice(&self.cs_type.unwrap_or(LCS_CALIBRATED_RGB).to_le_bytes());
        out.extend_from_slice(&[0; 36]); // endpoints
        out.extend_from_slice(&[0; 12]); // gamma
        out.extend_from_slice(&4u32.to_le_bytes()); // LCS_GM_IMAGES
        let (offset, size) = self.profile.unwrap_or((0, 0));
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        debug_assert_eq!(out.len() - start, V5_HEADER_LEN);
    }

    /// Parse the info header that follows the 14-byte file header.
    pub fn read(data: &[u8]) -> Result<Self, RasterError> {
        let mut c = Cursor::at_base(data.get(FILE_HEADER_LEN..).unwrap_or_default(), FILE_HEADER_LEN);
        let header_len = c.u32_le()?;
        if header_len < CORE_INFO_LEN {
            return Err(RasterError::UnsupportedFeature(format!(
                "BMP info header of {header_len} bytes (OS/2 core headers)"
            )));
        }
        let width = c.i32_le()?;
        let height = c.i32_le()?;
        if width <= 0 || height == 0 || height == i32::MIN {
            return Err(RasterError::violation(
                FILE_HEADER_LEN + 4,
                format!("BMP dimensions {width}x{height} are invalid"),
            ));
        }
        let planes = c.u16_le()?;
        if planes != 1 {
            return Err(c.violation(format!("BMP plane count {planes} is not 1")));
        }
        let bit_count = c.u16_le()?;
        let compression = c.u32_le()?;
        let image_size = c.u32_le()?;
        let pixels_per_meter = (c.i32_le()?, c.i32_le()?);
        let colors_used = c.u32_le()?;
        c.u32_le()?;

        let mut masks = None;
        if header_len >= 56 {
            masks = Some([c.u32_le()?, c.u32_le()?, c.u32_le()?, c.u32_le()?]);
        } else if compression == BI_BITFIELDS {
            // masks follow a 40-byte header
            masks = Some([c.u32_le()?, c.u32_le()?, c.u32_le()?, 0]);
        } else if header_len > CORE_INFO_LEN {
            c.skip(header_len as usize - CORE_INFO_LEN as usize)?;
        }

        let mut cs_type = None;
        let mut profile = None;
        if header_len >= 108 {
            cs_type = Some(c.u32_le()?);
            c.skip(48)?;
            if header_len >= V5_HEADER_LEN as u32 {
                c.u32_le()?;
                profile = Some((c.u32_le()?, c.u32_le()?));
            }
        }

        Ok(Self {
            header_len,
            width,
            height,
            bit_count,
            compression,
            image_size,
            pixels_per_meter,
            colors_used,
            masks,
            cs_type,
            profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v5_header_round_trips() {
        let header = InfoHeader {
            header_len: V5_HEADER_LEN as u32,
            width: 7,
            height: -3,
            bit_count: 32,
            compression: BI_BITFIELDS,
            image_size: 84,
            pixels_per_meter: (3780, 3780),
            colors_used: 0,
            masks: Some(BGRA_MASKS),
            cs_type: Some(PROFILE_EMBEDDED),
            profile: Some((300, 128)),
        };
        let mut data = vec![0; FILE_HEADER_LEN];
        header.write(&mut data);
        assert_eq!(data.len(), FILE_HEADER_LEN + V5_HEADER_LEN);
        let read = InfoHeader::read(&data).unwrap();
        assert_eq!(read, header);
        assert!(read.top_down());
        assert_eq!(read.rows(), 3);
    }

    #[test]
    fn core_header_is_unsupported() {
        let mut data = vec![0; FILE_HEADER_LEN];
        data.extend_from_slice(&12u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        assert!(matches!(InfoHeader::read(&data), Err(RasterError::UnsupportedFeature(_))));
    }
}
