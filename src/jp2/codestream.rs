//! JPEG 2000 codestream main header and tile-part framing.

use std::borrow::Cow;

use crate::cursor::Cursor;
use crate::error::RasterError;
use crate::metadata::WaveletTransform;
use crate::planner::{Layout, MAX_DECOMPOSITION_LEVELS, ProgressionOrder};

const SOC: u16 = 0xFF4F;
const SIZ: u16 = 0xFF51;
const COD: u16 = 0xFF52;
const QCD: u16 = 0xFF5C;
const COM: u16 = 0xFF64;
const SOT: u16 = 0xFF90;
const SOD: u16 = 0xFF93;
const EOC: u16 = 0xFFD9;

/// Code-block size exponent offset (2^(4+2) = 64).
const CODE_BLOCK_EXP: u8 = 4;
const COMMENT: &[u8] = b"zenraster";

/// Image and tile size parameters (SIZ).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Siz {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub components: u16,
    pub bit_depth: u8,
    pub signed: bool,
}

/// Coding style defaults (COD).
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Cod {
    pub progression: ProgressionOrder,
    pub layers: u16,
    pub levels: u8,
    pub transform: WaveletTransform,
}

pub(crate) struct Codestream<'a> {
    pub siz: Siz,
    pub cod: Cod,
    /// Tile payloads by tile index, tile-parts concatenated.
    pub tiles: Vec<Cow<'a, [u8]>>,
}

fn marker_segment(out: &mut Vec<u8>, marker: u16, body: &[u8]) -> Result<(), RasterError> {
    let len = u16::try_from(body.len() + 2)
        .map_err(|_| RasterError::Configuration(format!("marker {marker:04X} segment too long")))?;
    out.extend_from_slice(&marker.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(())
}

pub(crate) fn write(siz: &Siz, cod: &Cod, layout: &Layout, tiles: &[Vec<u8>]) -> Result<Vec<u8>, RasterError> {
    let payload_len: usize = tiles.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(payload_len + 256 + tiles.len() * 14);
    out.extend_from_slice(&SOC.to_be_bytes());

    let mut body = Vec::with_capacity(36 + 3 * usize::from(siz.components));
    body.extend_from_slice(&0u16.to_be_bytes()); // Rsiz
    body.extend_from_slice(&siz.width.to_be_bytes());
    body.extend_from_slice(&siz.height.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&siz.tile_width.to_be_bytes());
    body.extend_from_slice(&siz.tile_height.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&siz.components.to_be_bytes());
    let ssiz = (siz.bit_depth - 1) | if siz.signed { 0x80 } else { 0 };
    for _ in 0..siz.components {
        body.extend_from_slice(&[ssiz, 1, 1]);
    }
    marker_segment(&mut out, SIZ, &body)?;

    let mct = u8::from(siz.components >= 3);
    let mut body = vec![0u8, cod.progression.code()];
    body.extend_from_slice(&cod.layers.to_be_bytes());
    body.extend_from_slice(&[mct, cod.levels, CODE_BLOCK_EXP, CODE_BLOCK_EXP, 0, cod.transform.code()]);
    marker_segment(&mut out, COD, &body)?;

    let subbands = 3 * usize::from(cod.levels) + 1;
    let exponent = (siz.bit_depth + 2).min(31);
    let body = match cod.transform {
        WaveletTransform::Reversible53 => {
            let mut body = vec![2 << 5];
            body.extend(std::iter::repeat_n(exponent << 3, subbands));
            body
        }
        WaveletTransform::Irreversible97 => {
            let mut body = vec![(2 << 5) | 2];
            let step = u16::from(exponent) << 11;
            body.extend(std::iter::repeat_n(step.to_be_bytes(), subbands).flatten());
            body
        }
    };
    marker_segment(&mut out, QCD, &body)?;

    let mut body = 1u16.to_be_bytes().to_vec();
    body.extend_from_slice(COMMENT);
    marker_segment(&mut out, COM, &body)?;

    for tile in layout.grid.tiles() {
        let payload = &tiles[tile.index as usize];
        let index = u16::try_from(tile.index)
            .map_err(|_| RasterError::Configuration(format!("tile index {} exceeds 65534", tile.index)))?;
        let psot = u32::try_from(payload.len() + 14)
            .map_err(|_| RasterError::ResourceExhaustion(format!("tile {index} payload exceeds 4 GiB")))?;
        out.extend_from_slice(&SOT.to_be_bytes());
        out.extend_from_slice(&10u16.to_be_bytes());
        out.extend_from_slice(&index.to_be_bytes());
        out.extend_from_slice(&psot.to_be_bytes());
        out.extend_from_slice(&[0, 1]);
        out.extend_from_slice(&SOD.to_be_bytes());
        out.extend_from_slice(payload);
    }
    out.extend_from_slice(&EOC.to_be_bytes());
    Ok(out)
}

/// Parse a codestream located at absolute offset `base`.
pub(crate) fn parse(data: &[u8], base: usize) -> Result<Codestream<'_>, RasterError> {
    let mut c = Cursor::at_base(data, base);
    if c.u16_be()? != SOC {
        return Err(RasterError::violation(base, "codestream does not start with SOC"));
    }

    let mut siz = None;
    let mut cod = None;
    loop {
        let at = c.position();
        let marker = c.u16_be()?;
        if marker == SOT {
            c.set_position(at)?;
            break;
        }
        let len = usize::from(c.u16_be()?);
        if len < 2 {
            return Err(RasterError::violation(base + at, format!("marker {marker:04X} length {len}")));
        }
        let body = c.take(len - 2)?;
        match marker {
            SIZ => siz = Some(parse_siz(body, base + at + 4)?),
            COD => cod = Some(parse_cod(body, base + at + 4)?),
            // QCD, COM and other main-header segments
            0xFF50..=0xFF6F => {}
            _ => return Err(RasterError::violation(base + at, format!("unexpected marker {marker:04X} in main header"))),
        }
    }
    let siz = siz.ok_or_else(|| RasterError::violation(base, "codestream has no SIZ marker"))?;
    let cod = cod.ok_or_else(|| RasterError::violation(base, "codestream has no COD marker"))?;
    if siz.tile_width == 0 || siz.tile_height == 0 {
        return Err(RasterError::violation(base, "SIZ tile size is zero"));
    }

    let count = u64::from(siz.width.div_ceil(siz.tile_width)) * u64::from(siz.height.div_ceil(siz.tile_height));
    if count > 65535 {
        return Err(RasterError::violation(base, format!("SIZ implies {count} tiles")));
    }
    let mut parts: Vec<Vec<&[u8]>> = vec![Vec::new(); count as usize];
    loop {
        let at = c.position();
        match c.u16_be()? {
            EOC => break,
            SOT => {}
            m => return Err(RasterError::violation(base + at, format!("expected SOT or EOC, found {m:04X}"))),
        }
        let _lsot = c.u16_be()?;
        let index = usize::from(c.u16_be()?);
        let psot = c.u32_be()? as usize;
        let _part = c.u8()?;
        let _parts = c.u8()?;
        if index >= parts.len() {
            return Err(RasterError::violation(base + at, format!("tile index {index} outside a {count}-tile grid")));
        }
        loop {
            let m_at = c.position();
            let marker = c.u16_be()?;
            if marker == SOD {
                break;
            }
            let len = usize::from(c.u16_be()?);
            if len < 2 {
                return Err(RasterError::violation(base + m_at, format!("marker {marker:04X} length {len}")));
            }
            c.skip(len - 2)?;
        }
        let payload_len = if psot == 0 {
            // last tile-part runs up to EOC
            c.remaining().checked_sub(2).ok_or_else(|| c.violation("tile-part without EOC"))?
        } else {
            (at + psot)
                .checked_sub(c.position())
                .ok_or_else(|| RasterError::violation(base + at, format!("Psot {psot} shorter than tile-part header")))?
        };
        parts[index].push(c.take(payload_len)?);
    }

    let mut tiles = Vec::with_capacity(parts.len());
    for (index, mut chunks) in parts.into_iter().enumerate() {
        tiles.push(match chunks.len() {
            0 => return Err(RasterError::violation(base, format!("tile {index} has no tile-part"))),
            1 => Cow::Borrowed(chunks.remove(0)),
            _ => Cow::Owned(chunks.concat()),
        });
    }
    Ok(Codestream { siz, cod, tiles })
}

fn parse_siz(body: &[u8], base: usize) -> Result<Siz, RasterError> {
    let mut c = Cursor::at_base(body, base);
    let _rsiz = c.u16_be()?;
    let width = c.u32_be()?;
    let height = c.u32_be()?;
    let (x_origin, y_origin) = (c.u32_be()?, c.u32_be()?);
    let tile_width = c.u32_be()?;
    let tile_height = c.u32_be()?;
    let (tx_origin, ty_origin) = (c.u32_be()?, c.u32_be()?);
    if x_origin != 0 || y_origin != 0 || tx_origin != 0 || ty_origin != 0 {
        return Err(RasterError::UnsupportedFeature("codestream image or tile origin offsets".into()));
    }
    let components = c.u16_be()?;
    if components == 0 {
        return Err(c.violation("SIZ declares zero components"));
    }
    let mut ssiz = None;
    for _ in 0..components {
        let [s, dx, dy] = c.read_fixed::<3>()?;
        if dx != 1 || dy != 1 {
            return Err(RasterError::UnsupportedFeature("subsampled codestream components".into()));
        }
        match ssiz {
            None => ssiz = Some(s),
            Some(first) if first != s => {
                return Err(RasterError::UnsupportedFeature("components with differing precision".into()));
            }
            Some(_) => {}
        }
    }
    let ssiz = ssiz.unwrap_or(0);
    let bit_depth = (ssiz & 0x7F) + 1;
    if bit_depth > 38 {
        return Err(RasterError::violation(base, format!("component precision {bit_depth} exceeds 38 bits")));
    }
    if width == 0 || height == 0 {
        return Err(RasterError::violation(base, "SIZ image size is zero"));
    }
    Ok(Siz {
        width,
        height,
        tile_width,
        tile_height,
        components,
        bit_depth,
        signed: ssiz & 0x80 != 0,
    })
}

fn parse_cod(body: &[u8], base: usize) -> Result<Cod, RasterError> {
    let mut c = Cursor::at_base(body, base);
    let _scod = c.u8()?;
    let progression = c.u8()?;
    let progression = ProgressionOrder::from_code(progression)
        .ok_or_else(|| RasterError::violation(base + 1, format!("progression order {progression}")))?;
    let layers = c.u16_be()?;
    if layers == 0 {
        return Err(RasterError::violation(base + 2, "COD declares zero quality layers"));
    }
    let _mct = c.u8()?;
    let levels = c.u8()?;
    if levels > MAX_DECOMPOSITION_LEVELS {
        return Err(RasterError::violation(
            base + 5,
            format!("COD declares {levels} decomposition levels, at most {MAX_DECOMPOSITION_LEVELS} are allowed"),
        ));
    }
    let _cblk = c.read_fixed::<3>()?;
    let transform = c.u8()?;
    let transform = WaveletTransform::from_code(transform)
        .ok_or_else(|| RasterError::violation(base + 9, format!("wavelet transform {transform}")))?;
    Ok(Cod {
        progression,
        layers,
        levels,
        transform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{QualityLayers, ResolutionPyramid, TileGrid, TileSize};

    fn layout(w: u32, h: u32, tile: u32) -> Layout {
        Layout {
            grid: TileGrid::new(w, h, TileSize::square(tile)).unwrap(),
            pyramid: ResolutionPyramid::new(w, h, 2).unwrap(),
            progression: ProgressionOrder::Rpcl,
            layers: QualityLayers::new(3).unwrap(),
            roi: None,
        }
    }

    #[test]
    fn header_and_tiles_round_trip() {
        let siz = Siz {
            width: 100,
            height: 60,
            tile_width: 64,
            tile_height: 64,
            components: 3,
            bit_depth: 12,
            signed: true,
        };
        let cod = Cod {
            progression: ProgressionOrder::Rpcl,
            layers: 3,
            levels: 2,
            transform: WaveletTransform::Irreversible97,
        };
        let tiles = vec![vec![1, 2, 3], vec![4]];
        let bytes = write(&siz, &cod, &layout(100, 60, 64), &tiles).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0x4F]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);

        let parsed = parse(&bytes, 0).unwrap();
        assert_eq!(parsed.siz, siz);
        assert_eq!(parsed.cod, cod);
        assert_eq!(parsed.tiles.len(), 2);
        assert_eq!(&*parsed.tiles[0], &[1, 2, 3]);
        assert_eq!(&*parsed.tiles[1], &[4]);
    }

    #[test]
    fn cod_levels_are_bounded() {
        // Scod, LRCP, 1 layer, no MCT, levels, 64x64 blocks, style, 5/3
        let mut body = [0, 0, 0, 1, 0, 5, 4, 4, 0, 1];
        assert_eq!(parse_cod(&body, 100).unwrap().levels, 5);
        body[5] = MAX_DECOMPOSITION_LEVELS;
        assert!(parse_cod(&body, 100).is_ok());
        body[5] = 40;
        match parse_cod(&body, 100) {
            Err(RasterError::FormatViolation { offset, .. }) => assert_eq!(offset, 105),
            other => panic!("expected FormatViolation, got {other:?}"),
        }
    }

    #[test]
    fn siz_zero_tile_is_a_violation() {
        let siz = Siz {
            width: 16,
            height: 16,
            tile_width: 16,
            tile_height: 16,
            components: 1,
            bit_depth: 8,
            signed: false,
        };
        let cod = Cod {
            progression: ProgressionOrder::Lrcp,
            layers: 1,
            levels: 0,
            transform: WaveletTransform::Reversible53,
        };
        let mut bytes = write(&siz, &cod, &layout(16, 16, 16), &[vec![0; 256]]).unwrap();
        // SOC(2) + SIZ marker and length(4) + Rsiz, Xsiz, Ysiz, XOsiz, YOsiz(18) = XTsiz
        bytes[24..28].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(parse(&bytes, 0), Err(RasterError::FormatViolation { .. })));
    }

    #[test]
    fn missing_tile_is_a_violation() {
        let siz = Siz {
            width: 100,
            height: 60,
            tile_width: 64,
            tile_height: 64,
            components: 1,
            bit_depth: 8,
            signed: false,
        };
        let cod = Cod {
            progression: ProgressionOrder::Lrcp,
            layers: 1,
            levels: 0,
            transform: WaveletTransform::Reversible53,
        };
        let mut bytes = write(&siz, &cod, &layout(100, 60, 64), &[vec![9], vec![8]]).unwrap();
        // drop the second tile-part: SOT(12) + SOD(2) + 1 payload byte before EOC
        let eoc = bytes.len() - 2;
        bytes.drain(eoc - 15..eoc);
        assert!(matches!(parse(&bytes, 0), Err(RasterError::FormatViolation { .. })));
    }

    #[test]
    fn truncated_stream_is_a_violation() {
        let siz = Siz {
            width: 8,
            height: 8,
            tile_width: 8,
            tile_height: 8,
            components: 1,
            bit_depth: 8,
            signed: false,
        };
        let cod = Cod {
            progression: ProgressionOrder::Lrcp,
            layers: 1,
            levels: 0,
            transform: WaveletTransform::Reversible53,
        };
        let bytes = write(&siz, &cod, &layout(8, 8, 8), &[vec![0; 64]]).unwrap();
        for cut in [1, 10, 60, bytes.len() - 1] {
            assert!(parse(&bytes[..cut], 0).is_err(), "cut at {cut}");
        }
    }
}
