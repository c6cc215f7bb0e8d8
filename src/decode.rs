use std::borrow::Cow;

#[cfg(feature = "rgb")]
use rgb::AsPixels as _;
use enough::Stop;
use tracing::debug;

use crate::backend::{CodecBackend, CodingUnit, DecodeTarget, PassthroughBackend, map_units};
use crate::error::RasterError;
use crate::image::RasterImage;
use crate::info::{FormatKind, detect};
use crate::limits::Limits;
use crate::pixel::PixelDescriptor;
use crate::planner::{Layout, Rect};

static PASSTHROUGH: PassthroughBackend = PassthroughBackend;

/// A parsed container: the image description and one payload per coding
/// unit, in tile index order.
pub(crate) struct ParsedContainer<'a> {
    pub image: RasterImage,
    pub units: Vec<Cow<'a, [u8]>>,
}

/// Detect the format and parse its envelope. No backend is involved.
pub(crate) fn parse_container(data: &[u8]) -> Result<ParsedContainer<'_>, RasterError> {
    let format = detect(data).ok_or_else(|| RasterError::violation(0, "unrecognized container signature"))?;
    let parsed = match format {
        FormatKind::Jpeg2000 => crate::jp2::parse(data)?,
        FormatKind::Avif => crate::avif::parse(data)?,
        FormatKind::Tiff => crate::tiff::parse(data)?,
        FormatKind::Bmp => crate::bmp::parse(data)?,
    };
    debug!(%format, width = parsed.image.width(), height = parsed.image.height(), units = parsed.units.len(), "parsed container");
    Ok(parsed)
}

/// Decoded pixels and the image description recovered from the container.
#[derive(Clone, Debug)]
pub struct DecodeOutput {
    pub image: RasterImage,
    pixels: Vec<u8>,
    /// Width of the decoded region.
    pub width: u32,
    /// Height of the decoded region.
    pub height: u32,
    pub level: u8,
    pub layer: u16,
    /// Decoded rectangle in coordinates of `level`.
    pub region: Rect,
}

impl DecodeOutput {
    /// Interleaved samples in the layout of [`descriptor`](Self::descriptor).
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn descriptor(&self) -> PixelDescriptor {
        self.image.descriptor()
    }

    /// Reinterpret pixel data as typed pixel slice.
    ///
    /// Returns [`RasterError::Configuration`] if the sample layout doesn't match `P`.
    #[cfg(feature = "rgb")]
    pub fn as_pixels<P: crate::DecodePixel>(&self) -> Result<&[P], RasterError>
    where
        [u8]: rgb::AsPixels<P>,
    {
        if self.descriptor() != P::descriptor() {
            return Err(RasterError::Configuration(format!(
                "decoded layout {:?} does not match {:?}",
                self.descriptor(),
                P::descriptor()
            )));
        }
        Ok(self.pixels().as_pixels())
    }

    /// Zero-copy view as an [`imgref::ImgRef`] of typed pixels.
    #[cfg(feature = "imgref")]
    pub fn as_imgref<P: crate::DecodePixel>(&self) -> Result<imgref::ImgRef<'_, P>, RasterError>
    where
        [u8]: rgb::AsPixels<P>,
    {
        let pixels: &[P] = self.as_pixels()?;
        Ok(imgref::ImgRef::new(pixels, self.width as usize, self.height as usize))
    }

    /// Convert to an [`imgref::ImgVec`] of typed pixels.
    #[cfg(feature = "imgref")]
    pub fn to_imgvec<P: crate::DecodePixel>(&self) -> Result<imgref::ImgVec<P>, RasterError>
    where
        [u8]: rgb::AsPixels<P>,
    {
        let pixels: &[P] = self.as_pixels()?;
        Ok(imgref::ImgVec::new(pixels.to_vec(), self.width as usize, self.height as usize))
    }
}

/// Decode request builder.
///
/// By default the full image is decoded at full resolution with every
/// quality layer, using the [`PassthroughBackend`].
///
/// ```no_run
/// use zenraster::{DecodeRequest, Rect, Unstoppable};
///
/// let data: &[u8] = &[]; // JP2, AVIF, TIFF or BMP bytes
/// let thumb = DecodeRequest::new(data)
///     .resolution(2)
///     .region(Rect::new(0, 0, 64, 64))
///     .decode(Unstoppable)?;
/// println!("{}x{} at level {}", thumb.width, thumb.height, thumb.level);
/// # Ok::<(), zenraster::RasterError>(())
/// ```
#[derive(Clone, Copy)]
pub struct DecodeRequest<'a> {
    data: &'a [u8],
    level: u8,
    layer: Option<u16>,
    region: Option<Rect>,
    limits: Option<&'a Limits>,
    backend: &'a dyn CodecBackend,
}

impl<'a> DecodeRequest<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            level: 0,
            layer: None,
            region: None,
            limits: None,
            backend: &PASSTHROUGH,
        }
    }

    /// Resolution level to reconstruct; 0 is full resolution.
    pub fn resolution(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Highest quality layer to include.
    pub fn quality_layer(mut self, layer: u16) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Rectangle to decode, in coordinates of the requested resolution level.
    pub fn region(mut self, region: Rect) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_backend(mut self, backend: &'a dyn CodecBackend) -> Self {
        self.backend = backend;
        self
    }

    pub(crate) fn backend(&self) -> &'a dyn CodecBackend {
        self.backend
    }

    pub fn decode(self, stop: impl Stop) -> Result<DecodeOutput, RasterError> {
        decode_with(&self, &stop)
    }
}

fn decode_with(req: &DecodeRequest<'_>, stop: &dyn Stop) -> Result<DecodeOutput, RasterError> {
    stop.check()?;
    let parsed = parse_container(req.data)?;
    let image = parsed.image;
    if let Some(limits) = req.limits {
        limits.check(image.width(), image.height())?;
    }
    let layout = Layout::plan(&image)?;
    let tile_count = layout.grid.tile_count();
    if parsed.units.len() != tile_count as usize {
        return Err(RasterError::violation(
            0,
            format!("container holds {} coded units, layout needs {tile_count}", parsed.units.len()),
        ));
    }

    let level = req.level;
    let (level_w, level_h) = layout.pyramid.dimensions(level).ok_or_else(|| {
        RasterError::Configuration(format!(
            "resolution level {level} is outside 0..={}",
            layout.pyramid.levels()
        ))
    })?;
    let layer = match req.layer {
        Some(k) if !layout.layers.contains(k) => {
            return Err(RasterError::Configuration(format!(
                "quality layer {k} is outside 0..{}",
                layout.layers.count()
            )));
        }
        Some(k) => k,
        None => layout.layers.highest(),
    };
    let region = req.region.unwrap_or(Rect::full(level_w, level_h));
    if region.is_empty() || !region.fits_within(level_w, level_h) {
        return Err(RasterError::Configuration(format!(
            "region {region} is empty or outside the {level_w}x{level_h} image at level {level}"
        )));
    }

    let descriptor = image.descriptor();
    let bpp = descriptor.bytes_per_pixel();
    let out_len = descriptor
        .buffer_len(region.width, region.height)
        .ok_or_else(|| RasterError::ResourceExhaustion(format!("{region} region overflows")))?;
    if let Some(limits) = req.limits {
        limits.check_memory(out_len)?;
    }

    let wanted: Vec<(u32, Rect)> = (0..tile_count)
        .filter_map(|i| {
            let at_level = layout.grid.bounds_at_level(i, level)?;
            Some((i, at_level.intersect(&region)?))
        })
        .collect();
    debug!(level, layer, %region, tiles = wanted.len(), backend = req.backend.name(), "decoding");

    let indices: Vec<u32> = (0..wanted.len() as u32).collect();
    let pieces = map_units(&indices, stop, |n| {
        let (index, part) = wanted[n as usize];
        let unit = CodingUnit::for_tile(&image, &layout, index)
            .ok_or_else(|| RasterError::violation(0, format!("tile {index} is outside the grid")))?;
        let target = DecodeTarget { level, layer, region: part };
        let samples = req.backend.decompress(&parsed.units[index as usize], &unit, &target)?;
        let needed = part.area() as usize * bpp;
        if samples.len() < needed {
            return Err(RasterError::BufferTooSmall {
                needed,
                actual: samples.len(),
            });
        }
        Ok(samples)
    })?;

    let stride = region.width as usize * bpp;
    let mut pixels = vec![0u8; out_len];
    for ((_, part), samples) in wanted.iter().zip(&pieces) {
        let row_len = part.width as usize * bpp;
        let x0 = (part.x - region.x) as usize * bpp;
        for (row, src) in samples.chunks_exact(row_len).take(part.height as usize).enumerate() {
            let start = (part.y - region.y) as usize * stride + row * stride + x0;
            pixels[start..start + row_len].copy_from_slice(src);
        }
    }

    Ok(DecodeOutput {
        image,
        pixels,
        width: region.width,
        height: region.height,
        level,
        layer,
        region,
    })
}

/// Decode `region` (in coordinates of `level`) with every quality layer.
pub fn decode_region(data: &[u8], region: Rect, level: u8, stop: impl Stop) -> Result<DecodeOutput, RasterError> {
    DecodeRequest::new(data).resolution(level).region(region).decode(stop)
}

/// Decode the whole image at a reduced resolution.
pub fn decode_resolution(data: &[u8], level: u8, stop: impl Stop) -> Result<DecodeOutput, RasterError> {
    DecodeRequest::new(data).resolution(level).decode(stop)
}
