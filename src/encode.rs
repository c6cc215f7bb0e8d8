use std::borrow::Cow;

use enough::Stop;
use tracing::{debug, warn};

use crate::backend::{CodecBackend, CodecOptions, CodingUnit, PassthroughBackend, map_units};
use crate::error::RasterError;
use crate::image::{CompressionMode, RasterImage};
use crate::info::FormatKind;
use crate::limits::Limits;
use crate::metadata::FormatMetadata;
use crate::planner::{Layout, ProgressionOrder, Rect, RegionOfInterest, TileSize};
use crate::validate::{ResourcePolicy, ValidationConfig, ValidationPass, ValidationResult, Validator};

static PASSTHROUGH: PassthroughBackend = PassthroughBackend;

/// Per-encode overrides merged over the image's metadata.
///
/// Unset fields keep the metadata value. Setting a field the target format
/// has no counterpart for is a [`RasterError::Configuration`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodeOptions {
    pub compression: Option<CompressionMode>,
    pub compression_ratio: Option<f32>,
    /// JP2 tile size; for TIFF a full-width tile sets the rows per strip.
    pub tile_size: Option<TileSize>,
    pub decomposition_levels: Option<u8>,
    pub quality_layers: Option<u16>,
    pub progression: Option<ProgressionOrder>,
    pub roi: Option<RegionOfInterest>,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lossless() -> Self {
        Self::new().with_compression(CompressionMode::Lossless)
    }

    /// Lossy coding at `ratio` raw bytes per compressed byte.
    pub fn lossy(ratio: f32) -> Self {
        Self::new()
            .with_compression(CompressionMode::Lossy)
            .with_compression_ratio(ratio)
    }

    pub fn with_compression(mut self, mode: CompressionMode) -> Self {
        self.compression = Some(mode);
        self
    }

    pub fn with_compression_ratio(mut self, ratio: f32) -> Self {
        self.compression_ratio = Some(ratio);
        self
    }

    pub fn with_tile_size(mut self, tile: TileSize) -> Self {
        self.tile_size = Some(tile);
        self
    }

    pub fn with_decomposition_levels(mut self, levels: u8) -> Self {
        self.decomposition_levels = Some(levels);
        self
    }

    pub fn with_quality_layers(mut self, layers: u16) -> Self {
        self.quality_layers = Some(layers);
        self
    }

    pub fn with_progression(mut self, order: ProgressionOrder) -> Self {
        self.progression = Some(order);
        self
    }

    pub fn with_roi(mut self, roi: RegionOfInterest) -> Self {
        self.roi = Some(roi);
        self
    }

    /// Write the set fields into `image`'s metadata.
    pub(crate) fn apply(&self, image: &mut RasterImage) -> Result<(), RasterError> {
        let format = image.format();
        let width = image.width();
        if let Some(mode) = self.compression {
            image.set_compression(mode);
        }
        let inapplicable = |field: &str| RasterError::Configuration(format!("{format} has no {field} setting"));
        match image.metadata_mut() {
            FormatMetadata::Jpeg2000(m) => {
                if let Some(ratio) = self.compression_ratio {
                    m.compression_ratio = Some(ratio);
                }
                if let Some(tile) = self.tile_size {
                    m.tile_size = Some(tile);
                }
                if let Some(levels) = self.decomposition_levels {
                    m.decomposition_levels = levels;
                }
                if let Some(layers) = self.quality_layers {
                    m.quality_layers = layers;
                }
                if let Some(order) = self.progression {
                    m.progression = order;
                }
                if let Some(roi) = self.roi {
                    m.roi = Some(roi);
                }
                return Ok(());
            }
            FormatMetadata::Avif(m) => {
                if let Some(ratio) = self.compression_ratio {
                    m.compression_ratio = Some(ratio);
                }
                if self.tile_size.is_some() {
                    return Err(inapplicable("tile size"));
                }
            }
            FormatMetadata::Tiff(m) => {
                if self.compression_ratio.is_some() {
                    return Err(inapplicable("compression ratio"));
                }
                match self.tile_size {
                    Some(tile) if tile.width == width => m.rows_per_strip = Some(tile.height),
                    Some(tile) => {
                        return Err(RasterError::Configuration(format!(
                            "TIFF strips span the full width {width}, not {}",
                            tile.width
                        )));
                    }
                    None => {}
                }
            }
            FormatMetadata::Bmp(_) => {
                if self.compression_ratio.is_some() {
                    return Err(inapplicable("compression ratio"));
                }
                if self.tile_size.is_some() {
                    return Err(inapplicable("tile size"));
                }
            }
        }
        if self.decomposition_levels.is_some() {
            return Err(inapplicable("decomposition level"));
        }
        if self.quality_layers.is_some() {
            return Err(inapplicable("quality layer"));
        }
        if self.progression.is_some() {
            return Err(inapplicable("progression order"));
        }
        if self.roi.is_some() {
            return Err(inapplicable("region of interest"));
        }
        Ok(())
    }
}

/// Encoded container bytes with the validation report and resolved layout.
#[derive(Clone, Debug)]
pub struct EncodeOutput {
    pub data: Vec<u8>,
    /// Warnings raised by validation; never contains errors.
    pub report: ValidationResult,
    pub layout: Layout,
}

/// Encode request builder.
///
/// ```
/// use zenraster::{EncodeOptions, EncodeRequest, FormatKind, RasterImage, TileSize, Unstoppable};
///
/// let image = RasterImage::new(FormatKind::Jpeg2000, 256, 256, 3, 8)?;
/// let pixels = vec![0u8; 256 * 256 * 3];
/// let out = EncodeRequest::new(&image)
///     .with_options(EncodeOptions::new().with_tile_size(TileSize::square(128)))
///     .encode(&pixels, Unstoppable)?;
/// assert_eq!(out.layout.grid.tile_count(), 4);
/// # Ok::<(), zenraster::RasterError>(())
/// ```
#[derive(Clone)]
pub struct EncodeRequest<'a> {
    image: &'a RasterImage,
    options: EncodeOptions,
    validator: Validator,
    limits: Option<&'a Limits>,
    backend: &'a dyn CodecBackend,
}

impl<'a> EncodeRequest<'a> {
    pub fn new(image: &'a RasterImage) -> Self {
        Self {
            image,
            options: EncodeOptions::default(),
            validator: Validator::default(),
            limits: None,
            backend: &PASSTHROUGH,
        }
    }

    pub fn with_options(mut self, options: EncodeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validator = Validator::new(config);
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

    /// Encode interleaved, row-major `pixels` laid out per
    /// [`RasterImage::descriptor`].
    pub fn encode(self, pixels: &[u8], stop: impl Stop) -> Result<EncodeOutput, RasterError> {
        encode_with(&self, pixels, &stop)
    }
}

/// Samples of `rect`, borrowed when its rows are contiguous in `pixels`.
fn tile_pixels<'p>(pixels: &'p [u8], image_width: u32, bpp: usize, rect: Rect) -> Cow<'p, [u8]> {
    let stride = image_width as usize * bpp;
    let start = rect.y as usize * stride;
    if rect.x == 0 && rect.width == image_width {
        return Cow::Borrowed(&pixels[start..start + rect.height as usize * stride]);
    }
    let row_len = rect.width as usize * bpp;
    let x0 = rect.x as usize * bpp;
    let mut out = Vec::with_capacity(row_len * rect.height as usize);
    for row in pixels[start..].chunks(stride).take(rect.height as usize) {
        out.extend_from_slice(&row[x0..x0 + row_len]);
    }
    Cow::Owned(out)
}

fn encode_with(req: &EncodeRequest<'_>, pixels: &[u8], stop: &dyn Stop) -> Result<EncodeOutput, RasterError> {
    stop.check()?;
    let mut image = req.image.clone();
    req.options.apply(&mut image)?;

    let report = req.validator.validate(&image, image.metadata());
    if !report.is_valid() {
        debug!(summary = %report.summary(), "validation failed");
        return Err(RasterError::Configuration(report.error_text()));
    }
    for warning in report.warnings() {
        warn!(%warning, "validation warning");
    }
    if req.validator.config().resource_policy == ResourcePolicy::Enforce {
        if let Some(over) = report.warnings_from(ValidationPass::Memory).next() {
            return Err(RasterError::ResourceExhaustion(over.message.clone()));
        }
    }

    let (width, height) = (image.width(), image.height());
    if let Some(limits) = req.limits {
        limits.check(width, height)?;
    }
    let descriptor = image.descriptor();
    let needed = descriptor
        .buffer_len(width, height)
        .ok_or_else(|| RasterError::ResourceExhaustion(format!("{width}x{height} pixel buffer overflows")))?;
    if let Some(limits) = req.limits {
        limits.check_memory(needed)?;
    }
    if pixels.len() < needed {
        return Err(RasterError::BufferTooSmall {
            needed,
            actual: pixels.len(),
        });
    }
    req.backend.check_support(&image)?;

    let layout = Layout::plan(&image)?;
    let codec_options = CodecOptions::from_metadata(image.compression(), image.metadata());
    let bpp = descriptor.bytes_per_pixel();
    let indices: Vec<u32> = (0..layout.grid.tile_count()).collect();
    debug!(
        format = %image.format(),
        tiles = indices.len(),
        levels = layout.pyramid.levels(),
        layers = layout.layers.count(),
        backend = req.backend.name(),
        "encoding"
    );
    let units = map_units(&indices, stop, |index| {
        let unit = CodingUnit::for_tile(&image, &layout, index)
            .ok_or_else(|| RasterError::Configuration(format!("tile {index} is outside the grid")))?;
        let samples = tile_pixels(pixels, width, bpp, unit.bounds);
        req.backend.compress(&samples, &unit, &codec_options)
    })?;
    stop.check()?;

    let data = match image.format() {
        FormatKind::Jpeg2000 => crate::jp2::write(&image, &layout, &units)?,
        FormatKind::Avif => crate::avif::write(&image, &layout, &units)?,
        FormatKind::Tiff => crate::tiff::write(&image, &layout, &units)?,
        FormatKind::Bmp => crate::bmp::write(&image, &layout, &units)?,
    };
    debug!(bytes = data.len(), warnings = report.warnings().len(), "encoded");
    Ok(EncodeOutput { data, report, layout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use enough::Unstoppable;

    #[test]
    fn options_reach_jp2_metadata() {
        let mut image = RasterImage::new(FormatKind::Jpeg2000, 64, 64, 1, 8).unwrap();
        EncodeOptions::lossy(20.0)
            .with_quality_layers(3)
            .with_progression(ProgressionOrder::Rpcl)
            .apply(&mut image)
            .unwrap();
        let m = image.metadata().as_jp2().unwrap();
        assert_eq!(image.compression(), CompressionMode::Lossy);
        assert_eq!(m.compression_ratio, Some(20.0));
        assert_eq!((m.quality_layers, m.progression), (3, ProgressionOrder::Rpcl));
    }

    #[test]
    fn wavelet_options_are_rejected_elsewhere() {
        let mut image = RasterImage::new(FormatKind::Bmp, 8, 8, 3, 8).unwrap();
        let err = EncodeOptions::new().with_quality_layers(2).apply(&mut image).unwrap_err();
        assert!(matches!(err, RasterError::Configuration(_)));
    }

    #[test]
    fn tiff_strip_height_from_tile() {
        let mut image = RasterImage::new(FormatKind::Tiff, 32, 32, 1, 8).unwrap();
        EncodeOptions::new().with_tile_size(TileSize::new(32, 8)).apply(&mut image).unwrap();
        assert!(EncodeOptions::new().with_tile_size(TileSize::square(8)).apply(&mut image).is_err());
        let out = EncodeRequest::new(&image).encode(&[0; 1024], Unstoppable).unwrap();
        assert_eq!(out.layout.grid.tile_count(), 4);
    }

    #[test]
    fn tile_pixels_extracts_interior() {
        let pixels: Vec<u8> = (0..16).collect();
        let tile = tile_pixels(&pixels, 4, 1, Rect::new(1, 1, 2, 2));
        assert_eq!(&tile[..], &[5, 6, 9, 10]);
        assert!(matches!(tile_pixels(&pixels, 4, 1, Rect::new(0, 2, 4, 2)), Cow::Borrowed(_)));
    }

    #[test]
    fn invalid_image_never_reaches_the_backend() {
        let mut image = RasterImage::new(FormatKind::Jpeg2000, 64, 64, 3, 8).unwrap();
        image.set_compression(CompressionMode::Lossy);
        let err = EncodeRequest::new(&image).encode(&[0; 64 * 64 * 3], Unstoppable).unwrap_err();
        assert!(matches!(err, RasterError::Configuration(msg) if msg.contains("ratio")));
    }
}
