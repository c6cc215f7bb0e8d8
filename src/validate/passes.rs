use super::{Issue, ValidationConfig, ValidationPass, ValidationResult};
use crate::image::{CompressionMode, RasterImage};
use crate::info::FormatKind;
use crate::metadata::{BmpCompression, ChromaSubsampling, FormatMetadata, WaveletTransform};
use crate::planner::ResolutionPyramid;

/// JP2 tile indices are 16-bit in SOT.
const MAX_JP2_TILES: u64 = 65535;
const MAX_LEVELS: u8 = 32;

pub(super) struct Subject<'a> {
    pub image: &'a RasterImage,
    pub metadata: &'a FormatMetadata,
    pub config: &'a ValidationConfig,
}

impl Subject<'_> {
    fn format(&self) -> FormatKind {
        self.image.format()
    }
}

#[derive(Default)]
pub(super) struct Findings {
    pub pass: ValidationPass,
    errors: Vec<Issue>,
    warnings: Vec<Issue>,
}

impl Findings {
    fn issue(&self, message: String) -> Issue {
        Issue {
            pass: self.pass,
            message,
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        let issue = self.issue(message.into());
        self.errors.push(issue);
    }

    fn warn(&mut self, message: impl Into<String>) {
        let issue = self.issue(message.into());
        self.warnings.push(issue);
    }

    pub fn into_result(self) -> ValidationResult {
        ValidationResult {
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

pub(super) fn dimensions(s: &Subject<'_>, out: &mut Findings) {
    let (w, h) = (s.image.width(), s.image.height());
    let limits = s.format().limits();
    if w == 0 || h == 0 {
        out.error(format!("dimensions {w}x{h} must be positive"));
        return;
    }
    if w > limits.max_width || h > limits.max_height {
        out.error(format!(
            "dimensions {w}x{h} exceed the {} maximum of {}x{}",
            s.format(),
            limits.max_width,
            limits.max_height
        ));
    }
    let pixels = s.image.pixel_count();
    if pixels > s.config.large_image_pixels {
        out.warn(format!(
            "{pixels} pixels exceeds the large-image threshold of {}",
            s.config.large_image_pixels
        ));
    }
}

pub(super) fn components(s: &Subject<'_>, out: &mut Findings) {
    let format = s.format();
    let (components, depth) = (s.image.components(), s.image.bit_depth());
    if !format.supports_components(components) {
        out.error(format!("{format} does not support {components} components"));
    }
    if !format.supports_bit_depth(depth) {
        out.error(format!("{format} does not support {depth}-bit samples"));
    }
    if s.image.is_signed() && !format.supports_signed() {
        out.error(format!("{format} has no signed sample representation"));
    }
    if depth > 16 && components > 4 {
        out.warn(format!(
            "{components} components at {depth} bits is unusual and memory-heavy"
        ));
    }
}

pub(super) fn compression(s: &Subject<'_>, out: &mut Findings) {
    let format = s.format();
    let ratio = s.metadata.compression_ratio();
    match s.image.compression() {
        CompressionMode::Lossless => {
            match s.metadata {
                FormatMetadata::Jpeg2000(m) if m.transform != WaveletTransform::Reversible53 => {
                    out.error("lossless coding requires the reversible 5/3 transform");
                }
                FormatMetadata::Avif(m)
                    if matches!(m.subsampling, ChromaSubsampling::Yuv420 | ChromaSubsampling::Yuv422) =>
                {
                    out.error("lossless coding requires 4:4:4 chroma");
                }
                _ => {}
            }
            if let Some(ratio) = ratio {
                out.warn(format!("compression ratio {ratio} is ignored in lossless mode"));
            }
        }
        CompressionMode::Lossy if !format.supports_lossy() => {
            out.error(format!("{format} has no lossy mode"));
        }
        CompressionMode::Lossy => match ratio {
            None => out.error("lossy coding requires a compression ratio"),
            Some(ratio) if ratio.is_nan() || ratio <= 1.0 => {
                out.error(format!("compression ratio {ratio} must be greater than 1"));
            }
            Some(ratio) if ratio > s.config.extreme_compression_ratio => out.warn(format!(
                "compression ratio {ratio} exceeds {} and will degrade badly",
                s.config.extreme_compression_ratio
            )),
            Some(_) => {}
        },
    }
    if let FormatMetadata::Avif(m) = s.metadata {
        if m.speed > 10 {
            out.error(format!("AVIF speed {} is outside 0..=10", m.speed));
        }
        if m.subsampling == ChromaSubsampling::Yuv400 && s.image.components() > 2 {
            out.error("4:0:0 subsampling needs one luma component (plus optional alpha)");
        }
    }
    if let FormatMetadata::Bmp(m) = s.metadata {
        if m.compression != BmpCompression::Rgb && s.image.components() != 1 {
            out.error(format!("{:?} BMP data is palette-indexed and needs one component", m.compression));
        }
    }
}

pub(super) fn tiling(s: &Subject<'_>, out: &mut Findings) {
    let (w, h) = (s.image.width(), s.image.height());
    if w == 0 || h == 0 {
        return;
    }
    match s.metadata {
        FormatMetadata::Jpeg2000(m) => {
            let Some(tile) = m.tile_size else { return };
            if tile.width == 0 || tile.height == 0 {
                out.error(format!(
                    "tile dimensions {}x{} must be positive",
                    tile.width, tile.height
                ));
                return;
            }
            if tile.width > w || tile.height > h {
                out.error(format!(
                    "tile dimensions {}x{} exceed image dimensions {w}x{h}",
                    tile.width, tile.height
                ));
                return;
            }
            if !tile.width.is_power_of_two() || !tile.height.is_power_of_two() {
                out.warn(format!(
                    "tile dimensions {}x{} are not powers of two",
                    tile.width, tile.height
                ));
            }
            let count = u64::from(w.div_ceil(tile.width)) * u64::from(h.div_ceil(tile.height));
            if count > MAX_JP2_TILES {
                out.error(format!("{count} tiles exceed the codestream limit of {MAX_JP2_TILES}"));
            } else if count > u64::from(s.config.large_tile_count) {
                out.warn(format!(
                    "{count} tiles exceeds the large tile count of {}",
                    s.config.large_tile_count
                ));
            }
        }
        FormatMetadata::Tiff(m) => {
            let Some(rows) = m.rows_per_strip else { return };
            if rows == 0 {
                out.error("rows per strip must be positive");
                return;
            }
            if rows > h {
                out.warn(format!("rows per strip {rows} exceeds height {h} and will be clamped"));
            }
            let strips = h.div_ceil(rows.min(h));
            if strips > s.config.large_tile_count {
                out.warn(format!(
                    "{strips} strips exceeds the large tile count of {}",
                    s.config.large_tile_count
                ));
            }
        }
        FormatMetadata::Avif(_) | FormatMetadata::Bmp(_) => {}
    }
}

pub(super) fn progression(s: &Subject<'_>, out: &mut Findings) {
    let FormatMetadata::Jpeg2000(m) = s.metadata else { return };
    let order = m.progression;
    if m.tile_size.is_some() && !order.is_position_first() {
        out.warn(format!(
            "tiled coding favours a position-first order (RPCL, PCRL), not {order}"
        ));
    }
    if m.quality_layers > 1 && !order.is_layer_first() {
        out.warn(format!(
            "{} quality layers favour the layer-first order (LRCP), not {order}",
            m.quality_layers
        ));
    }
    let levels = m.decomposition_levels;
    if levels >= s.config.many_resolution_levels && !order.is_resolution_first() {
        out.warn(format!(
            "{levels} decomposition levels favour a resolution-first order (RLCP, RPCL), not {order}"
        ));
    }

    let (w, h) = (s.image.width(), s.image.height());
    if levels > MAX_LEVELS {
        out.error(format!("{levels} decomposition levels exceed the maximum of {MAX_LEVELS}"));
        return;
    }
    if w.min(h) >> levels == 0 {
        out.error(format!("{levels} decomposition levels collapse a {w}x{h} image to nothing"));
        return;
    }
    let ceiling = ResolutionPyramid::soft_level_ceiling(w, h);
    if levels > ceiling {
        out.warn(format!(
            "{levels} decomposition levels exceed the recommended {ceiling} for {w}x{h}"
        ));
    }
}

pub(super) fn quality_layers(s: &Subject<'_>, out: &mut Findings) {
    let FormatMetadata::Jpeg2000(m) = s.metadata else { return };
    if m.quality_layers == 0 {
        out.error("quality layer count must be in 1..=65535");
        return;
    }
    if m.quality_layers > 1 && s.image.compression() == CompressionMode::Lossless {
        out.warn(format!(
            "{} quality layers bring no benefit in lossless mode",
            m.quality_layers
        ));
    }
}

pub(super) fn region_of_interest(s: &Subject<'_>, out: &mut Findings) {
    let FormatMetadata::Jpeg2000(m) = s.metadata else { return };
    let Some(roi) = m.roi else { return };
    let (w, h) = (s.image.width(), s.image.height());
    let mut ok = true;
    if roi.rect.is_empty() || !roi.is_contained(w, h) {
        out.error(format!("region of interest {} is not contained in {w}x{h}", roi.rect));
        ok = false;
    }
    if roi.quality.is_nan() || roi.quality <= 0.0 {
        out.error(format!("region of interest quality {} must be positive", roi.quality));
        ok = false;
    }
    if !ok {
        return;
    }
    let coverage = roi.coverage(w, h);
    if coverage > 0.8 {
        out.warn(format!(
            "region of interest covers {:.1}% of the image",
            coverage * 100.0
        ));
    } else if coverage < 0.01 {
        out.warn(format!(
            "region of interest covers only {:.2}% of the image",
            coverage * 100.0
        ));
    }
}

pub(super) fn consistency(s: &Subject<'_>, out: &mut Findings) {
    let format = s.format();
    if s.metadata.format() != format {
        out.error(format!(
            "{} metadata attached to a {format} image",
            s.metadata.format()
        ));
    }
    let base = s.metadata.base();
    if base.width != s.image.width() || base.height != s.image.height() {
        out.error(format!(
            "metadata dimensions {}x{} differ from image dimensions {}x{}",
            base.width,
            base.height,
            s.image.width(),
            s.image.height()
        ));
    }
    if base.bit_depth != s.image.bit_depth() {
        out.error(format!(
            "metadata bit depth {} differs from image bit depth {}",
            base.bit_depth,
            s.image.bit_depth()
        ));
    }

    if let Some(icc) = &base.icc_profile {
        if icc.is_empty() {
            out.error("ICC profile is present but empty");
        } else if icc.len() < s.config.min_icc_profile_bytes {
            out.warn(format!(
                "ICC profile of {} bytes is implausibly small",
                icc.len()
            ));
        }
    }

    if base.color_space.is_hdr() {
        if format == FormatKind::Bmp {
            out.error(format!("BMP cannot carry the {:?} color space", base.color_space));
        } else if base.hdr.is_none() {
            out.warn(format!(
                "HDR color space {:?} has no HDR metadata attached",
                base.color_space
            ));
        }
    }
    if let Some(hdr) = &base.hdr {
        let finite = hdr.min_luminance.is_finite() && hdr.max_luminance.is_finite();
        if !finite || hdr.min_luminance < 0.0 || hdr.min_luminance >= hdr.max_luminance {
            out.error(format!(
                "HDR luminance range {}..{} cd/m² is invalid",
                hdr.min_luminance, hdr.max_luminance
            ));
        }
        if format != FormatKind::Avif {
            out.warn(format!("{format} does not store HDR luminance metadata; it will be dropped"));
        }
    }

    if base.exif.is_some() && !format.supports_exif() {
        out.warn(format!("{format} does not store EXIF; it will be dropped"));
    }
    if base.xmp.is_some() && !format.supports_xmp() {
        out.warn(format!("{format} does not store XMP; it will be dropped"));
    }
    if let (Some(created), Some(modified)) = (base.created, base.modified) {
        if modified < created {
            out.warn(format!("modification time {modified} precedes creation time {created}"));
        }
    }
}

pub(super) fn geospatial(s: &Subject<'_>, out: &mut Findings) {
    let Some(geo) = &s.metadata.base().geo else { return };
    let format = s.format();
    if !format.supports_geo() {
        out.warn(format!("{format} does not store geospatial metadata; it will be dropped"));
    }
    if geo.geotag.as_ref().is_some_and(|t| t.len() % 2 != 0) {
        out.error("geotag length must be a whole number of 16-bit entries");
    }
    if geo.coefficients().is_none() {
        out.error(format!(
            "geo transform has {} coefficients, expected 6",
            geo.transform.len()
        ));
        return;
    }
    if geo.is_degenerate() {
        out.error("geo transform is degenerate: both scale terms are zero");
        return;
    }
    if geo.has_rotation() {
        out.warn("geo transform has significant rotation or skew");
    }
    if geo.crs.as_deref().is_none_or(str::is_empty) {
        out.warn("geo reference has no coordinate reference system");
    }
}

pub(super) fn memory(s: &Subject<'_>, out: &mut Findings) {
    let metadata_bytes = s.metadata.base().estimated_size() as u64;
    if metadata_bytes > s.config.max_metadata_bytes {
        out.warn(format!(
            "estimated metadata size {metadata_bytes} bytes exceeds {}",
            s.config.max_metadata_bytes
        ));
    }
    let output_bytes = estimated_output_bytes(s.image, s.metadata);
    if output_bytes > s.config.max_output_bytes {
        out.warn(format!(
            "estimated output size {output_bytes} bytes exceeds {}",
            s.config.max_output_bytes
        ));
    }
}

/// Raw sample bytes, divided by the compression ratio when lossy. Advisory.
pub(crate) fn estimated_output_bytes(image: &RasterImage, metadata: &FormatMetadata) -> u64 {
    let raw = image.pixel_count()
        * u64::from(image.components())
        * image.descriptor().bytes_per_sample() as u64;
    match (image.compression(), metadata.compression_ratio()) {
        (CompressionMode::Lossy, Some(ratio)) if ratio > 1.0 => (raw as f64 / f64::from(ratio)) as u64,
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use crate::image::{CompressionMode, RasterImage};
    use crate::info::FormatKind;
    use crate::metadata::{ColorSpace, GeoReference, HdrMetadata, WaveletTransform};
    use crate::planner::{ProgressionOrder, Rect, RegionOfInterest, TileSize};
    use crate::validate::{ValidationConfig, ValidationPass, Validator};

    fn jp2(w: u32, h: u32) -> RasterImage {
        RasterImage::new(FormatKind::Jpeg2000, w, h, 3, 8).unwrap()
    }

    #[test]
    fn default_jp2_is_clean() {
        let result = jp2(512, 512).validate();
        assert!(result.is_valid(), "{}", result.summary());
        assert!(result.warnings().is_empty(), "{:?}", result.warnings());
    }

    #[test]
    fn oversized_tile_is_a_single_error() {
        let mut image = jp2(1000, 1000);
        image.metadata_mut().as_jp2_mut().unwrap().tile_size = Some(TileSize::new(2000, 1000));
        let result = image.validate();
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].pass, ValidationPass::Tiling);
        assert!(result.errors()[0].message.contains("exceed image dimensions"));
    }

    #[test]
    fn tiling_prefers_position_first() {
        let mut image = jp2(1024, 1024);
        let m = image.metadata_mut().as_jp2_mut().unwrap();
        m.tile_size = Some(TileSize::square(256));
        assert_eq!(image.validate().warnings_from(ValidationPass::Progression).count(), 1);
        image.metadata_mut().as_jp2_mut().unwrap().progression = ProgressionOrder::Rpcl;
        assert_eq!(image.validate().warnings_from(ValidationPass::Progression).count(), 0);
    }

    #[test]
    fn roi_out_of_bounds_is_an_error() {
        let mut image = jp2(1000, 1000);
        image.metadata_mut().as_jp2_mut().unwrap().roi =
            Some(RegionOfInterest::new(Rect::new(900, 900, 200, 200), 2.0));
        let result = image.validate();
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].pass, ValidationPass::RegionOfInterest);
    }

    #[test]
    fn roi_coverage_warnings() {
        let mut image = jp2(1000, 1000);
        image.metadata_mut().as_jp2_mut().unwrap().roi =
            Some(RegionOfInterest::new(Rect::new(0, 0, 950, 950), 2.0));
        assert_eq!(image.validate().warnings_from(ValidationPass::RegionOfInterest).count(), 1);
        image.metadata_mut().as_jp2_mut().unwrap().roi =
            Some(RegionOfInterest::new(Rect::new(0, 0, 10, 10), 2.0));
        assert_eq!(image.validate().warnings_from(ValidationPass::RegionOfInterest).count(), 1);
    }

    #[test]
    fn lossless_rejects_irreversible_transform() {
        let mut image = jp2(256, 256);
        image.metadata_mut().as_jp2_mut().unwrap().transform = WaveletTransform::Irreversible97;
        assert!(!image.validate().is_valid());
        image.set_compression(CompressionMode::Lossy);
        image.metadata_mut().as_jp2_mut().unwrap().compression_ratio = Some(20.0);
        assert!(image.validate().is_valid());
    }

    #[test]
    fn lossy_ratio_rules() {
        let mut image = jp2(256, 256);
        image.set_compression(CompressionMode::Lossy);
        assert!(!image.validate().is_valid());
        image.metadata_mut().as_jp2_mut().unwrap().compression_ratio = Some(1.0);
        assert!(!image.validate().is_valid());
        image.metadata_mut().as_jp2_mut().unwrap().compression_ratio = Some(500.0);
        let result = image.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings_from(ValidationPass::Compression).count(), 1);
    }

    #[test]
    fn tiff_has_no_lossy_mode() {
        let mut image = RasterImage::new(FormatKind::Tiff, 64, 64, 1, 8).unwrap();
        image.set_compression(CompressionMode::Lossy);
        assert_eq!(image.validate().errors()[0].pass, ValidationPass::Compression);
    }

    #[test]
    fn mirror_mismatch_is_an_error() {
        let mut image = jp2(64, 64);
        image.metadata_mut().base_mut().width = 65;
        let result = image.validate();
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].pass, ValidationPass::MetadataConsistency);
    }

    #[test]
    fn icc_profile_checks() {
        let mut image = jp2(64, 64);
        image.metadata_mut().base_mut().icc_profile = Some(Vec::new());
        assert!(!image.validate().is_valid());
        image.metadata_mut().base_mut().icc_profile = Some(vec![0; 64]);
        let result = image.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn hdr_luminance_must_be_ordered() {
        let mut image = RasterImage::new(FormatKind::Avif, 64, 64, 3, 10).unwrap();
        let base = image.metadata_mut().base_mut();
        base.color_space = ColorSpace::Bt2100Pq;
        base.hdr = Some(HdrMetadata {
            max_luminance: 0.005,
            min_luminance: 1000.0,
            max_content_light_level: 1000,
            max_frame_average_light_level: 400,
        });
        assert!(!image.validate().is_valid());
    }

    #[test]
    fn hdr_on_bmp_is_an_error() {
        let mut image = RasterImage::new(FormatKind::Bmp, 8, 8, 3, 8).unwrap();
        image.metadata_mut().base_mut().color_space = ColorSpace::Bt2100Hlg;
        assert!(!image.validate().is_valid());
    }

    #[test]
    fn geospatial_checks() {
        let mut image = RasterImage::new(FormatKind::Tiff, 64, 64, 1, 16).unwrap();
        image.metadata_mut().base_mut().geo = Some(GeoReference {
            transform: vec![0.0; 4],
            ..Default::default()
        });
        assert_eq!(image.validate().errors()[0].pass, ValidationPass::Geospatial);

        image.metadata_mut().base_mut().geo =
            Some(GeoReference::from_affine([10.0, 0.0, 0.0, 20.0, 0.0, 0.0]));
        assert!(!image.validate().is_valid());

        image.metadata_mut().base_mut().geo =
            Some(GeoReference::from_affine([10.0, 1.0, 0.0, 20.0, 0.0, -1.0]));
        let result = image.validate();
        assert!(result.is_valid());
        // missing CRS
        assert_eq!(result.warnings_from(ValidationPass::Geospatial).count(), 1);
    }

    #[test]
    fn memory_warnings_follow_config() {
        let config = ValidationConfig {
            max_output_bytes: 1000,
            ..Default::default()
        };
        let result = Validator::new(config).validate(&jp2(64, 64), jp2(64, 64).metadata());
        assert!(result.is_valid());
        assert_eq!(result.warnings_from(ValidationPass::Memory).count(), 1);
    }

    #[test]
    fn excessive_levels() {
        let mut image = jp2(64, 64);
        image.metadata_mut().as_jp2_mut().unwrap().decomposition_levels = 7;
        assert!(!image.validate().is_valid());
        image.metadata_mut().as_jp2_mut().unwrap().decomposition_levels = 3;
        let result = image.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings_from(ValidationPass::Progression).count(), 1);
    }

    #[test]
    fn summary_mentions_counts() {
        let mut image = jp2(64, 64);
        image.metadata_mut().base_mut().width = 1;
        let summary = image.validate().summary();
        assert!(summary.starts_with("invalid, 1 error, 0 warnings"), "{summary}");
        assert_eq!(jp2(64, 64).validate().summary(), "valid, 0 warnings");
    }
}
