use crate::error::RasterError;
use crate::info::FormatKind;
use crate::metadata::{FormatMetadata, TeardownReport};
use crate::pixel::PixelDescriptor;
use crate::validate::{ValidationResult, Validator};

/// Lossless or lossy coding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressionMode {
    #[default]
    Lossless,
    Lossy,
}

/// A raster description and its format metadata.
///
/// Dimensions, components and bit depth are bounded by the format on
/// construction and by every setter; the metadata mirror of width, height and
/// bit depth is kept in step. Cross-field rules are left to [`Validator`].
#[derive(Clone, Debug, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    components: u16,
    bit_depth: u8,
    signed: bool,
    compression: CompressionMode,
    metadata: FormatMetadata,
}

impl RasterImage {
    pub fn new(
        format: FormatKind,
        width: u32,
        height: u32,
        components: u16,
        bit_depth: u8,
    ) -> Result<Self, RasterError> {
        check_dimensions(format, width, height)?;
        check_components(format, components)?;
        check_bit_depth(format, bit_depth)?;
        Ok(Self {
            width,
            height,
            components,
            bit_depth,
            signed: false,
            compression: CompressionMode::Lossless,
            metadata: FormatMetadata::new(format, width, height, bit_depth),
        })
    }

    /// Assemble a parsed image without bounds checks.
    pub(crate) fn from_parts(
        components: u16,
        signed: bool,
        compression: CompressionMode,
        metadata: FormatMetadata,
    ) -> Self {
        let base = metadata.base();
        Self {
            width: base.width,
            height: base.height,
            components,
            bit_depth: base.bit_depth,
            signed,
            compression,
            metadata,
        }
    }

    pub fn format(&self) -> FormatKind {
        self.metadata.format()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn components(&self) -> u16 {
        self.components
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Interleaved sample layout of this image's pixel buffers.
    pub fn descriptor(&self) -> PixelDescriptor {
        PixelDescriptor {
            components: self.components,
            bit_depth: self.bit_depth,
            signed: self.signed,
        }
    }

    pub fn metadata(&self) -> &FormatMetadata {
        &self.metadata
    }

    /// Format extension fields. Changing the width, height or bit depth
    /// mirror here makes the image fail validation.
    pub fn metadata_mut(&mut self) -> &mut FormatMetadata {
        &mut self.metadata
    }

    pub fn set_dimensions(&mut self, width: u32, height: u32) -> Result<(), RasterError> {
        check_dimensions(self.format(), width, height)?;
        self.width = width;
        self.height = height;
        let base = self.metadata.base_mut();
        base.width = width;
        base.height = height;
        Ok(())
    }

    pub fn set_components(&mut self, components: u16) -> Result<(), RasterError> {
        check_components(self.format(), components)?;
        self.components = components;
        Ok(())
    }

    pub fn set_bit_depth(&mut self, bit_depth: u8) -> Result<(), RasterError> {
        check_bit_depth(self.format(), bit_depth)?;
        self.bit_depth = bit_depth;
        self.metadata.base_mut().bit_depth = bit_depth;
        Ok(())
    }

    pub fn set_signed(&mut self, signed: bool) -> Result<(), RasterError> {
        if signed && !self.format().supports_signed() {
            return Err(RasterError::UnsupportedFeature(format!(
                "{} has no signed sample representation",
                self.format()
            )));
        }
        self.signed = signed;
        Ok(())
    }

    pub fn set_compression(&mut self, mode: CompressionMode) {
        self.compression = mode;
    }

    /// Validate against the default [`ValidationConfig`](crate::ValidationConfig).
    pub fn validate(&self) -> ValidationResult {
        Validator::default().validate(self, &self.metadata)
    }

    /// Release the image and its metadata buffers in one step.
    pub fn dispose(self) -> TeardownReport {
        self.metadata.release()
    }

    /// Release the image, yielding between metadata buffer releases when they
    /// are large. See [`FormatMetadata::release_staged`].
    pub async fn dispose_staged(self) -> TeardownReport {
        self.metadata.release_staged().await
    }
}

fn check_dimensions(format: FormatKind, width: u32, height: u32) -> Result<(), RasterError> {
    let limits = format.limits();
    if width == 0 || height == 0 {
        return Err(RasterError::Configuration(format!(
            "dimensions {width}x{height} must be positive"
        )));
    }
    if width > limits.max_width || height > limits.max_height {
        return Err(RasterError::Configuration(format!(
            "dimensions {width}x{height} exceed the {format} maximum of {}x{}",
            limits.max_width, limits.max_height
        )));
    }
    Ok(())
}

fn check_components(format: FormatKind, components: u16) -> Result<(), RasterError> {
    if !format.supports_components(components) {
        return Err(RasterError::Configuration(format!(
            "{format} does not support {components} components"
        )));
    }
    Ok(())
}

fn check_bit_depth(format: FormatKind, bit_depth: u8) -> Result<(), RasterError> {
    if !format.supports_bit_depth(bit_depth) {
        return Err(RasterError::Configuration(format!(
            "{format} does not support {bit_depth}-bit samples"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_bounds() {
        assert!(RasterImage::new(FormatKind::Jpeg2000, 0, 10, 3, 8).is_err());
        assert!(RasterImage::new(FormatKind::Avif, 70000, 10, 3, 8).is_err());
        assert!(RasterImage::new(FormatKind::Avif, 64, 64, 5, 8).is_err());
        assert!(RasterImage::new(FormatKind::Bmp, 64, 64, 3, 16).is_err());
        assert!(RasterImage::new(FormatKind::Jpeg2000, 64, 64, 3, 38).is_ok());
    }

    #[test]
    fn setters_keep_mirror_in_sync() {
        let mut image = RasterImage::new(FormatKind::Tiff, 10, 10, 1, 8).unwrap();
        image.set_dimensions(20, 30).unwrap();
        image.set_bit_depth(16).unwrap();
        let base = image.metadata().base();
        assert_eq!((base.width, base.height, base.bit_depth), (20, 30, 16));
        assert!(image.set_bit_depth(12).is_err());
        assert_eq!(image.bit_depth(), 16);
    }

    #[test]
    fn signed_needs_format_support() {
        let mut bmp = RasterImage::new(FormatKind::Bmp, 4, 4, 3, 8).unwrap();
        assert!(matches!(bmp.set_signed(true), Err(RasterError::UnsupportedFeature(_))));
        let mut jp2 = RasterImage::new(FormatKind::Jpeg2000, 4, 4, 1, 16).unwrap();
        jp2.set_signed(true).unwrap();
        assert!(jp2.descriptor().signed);
    }

    #[test]
    fn format_follows_metadata() {
        let image = RasterImage::new(FormatKind::Avif, 4, 4, 3, 10).unwrap();
        assert_eq!(image.format(), FormatKind::Avif);
        assert!(matches!(image.metadata(), FormatMetadata::Avif(_)));
    }
}
