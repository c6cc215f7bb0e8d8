//! Cross-field validation of an image and its format metadata.
//!
//! [`Validator::validate`] never fails: it runs a fixed sequence of pure
//! passes and reports blocking errors and advisory warnings in pass order.
//!
//! ```
//! use zenraster::{FormatKind, RasterImage, Validator};
//!
//! let image = RasterImage::new(FormatKind::Jpeg2000, 512, 512, 3, 8)?;
//! let result = Validator::default().validate(&image, image.metadata());
//! assert!(result.is_valid());
//! # Ok::<(), zenraster::RasterError>(())
//! ```

mod passes;

use crate::image::RasterImage;
use crate::metadata::FormatMetadata;

/// Validation pass that produced an [`Issue`], in execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationPass {
    #[default]
    Dimension,
    ComponentBitDepth,
    Compression,
    Tiling,
    Progression,
    QualityLayers,
    RegionOfInterest,
    MetadataConsistency,
    Geospatial,
    Memory,
}

impl ValidationPass {
    pub const ALL: [ValidationPass; 10] = [
        Self::Dimension,
        Self::ComponentBitDepth,
        Self::Compression,
        Self::Tiling,
        Self::Progression,
        Self::QualityLayers,
        Self::RegionOfInterest,
        Self::MetadataConsistency,
        Self::Geospatial,
        Self::Memory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Dimension => "dimension",
            Self::ComponentBitDepth => "component/bit-depth",
            Self::Compression => "compression",
            Self::Tiling => "tiling",
            Self::Progression => "progression",
            Self::QualityLayers => "quality-layers",
            Self::RegionOfInterest => "region-of-interest",
            Self::MetadataConsistency => "metadata",
            Self::Geospatial => "geospatial",
            Self::Memory => "memory",
        }
    }
}

/// A single finding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub pass: ValidationPass,
    pub message: String,
}

impl core::fmt::Display for Issue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}] {}", self.pass.name(), self.message)
    }
}

/// Ordered errors (blocking) and warnings (advisory).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<Issue>,
    warnings: Vec<Issue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Issue] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Issue] {
        &self.warnings
    }

    /// Warnings raised by `pass`.
    pub fn warnings_from(&self, pass: ValidationPass) -> impl Iterator<Item = &Issue> {
        self.warnings.iter().filter(move |w| w.pass == pass)
    }

    /// One-line human-readable verdict.
    pub fn summary(&self) -> String {
        let plural = |n: usize, word: &str| {
            if n == 1 {
                format!("1 {word}")
            } else {
                format!("{n} {word}s")
            }
        };
        match self.errors.first() {
            None => format!("valid, {}", plural(self.warnings.len(), "warning")),
            Some(first) => format!(
                "invalid, {}, {}; first: {first}",
                plural(self.errors.len(), "error"),
                plural(self.warnings.len(), "warning")
            ),
        }
    }

    /// All error messages joined for a configuration error.
    pub(crate) fn error_text(&self) -> String {
        self.errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    }
}

/// What to do when the memory pass finds an estimate above its ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResourcePolicy {
    /// Warn only.
    #[default]
    Advisory,
    /// The orchestrator refuses with [`RasterError::ResourceExhaustion`](crate::RasterError::ResourceExhaustion).
    Enforce,
}

/// Thresholds for advisory warnings.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationConfig {
    /// Pixel count above which an image is flagged as large.
    pub large_image_pixels: u64,
    /// Lossy ratio above which quality is likely to collapse.
    pub extreme_compression_ratio: f32,
    pub large_tile_count: u32,
    /// Decomposition depth from which resolution-first orders are expected.
    pub many_resolution_levels: u8,
    /// ICC profiles shorter than this are implausible.
    pub min_icc_profile_bytes: usize,
    pub max_metadata_bytes: u64,
    pub max_output_bytes: u64,
    pub resource_policy: ResourcePolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            large_image_pixels: 100_000_000,
            extreme_compression_ratio: 200.0,
            large_tile_count: 4096,
            many_resolution_levels: 6,
            min_icc_profile_bytes: 128,
            max_metadata_bytes: 64 << 20,
            max_output_bytes: 4 << 30,
            resource_policy: ResourcePolicy::Advisory,
        }
    }
}

/// Runs the validation passes.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate `image` against `metadata`, which is normally
    /// `image.metadata()` or a candidate replacement for it.
    pub fn validate(&self, image: &RasterImage, metadata: &FormatMetadata) -> ValidationResult {
        let subject = passes::Subject {
            image,
            metadata,
            config: &self.config,
        };
        let mut findings = passes::Findings::default();
        for pass in ValidationPass::ALL {
            findings.pass = pass;
            match pass {
                ValidationPass::Dimension => passes::dimensions(&subject, &mut findings),
                ValidationPass::ComponentBitDepth => passes::components(&subject, &mut findings),
                ValidationPass::Compression => passes::compression(&subject, &mut findings),
                ValidationPass::Tiling => passes::tiling(&subject, &mut findings),
                ValidationPass::Progression => passes::progression(&subject, &mut findings),
                ValidationPass::QualityLayers => passes::quality_layers(&subject, &mut findings),
                ValidationPass::RegionOfInterest => passes::region_of_interest(&subject, &mut findings),
                ValidationPass::MetadataConsistency => passes::consistency(&subject, &mut findings),
                ValidationPass::Geospatial => passes::geospatial(&subject, &mut findings),
                ValidationPass::Memory => passes::memory(&subject, &mut findings),
            }
        }
        findings.into_result()
    }
}
