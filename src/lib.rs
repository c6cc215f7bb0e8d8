//! # zenraster
//!
//! Container engine for JPEG 2000 (JP2), AVIF, TIFF and BMP rasters, with
//! tiling, resolution pyramids, progression planning and validation-gated
//! encoding.
//!
//! The crate owns everything around the entropy coder: the box/IFD/header
//! envelopes, the metadata model, the checks that decide whether a codec
//! configuration is coherent, and the layout of tiles, resolution levels and
//! quality layers. Compression itself goes through a [`CodecBackend`]; the
//! built-in [`PassthroughBackend`] stores samples verbatim, which is enough to
//! round-trip every container and exercise the planner.
//!
//! ## Supported Formats
//!
//! - **JP2**: signature, `ftyp`, `jp2h` (`ihdr`, `colr`, `res `), XMP/EXIF
//!   `uuid` boxes, GeoJP2, and a `jp2c` codestream with SIZ/COD/QCD markers
//!   and one tile-part per tile
//! - **AVIF**: `ftyp`, `meta` (`hdlr`, `pitm`, `iinf`, `iloc`, `iprp`) and
//!   `mdat`, with `nclx`/ICC colour, `clli`/`mdcv` HDR properties
//! - **TIFF**: classic little- and big-endian files, strips, GeoTIFF tags
//! - **BMP**: V5 headers, 8/24/32-bit RGB, RLE8/RLE4 payloads, embedded ICC
//!
//! ## Non-Goals
//!
//! - Actual wavelet or AV1 compression (plug in a [`CodecBackend`])
//! - Animation and multi-image containers
//! - Colour management
//!
//! ## Usage
//!
//! ```
//! use zenraster::{
//!     DecodeRequest, EncodeOptions, EncodeRequest, FormatKind, ImageInfo, Rect, RasterImage,
//!     TileSize, Unstoppable,
//! };
//!
//! let image = RasterImage::new(FormatKind::Jpeg2000, 64, 64, 3, 8)?;
//! let pixels = vec![128u8; 64 * 64 * 3];
//!
//! let out = EncodeRequest::new(&image)
//!     .with_options(EncodeOptions::lossless().with_tile_size(TileSize::square(32)))
//!     .encode(&pixels, Unstoppable)?;
//! assert!(out.report.is_valid());
//!
//! // Probe without decoding
//! let info = ImageInfo::from_bytes(&out.data)?;
//! assert_eq!(info.tile_count, 4);
//!
//! // Only the tiles covering the region are decompressed
//! let part = DecodeRequest::new(&out.data)
//!     .region(Rect::new(16, 16, 32, 32))
//!     .decode(Unstoppable)?;
//! assert_eq!(part.pixels().len(), 32 * 32 * 3);
//! # Ok::<(), zenraster::RasterError>(())
//! ```

#![forbid(unsafe_code)]

mod error;
mod info;
mod limits;
mod pixel;

mod cursor;
pub mod container;
mod image;
pub mod metadata;
mod planner;
mod validate;

mod backend;

mod avif;
mod bmp;
mod jp2;
mod tiff;

mod decode;
mod encode;
mod session;

// Re-exports
pub use backend::{CodecBackend, CodecOptions, CodecScheme, CodingUnit, DecodeTarget, PassthroughBackend};
pub use decode::{DecodeOutput, DecodeRequest, decode_region, decode_resolution};
pub use encode::{EncodeOptions, EncodeOutput, EncodeRequest};
pub use enough::{Stop, StopReason, Unstoppable};
pub use error::RasterError;
pub use image::{CompressionMode, RasterImage};
pub use info::{FormatKind, FormatLimits, ImageInfo, detect};
pub use limits::Limits;
pub use metadata::{
    AvifMetadata, BaseMetadata, BmpCompression, BmpMetadata, ChromaSubsampling, ColorSpace,
    FormatMetadata, GeoReference, HdrMetadata, Jp2Metadata, TeardownReport, TiffCompression,
    TiffMetadata, WaveletTransform,
};
#[cfg(feature = "rgb")]
pub use pixel::DecodePixel;
pub use pixel::PixelDescriptor;
pub use planner::{
    Axis, Layout, Packet, PacketDims, Packets, ProgressionOrder, QualityLayers, Rect,
    RegionOfInterest, ResolutionPyramid, RoiWeight, Tile, TileGrid, TileSize,
};
pub use session::{Session, SessionState};
pub use validate::{
    Issue, ResourcePolicy, ValidationConfig, ValidationPass, ValidationResult, Validator,
};
