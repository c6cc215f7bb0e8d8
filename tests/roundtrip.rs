use std::sync::atomic::{AtomicUsize, Ordering};

use enough::Unstoppable;
use zenraster::container::JP2_SIGNATURE;
use zenraster::*;

fn gradient(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

fn crop(pixels: &[u8], width: u32, bpp: usize, rect: Rect) -> Vec<u8> {
    let stride = width as usize * bpp;
    let mut out = Vec::new();
    for y in rect.y..rect.y + rect.height {
        let start = y as usize * stride + rect.x as usize * bpp;
        out.extend_from_slice(&pixels[start..start + rect.width as usize * bpp]);
    }
    out
}

fn encode(image: &RasterImage, options: EncodeOptions) -> (Vec<u8>, Vec<u8>) {
    let len = image.descriptor().buffer_len(image.width(), image.height()).unwrap();
    let pixels = gradient(len);
    let out = EncodeRequest::new(image)
        .with_options(options)
        .encode(&pixels, Unstoppable)
        .unwrap();
    (out.data, pixels)
}

// --- Scenarios ---

#[test]
fn lossless_single_tile_jp2() {
    let image = RasterImage::new(FormatKind::Jpeg2000, 512, 512, 1, 8).unwrap();
    assert!(image.validate().errors().is_empty());

    let (data, pixels) = encode(&image, EncodeOptions::new());
    assert!(data.starts_with(&JP2_SIGNATURE));

    let decoded = DecodeRequest::new(&data).decode(Unstoppable).unwrap();
    assert_eq!((decoded.width, decoded.height), (512, 512));
    assert_eq!(decoded.image.format(), FormatKind::Jpeg2000);
    assert_eq!(decoded.pixels(), &pixels[..]);
}

#[test]
fn hdr_color_space_without_hdr_metadata_warns_once() {
    let mut image = RasterImage::new(FormatKind::Jpeg2000, 1920, 1080, 3, 10).unwrap();
    image.metadata_mut().base_mut().color_space = ColorSpace::Bt2100Pq;

    let result = image.validate();
    assert!(result.is_valid(), "{}", result.summary());
    assert_eq!(result.warnings().len(), 1, "{:?}", result.warnings());
    assert!(result.warnings()[0].message.contains("HDR metadata"));
}

#[test]
fn oversized_tile_blocks_encode() {
    let mut image = RasterImage::new(FormatKind::Jpeg2000, 1000, 1000, 1, 8).unwrap();
    image.metadata_mut().as_jp2_mut().unwrap().tile_size = Some(TileSize::new(2000, 1000));

    let result = image.validate();
    assert_eq!(result.errors().len(), 1, "{:?}", result.errors());
    assert!(result.errors()[0].message.contains("exceed image dimensions"));

    let pixels = vec![0u8; 1000 * 1000];
    let err = EncodeRequest::new(&image).encode(&pixels, Unstoppable).unwrap_err();
    assert!(matches!(err, RasterError::Configuration(_)), "{err}");
}

#[test]
fn roi_outside_image_is_one_error() {
    let mut image = RasterImage::new(FormatKind::Jpeg2000, 1000, 1000, 1, 8).unwrap();
    image.metadata_mut().as_jp2_mut().unwrap().roi =
        Some(RegionOfInterest::new(Rect::new(900, 900, 200, 200), 2.0));

    let result = image.validate();
    assert!(!result.is_valid());
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].pass, ValidationPass::RegionOfInterest);
}

#[test]
fn zero_bytes_are_unrecognized() {
    assert_eq!(detect(&[0; 4]), None);
    assert!(matches!(
        ImageInfo::from_bytes(&[0; 4]),
        Err(RasterError::FormatViolation { offset: 0, .. })
    ));
}

// --- Per-format round trips ---

#[test]
fn declared_metadata_survives_every_format() {
    for format in FormatKind::ALL {
        let components = if format == FormatKind::Bmp { 3 } else { 1 };
        let image = RasterImage::new(format, 24, 10, components, 8).unwrap();
        let (data, pixels) = encode(&image, EncodeOptions::new());
        assert_eq!(detect(&data), Some(format));

        let decoded = DecodeRequest::new(&data).decode(Unstoppable).unwrap();
        assert_eq!(decoded.image.format(), format);
        assert_eq!(decoded.image.width(), 24);
        assert_eq!(decoded.image.height(), 10);
        assert_eq!(decoded.image.bit_depth(), 8);
        assert_eq!(decoded.pixels(), &pixels[..], "{format}");
    }
}

#[test]
fn avif_ten_bit_round_trip() {
    let image = RasterImage::new(FormatKind::Avif, 16, 8, 3, 10).unwrap();
    let (data, pixels) = encode(&image, EncodeOptions::new());
    let decoded = DecodeRequest::new(&data).decode(Unstoppable).unwrap();
    assert_eq!(decoded.image.bit_depth(), 10);
    assert_eq!(decoded.descriptor().bytes_per_pixel(), 6);
    assert_eq!(decoded.pixels(), &pixels[..]);
}

#[test]
fn bmp_with_alpha_round_trip() {
    let image = RasterImage::new(FormatKind::Bmp, 5, 3, 4, 8).unwrap();
    let (data, pixels) = encode(&image, EncodeOptions::new());
    let decoded = DecodeRequest::new(&data).decode(Unstoppable).unwrap();
    assert_eq!(decoded.descriptor(), PixelDescriptor::RGBA8);
    assert_eq!(decoded.pixels(), &pixels[..]);
}

#[test]
fn bilevel_tiff_round_trip() {
    let image = RasterImage::new(FormatKind::Tiff, 10, 3, 1, 1).unwrap();
    let pixels: Vec<u8> = (0..30).map(|i| u8::from(i % 3 == 0)).collect();
    let out = EncodeRequest::new(&image).encode(&pixels, Unstoppable).unwrap();
    let decoded = DecodeRequest::new(&out.data).decode(Unstoppable).unwrap();
    assert_eq!(decoded.image.bit_depth(), 1);
    assert_eq!(decoded.pixels(), &pixels[..]);
}

#[test]
fn tiff_strips_from_tile_option() {
    let image = RasterImage::new(FormatKind::Tiff, 16, 10, 3, 8).unwrap();
    let (data, pixels) = encode(&image, EncodeOptions::new().with_tile_size(TileSize::new(16, 4)));
    assert_eq!(ImageInfo::from_bytes(&data).unwrap().tile_count, 3);

    let region = Rect::new(2, 3, 10, 5);
    let part = decode_region(&data, region, 0, Unstoppable).unwrap();
    assert_eq!(part.pixels(), &crop(&pixels, 16, 3, region)[..]);
}

#[test]
fn metadata_blobs_round_trip_in_jp2() {
    let mut image = RasterImage::new(FormatKind::Jpeg2000, 32, 32, 3, 8).unwrap();
    let base = image.metadata_mut().base_mut();
    base.color_space = ColorSpace::Srgb;
    base.xmp = Some(b"<x:xmpmeta/>".to_vec());
    base.exif = Some(b"II*\0exif".to_vec());
    base.geo = Some(GeoReference::from_affine([10.0, 0.5, 0.0, 50.0, 0.0, -0.5]).with_crs("EPSG:4326"));

    let (data, _) = encode(&image, EncodeOptions::new());
    let decoded = DecodeRequest::new(&data).decode(Unstoppable).unwrap();
    let base = decoded.image.metadata().base();
    assert_eq!(base.color_space, ColorSpace::Srgb);
    assert_eq!(base.xmp.as_deref(), Some(&b"<x:xmpmeta/>"[..]));
    assert_eq!(base.exif.as_deref(), Some(&b"II*\0exif"[..]));
    let geo = base.geo.as_ref().unwrap();
    assert_eq!(geo.coefficients(), Some([10.0, 0.5, 0.0, 50.0, 0.0, -0.5]));
    assert_eq!(geo.crs.as_deref(), Some("EPSG:4326"));
}

// --- Partial decode ---

struct CountingBackend {
    decompressed: AtomicUsize,
}

impl CodecBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn compress(&self, pixels: &[u8], unit: &CodingUnit, options: &CodecOptions) -> Result<Vec<u8>, RasterError> {
        PassthroughBackend.compress(pixels, unit, options)
    }

    fn decompress(&self, data: &[u8], unit: &CodingUnit, target: &DecodeTarget) -> Result<Vec<u8>, RasterError> {
        self.decompressed.fetch_add(1, Ordering::Relaxed);
        PassthroughBackend.decompress(data, unit, target)
    }
}

#[test]
fn region_decode_touches_only_intersecting_tiles() {
    let image = RasterImage::new(FormatKind::Jpeg2000, 64, 48, 3, 8).unwrap();
    let (data, pixels) = encode(&image, EncodeOptions::new().with_tile_size(TileSize::square(16)));
    assert_eq!(ImageInfo::from_bytes(&data).unwrap().tile_count, 12);

    let backend = CountingBackend {
        decompressed: AtomicUsize::new(0),
    };
    let region = Rect::new(10, 5, 20, 20);
    let part = DecodeRequest::new(&data)
        .region(region)
        .with_backend(&backend)
        .decode(Unstoppable)
        .unwrap();
    assert_eq!((part.width, part.height), (20, 20));
    assert_eq!(part.pixels(), &crop(&pixels, 64, 3, region)[..]);
    // columns 0..2, rows 0..2
    assert_eq!(backend.decompressed.load(Ordering::Relaxed), 4);
}

#[test]
fn reduced_resolution_is_point_sampled() {
    let image = RasterImage::new(FormatKind::Jpeg2000, 64, 64, 1, 8).unwrap();
    let (data, pixels) = encode(&image, EncodeOptions::new().with_decomposition_levels(2));
    assert_eq!(ImageInfo::from_bytes(&data).unwrap().resolution_levels, 3);

    let thumb = decode_resolution(&data, 2, Unstoppable).unwrap();
    assert_eq!((thumb.width, thumb.height), (16, 16));
    assert_eq!(thumb.level, 2);
    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(thumb.pixels()[y * 16 + x], pixels[y * 4 * 64 + x * 4]);
        }
    }
}

#[test]
fn out_of_range_requests_are_configuration_errors() {
    let image = RasterImage::new(FormatKind::Jpeg2000, 64, 64, 1, 8).unwrap();
    let (data, _) = encode(&image, EncodeOptions::new().with_quality_layers(3));

    let layered = DecodeRequest::new(&data).quality_layer(1).decode(Unstoppable).unwrap();
    assert_eq!(layered.layer, 1);

    let too_deep = DecodeRequest::new(&data).resolution(9).decode(Unstoppable);
    assert!(matches!(too_deep, Err(RasterError::Configuration(_))));
    let no_layer = DecodeRequest::new(&data).quality_layer(3).decode(Unstoppable);
    assert!(matches!(no_layer, Err(RasterError::Configuration(_))));
    let outside = decode_region(&data, Rect::new(60, 0, 8, 8), 0, Unstoppable);
    assert!(matches!(outside, Err(RasterError::Configuration(_))));
}

// --- Failure paths ---

#[test]
fn truncated_container_is_a_violation() {
    let image = RasterImage::new(FormatKind::Jpeg2000, 32, 32, 1, 8).unwrap();
    let (data, _) = encode(&image, EncodeOptions::new());
    let result = DecodeRequest::new(&data[..data.len() / 2]).decode(Unstoppable);
    assert!(matches!(result, Err(RasterError::FormatViolation { .. })));
}

#[test]
fn corrupt_header_fields_are_violations() {
    let is_violation = |data: &[u8]| {
        matches!(
            DecodeRequest::new(data).decode(Unstoppable),
            Err(RasterError::FormatViolation { .. })
        )
    };

    // AVIF ispe width and height
    let image = RasterImage::new(FormatKind::Avif, 8, 8, 3, 8).unwrap();
    let (mut data, _) = encode(&image, EncodeOptions::new());
    let at = data.windows(4).position(|w| w == b"ispe").unwrap();
    data[at + 8..at + 16].fill(0);
    assert!(is_violation(&data));

    // JP2 COD decomposition levels: marker, Lcod, Scod, SGcod (4 bytes), then levels
    let image = RasterImage::new(FormatKind::Jpeg2000, 32, 32, 1, 8).unwrap();
    let (mut data, _) = encode(&image, EncodeOptions::new());
    let at = data.windows(2).position(|w| w == [0xFF, 0x52]).unwrap();
    data[at + 9] = 40;
    assert!(is_violation(&data));

    // TIFF ImageWidth
    let image = RasterImage::new(FormatKind::Tiff, 8, 8, 1, 8).unwrap();
    let (mut data, _) = encode(&image, EncodeOptions::new());
    let ifd = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    let count = usize::from(u16::from_le_bytes([data[ifd], data[ifd + 1]]));
    let entry = (0..count)
        .map(|i| ifd + 2 + i * 12)
        .find(|&e| u16::from_le_bytes([data[e], data[e + 1]]) == 256)
        .unwrap();
    data[entry + 8..entry + 12].fill(0);
    assert!(is_violation(&data));
}

#[test]
fn decode_limits_are_enforced() {
    let image = RasterImage::new(FormatKind::Bmp, 32, 32, 3, 8).unwrap();
    let (data, _) = encode(&image, EncodeOptions::new());
    let limits = Limits {
        max_pixels: Some(100),
        ..Default::default()
    };
    let result = DecodeRequest::new(&data).with_limits(&limits).decode(Unstoppable);
    assert!(matches!(result, Err(RasterError::ResourceExhaustion(_))));
}

#[test]
fn memory_warning_escalates_only_when_enforced() {
    let image = RasterImage::new(FormatKind::Tiff, 64, 64, 1, 8).unwrap();
    let pixels = vec![0u8; 64 * 64];
    let tight = ValidationConfig {
        max_output_bytes: 1024,
        ..Default::default()
    };

    let out = EncodeRequest::new(&image)
        .with_validation(tight.clone())
        .encode(&pixels, Unstoppable)
        .unwrap();
    assert_eq!(out.report.warnings_from(ValidationPass::Memory).count(), 1);

    let enforced = ValidationConfig {
        resource_policy: ResourcePolicy::Enforce,
        ..tight
    };
    let err = EncodeRequest::new(&image)
        .with_validation(enforced)
        .encode(&pixels, Unstoppable)
        .unwrap_err();
    assert!(matches!(err, RasterError::ResourceExhaustion(_)), "{err}");
}

struct Cancelled;

impl Stop for Cancelled {
    fn check(&self) -> Result<(), StopReason> {
        Err(StopReason::Cancelled)
    }
}

#[test]
fn cancellation_is_reported() {
    let image = RasterImage::new(FormatKind::Jpeg2000, 32, 32, 1, 8).unwrap();
    let pixels = vec![0u8; 32 * 32];
    let err = EncodeRequest::new(&image).encode(&pixels, Cancelled).unwrap_err();
    assert!(matches!(err, RasterError::Cancelled(_)));

    let (data, _) = encode(&image, EncodeOptions::new());
    let err = DecodeRequest::new(&data).decode(Cancelled).unwrap_err();
    assert!(matches!(err, RasterError::Cancelled(_)));
}

#[test]
fn validation_is_idempotent() {
    let mut image = RasterImage::new(FormatKind::Avif, 300, 200, 3, 12).unwrap();
    image.set_compression(CompressionMode::Lossy);
    image.metadata_mut().as_avif_mut().unwrap().compression_ratio = Some(500.0);
    let first = image.validate();
    assert_eq!(first, image.validate());
    assert!(first.is_valid());
    assert_eq!(first.warnings_from(ValidationPass::Compression).count(), 1);
}

// --- Teardown ---

#[tokio::test]
async fn large_metadata_is_released_in_stages() {
    let mut image = RasterImage::new(FormatKind::Jpeg2000, 16, 16, 1, 8).unwrap();
    let base = image.metadata_mut().base_mut();
    base.xmp = Some(vec![0; STAGE_BYTES]);
    base.icc_profile = Some(vec![0; 512]);

    let report = image.dispose_staged().await;
    assert_eq!(report.bytes_released, STAGE_BYTES + 512);
    assert!(report.yielded);
    assert_eq!(report.stages, 2);
}

const STAGE_BYTES: usize = 2 << 20;
