#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::{DecodeRequest, ImageInfo, Limits, Rect, container};

fuzz_target!(|data: &[u8]| {
    let limits = Limits {
        max_pixels: Some(1 << 24),
        max_memory_bytes: Some(1 << 28),
        ..Default::default()
    };

    // Probing, box parsing and decoding must never panic
    let _ = container::read_boxes(data);
    let Ok(info) = ImageInfo::from_bytes(data) else {
        return;
    };
    let _ = DecodeRequest::new(data).with_limits(&limits).decode(enough::Unstoppable);

    // Partial decodes exercise the tile/level intersection paths
    let level = info.resolution_levels.saturating_sub(1);
    let region = Rect::new(info.width / 3, info.height / 3, (info.width / 2).max(1), (info.height / 2).max(1));
    let _ = DecodeRequest::new(data)
        .resolution(level)
        .region(region.at_level(level))
        .with_limits(&limits)
        .decode(enough::Unstoppable);
});
