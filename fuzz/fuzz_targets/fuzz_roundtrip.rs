#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::*;

fuzz_target!(|data: &[u8]| {
    let limits = Limits {
        max_pixels: Some(1 << 22),
        max_memory_bytes: Some(1 << 26),
        ..Default::default()
    };
    // If we can decode it, re-encoding and decoding again must produce identical pixels
    let Ok(decoded) = DecodeRequest::new(data).with_limits(&limits).decode(enough::Unstoppable) else {
        return;
    };

    // Images the passthrough backend or the validator refuse are fine to skip
    let Ok(reencoded) = EncodeRequest::new(&decoded.image).encode(decoded.pixels(), enough::Unstoppable) else {
        return;
    };
    let Ok(decoded2) = DecodeRequest::new(&reencoded.data).decode(enough::Unstoppable) else {
        panic!("re-encoded data failed to decode");
    };

    assert_eq!(decoded.pixels(), decoded2.pixels(), "roundtrip pixel mismatch");
    assert_eq!(decoded.width, decoded2.width);
    assert_eq!(decoded.height, decoded2.height);
    assert_eq!(decoded.image.format(), decoded2.image.format());
});
