#!/usr/bin/env -S cargo +nightly -Zscript
---
[dependencies]
zenraster = { path = ".." }
enough = "0.4"
---
//! Generate seed corpus files for fuzzing.
//! Run: cargo +nightly -Zscript fuzz/generate_seeds.rs

use zenraster::{EncodeOptions, EncodeRequest, FormatKind, RasterImage, TileSize};

fn seed(format: FormatKind, w: u32, h: u32, components: u16, bit_depth: u8, options: EncodeOptions) -> Vec<u8> {
    let image = RasterImage::new(format, w, h, components, bit_depth).unwrap();
    let len = image.descriptor().buffer_len(w, h).unwrap();
    let pixels: Vec<u8> = (0..len).map(|i| (i * 31 % 256) as u8).collect();
    EncodeRequest::new(&image)
        .with_options(options)
        .encode(&pixels, enough::Unstoppable)
        .unwrap()
        .data
}

fn main() {
    use std::fs;
    let dir = "fuzz/corpus/fuzz_decode";
    fs::create_dir_all(dir).unwrap();

    let seeds = [
        ("jp2_gray_8x8.jp2", seed(FormatKind::Jpeg2000, 8, 8, 1, 8, EncodeOptions::new())),
        (
            "jp2_tiled_40x24.jp2",
            seed(
                FormatKind::Jpeg2000,
                40,
                24,
                3,
                8,
                EncodeOptions::new().with_tile_size(TileSize::square(16)).with_quality_layers(2),
            ),
        ),
        ("avif_rgb_4x4.avif", seed(FormatKind::Avif, 4, 4, 3, 8, EncodeOptions::new())),
        ("avif_10bit_2x2.avif", seed(FormatKind::Avif, 2, 2, 3, 10, EncodeOptions::lossy(8.0))),
        (
            "tiff_strips_6x5.tif",
            seed(FormatKind::Tiff, 6, 5, 3, 8, EncodeOptions::new().with_tile_size(TileSize::new(6, 2))),
        ),
        ("tiff_bilevel_9x2.tif", seed(FormatKind::Tiff, 9, 2, 1, 1, EncodeOptions::new())),
        ("bmp_rgb_3x2.bmp", seed(FormatKind::Bmp, 3, 2, 3, 8, EncodeOptions::new())),
        ("bmp_rgba_2x2.bmp", seed(FormatKind::Bmp, 2, 2, 4, 8, EncodeOptions::new())),
    ];
    for (name, data) in &seeds {
        fs::write(format!("{dir}/{name}"), data).unwrap();
    }

    // Truncated/malformed seeds for edge coverage
    fs::write(format!("{dir}/empty.bin"), b"").unwrap();
    fs::write(format!("{dir}/jp2_signature_only.bin"), &seeds[0].1[..12]).unwrap();
    fs::write(format!("{dir}/tiff_header_only.bin"), b"II*\0\x08\0\0\0").unwrap();
    fs::write(format!("{dir}/bm_short.bin"), b"BM\x00\x00").unwrap();

    println!("Generated seed corpus in {dir}/");
}
