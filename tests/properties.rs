use std::collections::HashSet;

use proptest::prelude::*;
use zenraster::container::{BoxType, read_boxes, write_box};
use zenraster::*;

fn order() -> impl Strategy<Value = ProgressionOrder> {
    prop::sample::select(ProgressionOrder::ALL.to_vec())
}

proptest! {
    #[test]
    fn tiles_partition_the_image(w in 1u32..300, h in 1u32..300, tw in 1u32..128, th in 1u32..128) {
        let grid = TileGrid::new(w, h, TileSize::new(tw, th)).unwrap();
        let mut area = 0u64;
        for tile in grid.tiles() {
            prop_assert!(!tile.bounds.is_empty());
            prop_assert!(tile.bounds.fits_within(w, h));
            area += tile.bounds.area();
        }
        prop_assert_eq!(area, u64::from(w) * u64::from(h));
        prop_assert_eq!(grid.tile_count(), w.div_ceil(tw) * h.div_ceil(th));
    }

    #[test]
    fn every_pixel_has_exactly_one_tile(w in 1u32..200, h in 1u32..200, edge in 1u32..64, x in 0u32..200, y in 0u32..200) {
        let grid = TileGrid::new(w, h, TileSize::square(edge)).unwrap();
        let (x, y) = (x % w, y % h);
        let index = grid.tile_index_at(x, y).unwrap();
        let point = Rect::new(x, y, 1, 1);
        prop_assert!(grid.tile_bounds(index).unwrap().contains_rect(&point));
        let owners = grid.tiles().filter(|t| t.bounds.contains_rect(&point)).count();
        prop_assert_eq!(owners, 1);
    }

    #[test]
    fn pyramid_never_grows(w in 1u32..100_000, h in 1u32..100_000, levels in 0u8..=32) {
        let pyramid = ResolutionPyramid::new(w, h, levels).unwrap();
        prop_assert_eq!(pyramid.dimensions(0), Some((w, h)));
        let mut prev = (w, h);
        for level in 1..=levels {
            let dims = pyramid.dimensions(level).unwrap();
            prop_assert!(dims.0 <= prev.0 && dims.1 <= prev.1);
            prev = dims;
        }
        prop_assert_eq!(pyramid.dimensions(levels + 1), None);
    }

    #[test]
    fn packets_visit_each_coordinate_once(
        order in order(),
        layers in 1u16..4,
        resolutions in 1u8..4,
        components in 1u16..4,
        positions in 1u32..5,
    ) {
        let dims = PacketDims { layers, resolutions, components, positions };
        let packets: Vec<Packet> = order.packets(dims).collect();
        prop_assert_eq!(packets.len() as u64, dims.total());
        let unique: HashSet<Packet> = packets.iter().copied().collect();
        prop_assert_eq!(unique.len(), packets.len());
    }

    #[test]
    fn roi_overhang_is_always_an_error(
        w in 16u32..2000,
        h in 16u32..2000,
        x in 0u32..2000,
        y in 0u32..2000,
        rw in 1u32..2000,
        rh in 1u32..2000,
    ) {
        prop_assume!(u64::from(x) + u64::from(rw) > u64::from(w) || u64::from(y) + u64::from(rh) > u64::from(h));
        let mut image = RasterImage::new(FormatKind::Jpeg2000, w, h, 1, 8).unwrap();
        image.metadata_mut().as_jp2_mut().unwrap().roi = Some(RegionOfInterest::new(Rect::new(x, y, rw, rh), 2.0));
        let result = image.validate();
        prop_assert!(result.errors().iter().any(|e| e.pass == ValidationPass::RegionOfInterest));
        prop_assert!(result.warnings_from(ValidationPass::RegionOfInterest).next().is_none());
    }

    #[test]
    fn box_payloads_survive(tag in "[a-z]{4}", payload in prop::collection::vec(any::<u8>(), 0..512)) {
        let box_type = BoxType(tag.as_bytes().try_into().unwrap());
        prop_assume!(!box_type.is_container());
        let data = write_box(box_type, &payload, &[]);
        let boxes = read_boxes(&data).unwrap();
        prop_assert_eq!(boxes.len(), 1);
        prop_assert_eq!(boxes[0].box_type, box_type);
        prop_assert_eq!(boxes[0].payload, &payload[..]);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = detect(&data);
        let _ = ImageInfo::from_bytes(&data);
        let limits = Limits {
            max_pixels: Some(1 << 20),
            max_memory_bytes: Some(1 << 24),
            ..Default::default()
        };
        let _ = DecodeRequest::new(&data).with_limits(&limits).decode(Unstoppable);
    }

    #[test]
    fn signatures_with_a_bad_first_byte_are_unrecognized(rest in prop::collection::vec(any::<u8>(), 0..32)) {
        // no recognised signature starts with 0xFF
        let mut data = vec![0xFF];
        data.extend(rest);
        prop_assert_eq!(detect(&data), None);
    }

    #[test]
    fn validation_is_idempotent(w in 1u32..5000, h in 1u32..5000, levels in 0u8..12, layers in 0u16..8) {
        let mut image = RasterImage::new(FormatKind::Jpeg2000, w, h, 3, 8).unwrap();
        let m = image.metadata_mut().as_jp2_mut().unwrap();
        m.decomposition_levels = levels;
        m.quality_layers = layers;
        prop_assert_eq!(image.validate(), image.validate());
    }
}
