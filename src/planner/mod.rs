//! Tile grids, resolution pyramids, progression orders, quality layers and
//! regions of interest, resolved into a [`Layout`] for a [`RasterImage`].

mod progression;
mod pyramid;
mod roi;

pub use progression::{Axis, Packet, PacketDims, Packets, ProgressionOrder};
pub(crate) use pyramid::MAX_DECOMPOSITION_LEVELS;
pub use pyramid::ResolutionPyramid;
pub use roi::{RegionOfInterest, RoiWeight};

use crate::error::RasterError;
use crate::image::RasterImage;
use crate::metadata::FormatMetadata;

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering a whole `width` x `height` image.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether `self` lies entirely within a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= u64::from(width) && self.bottom() <= u64::from(height)
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Overlap of two rectangles, `None` when they share no pixel.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if u64::from(x0) >= x1 || u64::from(y0) >= y1 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - u64::from(x0)) as u32, (y1 - u64::from(y0)) as u32))
    }

    /// Projection onto resolution level `level`: both edges are floored, so
    /// adjacent rectangles still partition the reduced image.
    pub fn at_level(&self, level: u8) -> Rect {
        let shift = u32::from(level);
        let scale = |v: u64| if shift >= 64 { 0 } else { v >> shift };
        let x0 = scale(u64::from(self.x));
        let y0 = scale(u64::from(self.y));
        let x1 = scale(self.right());
        let y1 = scale(self.bottom());
        Rect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

impl core::fmt::Display for Rect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Nominal tile edge lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl TileSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }
}

/// One tile of a [`TileGrid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub index: u32,
    pub bounds: Rect,
}

/// Regular grid of tiles anchored at the image origin; edge tiles are clipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile: TileSize,
    across: u32,
    down: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile: TileSize) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::Configuration(format!(
                "image dimensions {width}x{height} must be positive"
            )));
        }
        if tile.width == 0 || tile.height == 0 {
            return Err(RasterError::Configuration(format!(
                "tile dimensions {}x{} must be positive",
                tile.width, tile.height
            )));
        }
        let across = width.div_ceil(tile.width);
        let down = height.div_ceil(tile.height);
        if u64::from(across) * u64::from(down) > u64::from(u32::MAX) {
            return Err(RasterError::ResourceExhaustion(format!(
                "{across}x{down} tiles exceed the addressable tile count"
            )));
        }
        Ok(Self {
            width,
            height,
            tile,
            across,
            down,
        })
    }

    /// One tile covering the whole image.
    pub fn single(width: u32, height: u32) -> Result<Self, RasterError> {
        Self::new(width, height, TileSize::new(width, height))
    }

    pub fn tile_size(&self) -> TileSize {
        self.tile
    }

    pub fn image_width(&self) -> u32 {
        self.width
    }

    pub fn image_height(&self) -> u32 {
        self.height
    }

    pub fn tiles_across(&self) -> u32 {
        self.across
    }

    pub fn tiles_down(&self) -> u32 {
        self.down
    }

    pub fn tile_count(&self) -> u32 {
        self.across * self.down
    }

    /// Full-resolution bounds of tile `index`, clipped at the image edges.
    pub fn tile_bounds(&self, index: u32) -> Option<Rect> {
        if index >= self.tile_count() {
            return None;
        }
        let tx = index % self.across;
        let ty = index / self.across;
        let x = u64::from(tx) * u64::from(self.tile.width);
        let y = u64::from(ty) * u64::from(self.tile.height);
        let w = u64::from(self.tile.width).min(u64::from(self.width) - x);
        let h = u64::from(self.tile.height).min(u64::from(self.height) - y);
        Some(Rect::new(x as u32, y as u32, w as u32, h as u32))
    }

    /// Index of the tile containing pixel `(x, y)`.
    pub fn tile_index_at(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y / self.tile.height) * self.across + x / self.tile.width)
    }

    /// Indices of tiles overlapping `rect`, in raster order.
    pub fn tiles_intersecting(&self, rect: &Rect) -> Vec<u32> {
        let Some(clipped) = rect.intersect(&Rect::full(self.width, self.height)) else {
            return Vec::new();
        };
        let tx0 = clipped.x / self.tile.width;
        let ty0 = clipped.y / self.tile.height;
        let tx1 = ((clipped.right() - 1) / u64::from(self.tile.width)) as u32;
        let ty1 = ((clipped.bottom() - 1) / u64::from(self.tile.height)) as u32;
        (ty0..=ty1)
            .flat_map(|ty| (tx0..=tx1).map(move |tx| ty * self.across + tx))
            .collect()
    }

    /// Bounds of tile `index` on resolution level `level`.
    pub fn bounds_at_level(&self, index: u32, level: u8) -> Option<Rect> {
        self.tile_bounds(index).map(|r| r.at_level(level))
    }

    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.tile_count()).filter_map(|index| {
            self.tile_bounds(index).map(|bounds| Tile { index, bounds })
        })
    }
}

/// Cumulative quality layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityLayers {
    count: u16,
}

impl QualityLayers {
    pub const SINGLE: Self = Self { count: 1 };

    pub fn new(count: u16) -> Result<Self, RasterError> {
        if count == 0 {
            return Err(RasterError::Configuration(
                "quality layer count must be at least 1".into(),
            ));
        }
        Ok(Self { count })
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn highest(&self) -> u16 {
        self.count - 1
    }

    pub fn contains(&self, layer: u16) -> bool {
        layer < self.count
    }

    /// Layers that contribute to a reconstruction at `layer`: `0..=layer`.
    pub fn cumulative(&self, layer: u16) -> Option<core::ops::RangeInclusive<u16>> {
        self.contains(layer).then_some(0..=layer)
    }
}

/// Resolved coding layout of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub grid: TileGrid,
    pub pyramid: ResolutionPyramid,
    pub progression: ProgressionOrder,
    pub layers: QualityLayers,
    pub roi: Option<RegionOfInterest>,
}

impl Layout {
    /// Resolve the layout of `image` from its metadata.
    ///
    /// Formats without a wavelet pyramid get zero decomposition levels and a
    /// single quality layer; TIFF strips become full-width tiles.
    pub fn plan(image: &RasterImage) -> Result<Self, RasterError> {
        let (w, h) = (image.width(), image.height());
        match image.metadata() {
            FormatMetadata::Jpeg2000(m) => {
                let grid = match m.tile_size {
                    Some(tile) => TileGrid::new(w, h, tile)?,
                    None => TileGrid::single(w, h)?,
                };
                Ok(Self {
                    grid,
                    pyramid: ResolutionPyramid::new(w, h, m.decomposition_levels)?,
                    progression: m.progression,
                    layers: QualityLayers::new(m.quality_layers)?,
                    roi: m.roi,
                })
            }
            FormatMetadata::Tiff(m) => {
                let rows = m.rows_per_strip.unwrap_or(h).min(h);
                Self::flat(TileGrid::new(w, h, TileSize::new(w, rows))?, w, h)
            }
            FormatMetadata::Avif(_) | FormatMetadata::Bmp(_) => {
                Self::flat(TileGrid::single(w, h)?, w, h)
            }
        }
    }

    fn flat(grid: TileGrid, w: u32, h: u32) -> Result<Self, RasterError> {
        Ok(Self {
            grid,
            pyramid: ResolutionPyramid::new(w, h, 0)?,
            progression: ProgressionOrder::Lrcp,
            layers: QualityLayers::SINGLE,
            roi: None,
        })
    }

    /// Packet sequence of this layout, treating each tile as one position.
    pub fn packets(&self, components: u16) -> Packets {
        self.progression.packets(PacketDims {
            layers: self.layers.count(),
            resolutions: self.pyramid.available_levels(),
            components,
            positions: self.grid.tile_count(),
        })
    }

    /// ROI weighting for tile `index`; neutral when no ROI is set.
    pub fn roi_weight(&self, index: u32) -> RoiWeight {
        match (self.roi, self.grid.tile_bounds(index)) {
            (Some(roi), Some(bounds)) => roi.weight_for(&bounds),
            _ => RoiWeight::NEUTRAL,
        }
    }
}
