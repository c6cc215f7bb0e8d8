use super::Rect;

/// Sub-rectangle granted preferential quality.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionOfInterest {
    pub rect: Rect,
    /// Relative quality multiplier; must be positive.
    pub quality: f32,
}

impl RegionOfInterest {
    pub fn new(rect: Rect, quality: f32) -> Self {
        Self { rect, quality }
    }

    pub fn is_contained(&self, width: u32, height: u32) -> bool {
        self.rect.fits_within(width, height)
    }

    /// Fraction of a `width` x `height` image the region covers, in `0..=1`.
    pub fn coverage(&self, width: u32, height: u32) -> f64 {
        let image = Rect::full(width, height);
        if image.is_empty() {
            return 0.0;
        }
        let covered = self.rect.intersect(&image).map_or(0, |r| r.area());
        covered as f64 / image.area() as f64
    }

    /// Weighting handed to the backend for a tile with bounds `tile`.
    pub fn weight_for(&self, tile: &Rect) -> RoiWeight {
        match self.rect.intersect(tile) {
            Some(overlap) => RoiWeight {
                region: Some(Rect::new(
                    overlap.x - tile.x,
                    overlap.y - tile.y,
                    overlap.width,
                    overlap.height,
                )),
                fraction: overlap.area() as f64 / tile.area() as f64,
                multiplier: self.quality,
            },
            None => RoiWeight::NEUTRAL,
        }
    }
}

/// ROI weighting of one coding unit. Bit allocation is the backend's job.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiWeight {
    /// Overlap with the region, relative to the tile origin.
    pub region: Option<Rect>,
    /// Share of the tile's pixels inside the region.
    pub fraction: f64,
    pub multiplier: f32,
}

impl RoiWeight {
    pub const NEUTRAL: Self = Self {
        region: None,
        fraction: 0.0,
        multiplier: 1.0,
    };

    pub fn is_neutral(&self) -> bool {
        self.region.is_none()
    }
}
