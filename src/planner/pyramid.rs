use crate::error::RasterError;

/// Wavelet decompositions deeper than this are never meaningful.
pub(crate) const MAX_DECOMPOSITION_LEVELS: u8 = 32;

/// Dyadic resolution pyramid: level `L` is `floor(w / 2^L) x floor(h / 2^L)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolutionPyramid {
    width: u32,
    height: u32,
    levels: u8,
}

impl ResolutionPyramid {
    pub fn new(width: u32, height: u32, levels: u8) -> Result<Self, RasterError> {
        if levels > MAX_DECOMPOSITION_LEVELS {
            return Err(RasterError::Configuration(format!(
                "{levels} decomposition levels exceed the maximum of {MAX_DECOMPOSITION_LEVELS}"
            )));
        }
        Ok(Self {
            width,
            height,
            levels,
        })
    }

    /// Decomposition levels.
    pub fn levels(&self) -> u8 {
        self.levels
    }

    /// Addressable resolutions: levels + 1.
    pub fn available_levels(&self) -> u8 {
        self.levels + 1
    }

    pub fn contains(&self, level: u8) -> bool {
        level <= self.levels
    }

    /// Dimensions at `level`, `None` beyond the deepest level.
    pub fn dimensions(&self, level: u8) -> Option<(u32, u32)> {
        self.contains(level).then(|| {
            let shift = u32::from(level);
            (self.width >> shift, self.height >> shift)
        })
    }

    /// Whether the deepest level reduces a dimension to zero.
    pub fn collapses(&self) -> bool {
        self.dimensions(self.levels).is_some_and(|(w, h)| w == 0 || h == 0)
    }

    /// `floor(log2(min(w, h) / 32))`, or 0 for images under 32 pixels on the
    /// short side. Deeper decompositions leave sub-bands too small to matter.
    pub fn soft_level_ceiling(width: u32, height: u32) -> u8 {
        let short = width.min(height);
        if short < 32 {
            return 0;
        }
        (31 - short.leading_zeros()).saturating_sub(5) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_floor() {
        let p = ResolutionPyramid::new(1001, 513, 3).unwrap();
        assert_eq!(p.available_levels(), 4);
        assert_eq!(p.dimensions(0), Some((1001, 513)));
        assert_eq!(p.dimensions(1), Some((500, 256)));
        assert_eq!(p.dimensions(3), Some((125, 64)));
        assert_eq!(p.dimensions(4), None);
    }

    #[test]
    fn soft_ceiling() {
        assert_eq!(ResolutionPyramid::soft_level_ceiling(512, 512), 4);
        assert_eq!(ResolutionPyramid::soft_level_ceiling(1920, 1080), 5);
        assert_eq!(ResolutionPyramid::soft_level_ceiling(63, 4000), 0);
        assert_eq!(ResolutionPyramid::soft_level_ceiling(64, 64), 1);
    }

    #[test]
    fn collapse_detection() {
        assert!(ResolutionPyramid::new(16, 16, 5).unwrap().collapses());
        assert!(!ResolutionPyramid::new(16, 16, 4).unwrap().collapses());
        assert!(ResolutionPyramid::new(16, 16, 33).is_err());
    }
}
