/// Geospatial reference carried as metadata only; no coordinate math is done.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoReference {
    /// Affine transform `[x0, x_scale, x_skew, y0, y_skew, y_scale]`:
    /// `X = x0 + col*x_scale + row*x_skew`, `Y = y0 + col*y_skew + row*y_scale`.
    ///
    /// Must hold exactly six coefficients to be valid.
    pub transform: Vec<f64>,
    /// Coordinate reference system identifier, e.g. `EPSG:4326`.
    pub crs: Option<String>,
    /// Opaque GeoKey directory bytes (little-endian 16-bit entries).
    pub geotag: Option<Vec<u8>>,
}

impl GeoReference {
    pub fn from_affine(transform: [f64; 6]) -> Self {
        Self {
            transform: transform.to_vec(),
            crs: None,
            geotag: None,
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    /// The six coefficients, if exactly six are present.
    pub fn coefficients(&self) -> Option<[f64; 6]> {
        self.transform.as_slice().try_into().ok()
    }

    /// Both scale terms zero: the transform maps every pixel to one point.
    pub fn is_degenerate(&self) -> bool {
        self.coefficients().is_some_and(|c| c[1] == 0.0 && c[5] == 0.0)
    }

    /// Whether the skew terms are significant relative to the scale terms.
    pub fn has_rotation(&self) -> bool {
        self.coefficients().is_some_and(|c| {
            let scale = c[1].abs().max(c[5].abs());
            c[2].abs() > scale * 1e-6 || c[4].abs() > scale * 1e-6
        })
    }

    pub(crate) fn blob_bytes(&self) -> usize {
        self.geotag.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn estimated_size(&self) -> usize {
        self.transform.len() * 8 + self.crs.as_ref().map_or(0, String::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_and_rotation() {
        let north_up = GeoReference::from_affine([500_000.0, 10.0, 0.0, 4_000_000.0, 0.0, -10.0]);
        assert!(!north_up.is_degenerate());
        assert!(!north_up.has_rotation());

        let rotated = GeoReference::from_affine([0.0, 10.0, 2.0, 0.0, 2.0, -10.0]);
        assert!(rotated.has_rotation());

        let flat = GeoReference::from_affine([1.0, 0.0, 0.5, 1.0, 0.5, 0.0]);
        assert!(flat.is_degenerate());
    }

    #[test]
    fn wrong_arity_has_no_coefficients() {
        let geo = GeoReference {
            transform: vec![1.0; 5],
            ..Default::default()
        };
        assert!(geo.coefficients().is_none());
        assert!(!geo.is_degenerate());
    }
}
