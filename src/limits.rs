use crate::error::RasterError;

/// Caller-imposed ceilings on the rasters a request may touch.
///
/// Unset fields impose nothing. A decode checks the container's declared
/// dimensions before any backend call and the output buffer before it is
/// allocated; an encode checks the image and its input buffer. Breaching one
/// is [`RasterError::ResourceExhaustion`]. Soft thresholds that only warn are
/// configured on [`ValidationConfig`](crate::ValidationConfig) instead.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub max_width: Option<u64>,
    pub max_height: Option<u64>,
    /// Ceiling on `width * height`.
    pub max_pixels: Option<u64>,
    /// Ceiling on a single sample buffer, in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    pub(crate) fn check(&self, width: u32, height: u32) -> Result<(), RasterError> {
        let pixels = u64::from(width) * u64::from(height);
        let checks = [
            ("width", u64::from(width), self.max_width),
            ("height", u64::from(height), self.max_height),
            ("pixel count", pixels, self.max_pixels),
        ];
        for (what, value, ceiling) in checks {
            if let Some(ceiling) = ceiling.filter(|&c| value > c) {
                return Err(RasterError::ResourceExhaustion(format!(
                    "raster {what} {value} is above the ceiling of {ceiling}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn check_memory(&self, bytes: usize) -> Result<(), RasterError> {
        match self.max_memory_bytes {
            Some(ceiling) if bytes as u64 > ceiling => Err(RasterError::ResourceExhaustion(format!(
                "{bytes}-byte sample buffer is above the ceiling of {ceiling} bytes"
            ))),
            _ => Ok(()),
        }
    }
}
