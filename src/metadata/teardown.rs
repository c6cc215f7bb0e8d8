use tracing::debug;

use super::FormatMetadata;

/// Blob total above which [`FormatMetadata::release_staged`] yields between
/// buffer releases.
pub const STAGED_TEARDOWN_THRESHOLD: usize = 1 << 20;

/// What a teardown released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub bytes_released: usize,
    /// Buffers released individually before the record itself.
    pub stages: usize,
    /// Whether control was handed back to the scheduler between stages.
    pub yielded: bool,
}

impl FormatMetadata {
    /// Releases every owned buffer in one step.
    pub fn release(self) -> TeardownReport {
        let bytes_released = self.base().blob_bytes();
        drop(self);
        TeardownReport {
            bytes_released,
            stages: 0,
            yielded: false,
        }
    }

    /// Releases owned buffers one at a time, yielding to the async scheduler
    /// between each when the total exceeds [`STAGED_TEARDOWN_THRESHOLD`].
    /// Smaller records are released in one step.
    pub async fn release_staged(mut self) -> TeardownReport {
        let total = self.base().blob_bytes();
        if total <= STAGED_TEARDOWN_THRESHOLD {
            return self.release();
        }

        let base = self.base_mut();
        let buffers = [
            base.icc_profile.take(),
            base.exif.take(),
            base.xmp.take(),
            base.geo.as_mut().and_then(|g| g.geotag.take()),
        ];

        let mut report = TeardownReport {
            bytes_released: 0,
            stages: 0,
            yielded: true,
        };
        for buffer in buffers.into_iter().flatten() {
            report.bytes_released += buffer.len();
            report.stages += 1;
            drop(buffer);
            tokio::task::yield_now().await;
        }
        drop(self);
        debug!(bytes = report.bytes_released, stages = report.stages, "staged metadata teardown");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::FormatKind;

    #[test]
    fn release_counts_blobs() {
        let mut meta = FormatMetadata::new(FormatKind::Avif, 4, 4, 8);
        meta.base_mut().exif = Some(vec![0; 100]);
        let report = meta.release();
        assert_eq!(report.bytes_released, 100);
        assert!(!report.yielded);
    }

    #[tokio::test]
    async fn large_records_are_released_in_stages() {
        let mut meta = FormatMetadata::new(FormatKind::Jpeg2000, 4, 4, 8);
        meta.base_mut().icc_profile = Some(vec![0; STAGED_TEARDOWN_THRESHOLD]);
        meta.base_mut().xmp = Some(vec![0; 1024]);
        let report = meta.release_staged().await;
        assert!(report.yielded);
        assert_eq!(report.stages, 2);
        assert_eq!(report.bytes_released, STAGED_TEARDOWN_THRESHOLD + 1024);
    }

    #[tokio::test]
    async fn small_records_release_at_once() {
        let meta = FormatMetadata::new(FormatKind::Tiff, 4, 4, 8);
        let report = meta.release_staged().await;
        assert!(!report.yielded);
        assert_eq!(report.stages, 0);
    }
}
