//! Bounds-checked byte cursor shared by the container and envelope parsers.
//!
//! Every read past the end of the buffer is a [`RasterError::FormatViolation`]
//! carrying the absolute offset of the failed read.

use crate::error::RasterError;

pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the enclosing stream.
    base: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn at_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn absolute(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn set_position(&mut self, pos: usize) -> Result<(), RasterError> {
        if pos > self.data.len() {
            return Err(RasterError::violation(
                self.base + pos,
                "seek past end of data",
            ));
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), RasterError> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], RasterError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                RasterError::violation(
                    self.absolute(),
                    format!("need {n} bytes, {} remain", self.remaining()),
                )
            })?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos.min(self.data.len())..];
        self.pos = self.data.len();
        out
    }

    pub(crate) fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], RasterError> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, RasterError> {
        Ok(self.read_fixed::<1>()?[0])
    }

    pub(crate) fn u16_be(&mut self) -> Result<u16, RasterError> {
        self.read_fixed().map(u16::from_be_bytes)
    }

    pub(crate) fn u32_be(&mut self) -> Result<u32, RasterError> {
        self.read_fixed().map(u32::from_be_bytes)
    }

    pub(crate) fn u64_be(&mut self) -> Result<u64, RasterError> {
        self.read_fixed().map(u64::from_be_bytes)
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16, RasterError> {
        self.read_fixed().map(u16::from_le_bytes)
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, RasterError> {
        self.read_fixed().map(u32::from_le_bytes)
    }

    pub(crate) fn i32_le(&mut self) -> Result<i32, RasterError> {
        self.read_fixed().map(i32::from_le_bytes)
    }

    /// Error positioned at the cursor.
    pub(crate) fn violation(&self, reason: impl Into<String>) -> RasterError {
        RasterError::violation(self.absolute(), reason)
    }
}
