//! Lifecycle of one image: configure, validate, encode or decode, dispose.

use core::fmt;

use enough::Stop;
use tracing::debug;

use crate::backend::CodecBackend;
use crate::decode::{DecodeOutput, DecodeRequest};
use crate::encode::{EncodeOptions, EncodeOutput, EncodeRequest};
use crate::error::RasterError;
use crate::image::RasterImage;
use crate::metadata::TeardownReport;
use crate::validate::{ValidationConfig, ValidationResult, Validator};

/// Where a [`Session`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Built or modified since the last successful validation.
    Configured,
    /// The last validation reported no errors.
    Validated,
    Encoded,
    Decoded,
    /// Buffers released; every further operation fails.
    Disposed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Validated => "validated",
            Self::Encoded => "encoded",
            Self::Decoded => "decoded",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// An image moving through `Configured → Validated → Encoded | Decoded →
/// Disposed`.
///
/// Any change made through [`update`](Self::update) returns the session to
/// `Configured`, so an encode always sees a freshly validated image.
///
/// ```
/// use zenraster::{FormatKind, RasterImage, Session, SessionState, Unstoppable};
///
/// let mut session = Session::new(RasterImage::new(FormatKind::Tiff, 16, 16, 1, 8)?);
/// assert!(session.validate()?.is_valid());
/// let out = session.encode(&[0u8; 256], None, Unstoppable)?;
/// assert_eq!(session.state(), SessionState::Encoded);
/// session.dispose()?;
/// assert!(session.encode(&out.data, None, Unstoppable).is_err());
/// # Ok::<(), zenraster::RasterError>(())
/// ```
pub struct Session<'a> {
    state: SessionState,
    image: Option<RasterImage>,
    report: Option<ValidationResult>,
    validator: Validator,
    backend: Option<&'a dyn CodecBackend>,
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("image", &self.image)
            .field("backend", &self.backend.map(|b| b.name()))
            .finish_non_exhaustive()
    }
}

impl<'a> Session<'a> {
    pub fn new(image: RasterImage) -> Self {
        Self {
            state: SessionState::Configured,
            image: Some(image),
            report: None,
            validator: Validator::default(),
            backend: None,
        }
    }

    /// Decode `request` and start a session around the recovered image.
    pub fn open(request: DecodeRequest<'a>, stop: impl Stop) -> Result<(Self, DecodeOutput), RasterError> {
        let output = request.decode(stop)?;
        let session = Self {
            state: SessionState::Decoded,
            image: Some(output.image.clone()),
            report: None,
            validator: Validator::default(),
            backend: Some(request.backend()),
        };
        Ok((session, output))
    }

    pub fn with_backend(mut self, backend: &'a dyn CodecBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_validation(mut self, config: ValidationConfig) -> Self {
        self.validator = Validator::new(config);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// `None` once disposed.
    pub fn image(&self) -> Option<&RasterImage> {
        self.image.as_ref()
    }

    /// Report of the most recent validation or encode.
    pub fn report(&self) -> Option<&ValidationResult> {
        self.report.as_ref()
    }

    fn unavailable(&self, operation: &str) -> RasterError {
        RasterError::Configuration(format!("cannot {operation} a {} session", self.state))
    }

    fn transition(&mut self, to: SessionState) {
        debug!(from = %self.state, %to, "session state");
        self.state = to;
    }

    /// Modify the image; the session returns to `Configured` even when `f`
    /// fails, since it may have changed the image before failing.
    pub fn update<F>(&mut self, f: F) -> Result<(), RasterError>
    where
        F: FnOnce(&mut RasterImage) -> Result<(), RasterError>,
    {
        let Some(image) = self.image.as_mut() else {
            return Err(self.unavailable("update"));
        };
        let result = f(image);
        self.report = None;
        self.transition(SessionState::Configured);
        result
    }

    /// Run the validation passes. Moves to `Validated` when there are no
    /// errors, otherwise to `Configured`.
    pub fn validate(&mut self) -> Result<&ValidationResult, RasterError> {
        let Some(image) = self.image.as_ref() else {
            return Err(self.unavailable("validate"));
        };
        let result = self.validator.validate(image, image.metadata());
        let next = if result.is_valid() {
            SessionState::Validated
        } else {
            SessionState::Configured
        };
        self.transition(next);
        Ok(self.report.insert(result))
    }

    /// Validate and encode. `options` apply to this encode only.
    pub fn encode(
        &mut self,
        pixels: &[u8],
        options: Option<EncodeOptions>,
        stop: impl Stop,
    ) -> Result<EncodeOutput, RasterError> {
        let Some(image) = self.image.as_ref() else {
            return Err(self.unavailable("encode"));
        };
        let mut request = EncodeRequest::new(image).with_validation(self.validator.config().clone());
        if let Some(options) = options {
            request = request.with_options(options);
        }
        if let Some(backend) = self.backend {
            request = request.with_backend(backend);
        }
        let output = request.encode(pixels, stop)?;
        self.report = Some(output.report.clone());
        self.transition(SessionState::Encoded);
        Ok(output)
    }

    /// Release the image and its metadata buffers.
    pub fn dispose(&mut self) -> Result<TeardownReport, RasterError> {
        let Some(image) = self.image.take() else {
            return Err(self.unavailable("dispose"));
        };
        self.report = None;
        self.transition(SessionState::Disposed);
        Ok(image.dispose())
    }

    /// Release the image, yielding to the runtime between large buffers.
    pub async fn dispose_staged(&mut self) -> Result<TeardownReport, RasterError> {
        let Some(image) = self.image.take() else {
            return Err(self.unavailable("dispose"));
        };
        self.report = None;
        self.transition(SessionState::Disposed);
        Ok(image.dispose_staged().await)
    }
}
