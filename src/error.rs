use thiserror::Error;

use crate::backend::{BackendError, FeatureLevel, OutputRect};
use crate::convert::LayoutError;

/// Errors that can occur while opening a [`CaptureSession`](crate::CaptureSession).
///
/// All of them are permanent for the environment they occur in: no session is
/// created and retrying the same construction is expected to fail again.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No rendering device could be created at any of the requested feature levels.
    ///
    /// **Recovery**: Check graphics driver installation. Not retried.
    #[error("failed to create a rendering device at any of the feature levels {attempted:?}")]
    DeviceCreation {
        attempted: Vec<FeatureLevel>,
        #[source]
        source: Option<BackendError>,
    },

    /// The adapter has no output at the requested index.
    ///
    /// Typical on headless machines. `source` is set when enumeration itself
    /// failed rather than simply finding nothing.
    #[error("no display output at index {index}")]
    OutputEnumeration {
        index: u32,
        #[source]
        source: Option<BackendError>,
    },

    /// The output reported a desktop rectangle with a non-positive width or height.
    #[error("output reported malformed desktop coordinates {rect:?}")]
    InvalidOutputGeometry { rect: OutputRect },

    /// The output or driver refused desktop duplication.
    ///
    /// Common under remote desktop sessions and on some virtual displays.
    /// **Recovery**: None; capture is unavailable in this environment.
    #[error("desktop duplication is not supported for this output")]
    DuplicationUnsupported(#[source] BackendError),

    /// The CPU-readable staging surface could not be allocated.
    #[error("failed to allocate a {width}x{height} staging surface")]
    SurfaceAllocation {
        width: u32,
        height: u32,
        #[source]
        source: BackendError,
    },

    /// The [`CaptureConfig`](crate::CaptureConfig) cannot be used.
    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),
}

/// Errors that can occur during a single [`grab_frame`](crate::CaptureSession::grab_frame) call.
///
/// A timeout is not among them; it is reported as [`Grab::TimedOut`](crate::Grab::TimedOut).
/// Unless [`CaptureError::is_fatal`] says otherwise the session stays usable
/// and the next call may succeed.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Acquiring the next frame failed for a reason other than a timeout.
    ///
    /// **Recovery**: Call again; recreate the session if it keeps failing
    /// (e.g. after a display mode change).
    #[error("failed to acquire the next frame")]
    FrameAcquisition(#[source] BackendError),

    /// The frame handle could not be interpreted as a 2D texture.
    ///
    /// This breaks the duplication contract. **Recovery**: Drop the session.
    #[error("acquired frame resource is not a 2D texture")]
    ResourceInterface(#[source] BackendError),

    /// The staging surface could not be mapped for reading.
    #[error("failed to map the staging surface")]
    SurfaceMap(#[source] BackendError),

    /// The mapped staging surface does not match the session's dimensions.
    #[error("mapped staging surface has an unexpected layout")]
    SurfaceLayout(#[from] LayoutError),

    /// The frame handle could not be returned to the duplication channel.
    #[error("failed to release the acquired frame")]
    FrameRelease(#[source] BackendError),
}

impl CaptureError {
    /// Returns true when the session must not be used for further captures.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::ResourceInterface(_))
    }
}
