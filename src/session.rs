use tracing::{debug, info, trace, warn};

use crate::backend::{
    AcquireOutcome, DeviceFactory, DisplayOutput, DuplicationChannel, FeatureLevel,
    GraphicsDevice, MappedRegion,
};
use crate::config::CaptureConfig;
use crate::convert;
use crate::error::{CaptureError, SessionError};
use crate::frame::{Frame, Grab};
use crate::negotiate;

// ---------------------------------------------------------------------------
// Scoped guards
// ---------------------------------------------------------------------------

/// Holds an acquired frame handle and returns it to the channel on drop.
struct FrameGuard<'a, C: DuplicationChannel> {
    channel: &'a mut C,
    active: bool,
}

impl<'a, C: DuplicationChannel> FrameGuard<'a, C> {
    fn new(channel: &'a mut C) -> Self {
        Self {
            channel,
            active: true,
        }
    }

    fn channel(&self) -> &C {
        self.channel
    }

    fn release(mut self) -> Result<(), CaptureError> {
        self.active = false;
        self.channel
            .release_frame()
            .map_err(CaptureError::FrameRelease)
    }
}

impl<C: DuplicationChannel> Drop for FrameGuard<'_, C> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.channel.release_frame() {
                warn!(error = %err, "failed to release frame while unwinding a capture");
            }
        }
    }
}

/// A mapped staging surface, unmapped on drop.
struct MappedStaging<'a, D: GraphicsDevice> {
    device: &'a D,
    staging: &'a D::Staging,
    region: MappedRegion<'a>,
}

impl<'a, D: GraphicsDevice> MappedStaging<'a, D> {
    fn map(device: &'a D, staging: &'a D::Staging) -> Result<Self, CaptureError> {
        let region = device
            .map_staging(staging)
            .map_err(CaptureError::SurfaceMap)?;
        Ok(Self {
            device,
            staging,
            region,
        })
    }
}

impl<D: GraphicsDevice> Drop for MappedStaging<'_, D> {
    fn drop(&mut self) {
        self.device.unmap_staging(self.staging);
    }
}

// ---------------------------------------------------------------------------
// CaptureSession
// ---------------------------------------------------------------------------

/// Long-lived capture state for one display output.
///
/// A session is opened once and then polled with [`CaptureSession::grab_frame`].
/// Each call is self-contained: it acquires one frame handle, copies the frame
/// into the session's staging surface, maps it, converts it to packed BGR,
/// unmaps, and releases the handle before returning.
///
/// # Examples
///
/// ```rust,no_run
/// # #[cfg(windows)]
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use desktop_grab::{CaptureSession, Grab};
///
/// let mut session = CaptureSession::new()?;
/// let (width, height) = session.geometry();
///
/// match session.grab_frame()? {
///     Grab::Frame(frame) => {
///         assert_eq!(frame.dimensions(), (width, height));
///         println!("{} bytes of BGR", frame.as_bytes().len());
///     }
///     Grab::TimedOut => { /* screen is static */ }
/// }
/// # Ok(())
/// # }
/// # #[cfg(not(windows))]
/// # fn main() {}
/// ```
///
/// # Thread Safety
///
/// `grab_frame` takes `&mut self` and blocks for up to the wait bound, so calls
/// are serialized. Create one session per capturing thread.
///
/// # Limitations
///
/// The staging surface is sized once. If the output's resolution changes after
/// the session is opened, open a new session.
pub struct CaptureSession<D: GraphicsDevice> {
    // Drop order is release order: channel, staging surface, then the device
    // (which drops its immediate context before itself).
    channel: D::Channel,
    staging: D::Staging,
    device: D,
    feature_level: FeatureLevel,
    output_name: String,
    width: u32,
    height: u32,
    timeout_ms: u32,
}

impl<D: GraphicsDevice> CaptureSession<D> {
    /// Opens a session using devices from `factory`.
    ///
    /// Feature levels from `config` are tried in order; the first device that
    /// can be created is kept. The session then resolves the output at
    /// `config.output_index`, duplicates it, and allocates the staging surface.
    ///
    /// # Errors
    ///
    /// Every [`SessionError`] variant is permanent; nothing created up to the
    /// failing step is kept.
    pub fn open<F>(factory: &F, config: CaptureConfig) -> Result<Self, SessionError>
    where
        F: DeviceFactory<Device = D>,
    {
        config.validate()?;

        let (feature_level, device) =
            negotiate::first_supported(&config.feature_levels, |level| {
                factory.create_device(level)
            })
            .map_err(|exhausted| SessionError::DeviceCreation {
                attempted: exhausted.attempted,
                source: exhausted.last_error,
            })?;
        info!(%feature_level, "device and immediate context created");

        let output = device
            .output(config.output_index)
            .map_err(|err| SessionError::OutputEnumeration {
                index: config.output_index,
                source: Some(err),
            })?
            .ok_or(SessionError::OutputEnumeration {
                index: config.output_index,
                source: None,
            })?;
        let output_name = output.name();

        let rect = output
            .desktop_rect()
            .map_err(|err| SessionError::OutputEnumeration {
                index: config.output_index,
                source: Some(err),
            })?;
        let (width, height) = rect
            .dimensions()
            .ok_or(SessionError::InvalidOutputGeometry { rect })?;

        let channel = device
            .duplicate_output(&output)
            .map_err(SessionError::DuplicationUnsupported)?;
        info!(output = %output_name, "desktop duplication initialized");
        info!(width, height, "screen dimensions resolved");

        let staging = device
            .create_staging_surface(width, height)
            .map_err(|source| SessionError::SurfaceAllocation {
                width,
                height,
                source,
            })?;

        Ok(Self {
            channel,
            staging,
            device,
            feature_level,
            output_name,
            width,
            height,
            timeout_ms: config.timeout_ms,
        })
    }

    /// `(width, height)` of the duplicated output, fixed at construction.
    pub fn geometry(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The feature level the device was created at.
    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    /// The rendering device the session captures with.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Device name of the duplicated output.
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Changes how long [`grab_frame`](Self::grab_frame) waits for an update.
    pub fn set_timeout_ms(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    /// Captures the next desktop image, or reports that none arrived in time.
    ///
    /// Blocks for at most [`timeout_ms`](Self::timeout_ms) while waiting for
    /// the OS to present a new frame.
    ///
    /// # Errors
    ///
    /// See [`CaptureError`]. The acquired frame handle is always released
    /// before an error is returned. After an error for which
    /// [`CaptureError::is_fatal`] is true the session should be dropped.
    pub fn grab_frame(&mut self) -> Result<Grab, CaptureError> {
        let (resource, info) = match self
            .channel
            .acquire_next_frame(self.timeout_ms)
            .map_err(CaptureError::FrameAcquisition)?
        {
            AcquireOutcome::TimedOut => {
                debug!(timeout_ms = self.timeout_ms, "no desktop update before timeout");
                return Ok(Grab::TimedOut);
            }
            AcquireOutcome::Acquired { resource, info } => (resource, info),
        };
        trace!(
            accumulated_frames = info.accumulated_frames,
            last_present_time = info.last_present_time,
            "frame acquired"
        );

        let frame = FrameGuard::new(&mut self.channel);
        let texture = frame
            .channel()
            .resolve_texture(resource)
            .map_err(CaptureError::ResourceInterface)?;

        self.device.copy_to_staging(&self.staging, &texture);

        let pixels = {
            let mapped = MappedStaging::map(&self.device, &self.staging)?;
            convert::bgra_to_bgr(
                mapped.region.bytes,
                mapped.region.row_pitch,
                self.width as usize,
                self.height as usize,
            )?
        };

        frame.release()?;
        drop(texture);

        let frame = Frame::from_bgr(pixels, self.width, self.height, info)
            .ok_or(convert::LayoutError::Overflow {
                width: self.width as usize,
                height: self.height as usize,
            })?;
        Ok(Grab::Frame(frame))
    }
}
