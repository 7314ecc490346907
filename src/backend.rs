//! The seam between the capture pipeline and the graphics stack.
//!
//! [`CaptureSession`](crate::CaptureSession) never talks to D3D11 or DXGI
//! directly. It drives four small traits instead:
//!
//! - [`DeviceFactory`] creates a rendering device at one [`FeatureLevel`]
//! - [`GraphicsDevice`] finds outputs, duplicates them, and owns the staging
//!   surface operations (copy, map, unmap)
//! - [`DisplayOutput`] describes one display output
//! - [`DuplicationChannel`] hands out frame handles with a bounded wait
//!
//! The Windows implementation lives in [`crate::dxgi`]. Anything else that
//! implements these traits (for example an in-memory stub in a test) drives
//! exactly the same acquire/copy/map/convert/unmap/release sequence.

use std::error::Error as StdError;
use std::fmt;

/// A ranked rendering device capability profile.
///
/// Variants are declared from most to least capable. [`FeatureLevel::DEFAULT_PREFERENCE`]
/// is the order in which a session tries them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureLevel {
    /// Direct3D 11.0
    Level11_0,
    /// Direct3D 10.1
    Level10_1,
    /// Direct3D 10.0
    Level10_0,
    /// Direct3D 9.1
    Level9_1,
}

impl FeatureLevel {
    /// Highest first, the way the device is negotiated unless configured otherwise.
    pub const DEFAULT_PREFERENCE: [FeatureLevel; 4] = [
        FeatureLevel::Level11_0,
        FeatureLevel::Level10_1,
        FeatureLevel::Level10_0,
        FeatureLevel::Level9_1,
    ];

    /// Parses the `major_minor` notation used in logs and configuration (`"11_0"`, `"9.1"`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().replace('.', "_").as_str() {
            "11_0" => Some(FeatureLevel::Level11_0),
            "10_1" => Some(FeatureLevel::Level10_1),
            "10_0" => Some(FeatureLevel::Level10_0),
            "9_1" => Some(FeatureLevel::Level9_1),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureLevel::Level11_0 => "11_0",
            FeatureLevel::Level10_1 => "10_1",
            FeatureLevel::Level10_0 => "10_0",
            FeatureLevel::Level9_1 => "9_1",
        };
        f.write_str(name)
    }
}

/// An output's position on the virtual desktop, in desktop coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl OutputRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Width and height as bottom-right minus top-left, or `None` unless both
    /// are strictly positive.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let width = i64::from(self.right) - i64::from(self.left);
        let height = i64::from(self.bottom) - i64::from(self.top);
        if width <= 0 || height <= 0 {
            return None;
        }
        Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
    }
}

/// Metadata the duplication channel reports alongside a frame handle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Performance counter value of the last desktop image update, `0` if only
    /// the pointer changed.
    pub last_present_time: i64,
    /// Performance counter value of the last mouse update, `0` if none.
    pub last_mouse_update_time: i64,
    /// Desktop updates folded into this frame since the previous acquisition.
    pub accumulated_frames: u32,
    pub rects_coalesced: bool,
    pub protected_content_masked_out: bool,
}

/// Result of asking the channel for the next frame.
#[derive(Debug)]
pub enum AcquireOutcome<R> {
    /// No desktop update arrived within the wait bound.
    TimedOut,
    /// A frame handle that must be released before the next acquisition.
    Acquired { resource: R, info: FrameInfo },
}

/// CPU view of a mapped staging surface.
///
/// `bytes` starts at the first pixel of the first row and consecutive rows
/// begin `row_pitch` bytes apart. The view is only valid until the surface is
/// unmapped, which the borrow on the staging surface enforces.
#[derive(Copy, Clone, Debug)]
pub struct MappedRegion<'a> {
    pub bytes: &'a [u8],
    pub row_pitch: usize,
}

/// A failed call into the graphics stack.
#[derive(Debug)]
pub struct BackendError {
    operation: &'static str,
    code: Option<i32>,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl BackendError {
    /// A failure with no underlying platform error.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the raw status code (an HRESULT on Windows).
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The API call that failed, e.g. `"IDXGIOutputDuplication::AcquireNextFrame"`.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(
                f,
                "{} failed ({:#010x}): {}",
                self.operation, code as u32, self.message
            ),
            None => write!(f, "{} failed: {}", self.operation, self.message),
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Creates rendering devices.
pub trait DeviceFactory {
    type Device: GraphicsDevice;

    /// Creates a hardware device restricted to exactly `level`.
    fn create_device(&self, level: FeatureLevel) -> Result<Self::Device, BackendError>;
}

/// A rendering device together with its immediate context.
pub trait GraphicsDevice {
    type Output: DisplayOutput;
    /// A GPU texture holding one duplicated desktop image.
    type Texture;
    type Channel: DuplicationChannel<Texture = Self::Texture>;
    /// CPU-readable copy destination, sized once at session creation.
    type Staging;

    /// The output at `index` on the adapter this device was created on, or
    /// `None` when the adapter has no such output.
    fn output(&self, index: u32) -> Result<Option<Self::Output>, BackendError>;

    /// Opens a duplication channel for `output`.
    fn duplicate_output(&self, output: &Self::Output) -> Result<Self::Channel, BackendError>;

    /// Allocates a `width` x `height` BGRA staging surface with CPU read access
    /// and no bind flags.
    fn create_staging_surface(
        &self,
        width: u32,
        height: u32,
    ) -> Result<Self::Staging, BackendError>;

    /// Queues a whole-surface GPU copy of `source` into `staging`.
    fn copy_to_staging(&self, staging: &Self::Staging, source: &Self::Texture);

    /// Maps `staging` for reading. Every successful call must be paired with
    /// [`GraphicsDevice::unmap_staging`].
    fn map_staging<'a>(
        &'a self,
        staging: &'a Self::Staging,
    ) -> Result<MappedRegion<'a>, BackendError>;

    fn unmap_staging(&self, staging: &Self::Staging);
}

pub trait DisplayOutput {
    /// Human-readable device name, used in diagnostics only.
    fn name(&self) -> String;

    fn desktop_rect(&self) -> Result<OutputRect, BackendError>;
}

/// The OS stream of composited frames for one output.
///
/// At most one frame handle may be outstanding: each successful
/// [`acquire_next_frame`](DuplicationChannel::acquire_next_frame) must be
/// followed by [`release_frame`](DuplicationChannel::release_frame) before the
/// next acquisition.
pub trait DuplicationChannel {
    /// The raw frame handle.
    type Resource;
    type Texture;

    fn acquire_next_frame(
        &mut self,
        timeout_ms: u32,
    ) -> Result<AcquireOutcome<Self::Resource>, BackendError>;

    /// Interprets a frame handle as a 2D texture.
    fn resolve_texture(&self, resource: Self::Resource) -> Result<Self::Texture, BackendError>;

    fn release_frame(&mut self) -> Result<(), BackendError>;
}
