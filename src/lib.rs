//! Desktop frame grabbing with the DXGI Desktop Duplication API.
//!
//! This library duplicates one display output and turns each composited
//! desktop update into an owned, tightly packed BGR buffer, ready for computer
//! vision or encoding.
//!
//! # Features
//!
//! - **Explicit timeouts**: "nothing changed" is [`Grab::TimedOut`], never an error
//!   and never an empty frame
//! - **Leak-free capture**: frame handles and mapped memory are released on every
//!   exit path, including failures
//! - **Stride aware**: row padding in the mapped surface never reaches the output
//! - **Exact conversion**: BGRA → BGR copies blue, green and red bit for bit
//! - **Feature level negotiation**: devices are created at the best level the
//!   driver accepts
//! - **Pluggable backend**: the pipeline runs against the [`backend`] traits, so it
//!   can be driven by the Windows implementation or by a stub
//!
//! # Platform Requirements
//!
//! - Windows 8 or later (DXGI 1.2+ required) for [`dxgi`]
//! - Compatible graphics driver supporting Desktop Duplication
//! - Active desktop session (duplication is refused under most remote desktop
//!   sessions and on headless machines)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! # #[cfg(windows)]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use desktop_grab::{CaptureSession, Grab};
//!
//! let mut session = CaptureSession::new()?;
//!
//! match session.grab_frame()? {
//!     Grab::Frame(frame) => {
//!         let (width, height) = frame.dimensions();
//!         println!("Captured {width}x{height} frame");
//!         // frame.as_bytes() is width * height * 3 bytes of BGR
//!     }
//!     Grab::TimedOut => {
//!         // No screen update within 500 ms - normal occurrence
//!     }
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! # Error Handling
//!
//! ```rust,no_run
//! # #[cfg(windows)]
//! # fn main() {
//! use desktop_grab::{CaptureError, CaptureSession, Grab};
//!
//! let mut session = match CaptureSession::new() {
//!     Ok(session) => session,
//!     // Permanent for this environment, e.g. a remote desktop session
//!     Err(e) => return eprintln!("Capture unavailable: {e}"),
//! };
//!
//! loop {
//!     match session.grab_frame() {
//!         Ok(Grab::Frame(frame)) => { /* Process frame */ }
//!         Ok(Grab::TimedOut) => { /* Static screen */ }
//!         Err(e) if e.is_fatal() => break,
//!         Err(CaptureError::FrameAcquisition(e)) => eprintln!("Acquire failed: {e}"),
//!         Err(e) => eprintln!("Capture failed: {e}"),
//!     }
//! }
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! # Diagnostics
//!
//! The library emits [`tracing`] events (device creation, duplication setup,
//! resolved dimensions, timeouts) and never prints. Install a subscriber in the
//! application to see them.
//!
//! # Thread Safety
//!
//! [`CaptureSession`] is single-threaded: [`CaptureSession::grab_frame`] takes
//! `&mut self` and blocks for up to the configured wait bound. Create separate
//! sessions if you need concurrent capture.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod config;
pub mod convert;
#[cfg(windows)]
#[cfg_attr(docsrs, doc(cfg(windows)))]
pub mod dxgi;
pub mod error;
pub mod frame;
pub mod negotiate;
mod session;

pub use backend::{BackendError, FeatureLevel, FrameInfo};
pub use config::{CaptureConfig, DEFAULT_TIMEOUT_MS};
pub use error::{CaptureError, SessionError};
pub use frame::{BGR8, Frame, Grab};
pub use session::CaptureSession;
