//! In-memory backend for exercising `CaptureSession` without a GPU.
//!
//! Every call the session makes is appended to a shared [`Log`], so tests can
//! assert on both counts and ordering.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use desktop_grab::FeatureLevel;
use desktop_grab::backend::{
    AcquireOutcome, BackendError, DeviceFactory, DisplayOutput, DuplicationChannel, FrameInfo,
    GraphicsDevice, MappedRegion, OutputRect,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    CreateDevice(FeatureLevel),
    EnumOutput(u32),
    Duplicate,
    CreateStaging(u32, u32),
    Acquire(u32),
    Resolve,
    Copy,
    Map,
    Unmap,
    Release,
    DropChannel,
    DropStaging,
    DropDevice,
}

#[derive(Clone, Debug, Default)]
pub struct Log(Rc<RefCell<Vec<Event>>>);

impl Log {
    fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.borrow().iter().position(|e| e == event)
    }
}

/// What the channel does on one `acquire_next_frame` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// No update within the wait bound.
    Idle,
    /// A frame whose resource is a 2D texture.
    Frame,
    /// A frame whose resource is some other interface.
    IncompatibleFrame,
    /// The OS reports a failure (access lost, device removed...).
    Fail,
}

/// Deterministic BGRA surface with a distinct blue/green/red per pixel and an
/// alpha that varies per pixel. Padding bytes are `0xEE`.
pub fn bgra_surface(width: u32, height: u32, row_pitch: usize) -> Vec<u8> {
    let mut bytes = vec![0xEE; row_pitch * height as usize];
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = y * row_pitch + x * 4;
            bytes[offset] = (x * 3 + y) as u8;
            bytes[offset + 1] = (x + y * 5) as u8;
            bytes[offset + 2] = (x ^ y) as u8;
            bytes[offset + 3] = (x * 37 + y * 11) as u8;
        }
    }
    bytes
}

/// The BGR buffer [`bgra_surface`] must convert to.
pub fn expected_bgr(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            bytes.extend_from_slice(&[(x * 3 + y) as u8, (x + y * 5) as u8, (x ^ y) as u8]);
        }
    }
    bytes
}

pub struct StubFactory {
    pub log: Log,
    pub supported_levels: Vec<FeatureLevel>,
    pub outputs: Vec<OutputRect>,
    pub duplication_supported: bool,
    pub staging_allocatable: bool,
    pub row_pitch: usize,
    pub surface: Vec<u8>,
    pub map_failures: usize,
    pub release_fails: bool,
    pub steps: Vec<Step>,
}

impl StubFactory {
    /// One `width` x `height` output, every feature level supported, tightly
    /// packed rows, and a channel that never produces a frame.
    pub fn new(width: u32, height: u32) -> Self {
        let row_pitch = width as usize * 4;
        Self {
            log: Log::default(),
            supported_levels: FeatureLevel::DEFAULT_PREFERENCE.to_vec(),
            outputs: vec![OutputRect::new(0, 0, width as i32, height as i32)],
            duplication_supported: true,
            staging_allocatable: true,
            row_pitch,
            surface: bgra_surface(width, height, row_pitch),
            map_failures: 0,
            release_fails: false,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps = steps.into_iter().collect();
        self
    }

    /// Re-renders the surface with `row_pitch` bytes per row.
    pub fn with_row_pitch(mut self, row_pitch: usize) -> Self {
        let rect = self.outputs[0];
        let (width, height) = rect.dimensions().unwrap();
        self.row_pitch = row_pitch;
        self.surface = bgra_surface(width, height, row_pitch);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<OutputRect>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_supported_levels(mut self, levels: Vec<FeatureLevel>) -> Self {
        self.supported_levels = levels;
        self
    }
}

impl DeviceFactory for StubFactory {
    type Device = StubDevice;

    fn create_device(&self, level: FeatureLevel) -> Result<StubDevice, BackendError> {
        self.log.push(Event::CreateDevice(level));
        if !self.supported_levels.contains(&level) {
            return Err(BackendError::new("create_device", format!("level {level} unsupported")));
        }
        Ok(StubDevice {
            log: self.log.clone(),
            outputs: self.outputs.clone(),
            duplication_supported: self.duplication_supported,
            staging_allocatable: self.staging_allocatable,
            row_pitch: self.row_pitch,
            surface: self.surface.clone(),
            map_failures: Cell::new(self.map_failures),
            release_fails: self.release_fails,
            steps: self.steps.clone(),
        })
    }
}

pub struct StubDevice {
    log: Log,
    outputs: Vec<OutputRect>,
    duplication_supported: bool,
    staging_allocatable: bool,
    row_pitch: usize,
    surface: Vec<u8>,
    map_failures: Cell<usize>,
    release_fails: bool,
    steps: Vec<Step>,
}

impl Drop for StubDevice {
    fn drop(&mut self) {
        self.log.push(Event::DropDevice);
    }
}

pub struct StubOutput {
    index: u32,
    rect: OutputRect,
}

impl DisplayOutput for StubOutput {
    fn name(&self) -> String {
        format!("\\\\.\\STUB{}", self.index + 1)
    }

    fn desktop_rect(&self) -> Result<OutputRect, BackendError> {
        Ok(self.rect)
    }
}

pub struct StubResource {
    is_texture: bool,
}

pub struct StubTexture;

pub struct StubStaging {
    log: Log,
    bytes: Vec<u8>,
    row_pitch: usize,
}

impl Drop for StubStaging {
    fn drop(&mut self) {
        self.log.push(Event::DropStaging);
    }
}

impl GraphicsDevice for StubDevice {
    type Output = StubOutput;
    type Texture = StubTexture;
    type Channel = StubChannel;
    type Staging = StubStaging;

    fn output(&self, index: u32) -> Result<Option<StubOutput>, BackendError> {
        self.log.push(Event::EnumOutput(index));
        Ok(self
            .outputs
            .get(index as usize)
            .map(|&rect| StubOutput { index, rect }))
    }

    fn duplicate_output(&self, _output: &StubOutput) -> Result<StubChannel, BackendError> {
        self.log.push(Event::Duplicate);
        if !self.duplication_supported {
            return Err(BackendError::new("duplicate_output", "not supported in this session")
                .with_code(0x887A_0004_u32 as i32));
        }
        Ok(StubChannel {
            log: self.log.clone(),
            steps: self.steps.iter().cloned().collect(),
            holding_frame: false,
            release_fails: self.release_fails,
        })
    }

    fn create_staging_surface(&self, width: u32, height: u32) -> Result<StubStaging, BackendError> {
        self.log.push(Event::CreateStaging(width, height));
        if !self.staging_allocatable {
            return Err(BackendError::new("create_staging_surface", "out of memory"));
        }
        Ok(StubStaging {
            log: self.log.clone(),
            bytes: self.surface.clone(),
            row_pitch: self.row_pitch,
        })
    }

    fn copy_to_staging(&self, _staging: &StubStaging, _source: &StubTexture) {
        self.log.push(Event::Copy);
    }

    fn map_staging<'a>(&'a self, staging: &'a StubStaging) -> Result<MappedRegion<'a>, BackendError> {
        let remaining = self.map_failures.get();
        if remaining > 0 {
            self.map_failures.set(remaining - 1);
            return Err(BackendError::new("map_staging", "device removed"));
        }
        self.log.push(Event::Map);
        Ok(MappedRegion {
            bytes: &staging.bytes,
            row_pitch: staging.row_pitch,
        })
    }

    fn unmap_staging(&self, _staging: &StubStaging) {
        self.log.push(Event::Unmap);
    }
}

pub struct StubChannel {
    log: Log,
    steps: VecDeque<Step>,
    holding_frame: bool,
    release_fails: bool,
}

impl Drop for StubChannel {
    fn drop(&mut self) {
        self.log.push(Event::DropChannel);
    }
}

impl DuplicationChannel for StubChannel {
    type Resource = StubResource;
    type Texture = StubTexture;

    fn acquire_next_frame(
        &mut self,
        timeout_ms: u32,
    ) -> Result<AcquireOutcome<StubResource>, BackendError> {
        self.log.push(Event::Acquire(timeout_ms));
        assert!(!self.holding_frame, "frame acquired while another is outstanding");

        let is_texture = match self.steps.pop_front().unwrap_or(Step::Idle) {
            Step::Idle => return Ok(AcquireOutcome::TimedOut),
            Step::Fail => return Err(BackendError::new("acquire_next_frame", "access lost")),
            Step::Frame => true,
            Step::IncompatibleFrame => false,
        };
        self.holding_frame = true;
        Ok(AcquireOutcome::Acquired {
            resource: StubResource { is_texture },
            info: FrameInfo {
                last_present_time: 42,
                accumulated_frames: 1,
                ..FrameInfo::default()
            },
        })
    }

    fn resolve_texture(&self, resource: StubResource) -> Result<StubTexture, BackendError> {
        self.log.push(Event::Resolve);
        if resource.is_texture {
            Ok(StubTexture)
        } else {
            Err(BackendError::new("resolve_texture", "no such interface"))
        }
    }

    fn release_frame(&mut self) -> Result<(), BackendError> {
        self.log.push(Event::Release);
        assert!(self.holding_frame, "frame released twice");
        self.holding_frame = false;
        if self.release_fails {
            return Err(BackendError::new("release_frame", "invalid call"));
        }
        Ok(())
    }
}
