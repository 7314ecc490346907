//! D3D11 / DXGI 1.2 implementation of the [`backend`](crate::backend) traits.
//!
//! Every handle here is a `windows` COM smart pointer, so dropping a value
//! releases the underlying interface.

use std::{mem, slice};

use tracing::debug;
use windows::{
    Win32::{
        Foundation::HMODULE,
        Graphics::{
            Direct3D::{
                D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_9_1,
                D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_11_0,
            },
            Direct3D11::{
                D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ,
                D3D11_MAPPED_SUBRESOURCE, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC,
                D3D11_USAGE_STAGING, D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext,
                ID3D11Texture2D,
            },
            Dxgi::{
                Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC},
                DXGI_ERROR_NOT_FOUND, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO,
                DXGI_OUTPUT_DESC, IDXGIAdapter, IDXGIDevice, IDXGIOutput, IDXGIOutput1,
                IDXGIOutputDuplication, IDXGIResource,
            },
        },
    },
    core::Interface,
};

use crate::backend::{
    AcquireOutcome, BackendError, DeviceFactory, DisplayOutput, DuplicationChannel, FeatureLevel,
    FrameInfo, GraphicsDevice, MappedRegion, OutputRect,
};
use crate::config::CaptureConfig;
use crate::error::SessionError;
use crate::session::CaptureSession;

/// Wraps a `windows` error with the name of the call that produced it.
fn win_error(operation: &'static str, err: windows::core::Error) -> BackendError {
    BackendError::new(operation, err.message())
        .with_code(err.code().0)
        .with_source(err)
}

fn d3d_feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::Level11_0 => D3D_FEATURE_LEVEL_11_0,
        FeatureLevel::Level10_1 => D3D_FEATURE_LEVEL_10_1,
        FeatureLevel::Level10_0 => D3D_FEATURE_LEVEL_10_0,
        FeatureLevel::Level9_1 => D3D_FEATURE_LEVEL_9_1,
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// Creates hardware D3D11 devices on the default adapter.
#[derive(Copy, Clone, Debug, Default)]
pub struct D3D11DeviceFactory;

impl DeviceFactory for D3D11DeviceFactory {
    type Device = D3D11Device;

    fn create_device(&self, level: FeatureLevel) -> Result<D3D11Device, BackendError> {
        let mut device: Option<ID3D11Device> = None;
        let mut device_context: Option<ID3D11DeviceContext> = None;
        let feature_levels = [d3d_feature_level(level)];

        unsafe {
            D3D11CreateDevice(
                None::<&IDXGIAdapter>,
                D3D_DRIVER_TYPE_HARDWARE,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                Some(&feature_levels),
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut device_context),
            )
        }
        .map_err(|err| win_error("D3D11CreateDevice", err))?;

        let device = device
            .ok_or_else(|| BackendError::new("D3D11CreateDevice", "no device returned"))?;
        let device_context = device_context.ok_or_else(|| {
            BackendError::new("D3D11CreateDevice", "no immediate context returned")
        })?;

        Ok(D3D11Device {
            device_context,
            device,
        })
    }
}

/// A D3D11 device and its immediate context.
pub struct D3D11Device {
    // The context is released before the device.
    device_context: ID3D11DeviceContext,
    device: ID3D11Device,
}

impl D3D11Device {
    pub fn raw_device(&self) -> &ID3D11Device {
        &self.device
    }

    pub fn raw_context(&self) -> &ID3D11DeviceContext {
        &self.device_context
    }
}

impl GraphicsDevice for D3D11Device {
    type Output = DxgiOutput;
    type Texture = ID3D11Texture2D;
    type Channel = DxgiDuplication;
    type Staging = StagingTexture;

    fn output(&self, index: u32) -> Result<Option<DxgiOutput>, BackendError> {
        let dxgi_device: IDXGIDevice = self
            .device
            .cast()
            .map_err(|err| win_error("ID3D11Device::QueryInterface(IDXGIDevice)", err))?;
        let adapter = unsafe { dxgi_device.GetAdapter() }
            .map_err(|err| win_error("IDXGIDevice::GetAdapter", err))?;

        match unsafe { adapter.EnumOutputs(index) } {
            Ok(output) => Ok(Some(DxgiOutput { output })),
            Err(err) if err.code() == DXGI_ERROR_NOT_FOUND => Ok(None),
            Err(err) => Err(win_error("IDXGIAdapter::EnumOutputs", err)),
        }
    }

    fn duplicate_output(&self, output: &DxgiOutput) -> Result<DxgiDuplication, BackendError> {
        let output1: IDXGIOutput1 = output
            .output
            .cast()
            .map_err(|err| win_error("IDXGIOutput::QueryInterface(IDXGIOutput1)", err))?;
        let duplication = unsafe { output1.DuplicateOutput(&self.device) }
            .map_err(|err| win_error("IDXGIOutput1::DuplicateOutput", err))?;
        Ok(DxgiDuplication { duplication })
    }

    fn create_staging_surface(
        &self,
        width: u32,
        height: u32,
    ) -> Result<StagingTexture, BackendError> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .map_err(|err| win_error("ID3D11Device::CreateTexture2D", err))?;
        let texture = texture.ok_or_else(|| {
            BackendError::new("ID3D11Device::CreateTexture2D", "no texture returned")
        })?;

        debug!(width, height, "staging texture allocated");
        Ok(StagingTexture { texture, height })
    }

    fn copy_to_staging(&self, staging: &StagingTexture, source: &ID3D11Texture2D) {
        unsafe { self.device_context.CopyResource(&staging.texture, source) };
    }

    fn map_staging<'a>(
        &'a self,
        staging: &'a StagingTexture,
    ) -> Result<MappedRegion<'a>, BackendError> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.device_context
                .Map(&staging.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|err| win_error("ID3D11DeviceContext::Map", err))?;

        if mapped.pData.is_null() {
            unsafe { self.device_context.Unmap(&staging.texture, 0) };
            return Err(BackendError::new(
                "ID3D11DeviceContext::Map",
                "mapped pointer is null",
            ));
        }

        let row_pitch = mapped.RowPitch as usize;
        // The mapping stays valid until `unmap_staging`, which the session only
        // calls once this slice is no longer borrowed.
        let bytes = unsafe {
            slice::from_raw_parts(
                mapped.pData as *const u8,
                row_pitch * staging.height as usize,
            )
        };
        Ok(MappedRegion { bytes, row_pitch })
    }

    fn unmap_staging(&self, staging: &StagingTexture) {
        unsafe { self.device_context.Unmap(&staging.texture, 0) };
    }
}

/// The session's CPU-readable copy destination.
pub struct StagingTexture {
    texture: ID3D11Texture2D,
    height: u32,
}

// ---------------------------------------------------------------------------
// Output and duplication
// ---------------------------------------------------------------------------

pub struct DxgiOutput {
    output: IDXGIOutput,
}

impl DxgiOutput {
    fn desc(&self) -> Result<DXGI_OUTPUT_DESC, BackendError> {
        unsafe { self.output.GetDesc() }.map_err(|err| win_error("IDXGIOutput::GetDesc", err))
    }
}

impl DisplayOutput for DxgiOutput {
    fn name(&self) -> String {
        match self.desc() {
            Ok(desc) => {
                let name = &desc.DeviceName;
                let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
                String::from_utf16_lossy(&name[..end])
            }
            Err(_) => String::from("<unknown output>"),
        }
    }

    fn desktop_rect(&self) -> Result<OutputRect, BackendError> {
        let rect = self.desc()?.DesktopCoordinates;
        Ok(OutputRect::new(rect.left, rect.top, rect.right, rect.bottom))
    }
}

pub struct DxgiDuplication {
    duplication: IDXGIOutputDuplication,
}

impl DuplicationChannel for DxgiDuplication {
    type Resource = IDXGIResource;
    type Texture = ID3D11Texture2D;

    fn acquire_next_frame(
        &mut self,
        timeout_ms: u32,
    ) -> Result<AcquireOutcome<IDXGIResource>, BackendError> {
        let mut resource: Option<IDXGIResource> = None;
        let mut frame_info: DXGI_OUTDUPL_FRAME_INFO = unsafe { mem::zeroed() };

        match unsafe {
            self.duplication
                .AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource)
        } {
            Ok(()) => {}
            Err(err) if err.code() == DXGI_ERROR_WAIT_TIMEOUT => {
                return Ok(AcquireOutcome::TimedOut);
            }
            Err(err) => return Err(win_error("IDXGIOutputDuplication::AcquireNextFrame", err)),
        }

        let Some(resource) = resource else {
            // A frame is held even though no resource came back; give it back
            // before reporting.
            let _ = unsafe { self.duplication.ReleaseFrame() };
            return Err(BackendError::new(
                "IDXGIOutputDuplication::AcquireNextFrame",
                "no desktop resource returned",
            ));
        };

        let info = FrameInfo {
            last_present_time: frame_info.LastPresentTime,
            last_mouse_update_time: frame_info.LastMouseUpdateTime,
            accumulated_frames: frame_info.AccumulatedFrames,
            rects_coalesced: frame_info.RectsCoalesced.as_bool(),
            protected_content_masked_out: frame_info.ProtectedContentMaskedOut.as_bool(),
        };
        Ok(AcquireOutcome::Acquired { resource, info })
    }

    fn resolve_texture(&self, resource: IDXGIResource) -> Result<ID3D11Texture2D, BackendError> {
        resource
            .cast()
            .map_err(|err| win_error("IDXGIResource::QueryInterface(ID3D11Texture2D)", err))
    }

    fn release_frame(&mut self) -> Result<(), BackendError> {
        unsafe { self.duplication.ReleaseFrame() }
            .map_err(|err| win_error("IDXGIOutputDuplication::ReleaseFrame", err))
    }
}

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl CaptureSession<D3D11Device> {
    /// Opens a session on the first output of the default hardware adapter
    /// with the default 500 ms wait bound.
    pub fn new() -> Result<Self, SessionError> {
        Self::with_config(CaptureConfig::default())
    }

    /// Opens a session on the default hardware adapter with custom settings.
    pub fn with_config(config: CaptureConfig) -> Result<Self, SessionError> {
        Self::open(&D3D11DeviceFactory, config)
    }
}
