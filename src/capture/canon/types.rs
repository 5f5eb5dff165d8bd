//! EDSDK types and constants needed for live view.
//!
//! Numeric values match EDSDKTypes.h and EDSDKErrors.h.

use std::ffi::c_void;

pub type EdsError = u32;
pub type EdsPropertyID = u32;

pub type EdsBaseRef = *mut c_void;
pub type EdsCameraRef = *mut c_void;
pub type EdsCameraListRef = *mut c_void;
/// Viewfinder frame container filled by `EdsDownloadEvfImage`.
pub type EdsEvfImageRef = *mut c_void;
/// In-memory stream receiving the viewfinder JPEG.
pub type EdsStreamRef = *mut c_void;

/// `EdsDeviceInfo` as laid out by the SDK.
#[derive(Debug, Clone)]
#[repr(C)]
pub struct EdsDeviceInfo {
    pub port_name: [u8; 256],
    /// NUL-terminated model name, e.g. "Canon EOS 90D".
    pub device_description: [u8; 256],
    pub device_sub_type: u32,
    pub reserved: u32,
}

impl EdsDeviceInfo {
    /// A zeroed record for the SDK to fill in.
    pub fn empty() -> Self {
        Self {
            port_name: [0; 256],
            device_description: [0; 256],
            device_sub_type: 0,
            reserved: 0,
        }
    }

    pub fn model_name(&self) -> String {
        let text = &self.device_description;
        let len = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        String::from_utf8_lossy(&text[..len]).into_owned()
    }

    /// Store `name`, truncated so the terminator always fits.
    pub fn set_model_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(self.device_description.len() - 1);
        self.device_description[..len].copy_from_slice(&bytes[..len]);
    }
}

/// `EdsSize`, used for the viewfinder coordinate system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct EdsSize {
    pub width: i32,
    pub height: i32,
}

pub const EDS_ERR_OK: EdsError = 0x0000_0000;
pub const EDS_ERR_INTERNAL_ERROR: EdsError = 0x0000_0002;
pub const EDS_ERR_MEM_ALLOC_FAILED: EdsError = 0x0000_0003;
pub const EDS_ERR_INVALID_HANDLE: EdsError = 0x0000_0061;
/// Retry later.
pub const EDS_ERR_DEVICE_BUSY: EdsError = 0x0000_0081;
pub const EDS_ERR_COMM_DISCONNECTED: EdsError = 0x0000_00C1;
pub const EDS_ERR_SESSION_NOT_OPEN: EdsError = 0x0000_2003;
/// Another application holds the camera.
pub const EDS_ERR_SESSION_ALREADY_OPEN: EdsError = 0x0000_2004;
/// No viewfinder frame yet; normal right after live view starts.
pub const EDS_ERR_OBJECT_NOTREADY: EdsError = 0x0000_A104;

/// `kEdsPropID_Evf_OutputDevice`
pub const PROP_ID_EVF_OUTPUT_DEVICE: EdsPropertyID = 0x0000_0500;
/// `kEdsPropID_Evf_CoordinateSystem`, read from an EVF image.
pub const PROP_ID_EVF_COORDINATE_SYSTEM: EdsPropertyID = 0x0000_0540;

/// Viewfinder on the camera's own screen.
pub const EVF_OUTPUT_DEVICE_TFT: u32 = 1;
/// Viewfinder streamed to the host.
pub const EVF_OUTPUT_DEVICE_PC: u32 = 2;

/// Short text for an SDK status code.
pub fn error_description(code: EdsError) -> &'static str {
    match code {
        EDS_ERR_OK => "ok",
        EDS_ERR_INTERNAL_ERROR => "internal SDK error",
        EDS_ERR_MEM_ALLOC_FAILED => "out of memory",
        EDS_ERR_INVALID_HANDLE => "invalid handle",
        EDS_ERR_DEVICE_BUSY => "camera is busy",
        EDS_ERR_COMM_DISCONNECTED => "camera disconnected",
        EDS_ERR_SESSION_NOT_OPEN => "session not open",
        EDS_ERR_SESSION_ALREADY_OPEN => "camera session is held elsewhere",
        EDS_ERR_OBJECT_NOTREADY => "live view frame not ready",
        _ => "unrecognised EDSDK status",
    }
}
