//! Safe EDSDK wrapper with RAII lifecycle management.
//!
//! Only compiled with the `canon` feature. Production code uses this; tests
//! use `MockEdsSdk` instead.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::api::{CameraHandle, EdsSdkApi, SdkError, SdkResult};
use super::ffi;
use super::types::*;

/// Whether the SDK has been initialised (global, since EDSDK is per-process).
static SDK_INITIALISED: AtomicBool = AtomicBool::new(false);

fn check(op: &'static str, code: EdsError) -> SdkResult<()> {
    if code == EDS_ERR_OK {
        Ok(())
    } else {
        Err(SdkError::new(op, code))
    }
}

/// An SDK object reference released on drop.
struct Owned(EdsBaseRef);

impl Owned {
    fn null() -> Self {
        Self(std::ptr::null_mut())
    }
}

impl Drop for Owned {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                ffi::EdsRelease(self.0);
            }
        }
    }
}

/// Camera reference kept between calls.
struct CameraRef(Owned);

// EDSDK refs are plain handles; every call through them is serialised by
// the `cameras` mutex.
unsafe impl Send for CameraRef {}

/// Safe wrapper around the Canon EDSDK.
///
/// Initialises the SDK on construction and terminates it on drop.
/// Only one instance may exist per process.
pub struct EdsSdk {
    cameras: Mutex<Vec<CameraRef>>,
}

impl EdsSdk {
    /// Initialise the EDSDK.
    pub fn new() -> SdkResult<Self> {
        if SDK_INITIALISED.swap(true, Ordering::SeqCst) {
            return Err(SdkError::new("EdsInitializeSDK", EDS_ERR_INTERNAL_ERROR));
        }

        let err = unsafe { ffi::EdsInitializeSDK() };
        if let Err(e) = check("EdsInitializeSDK", err) {
            SDK_INITIALISED.store(false, Ordering::SeqCst);
            return Err(e);
        }

        Ok(Self {
            cameras: Mutex::new(Vec::new()),
        })
    }

    fn with_camera<T>(
        &self,
        op: &'static str,
        camera: CameraHandle,
        f: impl FnOnce(EdsCameraRef) -> SdkResult<T>,
    ) -> SdkResult<T> {
        let cameras = self.cameras.lock();
        let camera_ref = cameras
            .get(camera.0)
            .ok_or(SdkError::new(op, EDS_ERR_INVALID_HANDLE))?;
        f(camera_ref.0 .0)
    }

    fn set_evf_output(&self, op: &'static str, camera: CameraHandle, device: u32) -> SdkResult<()> {
        self.with_camera(op, camera, |camera_ref| {
            let err = unsafe {
                ffi::EdsSetPropertyData(
                    camera_ref,
                    PROP_ID_EVF_OUTPUT_DEVICE,
                    0,
                    std::mem::size_of::<u32>() as u32,
                    &device as *const u32 as *const c_void,
                )
            };
            check(op, err)
        })
    }

    /// Download one EVF image, returning the stream and image refs.
    fn download(&self, op: &'static str, camera: CameraHandle) -> SdkResult<(Owned, Owned)> {
        self.with_camera(op, camera, |camera_ref| unsafe {
            let mut stream = Owned::null();
            check(op, ffi::EdsCreateMemoryStream(0, &mut stream.0))?;
            let mut image = Owned::null();
            check(op, ffi::EdsCreateEvfImageRef(stream.0, &mut image.0))?;
            check(op, ffi::EdsDownloadEvfImage(camera_ref, image.0))?;
            Ok((stream, image))
        })
    }
}

impl Drop for EdsSdk {
    fn drop(&mut self) {
        self.cameras.lock().clear();
        unsafe {
            ffi::EdsTerminateSDK();
        }
        SDK_INITIALISED.store(false, Ordering::SeqCst);
    }
}

impl EdsSdkApi for EdsSdk {
    fn camera_list(&self) -> SdkResult<Vec<CameraHandle>> {
        const OP: &str = "EdsGetCameraList";
        unsafe {
            let mut list = Owned::null();
            check(OP, ffi::EdsGetCameraList(&mut list.0))?;

            let mut count: u32 = 0;
            check(OP, ffi::EdsGetChildCount(list.0, &mut count))?;

            let mut refs = Vec::with_capacity(count as usize);
            for i in 0..count {
                let mut camera = Owned::null();
                check(OP, ffi::EdsGetChildAtIndex(list.0, i as i32, &mut camera.0))?;
                refs.push(CameraRef(camera));
            }

            let handles = (0..refs.len()).map(CameraHandle).collect();
            *self.cameras.lock() = refs;
            Ok(handles)
        }
    }

    fn open_session(&self, camera: CameraHandle) -> SdkResult<()> {
        self.with_camera("EdsOpenSession", camera, |camera_ref| {
            check("EdsOpenSession", unsafe { ffi::EdsOpenSession(camera_ref) })
        })
    }

    fn close_session(&self, camera: CameraHandle) -> SdkResult<()> {
        self.with_camera("EdsCloseSession", camera, |camera_ref| {
            check("EdsCloseSession", unsafe { ffi::EdsCloseSession(camera_ref) })
        })
    }

    fn get_device_info(&self, camera: CameraHandle) -> SdkResult<EdsDeviceInfo> {
        self.with_camera("EdsGetDeviceInfo", camera, |camera_ref| {
            let mut info = EdsDeviceInfo::empty();
            check("EdsGetDeviceInfo", unsafe {
                ffi::EdsGetDeviceInfo(camera_ref, &mut info)
            })?;
            Ok(info)
        })
    }

    fn start_live_view(&self, camera: CameraHandle) -> SdkResult<()> {
        self.set_evf_output("start live view", camera, EVF_OUTPUT_DEVICE_PC)
    }

    fn stop_live_view(&self, camera: CameraHandle) -> SdkResult<()> {
        self.set_evf_output("stop live view", camera, EVF_OUTPUT_DEVICE_TFT)
    }

    fn download_evf_image(&self, camera: CameraHandle) -> SdkResult<Vec<u8>> {
        const OP: &str = "EdsDownloadEvfImage";
        let (stream, _image) = self.download(OP, camera)?;
        unsafe {
            let mut length: u64 = 0;
            check(OP, ffi::EdsGetLength(stream.0, &mut length))?;
            let mut pointer: *mut c_void = std::ptr::null_mut();
            check(OP, ffi::EdsGetPointer(stream.0, &mut pointer))?;
            if pointer.is_null() || length == 0 {
                return Err(SdkError::new(OP, EDS_ERR_OBJECT_NOTREADY));
            }
            Ok(std::slice::from_raw_parts(pointer as *const u8, length as usize).to_vec())
        }
    }

    fn live_view_size(&self, camera: CameraHandle) -> SdkResult<EdsSize> {
        const OP: &str = "Evf_CoordinateSystem";
        let (_stream, image) = self.download(OP, camera)?;
        let mut size = EdsSize::default();
        check(OP, unsafe {
            ffi::EdsGetPropertyData(
                image.0,
                PROP_ID_EVF_COORDINATE_SYSTEM,
                0,
                std::mem::size_of::<EdsSize>() as u32,
                &mut size as *mut EdsSize as *mut c_void,
            )
        })?;
        Ok(size)
    }

    fn get_event(&self) -> SdkResult<()> {
        check("EdsGetEvent", unsafe { ffi::EdsGetEvent() })
    }
}
