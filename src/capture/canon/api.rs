//! `EdsSdkApi` trait: abstracts the EDSDK calls live view needs.
//!
//! The real `EdsSdk` and the `MockEdsSdk` both implement this trait,
//! allowing `CanonCapture<S>` to be generic over the SDK implementation.

use std::fmt;

use super::types::{
    error_description, EdsDeviceInfo, EdsError, EdsSize, EDS_ERR_COMM_DISCONNECTED,
    EDS_ERR_DEVICE_BUSY, EDS_ERR_OBJECT_NOTREADY, EDS_ERR_SESSION_ALREADY_OPEN,
};

/// Opaque camera handle used across the API boundary.
///
/// For the real SDK this indexes the camera refs taken from the last
/// `camera_list`; for the mock it is an index into the mock's camera list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(pub usize);

/// A failed SDK call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkError {
    pub op: &'static str,
    pub code: EdsError,
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: {} (0x{:08X})",
            self.op,
            error_description(self.code),
            self.code
        )
    }
}

impl std::error::Error for SdkError {}

impl SdkError {
    pub fn new(op: &'static str, code: EdsError) -> Self {
        Self { op, code }
    }

    /// Live view has no image yet; polling again is expected.
    pub fn is_not_ready(&self) -> bool {
        self.code == EDS_ERR_OBJECT_NOTREADY
    }

    /// The camera is held by someone else.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.code,
            EDS_ERR_DEVICE_BUSY | EDS_ERR_SESSION_ALREADY_OPEN
        )
    }

    pub fn is_disconnected(&self) -> bool {
        self.code == EDS_ERR_COMM_DISCONNECTED
    }
}

pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Abstraction over EDSDK operations.
///
/// All methods take `&self`; the implementation manages interior
/// mutability.
pub trait EdsSdkApi: Send + Sync {
    /// List all connected Canon cameras, returning handles.
    fn camera_list(&self) -> SdkResult<Vec<CameraHandle>>;

    /// Open a session with a camera.
    fn open_session(&self, camera: CameraHandle) -> SdkResult<()>;

    /// Close a session with a camera.
    fn close_session(&self, camera: CameraHandle) -> SdkResult<()>;

    /// Get device information for a camera.
    fn get_device_info(&self, camera: CameraHandle) -> SdkResult<EdsDeviceInfo>;

    /// Route the viewfinder image to the host.
    fn start_live_view(&self, camera: CameraHandle) -> SdkResult<()>;

    /// Route the viewfinder image back to the camera's own screen.
    fn stop_live_view(&self, camera: CameraHandle) -> SdkResult<()>;

    /// Download the current live view JPEG frame.
    ///
    /// Fails with `EDS_ERR_OBJECT_NOTREADY` while no frame is available.
    fn download_evf_image(&self, camera: CameraHandle) -> SdkResult<Vec<u8>>;

    /// Size of the live view coordinate system.
    fn live_view_size(&self, camera: CameraHandle) -> SdkResult<EdsSize>;

    /// Process pending EDSDK events.
    fn get_event(&self) -> SdkResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdk_error_display_names_operation_and_code() {
        let err = SdkError::new("EdsOpenSession", EDS_ERR_DEVICE_BUSY);
        assert_eq!(
            err.to_string(),
            "EdsOpenSession failed: camera is busy (0x00000081)"
        );
    }

    #[test]
    fn sdk_error_classification() {
        assert!(SdkError::new("x", EDS_ERR_OBJECT_NOTREADY).is_not_ready());
        assert!(SdkError::new("x", EDS_ERR_SESSION_ALREADY_OPEN).is_busy());
        assert!(SdkError::new("x", EDS_ERR_COMM_DISCONNECTED).is_disconnected());
        assert!(!SdkError::new("x", EDS_ERR_COMM_DISCONNECTED).is_not_ready());
    }

    /// Verify the trait is object-safe (can be used as `dyn EdsSdkApi`).
    #[test]
    fn trait_is_object_safe() {
        fn _accepts_dyn(_sdk: &dyn EdsSdkApi) {}
    }

    #[test]
    fn trait_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Box<dyn EdsSdkApi>>();
    }
}
