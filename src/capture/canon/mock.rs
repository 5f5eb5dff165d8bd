//! In-process stand-in for the EDSDK.
//!
//! Builder methods set up attached bodies, the viewfinder payload, how many
//! polls come back "not ready" and one-shot failures per operation.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::api::{CameraHandle, EdsSdkApi, SdkError, SdkResult};
use super::types::{
    EdsDeviceInfo, EdsError, EdsSize, EDS_ERR_INVALID_HANDLE, EDS_ERR_OBJECT_NOTREADY,
    EDS_ERR_SESSION_NOT_OPEN,
};

#[derive(Debug, Clone)]
struct MockCamera {
    model: String,
    session_open: bool,
    live_view: bool,
}

/// One-shot failure for the next call of `operation`.
#[derive(Debug, Clone)]
struct ErrorInjection {
    operation: &'static str,
    code: EdsError,
}

/// Scriptable [`EdsSdkApi`]. Shareable across threads like the real SDK.
pub struct MockEdsSdk {
    state: Mutex<MockState>,
}

#[derive(Debug)]
struct MockState {
    cameras: Vec<MockCamera>,
    live_view_frame: Option<Vec<u8>>,
    live_view_size: Option<EdsSize>,
    not_ready_polls: usize,
    error_injections: Vec<ErrorInjection>,
    calls: HashMap<&'static str, u32>,
}

impl MockEdsSdk {
    /// No cameras attached.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                cameras: Vec::new(),
                live_view_frame: None,
                live_view_size: None,
                not_ready_polls: 0,
                error_injections: Vec::new(),
                calls: HashMap::new(),
            }),
        }
    }

    /// Attach a body reporting `model`.
    pub fn with_camera(self, model: &str) -> Self {
        self.state.lock().cameras.push(MockCamera {
            model: model.to_string(),
            session_open: false,
            live_view: false,
        });
        self
    }

    /// Attach `count` numbered bodies.
    pub fn with_cameras(self, count: usize) -> Self {
        (0..count).fold(self, |mock, i| {
            mock.with_camera(&format!("Canon EOS Mock {}", i + 1))
        })
    }

    /// Set the JPEG returned by every successful `download_evf_image`.
    pub fn with_live_view_frame(self, jpeg_bytes: Vec<u8>) -> Self {
        self.state.lock().live_view_frame = Some(jpeg_bytes);
        self
    }

    /// Report this live view coordinate size.
    pub fn with_live_view_size(self, width: i32, height: i32) -> Self {
        self.state.lock().live_view_size = Some(EdsSize { width, height });
        self
    }

    /// Answer the next `count` downloads with `EDS_ERR_OBJECT_NOTREADY`.
    pub fn with_not_ready_polls(self, count: usize) -> Self {
        self.state.lock().not_ready_polls = count;
        self
    }

    /// Inject an error code for the next call of `operation`.
    ///
    /// Operation names match the trait methods: `"camera_list"`,
    /// `"open_session"`, `"close_session"`, `"get_device_info"`,
    /// `"start_live_view"`, `"stop_live_view"`, `"download_evf_image"`,
    /// `"live_view_size"`, `"get_event"`.
    pub fn with_error(self, operation: &'static str, code: EdsError) -> Self {
        self.state
            .lock()
            .error_injections
            .push(ErrorInjection { operation, code });
        self
    }

    /// Number of times `operation` was called.
    pub fn calls(&self, operation: &str) -> u32 {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Whether a session is currently open on the camera at `index`.
    pub fn session_open(&self, index: usize) -> bool {
        self.state
            .lock()
            .cameras
            .get(index)
            .is_some_and(|c| c.session_open)
    }
}

impl Default for MockEdsSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Count the call and fire any injected error for it.
    fn enter(&mut self, operation: &'static str) -> SdkResult<()> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some(pos) = self
            .error_injections
            .iter()
            .position(|e| e.operation == operation)
        {
            let injection = self.error_injections.remove(pos);
            return Err(SdkError::new(operation, injection.code));
        }
        Ok(())
    }

    fn camera_mut(
        &mut self,
        operation: &'static str,
        handle: CameraHandle,
    ) -> SdkResult<&mut MockCamera> {
        self.cameras
            .get_mut(handle.0)
            .ok_or(SdkError::new(operation, EDS_ERR_INVALID_HANDLE))
    }

    fn session_camera(
        &mut self,
        operation: &'static str,
        handle: CameraHandle,
    ) -> SdkResult<&mut MockCamera> {
        let camera = self.camera_mut(operation, handle)?;
        if !camera.session_open {
            return Err(SdkError::new(operation, EDS_ERR_SESSION_NOT_OPEN));
        }
        Ok(camera)
    }
}

impl EdsSdkApi for MockEdsSdk {
    fn camera_list(&self) -> SdkResult<Vec<CameraHandle>> {
        let mut state = self.state.lock();
        state.enter("camera_list")?;
        Ok((0..state.cameras.len()).map(CameraHandle).collect())
    }

    fn open_session(&self, camera: CameraHandle) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.enter("open_session")?;
        state.camera_mut("open_session", camera)?.session_open = true;
        Ok(())
    }

    fn close_session(&self, camera: CameraHandle) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.enter("close_session")?;
        let cam = state.camera_mut("close_session", camera)?;
        cam.session_open = false;
        cam.live_view = false;
        Ok(())
    }

    fn get_device_info(&self, camera: CameraHandle) -> SdkResult<EdsDeviceInfo> {
        let mut state = self.state.lock();
        state.enter("get_device_info")?;
        let cam = state.camera_mut("get_device_info", camera)?;
        let mut info = EdsDeviceInfo::empty();
        info.set_model_name(&cam.model);
        Ok(info)
    }

    fn start_live_view(&self, camera: CameraHandle) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.enter("start_live_view")?;
        state.session_camera("start_live_view", camera)?.live_view = true;
        Ok(())
    }

    fn stop_live_view(&self, camera: CameraHandle) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.enter("stop_live_view")?;
        state.session_camera("stop_live_view", camera)?.live_view = false;
        Ok(())
    }

    fn download_evf_image(&self, camera: CameraHandle) -> SdkResult<Vec<u8>> {
        const OP: &str = "download_evf_image";
        let mut state = self.state.lock();
        state.enter(OP)?;
        if !state.session_camera(OP, camera)?.live_view {
            return Err(SdkError::new(OP, EDS_ERR_OBJECT_NOTREADY));
        }
        if state.not_ready_polls > 0 {
            state.not_ready_polls -= 1;
            return Err(SdkError::new(OP, EDS_ERR_OBJECT_NOTREADY));
        }
        state
            .live_view_frame
            .clone()
            .ok_or(SdkError::new(OP, EDS_ERR_OBJECT_NOTREADY))
    }

    fn live_view_size(&self, camera: CameraHandle) -> SdkResult<EdsSize> {
        const OP: &str = "live_view_size";
        let mut state = self.state.lock();
        state.enter(OP)?;
        state.session_camera(OP, camera)?;
        state
            .live_view_size
            .ok_or(SdkError::new(OP, EDS_ERR_OBJECT_NOTREADY))
    }

    fn get_event(&self) -> SdkResult<()> {
        self.state.lock().enter("get_event")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::canon::types::EDS_ERR_DEVICE_BUSY;

    #[test]
    fn empty_mock_returns_no_cameras() {
        let mock = MockEdsSdk::new();
        assert!(mock.camera_list().unwrap().is_empty());
    }

    #[test]
    fn with_cameras_returns_correct_count() {
        let mock = MockEdsSdk::new().with_cameras(3);
        assert_eq!(mock.camera_list().unwrap().len(), 3);
    }

    #[test]
    fn device_info_carries_model_name() {
        let mock = MockEdsSdk::new().with_camera("Canon EOS R5");
        let cameras = mock.camera_list().unwrap();
        let info = mock.get_device_info(cameras[0]).unwrap();
        assert_eq!(info.model_name(), "Canon EOS R5");
    }

    #[test]
    fn live_view_requires_session_and_start() {
        let mock = MockEdsSdk::new()
            .with_cameras(1)
            .with_live_view_frame(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let handle = CameraHandle(0);

        let err = mock.download_evf_image(handle).unwrap_err();
        assert_eq!(err.code, EDS_ERR_SESSION_NOT_OPEN);

        mock.open_session(handle).unwrap();
        assert!(mock.download_evf_image(handle).unwrap_err().is_not_ready());

        mock.start_live_view(handle).unwrap();
        assert_eq!(
            mock.download_evf_image(handle).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xD9]
        );

        mock.stop_live_view(handle).unwrap();
        assert!(mock.download_evf_image(handle).is_err());
    }

    #[test]
    fn not_ready_polls_precede_frames() {
        let mock = MockEdsSdk::new()
            .with_cameras(1)
            .with_live_view_frame(vec![0xFF, 0xD8])
            .with_not_ready_polls(2);
        let handle = CameraHandle(0);
        mock.open_session(handle).unwrap();
        mock.start_live_view(handle).unwrap();

        assert!(mock.download_evf_image(handle).unwrap_err().is_not_ready());
        assert!(mock.download_evf_image(handle).unwrap_err().is_not_ready());
        assert!(mock.download_evf_image(handle).is_ok());
        assert_eq!(mock.calls("download_evf_image"), 3);
    }

    #[test]
    fn error_injection_fires_once() {
        let mock = MockEdsSdk::new()
            .with_cameras(1)
            .with_error("open_session", EDS_ERR_DEVICE_BUSY);

        assert!(mock.open_session(CameraHandle(0)).unwrap_err().is_busy());
        assert!(mock.open_session(CameraHandle(0)).is_ok());
        assert!(mock.session_open(0));
    }

    #[test]
    fn invalid_camera_handle_returns_error() {
        let mock = MockEdsSdk::new();
        let err = mock.get_device_info(CameraHandle(99)).unwrap_err();
        assert_eq!(err.code, EDS_ERR_INVALID_HANDLE);
    }

    #[test]
    fn mock_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockEdsSdk>();
    }
}
