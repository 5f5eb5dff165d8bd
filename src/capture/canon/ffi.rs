//! EDSDK entry points used for live view.
//!
//! Linked only with the `canon` feature. Callers outside `sdk` never see
//! these; they use the safe `EdsSdk` wrapper.

#![allow(non_snake_case)]

use std::ffi::c_void;

use super::types::{
    EdsBaseRef, EdsCameraListRef, EdsCameraRef, EdsDeviceInfo, EdsError, EdsEvfImageRef,
    EdsPropertyID, EdsStreamRef,
};

#[link(name = "EDSDK")]
extern "C" {
    pub fn EdsInitializeSDK() -> EdsError;
    pub fn EdsTerminateSDK() -> EdsError;

    // Enumeration and sessions
    pub fn EdsGetCameraList(out_list: *mut EdsCameraListRef) -> EdsError;
    pub fn EdsGetChildCount(list: EdsCameraListRef, out_count: *mut u32) -> EdsError;
    pub fn EdsGetChildAtIndex(
        list: EdsCameraListRef,
        index: i32,
        out_camera: *mut EdsCameraRef,
    ) -> EdsError;
    pub fn EdsOpenSession(camera: EdsCameraRef) -> EdsError;
    pub fn EdsCloseSession(camera: EdsCameraRef) -> EdsError;
    pub fn EdsGetDeviceInfo(camera: EdsCameraRef, out_info: *mut EdsDeviceInfo) -> EdsError;

    // Viewfinder download
    pub fn EdsCreateMemoryStream(initial_size: u64, out_stream: *mut EdsStreamRef) -> EdsError;
    pub fn EdsGetPointer(stream: EdsStreamRef, out_data: *mut *mut c_void) -> EdsError;
    pub fn EdsGetLength(stream: EdsStreamRef, out_len: *mut u64) -> EdsError;
    pub fn EdsCreateEvfImageRef(stream: EdsStreamRef, out_image: *mut EdsEvfImageRef)
        -> EdsError;
    /// Fails with `EDS_ERR_OBJECT_NOTREADY` until the first frame exists.
    pub fn EdsDownloadEvfImage(camera: EdsCameraRef, image: EdsEvfImageRef) -> EdsError;

    pub fn EdsGetPropertyData(
        object: EdsBaseRef,
        property: EdsPropertyID,
        param: i32,
        size: u32,
        out_data: *mut c_void,
    ) -> EdsError;
    pub fn EdsSetPropertyData(
        object: EdsBaseRef,
        property: EdsPropertyID,
        param: i32,
        size: u32,
        data: *const c_void,
    ) -> EdsError;

    /// Pumps the SDK's event queue; needed between downloads on some hosts.
    pub fn EdsGetEvent() -> EdsError;

    /// Returns the remaining reference count.
    pub fn EdsRelease(object: EdsBaseRef) -> u32;
}
