//! Placeholders for hosts without a camera or face model. Only manual
//! capture works with these.

use async_trait::async_trait;
use domain::capture::{Detection, FaceDetector, Frame, FrameSource};
use domain::DeviceFault;

pub struct NoCamera;

#[async_trait]
impl FrameSource for NoCamera {
    async fn open(&mut self) -> Result<(), DeviceFault> {
        Err(DeviceFault::CameraUnavailable("no camera attached".to_string()))
    }

    async fn next_frame(&mut self) -> Result<Frame, DeviceFault> {
        Err(DeviceFault::CameraUnavailable("no camera attached".to_string()))
    }
}

pub struct NoDetector;

#[async_trait]
impl FaceDetector for NoDetector {
    async fn load(&mut self) -> Result<(), DeviceFault> {
        Err(DeviceFault::DetectorUnavailable("no face model installed".to_string()))
    }

    async fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DeviceFault> {
        Ok(Vec::new())
    }
}
