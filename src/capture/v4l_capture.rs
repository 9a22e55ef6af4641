use super::CaptureSource;
use anyhow::{Context, Result};
use backdrop::{Frame, PixelFormat, Rotation};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::time::Instant;

pub struct WebcamCapture {
    camera: Camera,
    started: Instant,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            started: Instant::now(),
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        let buffer = self
            .camera
            .frame()
            .context("Failed to capture frame")?;
        let timestamp_ns = self.started.elapsed().as_nanos() as i64;

        let decoded = buffer.decode_image::<RgbAFormat>()
            .context("Failed to decode frame")?;

        Ok(Frame::new(decoded, PixelFormat::Rgba8, Rotation::Deg0, timestamp_ns))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
