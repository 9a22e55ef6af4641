use super::OutputSink;
use anyhow::{bail, Context, Result};
use backdrop::{Frame, PixelFormat};
use image::{imageops, RgbaImage};
use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

pub struct V4L2Output {
    // Kept open so the negotiated format stays in effect
    _device: Device,
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;
        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let negotiated = Output::set_format(&device, &requested)
            .context("Failed to set YUYV output format")?;
        if (negotiated.width, negotiated.height) != (width, height) {
            bail!(
                "v4l2loopback device negotiated {}x{}, expected {}x{}",
                negotiated.width,
                negotiated.height,
                width,
                height
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device ready ({})", negotiated.fourcc);

        Ok(Self {
            _device: device,
            file,
            width,
            height,
        })
    }

    /// Convert a frame to YUV422 (YUYV), reading channels in the frame's order
    fn frame_to_yuyv(format: PixelFormat, image: &RgbaImage) -> Vec<u8> {
        let (width, height) = image.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = format.reorder_to_rgba(image.get_pixel(x, y).0);
                let pixel2 = if x + 1 < width {
                    format.reorder_to_rgba(image.get_pixel(x + 1, y).0)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // Chroma is shared by the pixel pair
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

/// BT.601 RGB to YUV
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let image = if frame.dimensions() != (self.width, self.height) {
            Cow::Owned(imageops::resize(
                frame.image(),
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            ))
        } else {
            Cow::Borrowed(frame.image())
        };

        let yuyv_data = Self::frame_to_yuyv(frame.format(), &image);

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn white_and_black_map_to_luma_extremes() {
        assert!(rgb_to_yuv(255, 255, 255).0 >= 254);
        assert_eq!(rgb_to_yuv(0, 0, 0), (0, 128, 128));
    }

    #[test]
    fn yuyv_packs_two_pixels_per_word() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        let yuyv = V4L2Output::frame_to_yuyv(PixelFormat::Rgba8, &image);
        assert_eq!(yuyv.len(), 4 * 2 * 2);
        assert_eq!(&yuyv[..4], &[0, 128, 0, 128]);
    }

    #[test]
    fn bgra_frames_convert_like_rgba() {
        let rgba = RgbaImage::from_pixel(2, 1, Rgba([200, 30, 10, 255]));
        let bgra = RgbaImage::from_pixel(2, 1, Rgba([10, 30, 200, 255]));
        assert_eq!(
            V4L2Output::frame_to_yuyv(PixelFormat::Rgba8, &rgba),
            V4L2Output::frame_to_yuyv(PixelFormat::Bgra8, &bgra)
        );
    }
}
