use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use camino::Utf8Path;
use color_eyre::eyre::{bail, eyre, OptionExt};
use color_eyre::Result;
use crabgrab::capturable_content::{CapturableContent, CapturableContentFilter};
use crabgrab::capture_stream::{CaptureConfig, CapturePixelFormat, CaptureStream};
use crabgrab::feature::screenshot;
use crabgrab::prelude::{BoxedSliceFrameBitmap, FrameBitmap, VideoFrameBitmap};
use image::{ImageFormat, RgbImage};
use tracing::{info, instrument};

use super::Camera;

/// Uses a display as the capture device.
pub struct ScreenCamera {
    display_index: usize,
    bound: AtomicBool,
}

impl ScreenCamera {
    pub fn new(display_index: usize) -> Self {
        Self {
            display_index,
            bound: AtomicBool::new(false),
        }
    }
}

fn to_rgb_image(bitmap: BoxedSliceFrameBitmap) -> Result<RgbImage> {
    let pixels = match bitmap {
        FrameBitmap::BgraUnorm8x4(frame) => frame,
        FrameBitmap::ArgbUnormPacked2101010(_) => bail!("10-bit frames are not supported"),
        FrameBitmap::RgbaF16x4(_) => bail!("half-float frames are not supported"),
        FrameBitmap::YCbCr(_) => bail!("YCbCr frames are not supported"),
    };

    let data: Vec<_> = pixels
        .data
        .iter()
        .copied()
        .flat_map(|[b, g, r, _]| [r, g, b])
        .collect();

    RgbImage::from_raw(pixels.width as u32, pixels.height as u32, data)
        .ok_or_eyre("unable to create image buffer")
}

#[async_trait]
impl Camera for ScreenCamera {
    #[instrument(skip(self))]
    async fn start_preview(&self) -> Result<()> {
        let content = CapturableContent::new(CapturableContentFilter::EVERYTHING_NORMAL).await?;
        let displays = content.displays().count();
        if self.display_index >= displays {
            bail!(
                "display {} not found, {} available",
                self.display_index,
                displays
            );
        }

        self.bound.store(true, Ordering::SeqCst);
        info!("bound display {} of {}", self.display_index, displays);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn capture_still(&self, destination: &Utf8Path) -> Result<()> {
        if !self.bound.load(Ordering::SeqCst) {
            bail!("camera is not bound");
        }

        let access_token =
            CaptureStream::test_access(false).ok_or_eyre("screen capture access was revoked")?;
        let content = CapturableContent::new(CapturableContentFilter::EVERYTHING_NORMAL).await?;
        let display = content
            .displays()
            .nth(self.display_index)
            .ok_or_else(|| eyre!("display {} disappeared", self.display_index))?;
        // supported by both windows and macos
        let config = CaptureConfig::with_display(display, CapturePixelFormat::Bgra8888);

        let video_frame = screenshot::take_screenshot(access_token, config).await?;
        let image = to_rgb_image(video_frame.get_bitmap()?)?;

        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || image.save_with_format(destination, ImageFormat::Jpeg))
            .await??;
        Ok(())
    }

    fn unbind_all(&self) {
        self.bound.store(false, Ordering::SeqCst);
    }
}
