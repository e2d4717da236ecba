//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::env;

use anyhow::bail;
use image::RgbImage;
use linuxvideo::{
    format::{PixFormat, PixelFormat},
    stream::ReadStream,
    CapabilityFlags, Device,
};

use crate::{image::decode_jpeg, timer::Timer};

use super::FrameSource;

/// Environment variable selecting the webcam by name. Overrides the configured name.
pub const ENV_VAR_WEBCAM_NAME: &str = "PALM_ALERT_WEBCAM_NAME";

/// A local webcam yielding decoded frames.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam, or the one called `name`.
    ///
    /// `width` and `height` are a request; the driver picks the closest resolution it supports.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(name: Option<&str>, width: u32, height: u32) -> anyhow::Result<Self> {
        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &name_from_env {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
        }
        let name = name_from_env.as_deref().or(name);

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_impl(dev, name, width, height) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{}", e);
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                }
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_impl(
        dev: Device,
        name: Option<&str>,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let capture = dev.video_capture(PixFormat::new(width, height, PixelFormat::MJPG))?;
        let format = capture.format();
        match format.pixel_format() {
            PixelFormat::JPEG | PixelFormat::MJPG => {}
            other => bail!("{}: unsupported pixel format {}", caps.card(), other),
        }

        log::info!(
            "opened {} ({}), {}x{}",
            caps.card(),
            path.display(),
            format.width(),
            format.height(),
        );

        Ok(Some(Self {
            width: format.width(),
            height: format.height(),
            stream: capture.into_stream()?,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }
}

impl FrameSource for Webcam {
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
        let dequeue_guard = self.t_dequeue.start();
        let (width, height) = (self.width, self.height);
        let t_decode = &self.t_decode;
        let image = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    // Webcams occasionally deliver corrupted MJPG frames. A blank frame keeps the
                    // loop going; it simply contains no hand.
                    log::error!("webcam decode error: {}", e);
                    RgbImage::new(width, height)
                }
            };
            Ok(image)
        })?;
        Ok(Some(image))
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}
