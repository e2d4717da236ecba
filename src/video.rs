//! Frame sources for the live loop.

pub mod httpcam;
pub mod webcam;

use image::RgbImage;

use crate::{
    config::{LiveConfig, LiveSource},
    timer::Timer,
};

pub use httpcam::HttpStream;
pub use webcam::Webcam;

/// A stream of camera frames.
pub trait FrameSource {
    /// Blocks until the next frame is available.
    ///
    /// Returns `Ok(None)` at the end of the stream. Errors are not recoverable; the caller should
    /// stop reading.
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>>;

    /// Returns profiling timers of this source.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// Opens the frame source selected by `config`.
pub fn open(config: &LiveConfig) -> anyhow::Result<Box<dyn FrameSource>> {
    match &config.source {
        LiveSource::Webcam => {
            let webcam = Webcam::open(config.webcam_name.as_deref(), config.width, config.height)?;
            Ok(Box::new(webcam))
        }
        LiveSource::Http { host, port, path } => {
            Ok(Box::new(HttpStream::connect(host, *port, path)?))
        }
    }
}
