//! The hand landmark detection boundary.

use image::RgbImage;

use crate::{hand::Hand, timer::Timer};

/// Detects hands and their landmarks in an image.
///
/// Implementations are shared between concurrent requests, so `detect` takes `&self`. Providers
/// whose inference backend cannot run concurrently have to serialize calls internally.
pub trait LandmarkProvider: Send + Sync {
    /// Returns all hands detected in `image`, most confident first.
    ///
    /// An image without hands yields an empty list, not an error.
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Hand>>;

    /// Returns profiling timers of the detection stages.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<P: LandmarkProvider + ?Sized> LandmarkProvider for Box<P> {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        (**self).detect(image)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

impl<P: LandmarkProvider + ?Sized> LandmarkProvider for std::sync::Arc<P> {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        (**self).detect(image)
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}
