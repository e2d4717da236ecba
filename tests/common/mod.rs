#![allow(dead_code)]

use std::{
    io::Cursor,
    sync::{Arc, Mutex},
};

use anyhow::bail;
use image::{ImageFormat, Rgb, RgbImage};
use palm_alert::{
    alert::{Alert, AlertSink},
    hand::{Hand, Landmark, LandmarkIdx},
    pipeline::Pipeline,
    provider::LandmarkProvider,
};

pub const ALERT_MESSAGE: &str = "WARNING: customer requests help";
pub const RESPONSE_MESSAGE: &str = "Open palm detected, warning sent";

/// Reports the same hands for every image.
pub struct FixedHands(pub Vec<Hand>);

impl LandmarkProvider for FixedHands {
    fn detect(&self, _: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        Ok(self.0.clone())
    }
}

/// Fails every detection.
pub struct FailingProvider;

impl LandmarkProvider for FailingProvider {
    fn detect(&self, _: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        bail!("inference backend unavailable")
    }
}

/// Remembers every published alert.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<Alert>>);

impl RecordingSink {
    pub fn alerts(&self) -> Vec<Alert> {
        self.0.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingSink {
    fn publish(&self, alert: &Alert) {
        self.0.lock().unwrap().push(alert.clone());
    }
}

/// A hand whose four fingers are extended (or curled, if `open` is `false`).
pub fn hand(open: bool) -> Hand {
    let mut hand = Hand::from_landmarks((0..21).map(|i| Landmark::new(0.5, 0.9 - i as f32 * 0.01)))
        .unwrap();
    for (tip, pip) in [
        (LandmarkIdx::IndexFingerTip, LandmarkIdx::IndexFingerPip),
        (LandmarkIdx::MiddleFingerTip, LandmarkIdx::MiddleFingerPip),
        (LandmarkIdx::RingFingerTip, LandmarkIdx::RingFingerPip),
        (LandmarkIdx::PinkyTip, LandmarkIdx::PinkyPip),
    ] {
        let (tip_y, pip_y) = if open { (0.2, 0.4) } else { (0.6, 0.4) };
        hand.landmark_mut(tip).y = tip_y;
        hand.landmark_mut(pip).y = pip_y;
    }
    hand
}

pub fn pipeline(provider: impl LandmarkProvider + 'static) -> (Arc<Pipeline>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = Pipeline::new(Arc::new(provider), sink.clone())
        .with_alert_message(ALERT_MESSAGE)
        .with_response_message(RESPONSE_MESSAGE);
    (Arc::new(pipeline), sink)
}

/// A small JPEG, as an ESP32-CAM would send it.
pub fn jpeg() -> Vec<u8> {
    let image = RgbImage::from_pixel(32, 24, Rgb([180, 140, 120]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}
