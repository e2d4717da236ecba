//! The per-frame detection pipeline shared by the HTTP server and the live loop.

use std::{f32::consts::FRAC_PI_4, sync::Arc};

use image::{ImageError, RgbImage};
use serde::Serialize;
use thiserror::Error;

use crate::{
    alert::{self, Alert, AlertSink},
    hand::{Hand, Openness},
    provider::LandmarkProvider,
    timer::Timer,
};

/// Response message when an open hand was found and the alert was sent, unless configured
/// otherwise.
pub const OPEN_PALM: &str = "Open palm detected, warning sent";

/// Response message when no open hand was found.
pub const NO_OPEN_PALM: &str = "No open palm detected";

/// Response message for request bodies that are not a decodable image.
pub const INVALID_IMAGE: &str = "Invalid image";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid image: {0}")]
    InvalidImage(#[source] ImageError),
    #[error("hand detection failed: {0:#}")]
    Detection(anyhow::Error),
}

/// Outcome of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub warning: bool,
    pub message: String,
}

/// Result of analyzing one frame.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The first detected hand, if any. Further hands are ignored.
    pub hand: Option<Hand>,
    pub openness: Option<Openness>,
}

impl Analysis {
    pub fn is_open(&self) -> bool {
        self.openness.map_or(false, |o| o.is_open())
    }
}

/// Runs landmark detection and the openness rule, and raises alerts.
///
/// Holds no per-frame state, so one pipeline can serve any number of concurrent requests.
pub struct Pipeline {
    provider: Arc<dyn LandmarkProvider>,
    sink: Arc<dyn AlertSink>,
    alert_message: String,
    response_message: String,
    t_decode: Timer,
    t_detect: Timer,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn LandmarkProvider>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            provider,
            sink,
            alert_message: alert::DEFAULT_MESSAGE.to_string(),
            response_message: OPEN_PALM.to_string(),
            t_decode: Timer::new("decode"),
            t_detect: Timer::new("detect"),
        }
    }

    /// Sets the message carried by published alerts.
    pub fn with_alert_message(mut self, message: impl Into<String>) -> Self {
        self.alert_message = message.into();
        self
    }

    /// Sets the response message returned by [`Pipeline::handle_upload`] for open hands.
    pub fn with_response_message(mut self, message: impl Into<String>) -> Self {
        self.response_message = message.into();
        self
    }

    /// Detects hands in `image` and classifies the first one.
    pub fn analyze(&self, image: &RgbImage) -> anyhow::Result<Analysis> {
        let hands = self.t_detect.time(|| self.provider.detect(image))?;
        if hands.len() > 1 {
            log::trace!("{} hands detected, using the first", hands.len());
        }

        let Some(hand) = hands.into_iter().next() else {
            log::trace!("no hand detected");
            return Ok(Analysis {
                hand: None,
                openness: None,
            });
        };

        let openness = Openness::of(&hand);
        log::debug!(
            "hand (presence={:.2}, {:?}): {}",
            hand.presence(),
            hand.handedness(),
            openness,
        );
        let rotation = hand.rotation_radians();
        if rotation.abs() > FRAC_PI_4 {
            log::debug!(
                "hand is tilted by {:.0} degrees, openness verdict may be unreliable",
                rotation.to_degrees(),
            );
        }

        Ok(Analysis {
            hand: Some(hand),
            openness: Some(openness),
        })
    }

    /// Publishes a `HAND_OPEN` alert without waiting for delivery.
    pub fn alert(&self) {
        self.sink.publish(&Alert::hand_open(&self.alert_message));
    }

    /// Decodes an uploaded image, analyzes it, and publishes an alert if the hand is open.
    ///
    /// No alert is published for undecodable images or images without an open hand.
    pub fn handle_upload(&self, data: &[u8]) -> Result<Verdict, PipelineError> {
        let image = self
            .t_decode
            .time(|| crate::image::decode(data))
            .map_err(PipelineError::InvalidImage)?;
        let analysis = self.analyze(&image).map_err(PipelineError::Detection)?;

        if analysis.is_open() {
            self.alert();
            Ok(Verdict {
                warning: true,
                message: self.response_message.clone(),
            })
        } else {
            Ok(Verdict {
                warning: false,
                message: NO_OPEN_PALM.to_string(),
            })
        }
    }

    /// Returns profiling timers for decoding and detection, followed by the provider's own.
    pub fn timers(&self) -> Vec<&Timer> {
        let mut timers = vec![&self.t_decode, &self.t_detect];
        timers.extend(self.provider.timers());
        timers
    }
}
