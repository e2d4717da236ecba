//! Open palm detection with MQTT warnings.
//!
//! A hand is considered *open* when all four non-thumb fingers point upwards in the image, that
//! is, when each fingertip lies above the finger's middle knuckle. Hand landmarks are provided by
//! a pre-trained network behind the [`provider::LandmarkProvider`] trait; the decision itself is
//! made by [`hand::openness`].
//!
//! The crate is used in two ways:
//!
//! * [`server`] exposes a single HTTP endpoint that receives one still image per request (sent by
//!   an ESP32-CAM, for example) and publishes an [`alert::Alert`] when the depicted hand is open.
//! * [`live`] runs detection on a continuous camera feed and shows the annotated frames in a
//!   window.
//!
//! # Coordinates
//!
//! Landmark coordinates are normalized to the image size: `(0, 0)` is the top left corner,
//! `(1, 1)` the bottom right one. Y points *down*, so a smaller Y value is higher up in the image.
//!
//! # Environment Variables
//!
//! * `PALM_ALERT_WEBCAM_NAME`: Forces the webcam device to use in the live loop, taking precedence
//!   over the configuration file. If unset, the first device that yields JPEG frames is used.
//! * `RUST_LOG`: Overrides the default log filter (see [`init_logger!`]).

use log::LevelFilter;

pub mod alert;
pub mod config;
pub mod gui;
pub mod hand;
pub mod image;
pub mod live;
pub mod nn;
pub mod pipeline;
pub mod provider;
pub mod server;
pub mod timer;
pub mod video;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .filter(Some("naga"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level. Everything else logs at *info* level, except
/// for `wgpu`, which will always log at *warn* level.
///
/// `RUST_LOG` is parsed after the defaults are applied, so it can override any of them.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
