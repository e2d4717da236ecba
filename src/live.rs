//! The live camera loop.

use anyhow::Context;
use image::RgbImage;

use crate::{
    hand::openness::OPEN_THRESHOLD, image::draw_hand, pipeline::Pipeline, timer::FpsCounter,
    video::FrameSource,
};

/// Title of the preview window.
pub const WINDOW_TITLE: &str = "Hand Detection";

/// Returned by a [`Display`] to tell the loop whether to keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Presents annotated frames to the user.
pub trait Display {
    /// Shows `image`. Returns [`Control::Stop`] once the user asked to quit.
    fn show(&mut self, image: &RgbImage) -> anyhow::Result<Control>;
}

/// A [`Display`] that shows nothing and never asks to stop.
#[derive(Debug, Default)]
pub struct Headless;

impl Display for Headless {
    fn show(&mut self, _: &RgbImage) -> anyhow::Result<Control> {
        Ok(Control::Continue)
    }
}

/// Frame counts collected by [`run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub frames: u64,
    pub hands: u64,
    pub open: u64,
}

/// Runs the live loop until the display asks to stop or the source ends.
///
/// Every frame with a hand gets its landmarks drawn. Open hands are logged as warnings and, if
/// `publish_alerts` is set, published as alerts. A failed frame read ends the loop with the error.
pub fn run(
    source: &mut dyn FrameSource,
    pipeline: &Pipeline,
    display: &mut dyn Display,
    publish_alerts: bool,
) -> anyhow::Result<Stats> {
    let mut stats = Stats::default();
    let mut fps = FpsCounter::new("live");

    loop {
        let Some(mut image) = source.read().context("failed to read frame")? else {
            log::info!("end of stream after {} frames", stats.frames);
            break;
        };
        stats.frames += 1;

        let analysis = pipeline.analyze(&image)?;
        if let (Some(hand), Some(openness)) = (&analysis.hand, analysis.openness) {
            stats.hands += 1;
            let label = if openness.is_open() {
                stats.open += 1;
                log::warn!("WARNING: open palm detected");
                if publish_alerts {
                    pipeline.alert();
                }
                "OPEN".to_string()
            } else {
                format!("{}/{}", openness.count(), OPEN_THRESHOLD)
            };
            draw_hand(&mut image, hand, Some(label.as_str()));
        }

        if display.show(&image)? == Control::Stop {
            log::info!("stopped by user after {} frames", stats.frames);
            break;
        }

        fps.tick_with(source.timers().into_iter().chain(pipeline.timers()));
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Arc, sync::Mutex};

    use anyhow::bail;
    use image::Rgb;

    use super::*;
    use crate::{
        alert::{Alert, AlertSink},
        hand::{Hand, Landmark, LandmarkIdx},
        provider::LandmarkProvider,
    };

    /// Yields the queued frames, then ends the stream (or fails, if `fail_at_end` is set).
    struct Frames {
        frames: VecDeque<RgbImage>,
        fail_at_end: bool,
    }

    impl Frames {
        fn new(n: usize) -> Self {
            Self {
                frames: (0..n).map(|_| RgbImage::new(64, 64)).collect(),
                fail_at_end: false,
            }
        }
    }

    impl FrameSource for Frames {
        fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None if self.fail_at_end => bail!("camera unplugged"),
                None => Ok(None),
            }
        }
    }

    /// Reports an open hand on every other call, starting with the first.
    #[derive(Default)]
    struct Alternating(Mutex<u32>);

    impl LandmarkProvider for Alternating {
        fn detect(&self, _: &RgbImage) -> anyhow::Result<Vec<Hand>> {
            let mut calls = self.0.lock().unwrap();
            *calls += 1;
            let mut hand = Hand::from_landmarks([Landmark::new(0.5, 0.6); 21]).unwrap();
            if *calls % 2 == 1 {
                for tip in [
                    LandmarkIdx::IndexFingerTip,
                    LandmarkIdx::MiddleFingerTip,
                    LandmarkIdx::RingFingerTip,
                    LandmarkIdx::PinkyTip,
                ] {
                    hand.landmark_mut(tip).y = 0.2;
                }
            }
            Ok(vec![hand])
        }
    }

    #[derive(Default)]
    struct Count(Mutex<usize>);

    impl AlertSink for Count {
        fn publish(&self, _: &Alert) {
            *self.0.lock().unwrap() += 1;
        }
    }

    /// Records shown frames and stops after `stop_after` of them.
    struct Recorder {
        shown: Vec<RgbImage>,
        stop_after: usize,
    }

    impl Display for Recorder {
        fn show(&mut self, image: &RgbImage) -> anyhow::Result<Control> {
            self.shown.push(image.clone());
            if self.shown.len() >= self.stop_after {
                Ok(Control::Stop)
            } else {
                Ok(Control::Continue)
            }
        }
    }

    fn pipeline() -> (Pipeline, Arc<Count>) {
        let sink = Arc::new(Count::default());
        let pipeline = Pipeline::new(Arc::new(Alternating::default()), sink.clone());
        (pipeline, sink)
    }

    #[test]
    fn runs_until_end_of_stream() {
        let (pipeline, sink) = pipeline();
        let stats = run(&mut Frames::new(5), &pipeline, &mut Headless, true).unwrap();
        assert_eq!(
            stats,
            Stats {
                frames: 5,
                hands: 5,
                open: 3,
            }
        );
        assert_eq!(*sink.0.lock().unwrap(), 3);
    }

    #[test]
    fn alerts_are_only_logged_by_default() {
        let (pipeline, sink) = pipeline();
        let stats = run(&mut Frames::new(2), &pipeline, &mut Headless, false).unwrap();
        assert_eq!(stats.open, 1);
        assert_eq!(*sink.0.lock().unwrap(), 0);
    }

    #[test]
    fn display_can_stop_the_loop() {
        let (pipeline, _) = pipeline();
        let mut display = Recorder {
            shown: Vec::new(),
            stop_after: 2,
        };
        let stats = run(&mut Frames::new(10), &pipeline, &mut display, false).unwrap();
        assert_eq!(stats.frames, 2);

        // Landmarks are drawn onto the displayed frames.
        let center = display.shown[0].get_pixel(32, 38);
        assert_eq!(center, &Rgb([0, 255, 0]));
    }

    #[test]
    fn read_errors_end_the_loop() {
        let (pipeline, _) = pipeline();
        let mut frames = Frames::new(1);
        frames.fail_at_end = true;
        let err = run(&mut frames, &pipeline, &mut Headless, false).unwrap_err();
        assert!(format!("{err:#}").contains("camera unplugged"), "{err:#}");
    }
}
