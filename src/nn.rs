//! Hand landmark inference with an ONNX network.
//!
//! This runs MediaPipe's hand landmark network (`hand_landmark_full.onnx` or
//! `hand_landmark_lite.onnx`) on the CPU via [`tract_onnx`]. The network expects a single hand
//! roughly filling its input; the whole camera image is letterboxed into the input, so the hand
//! needs to be close to the camera (as it is with an ESP32-CAM mounted at a counter).

use std::path::Path;

use anyhow::{bail, ensure, Context};
use image::RgbImage;
use tract_onnx::prelude::{
    tract_ndarray::Array4, tvec, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan,
    TypedFact, TypedOp,
};

use crate::{
    hand::{Hand, Handedness, Landmark},
    image::letterbox,
    provider::LandmarkProvider,
    timer::Timer,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Number of values in the screen landmark output (21 landmarks with X, Y and Z each).
const LANDMARK_OUTPUT_LEN: usize = 63;

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, always 1 here.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputShape {
    /// Shape is `(N, C, H, W)`.
    Nchw,
    /// Shape is `(N, H, W, C)`.
    Nhwc,
}

impl InputShape {
    /// Determines the layout and input resolution from a concrete tensor shape.
    fn detect(shape: &[usize]) -> anyhow::Result<(Self, u32, u32)> {
        let (layout, w, h) = match *shape {
            [1, 3, h, w] => (InputShape::Nchw, w, h),
            [1, h, w, 3] => (InputShape::Nhwc, w, h),
            _ => bail!("unsupported network input shape {:?}", shape),
        };
        Ok((layout, w.try_into()?, h.try_into()?))
    }
}

/// A [`LandmarkProvider`] backed by a MediaPipe hand landmark network.
///
/// The optimized inference plan is immutable and can run concurrent inference calls.
pub struct OnnxLandmarker {
    model: Model,
    shape: InputShape,
    input_width: u32,
    input_height: u32,
    presence_threshold: f32,
    t_resize: Timer,
    t_infer: Timer,
}

impl OnnxLandmarker {
    /// Loads and optimizes the network from an ONNX file.
    ///
    /// Hands whose presence score is below `presence_threshold` are not reported.
    pub fn load(path: impl AsRef<Path>, presence_threshold: f32) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref(), presence_threshold)
    }

    fn load_impl(path: &Path, presence_threshold: f32) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => bail!("neural network file must have `.onnx` extension"),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read model '{}'", path.display()))?;
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*model_data)?
            .into_optimized()?;
        let model = graph.into_runnable()?;

        let fact = model.model().input_fact(0)?;
        let Some(shape) = fact.shape.as_concrete() else {
            bail!("network input shape is not fixed: {:?}", fact.shape);
        };
        let (shape, input_width, input_height) = InputShape::detect(shape)?;
        ensure!(
            model.model().outputs.len() >= 3,
            "expected at least 3 network outputs, got {}",
            model.model().outputs.len()
        );

        log::info!(
            "loaded hand landmark network '{}' ({}x{}, {:?})",
            path.display(),
            input_width,
            input_height,
            shape,
        );

        Ok(Self {
            model,
            shape,
            input_width,
            input_height,
            presence_threshold,
            t_resize: Timer::new("resize"),
            t_infer: Timer::new("infer"),
        })
    }

    fn estimate(&self, image: &RgbImage) -> anyhow::Result<Option<Hand>> {
        let (input, letterbox) = self
            .t_resize
            .time(|| letterbox(image, self.input_width, self.input_height));

        let (h, w) = (self.input_height as usize, self.input_width as usize);
        let channel = |x: usize, y: usize, c: usize| {
            f32::from(input.get_pixel(x as u32, y as u32)[c]) / 255.0
        };
        let tensor = match self.shape {
            InputShape::Nchw => {
                Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| channel(x, y, c))
            }
            InputShape::Nhwc => {
                Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| channel(x, y, c))
            }
        }
        .into_tensor();

        let outputs = self.t_infer.time(|| self.model.run(tvec!(tensor.into())))?;
        log::trace!("network outputs: {:?}", outputs);

        let screen_landmarks = outputs[0].to_array_view::<f32>()?;
        let presence = outputs[1].to_array_view::<f32>()?;
        let handedness = outputs[2].to_array_view::<f32>()?;
        ensure!(
            screen_landmarks.len() == LANDMARK_OUTPUT_LEN,
            "unexpected landmark output shape {:?}",
            screen_landmarks.shape()
        );
        let (Some(&presence), Some(&handedness)) = (presence.iter().next(), handedness.iter().next())
        else {
            bail!("network returned an empty presence or handedness output");
        };

        if presence < self.presence_threshold {
            log::trace!("no hand (presence={presence:.2})");
            return Ok(None);
        }

        let coords = screen_landmarks.iter().copied().collect::<Vec<f32>>();
        let landmarks = coords.chunks_exact(3).map(|xyz| {
            let (x, y) = letterbox.to_source(xyz[0], xyz[1]);
            Landmark::new(x, y).with_z(xyz[2] / self.input_width as f32)
        });

        let handedness = if handedness > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        };
        let hand = Hand::from_landmarks(landmarks)?
            .with_presence(presence)
            .with_handedness(handedness);
        Ok(Some(hand))
    }
}

impl LandmarkProvider for OnnxLandmarker {
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Hand>> {
        Ok(self.estimate(image)?.into_iter().collect())
    }

    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_resize, &self.t_infer]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_shapes() {
        assert_eq!(
            InputShape::detect(&[1, 3, 224, 224]).unwrap(),
            (InputShape::Nchw, 224, 224)
        );
        assert_eq!(
            InputShape::detect(&[1, 256, 192, 3]).unwrap(),
            (InputShape::Nhwc, 192, 256)
        );
        InputShape::detect(&[1, 224, 224]).unwrap_err();
        InputShape::detect(&[2, 3, 224, 224]).unwrap_err();
    }

    #[test]
    fn rejects_non_onnx_path() {
        let err = OnnxLandmarker::load("hand_landmarker.task", 0.5)
            .err()
            .unwrap();
        assert!(err.to_string().contains(".onnx"), "{err}");
    }

    #[test]
    fn missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.onnx");
        let err = OnnxLandmarker::load(&path, 0.5).err().unwrap();
        assert!(format!("{err:#}").contains("missing.onnx"), "{err:#}");
    }
}
