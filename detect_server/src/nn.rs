//! Object detection network.
//!
//! The network is a YOLOv3 exported to ONNX with a decoded head: every output layer holds
//! one row per candidate, `[center_x, center_y, width, height, objectness, class scores...]`,
//! with the box given as fractions of the input size.
//!
//! The class scores must already be multiplied by the objectness, as the Darknet region
//! layer emits them. Detection reads only the class scores and ignores the objectness
//! column, so an export with raw class probabilities reports far too many objects.
use std::path::Path;

use common::{PipelineError, Result};
use image::RgbImage;
use ndarray::Array2;
use tract_onnx::prelude::*;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Side length of the square network input.
pub const INPUT_SIZE: u32 = 416;

/// Index of the first class score in an output row.
pub const CLASS_SCORES_OFFSET: usize = 5;

pub trait InferModel: Send + Sync {
    /// Run one forward pass on a frame.
    fn infer(&self, frame: &RgbImage) -> Result<RawOutput>;
}

/// Output of one forward pass, one candidate matrix per output layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    layers: Vec<Array2<f32>>,
}

impl RawOutput {
    /// Wrap output layers, rejecting layers too narrow to hold a box and a class score.
    pub fn new(layers: Vec<Array2<f32>>) -> Result<Self> {
        if let Some(layer) = layers
            .iter()
            .find(|layer| layer.ncols() <= CLASS_SCORES_OFFSET)
        {
            return Err(PipelineError::InferenceError(format!(
                "output layer has {} columns, expected at least {}",
                layer.ncols(),
                CLASS_SCORES_OFFSET + 1
            )));
        }

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Array2<f32>] {
        &self.layers
    }
}

pub struct YoloModel {
    model: NnModel,
}

impl YoloModel {
    /// Load and optimize the network from an `.onnx` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
        );

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, input_fact))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|err| PipelineError::artifact(path, format!("{err:#}")))?;

        log::info!("Loaded detection network from {}", path.display());
        Ok(Self { model })
    }
}

impl InferModel for YoloModel {
    fn infer(&self, frame: &RgbImage) -> Result<RawOutput> {
        let input = preproc(frame, INPUT_SIZE)?;
        let raw_nn_out = self
            .model
            .run(tvec!(input.into()))
            .map_err(PipelineError::inference)?;

        let layers = raw_nn_out
            .iter()
            .map(|output| as_candidate_rows(output))
            .collect::<Result<Vec<_>>>()?;

        RawOutput::new(layers)
    }
}

/// Build the network input tensor from a frame.
///
/// The frame is resized to `size`x`size` and scaled to `[0, 1]`, laid out as NCHW with the
/// channels in R, G, B order. No mean is subtracted.
pub fn preproc(frame: &RgbImage, size: u32) -> Result<Tensor> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(PipelineError::InferenceError(format!(
            "cannot run on an empty {}x{} frame",
            frame.width(),
            frame.height()
        )));
    }

    let resized: RgbImage =
        image::imageops::resize(frame, size, size, image::imageops::FilterType::Triangle);

    let tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
        (1, 3, size as usize, size as usize),
        |(_, c, y, x)| resized[(x as _, y as _)][c] as f32 / 255.0,
    )
    .into();

    Ok(tensor)
}

/// Flatten an output tensor of shape `[..., rows, cols]` into a candidate matrix.
fn as_candidate_rows(output: &Tensor) -> Result<Array2<f32>> {
    let view = output
        .to_array_view::<f32>()
        .map_err(PipelineError::inference)?;

    let cols = match view.shape().last() {
        Some(&cols) if cols > 0 => cols,
        _ => {
            return Err(PipelineError::InferenceError(format!(
                "unexpected output shape {:?}",
                view.shape()
            )))
        }
    };
    let rows = view.len() / cols;

    Array2::from_shape_vec((rows, cols), view.iter().cloned().collect())
        .map_err(PipelineError::inference)
}
