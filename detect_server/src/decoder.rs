//! Conversion of raw network output into pixel-space candidates.
//!
use ndarray::ArrayView1;

use crate::{
    bbox::{BBox, Candidate},
    nn::{RawOutput, CLASS_SCORES_OFFSET},
};

/// Candidates scoring at or below this confidence are dropped.
pub const CONFIDENCE_THRESHOLD: f32 = 0.25;

/// Decode all candidate rows of a forward pass for a frame of the given size.
///
/// The confidence of a row is its highest class score and the class is the index of that
/// score, the first one on ties. The iterator is lazy and yields candidates in output order.
pub fn decode(
    raw: &RawOutput,
    frame_width: u32,
    frame_height: u32,
) -> impl Iterator<Item = Candidate> + '_ {
    let (width, height) = (frame_width as f32, frame_height as f32);

    raw.layers()
        .iter()
        .flat_map(|layer| layer.rows())
        .filter_map(move |row| decode_row(row, width, height))
}

fn decode_row(row: ArrayView1<f32>, width: f32, height: f32) -> Option<Candidate> {
    let (class_id, confidence) = row
        .iter()
        .skip(CLASS_SCORES_OFFSET)
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &score)| match best {
            Some((_, best_score)) if score <= best_score => best,
            _ => Some((idx, score)),
        })?;

    if confidence <= CONFIDENCE_THRESHOLD {
        return None;
    }

    // Box center and extent are fractions of the frame size
    let center_x = (row[0] * width) as i32;
    let center_y = (row[1] * height) as i32;
    let box_width = (row[2] * width) as i32;
    let box_height = (row[3] * height) as i32;
    let x = (center_x as f32 - box_width as f32 / 2.0) as i32;
    let y = (center_y as f32 - box_height as f32 / 2.0) as i32;

    Some(Candidate {
        bbox: BBox::new(x, y, box_width, box_height),
        confidence,
        class_id,
    })
}
