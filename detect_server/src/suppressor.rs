//! Non-maximum suppression of overlapping candidates.
//!
use common::Result;

use crate::{
    bbox::{iou, Candidate, Detection},
    labels::ClassTable,
};

/// Only candidates above this confidence take part in suppression.
pub const SCORE_THRESHOLD: f32 = 0.5;

/// Candidates overlapping a kept box by more than this IoU are suppressed.
pub const IOU_THRESHOLD: f32 = 0.4;

/// Class-agnostic greedy non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suppressor {
    pub score_threshold: f32,
    pub iou_threshold: f32,
}

impl Default for Suppressor {
    fn default() -> Self {
        Self {
            score_threshold: SCORE_THRESHOLD,
            iou_threshold: IOU_THRESHOLD,
        }
    }
}

impl Suppressor {
    /// Suppress duplicate candidates and resolve the labels of the kept ones.
    ///
    /// Detections are returned in order of falling confidence.
    pub fn suppress(
        &self,
        candidates: impl IntoIterator<Item = Candidate>,
        classes: &ClassTable,
    ) -> Result<Vec<Detection>> {
        non_maximum_suppression(candidates, self.score_threshold, self.iou_threshold)
            .into_iter()
            .map(|candidate| classes.resolve(candidate))
            .collect()
    }
}

/// Run non-maximum-suppression on candidate bounding boxes.
///
/// Candidates not exceeding `score_threshold` are discarded. The rest is visited in the order
/// of falling confidence, candidates with equal confidence in their input order. A candidate
/// is selected unless its IoU with an already selected box exceeds `max_iou`, so an IoU of
/// exactly `max_iou` still keeps both boxes.
pub fn non_maximum_suppression(
    candidates: impl IntoIterator<Item = Candidate>,
    score_threshold: f32,
    max_iou: f32,
) -> Vec<Candidate> {
    let mut sorted: Vec<Candidate> = candidates
        .into_iter()
        .filter(|candidate| candidate.confidence > score_threshold)
        .collect();
    // Stable sort, equal confidences keep their input order
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut selected: Vec<Candidate> = Vec::with_capacity(sorted.len());
    'candidates: for candidate in sorted {
        for kept in selected.iter() {
            if iou(&candidate.bbox, &kept.bbox) > max_iou {
                continue 'candidates;
            }
        }

        selected.push(candidate);
    }

    selected
}
