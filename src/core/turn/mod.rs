//! Turn segmentation: folds normalized recognizer events into complete caller turns.

mod segmenter;

pub use segmenter::{Turn, TurnBoundary, TurnSegmenter, ends_sentence};
