//! Batch statistics
//!
//! Distribution descriptors computed per batch and per field. The same
//! descriptors make up a baseline, so batch and baseline compare like for
//! like.

mod compute;
mod sketch;
mod summary;

pub use compute::{compute_batch_statistics, summarize_field, BatchStatistics};
pub use sketch::{QuantileSketch, SKETCH_POINTS};
pub use summary::{CategoricalSummary, FieldStatistic, NumericSummary};
