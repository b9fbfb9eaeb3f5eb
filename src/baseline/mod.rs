//! Baseline store
//!
//! Reference statistics per schema version, replaced atomically by
//! recalibration. The drift monitor reads a snapshot; it never mutates one.

mod errors;
mod file;
mod model;
mod store;

pub use errors::{BaselineError, BaselineResult};
pub use file::FileBaselineStore;
pub use model::Baseline;
pub use store::{BaselineStore, MemoryBaselineStore};
