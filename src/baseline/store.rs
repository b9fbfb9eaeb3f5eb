//! Baseline store contract and in-memory implementation
//!
//! Readers receive an `Arc<Baseline>` snapshot. `put` swaps the pointer
//! under a write lock, so a reader holds either the old snapshot or the new
//! one, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::{BaselineError, BaselineResult};
use super::model::Baseline;

/// Keyed by schema version; one current baseline per version.
pub trait BaselineStore: Send + Sync {
    /// Current baseline, or `NoBaseline`.
    fn get(&self, schema_version: &str) -> BaselineResult<Arc<Baseline>>;

    /// Replaces the current baseline for `baseline.schema_version`.
    ///
    /// Once this returns, `get` on the same store returns the new baseline.
    /// A baseline with non-finite statistics is refused with `NonFinite`.
    fn put(&self, baseline: Baseline) -> BaselineResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    current: RwLock<HashMap<String, Arc<Baseline>>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn get(&self, schema_version: &str) -> BaselineResult<Arc<Baseline>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(schema_version)
            .cloned()
            .ok_or_else(|| BaselineError::NoBaseline(schema_version.to_string()))
    }

    fn put(&self, baseline: Baseline) -> BaselineResult<()> {
        baseline.ensure_finite()?;
        let key = baseline.schema_version.clone();
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(baseline));
        Ok(())
    }
}
