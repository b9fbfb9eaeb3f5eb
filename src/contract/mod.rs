//! Schema registry subsystem
//!
//! Contracts are versioned, immutable field declarations that every incoming
//! batch is validated against.
//!
//! # Design Principles
//!
//! - Explicit version binding: callers pin a `schema_version`
//! - Immutable once published; changes produce a new version
//! - Closed field-type variants so rule dispatch is exhaustive

mod errors;
mod registry;
mod types;

pub use errors::{ContractError, ContractResult};
pub use registry::{load_contract_file, SchemaRegistry};
pub use types::{Contract, FieldSpec, FieldType, NumericRange};
