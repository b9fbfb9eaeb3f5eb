//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Stage scopes with elapsed time
//!
//! # Principles
//!
//! 1. Observability is read-only: emitting never changes a run's outcome
//! 2. Sinks are injected, there is no global logger state
//! 3. Deterministic output
//!
//! # Usage
//!
//! ```ignore
//! use featuregate::observability::{JsonLinesSink, RunLogger, StageScope, Event};
//!
//! let logger = RunLogger::new(Arc::new(JsonLinesSink::stdout())).for_run(run_id);
//! logger.info(Event::RunBegin, json!({"schema_version": "v1"}));
//!
//! let scope = StageScope::begin(&logger, "validate");
//! // ... do work ...
//! scope.complete(json!({"accepted": 42}));
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{
    EventSink, JsonLinesSink, Level, MemorySink, NullSink, PipelineEvent, RunLogger,
};
pub use scope::{StageScope, Timer};
