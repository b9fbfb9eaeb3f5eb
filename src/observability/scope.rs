//! StageScope for automatic begin/complete events
//!
//! - Emits STAGE_BEGIN on creation
//! - Emits STAGE_COMPLETE with elapsed time on `complete`
//! - Emits STAGE_INCOMPLETE on drop without an outcome

use std::time::Instant;

use serde_json::{json, Value};

use super::events::Event;
use super::logger::{Level, RunLogger};

/// A scope around one pipeline stage
///
/// # Usage
///
/// ```ignore
/// let scope = StageScope::begin(&logger, "validate");
/// // ... do work ...
/// scope.complete(json!({"accepted": 10}));
/// ```
pub struct StageScope<'a> {
    logger: &'a RunLogger,
    stage: &'static str,
    timer: Timer,
    finished: bool,
}

impl<'a> StageScope<'a> {
    /// Emits `STAGE_BEGIN` immediately.
    pub fn begin(logger: &'a RunLogger, stage: &'static str) -> Self {
        logger.log(Level::Info, Event::StageBegin, Some(stage), json!({}));
        Self {
            logger,
            stage,
            timer: Timer::new(),
            finished: false,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Emits `STAGE_COMPLETE`; `elapsed_ms` is merged into the payload.
    pub fn complete(mut self, payload: Value) {
        self.finished = true;
        let payload = self.with_elapsed(payload);
        self.logger
            .log(Level::Info, Event::StageComplete, Some(self.stage), payload);
    }

    /// Emits `STAGE_SKIPPED` at WARN: the stage failed but the run goes on.
    pub fn skip(mut self, code: &str, reason: &str) {
        self.finished = true;
        let payload = self.with_elapsed(json!({"code": code, "reason": reason}));
        self.logger
            .log(Level::Warn, Event::StageSkipped, Some(self.stage), payload);
    }

    /// Emits `STAGE_FAILED` at ERROR.
    pub fn fail(mut self, code: &str, reason: &str) {
        self.finished = true;
        let payload = self.with_elapsed(json!({"code": code, "reason": reason}));
        self.logger
            .log(Level::Error, Event::StageFailed, Some(self.stage), payload);
    }

    fn with_elapsed(&self, payload: Value) -> Value {
        let mut payload = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        payload.insert("elapsed_ms".to_string(), json!(self.timer.elapsed_ms()));
        Value::Object(payload)
    }
}

impl Drop for StageScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.logger.log(
                Level::Warn,
                Event::StageIncomplete,
                Some(self.stage),
                json!({"reason": "scope dropped without completion"}),
            );
        }
    }
}

/// A simple duration timer for logging elapsed time
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use std::sync::Arc;

    fn logger() -> (Arc<MemorySink>, RunLogger) {
        let sink = Arc::new(MemorySink::new());
        let logger = RunLogger::new(sink.clone());
        (sink, logger)
    }

    #[test]
    fn test_begin_and_complete() {
        let (sink, logger) = logger();
        let scope = StageScope::begin(&logger, "validate");
        scope.complete(json!({"accepted": 3}));

        let events = sink.events();
        assert_eq!(sink.names(), vec!["STAGE_BEGIN", "STAGE_COMPLETE"]);
        assert_eq!(events[1].payload["accepted"], 3);
        assert!(events[1].payload["elapsed_ms"].is_u64());
        assert_eq!(events[1].stage.as_deref(), Some("validate"));
    }

    #[test]
    fn test_skip_is_warning() {
        let (sink, logger) = logger();
        StageScope::begin(&logger, "drift").skip("FG_NO_BASELINE", "no baseline");
        let events = sink.events();
        assert_eq!(events[1].event, Event::StageSkipped);
        assert_eq!(events[1].level, Level::Warn);
        assert_eq!(events[1].payload["code"], "FG_NO_BASELINE");
    }

    #[test]
    fn test_drop_without_outcome() {
        let (sink, logger) = logger();
        {
            let _scope = StageScope::begin(&logger, "persist");
        }
        assert_eq!(sink.names(), vec!["STAGE_BEGIN", "STAGE_INCOMPLETE"]);
    }

    #[test]
    fn test_fail_emits_once() {
        let (sink, logger) = logger();
        StageScope::begin(&logger, "ingest").fail("FG_INGESTION", "boom");
        assert_eq!(sink.count(Event::StageFailed), 1);
        assert_eq!(sink.count(Event::StageIncomplete), 0);
    }
}
