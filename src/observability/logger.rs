//! Structured JSON event sinks
//!
//! - One line = one event
//! - Deterministic key ordering
//! - Explicit severity levels
//! - Synchronous, no buffering
//!
//! Sinks are injected into the orchestrator; there is no global logger.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::events::Event;

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Debug-level detail
    Trace = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
    /// Unrecoverable, the run stops
    Fatal = 4,
}

impl Level {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One structured event.
///
/// Field order here is the key order on the wire; `payload` is a JSON
/// object whose keys serialize sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineEvent {
    pub event: Event,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(serialize_with = "serialize_ts")]
    pub ts: DateTime<Utc>,
    pub payload: serde_json::Value,
}

fn serialize_ts<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl PipelineEvent {
    pub fn new(level: Level, event: Event) -> Self {
        Self {
            event,
            level,
            run_id: None,
            stage: None,
            ts: Utc::now(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Serializes to one JSON line, without the trailing newline.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"event\":\"{}\",\"level\":\"ERROR\",\"payload\":{{\"serialize_error\":{:?}}}}}",
                self.event,
                e.to_string()
            )
        })
    }
}

/// Destination for pipeline events.
///
/// Emitting never fails the caller; sinks swallow their own I/O errors.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

/// Writes one JSON object per line.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
    min_level: Level,
}

impl JsonLinesSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            min_level: Level::Trace,
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// Drops events below `level`.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &PipelineEvent) {
        if event.level < self.min_level {
            return;
        }
        let mut line = event.to_json_line();
        line.push('\n');

        // Write atomically (one syscall)
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

impl fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("min_level", &self.min_level)
            .finish()
    }
}

/// Keeps events in memory for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Event names in emission order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.event.as_str())
            .collect()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event == event)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Emits events tagged with one run's id.
#[derive(Clone)]
pub struct RunLogger {
    sink: Arc<dyn EventSink>,
    run_id: Option<Uuid>,
}

impl RunLogger {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink, run_id: None }
    }

    pub fn for_run(&self, run_id: Uuid) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            run_id: Some(run_id),
        }
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn log(
        &self,
        level: Level,
        event: Event,
        stage: Option<&str>,
        payload: serde_json::Value,
    ) {
        let mut e = PipelineEvent::new(level, event).with_payload(payload);
        e.run_id = self.run_id;
        e.stage = stage.map(str::to_string);
        self.sink.emit(&e);
    }

    pub fn info(&self, event: Event, payload: serde_json::Value) {
        self.log(Level::Info, event, None, payload);
    }

    pub fn warn(&self, event: Event, payload: serde_json::Value) {
        self.log(Level::Warn, event, None, payload);
    }

    pub fn error(&self, event: Event, payload: serde_json::Value) {
        self.log(Level::Error, event, None, payload);
    }
}

impl fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLogger")
            .field("run_id", &self.run_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Writer that appends into a shared buffer
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_json_line_format() {
        let buf = SharedBuf::default();
        let sink = JsonLinesSink::new(buf.clone());
        let run_id = Uuid::new_v4();
        sink.emit(
            &PipelineEvent::new(Level::Warn, Event::DriftSkipped)
                .with_run(run_id)
                .with_stage("drift")
                .with_payload(json!({"zeta": 1, "alpha": "x"})),
        );

        let out = buf.contents();
        assert!(out.ends_with('\n'));
        assert_eq!(out.lines().count(), 1);

        let parsed: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(parsed["event"], "DRIFT_SKIPPED");
        assert_eq!(parsed["level"], "WARN");
        assert_eq!(parsed["stage"], "drift");
        assert_eq!(parsed["run_id"], run_id.to_string());

        // Deterministic key order
        let event_at = out.find("\"event\"").unwrap();
        let level_at = out.find("\"level\"").unwrap();
        assert!(event_at < level_at);
        assert!(out.find("\"alpha\"").unwrap() < out.find("\"zeta\"").unwrap());
    }

    #[test]
    fn test_min_level_filters() {
        let buf = SharedBuf::default();
        let sink = JsonLinesSink::new(buf.clone()).with_min_level(Level::Warn);
        sink.emit(&PipelineEvent::new(Level::Info, Event::StageBegin));
        sink.emit(&PipelineEvent::new(Level::Error, Event::StageFailed));
        assert_eq!(buf.contents().lines().count(), 1);
    }

    #[test]
    fn test_run_logger_tags_events() {
        let sink = Arc::new(MemorySink::new());
        let run_id = Uuid::new_v4();
        let logger = RunLogger::new(sink.clone()).for_run(run_id);
        logger.info(Event::RunBegin, json!({}));
        logger.log(Level::Warn, Event::StageSkipped, Some("drift"), json!({}));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.run_id == Some(run_id)));
        assert_eq!(events[1].stage.as_deref(), Some("drift"));
        assert_eq!(sink.names(), vec!["RUN_BEGIN", "STAGE_SKIPPED"]);
    }
}
