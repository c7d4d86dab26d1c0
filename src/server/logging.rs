// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Forwarding of local log records to the MCP caller.
//!
//! [`McpLogLayer`] sits in the `tracing` subscriber and hands every event at
//! or above the caller's chosen level to the attached [`LogSink`] as a
//! `notifications/message` record. The subscriber is installed before the
//! server exists, so the sink is attached later through [`LogControl`].
//!
//! Records are attributed to the client whose request produced them through
//! a task-local set by [`with_origin`]; the sink routes them accordingly.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::mcp::{LogMessage, McpLogLevel};

/// Events with this target are never forwarded.
pub const FORWARDING_TARGET: &str = "spl_agent::server::logging";

tokio::task_local! {
    static ORIGIN: String;
}

/// Run `fut` with every record it logs attributed to session `origin`.
pub async fn with_origin<F: Future>(origin: &str, fut: F) -> F::Output {
    ORIGIN.scope(origin.to_string(), fut).await
}

/// Session the current task is working for, if any.
pub fn current_origin() -> Option<String> {
    ORIGIN.try_with(Clone::clone).ok()
}

/// Receives forwarded log records. Must not block.
pub trait LogSink: Send + Sync {
    /// `origin` is the session whose request produced the record.
    fn forward(&self, origin: Option<&str>, record: &LogMessage);
}

type FilterReload = Box<dyn Fn(Level) -> Result<(), String> + Send + Sync>;

/// Shared switchboard between the log layer and the server.
pub struct LogControl {
    sink: RwLock<Option<Arc<dyn LogSink>>>,
    default_level: McpLogLevel,
    min_level: AtomicUsize,
    reload: RwLock<Option<FilterReload>>,
}

impl LogControl {
    pub fn new(min_level: McpLogLevel) -> Self {
        Self {
            sink: RwLock::new(None),
            default_level: min_level,
            min_level: AtomicUsize::new(level_index(min_level)),
            reload: RwLock::new(None),
        }
    }

    /// Start forwarding to `sink`, replacing any previous one.
    pub fn attach(&self, sink: Arc<dyn LogSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Stop forwarding.
    pub fn detach(&self) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.sink.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn sink(&self) -> Option<Arc<dyn LogSink>> {
        self.sink.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Level new sessions start at.
    pub fn default_level(&self) -> McpLogLevel {
        self.default_level
    }

    /// Lowest level any record is forwarded at.
    pub fn min_level(&self) -> McpLogLevel {
        McpLogLevel::ALL[self.min_level.load(Ordering::Relaxed)]
    }

    /// Whether a record at `level` would be forwarded.
    pub fn enabled(&self, level: McpLogLevel) -> bool {
        level >= self.min_level()
    }

    /// Install the hook that changes the local log filter.
    pub fn set_filter_reload(&self, reload: impl Fn(Level) -> Result<(), String> + Send + Sync + 'static) {
        *self.reload.write().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(reload));
    }

    /// Move the forwarding floor and the local filter to `level`.
    pub fn set_level(&self, level: McpLogLevel) -> Result<(), String> {
        self.min_level.store(level_index(level), Ordering::Relaxed);
        match self.reload.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(reload) => reload(level.to_tracing()),
            None => Ok(()),
        }
    }
}

impl Default for LogControl {
    fn default() -> Self {
        Self::new(McpLogLevel::Info)
    }
}

impl Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("attached", &self.is_attached())
            .field("min_level", &self.min_level())
            .finish()
    }
}

pub(crate) fn level_index(level: McpLogLevel) -> usize {
    McpLogLevel::ALL.iter().position(|l| *l == level).unwrap_or(0)
}

/// `tracing` layer that forwards events through a [`LogControl`].
pub struct McpLogLayer {
    control: Arc<LogControl>,
}

impl McpLogLayer {
    pub fn new(control: Arc<LogControl>) -> Self {
        Self { control }
    }
}

impl<S: Subscriber> Layer<S> for McpLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(FORWARDING_TARGET) {
            return;
        }
        let level = McpLogLevel::from_tracing(metadata.level());
        if !self.control.enabled(level) {
            return;
        }
        let Some(sink) = self.control.sink() else {
            return;
        };

        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        let origin = current_origin();
        sink.forward(origin.as_deref(), &LogMessage {
            level,
            logger: Some(metadata.target().to_string()),
            data: fields.into_data(),
        });
    }
}

/// Collects event fields. A lone message becomes a string, anything richer
/// an object with a `message` key.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn into_data(self) -> Value {
        if self.fields.is_empty() {
            return Value::String(self.message.unwrap_or_default());
        }
        let mut data = self.fields;
        if let Some(message) = self.message {
            data.insert("message".to_string(), Value::String(message));
        }
        Value::Object(data)
    }

    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Default)]
    struct Captured(Mutex<Vec<LogMessage>>, Mutex<Vec<Option<String>>>);

    impl LogSink for Captured {
        fn forward(&self, origin: Option<&str>, record: &LogMessage) {
            self.0.lock().unwrap().push(record.clone());
            self.1.lock().unwrap().push(origin.map(str::to_string));
        }
    }

    fn capture(control: &Arc<LogControl>, f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(McpLogLayer::new(control.clone()));
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_forwards_above_min_level() {
        let control = Arc::new(LogControl::new(McpLogLevel::Info));
        let sink = Arc::new(Captured::default());
        control.attach(sink.clone());

        capture(&control, || {
            tracing::debug!("hidden");
            tracing::info!("shown");
            tracing::warn!(server = "time", attempts = 2u64, "careful");
        });

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, McpLogLevel::Info);
        assert_eq!(records[0].data, Value::String("shown".to_string()));
        assert_eq!(records[1].level, McpLogLevel::Warning);
        assert_eq!(records[1].data["message"], "careful");
        assert_eq!(records[1].data["server"], "time");
        assert_eq!(records[1].data["attempts"], 2);
    }

    #[test]
    fn test_nothing_forwarded_without_sink() {
        let control = Arc::new(LogControl::default());
        let sink = Arc::new(Captured::default());

        capture(&control, || tracing::error!("before attach"));
        control.attach(sink.clone());
        capture(&control, || tracing::error!("after attach"));
        control.detach();
        capture(&control, || tracing::error!("after detach"));

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, "after attach");
    }

    #[test]
    fn test_forwarding_target_is_skipped() {
        let control = Arc::new(LogControl::new(McpLogLevel::Debug));
        let sink = Arc::new(Captured::default());
        control.attach(sink.clone());

        capture(&control, || tracing::warn!(target: FORWARDING_TARGET, "dropped record"));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_carry_their_origin() {
        let control = Arc::new(LogControl::new(McpLogLevel::Info));
        let sink = Arc::new(Captured::default());
        control.attach(sink.clone());

        let subscriber = tracing_subscriber::registry().with(McpLogLayer::new(control.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);
        with_origin("client-a", async {
            tracing::info!("inside a request");
            tokio::task::yield_now().await;
            tracing::info!("after a suspension");
        })
        .await;
        tracing::info!("outside any request");

        let origins = sink.1.lock().unwrap();
        assert_eq!(
            *origins,
            vec![Some("client-a".to_string()), Some("client-a".to_string()), None]
        );
        assert_eq!(current_origin(), None);
    }

    #[test]
    fn test_set_level_updates_threshold_and_filter() {
        let control = LogControl::new(McpLogLevel::Info);
        let applied = Arc::new(Mutex::new(None));
        let seen = applied.clone();
        control.set_filter_reload(move |level| {
            *seen.lock().unwrap() = Some(level);
            Ok(())
        });

        control.set_level(McpLogLevel::Warning).unwrap();
        assert_eq!(control.min_level(), McpLogLevel::Warning);
        assert!(!control.enabled(McpLogLevel::Info));
        assert!(control.enabled(McpLogLevel::Critical));
        assert_eq!(control.default_level(), McpLogLevel::Info);
        assert_eq!(*applied.lock().unwrap(), Some(Level::WARN));
    }
}
