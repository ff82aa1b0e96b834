//! Progress notifications for whatever dashboard watches a run.
//!
//! Sinks are fire-and-forget. [`Progress`] wraps a sink and swallows panics so
//! a misbehaving dashboard can never take the pipeline down with it.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressKind {
    Manifest,
    Sets,
    Cards,
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressKind::Manifest => "manifest",
            ProgressKind::Sets => "sets",
            ProgressKind::Cards => "cards",
        };
        f.write_str(s)
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, kind: ProgressKind, current: usize, total: usize, action: &str, item: &str);
    fn on_set_completed(&self, name: &str);
    fn on_completed(&self, message: &str);
}

/// Writes progress to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn on_progress(&self, kind: ProgressKind, current: usize, total: usize, action: &str, item: &str) {
        let percent = if total == 0 {
            100.0
        } else {
            current as f64 * 100.0 / total as f64
        };
        log::info!(
            "📊 {} {}/{} ({:.1}%) {} {}",
            kind,
            current,
            total,
            percent,
            action,
            item
        );
    }

    fn on_set_completed(&self, name: &str) {
        log::debug!("set completed: {}", name);
    }

    fn on_completed(&self, message: &str) {
        log::info!("🏁 {}", message);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _: ProgressKind, _: usize, _: usize, _: &str, _: &str) {}
    fn on_set_completed(&self, _: &str) {}
    fn on_completed(&self, _: &str) {}
}

/// Panic-isolating handle to a sink, cheap to clone into workers.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<dyn ProgressSink>,
}

impl Progress {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopProgressSink))
    }

    pub fn progress(&self, kind: ProgressKind, current: usize, total: usize, action: &str, item: &str) {
        self.guard("on_progress", || {
            self.sink.on_progress(kind, current, total, action, item)
        });
    }

    pub fn set_completed(&self, name: &str) {
        self.guard("on_set_completed", || self.sink.on_set_completed(name));
    }

    pub fn completed(&self, message: &str) {
        self.guard("on_completed", || self.sink.on_completed(message));
    }

    fn guard(&self, call: &str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            log::warn!("progress sink panicked in {}; ignoring", call);
        }
    }
}
