//! Events emitted by a run
//!
//! The orchestrator reports everything through an unbounded channel so the consumer
//! (CLI, GUI, test) never blocks the loop. Log events are mirrored to `tracing`.

use crate::engine::{FetchResult, RobotsWarning};
use crate::output::RunSummary;
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Something the consumer of a run may want to render
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    /// A kept result, in visit order
    Result(FetchResult),
    Progress {
        current: usize,
        total: usize,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    RobotsWarning(RobotsWarning),
    /// The run is waiting for `resume`, `skip_current` or `stop`
    Paused {
        reason: String,
        result: FetchResult,
    },
    Completed(RunSummary),
    /// The run could not start
    Error(String),
}

/// Sending half of the event channel; a sink without a channel drops events
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<Event>>,
}

impl EventSink {
    /// Creates a sink and the receiver that consumes it
    pub fn channel() -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn from_sender(tx: UnboundedSender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything except the `tracing` mirror of logs
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Sends an event; a dropped receiver is not an error
    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }
        self.emit(Event::Log { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message)
    }
}
