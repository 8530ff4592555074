//! Notifications a hunt pushes to its host.
//!
//! The hunter never touches host state. Everything it wants the host to
//! know or do travels as a [`HuntEvent`] on an unbounded channel; the host
//! owns the receiving end and decides which thread handles it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::hunter::{HuntMode, RunId};
use crate::model::Point;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called.
    Cancelled,
    /// A stop-hunting idle click step was reached.
    StopStep { group: String, step: String },
    /// The configured round limit was reached.
    RoundLimit { rounds: u64 },
    /// The run hit an unrecoverable error.
    Failed { message: String },
}

/// Events emitted by a hunt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HuntEvent {
    /// A human-readable log line.
    Log {
        level: LogLevel,
        message: String,
        at: DateTime<Utc>,
    },
    /// A run began.
    HuntingStarted {
        run_id: RunId,
        group: String,
        mode: HuntMode,
    },
    /// A template was recognized and is about to be clicked.
    TargetFound {
        name: String,
        point: Point,
        confidence: f64,
    },
    /// A run ended and the hunter is idle again.
    HuntingStopped { run_id: RunId, reason: StopReason },
    /// The host should switch to the named configuration.
    ConfigSwitchRequested { name: String },
    /// The host should switch to the named text content.
    TextSwitchRequested { name: String },
}

/// Receiving half handed to the host.
pub type EventStream = mpsc::UnboundedReceiver<HuntEvent>;

/// Sending half used by the hunter.
///
/// Sends never fail from the hunter's point of view: a host that dropped its
/// receiver simply stops getting events. Log events are mirrored to
/// `tracing` so they show up even without a consumer.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<HuntEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: HuntEvent) {
        // Receiver gone means nobody is listening; not an error for the run
        let _ = self.tx.send(event);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.emit(HuntEvent::Log {
            level,
            message,
            at: Utc::now(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}
