//! Operator log stream
//!
//! Bounded FIFO channel between the controller (producer) and the
//! presentation layer (consumer). Publishing never blocks: when the consumer
//! lags past the channel capacity the event is dropped, because log delivery
//! must never stall a trading decision.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::models::{LogEvent, Severity};

/// Default channel capacity; generous enough that drops mean a stuck consumer
pub const DEFAULT_CAPACITY: usize = 1024;

/// Interval after which an idle stream yields a keep-alive marker
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Producer half of the log channel
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogEvent>,
}

/// Consumer half: a lazy, infinite, non-restartable sequence of events
pub struct LogStream {
    rx: mpsc::Receiver<LogEvent>,
    keepalive: Duration,
}

/// One item of the consumer stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(LogEvent),
    /// Emitted when no event arrived within the keep-alive interval
    KeepAlive,
}

/// Create a connected sink/stream pair
pub fn channel(capacity: usize) -> (LogSink, LogStream) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        LogSink { tx },
        LogStream {
            rx,
            keepalive: KEEPALIVE_INTERVAL,
        },
    )
}

impl LogSink {
    /// Publish an event without blocking
    ///
    /// Events are also mirrored to `tracing` so console logs stay useful
    /// when no stream consumer is attached.
    pub fn publish(&self, severity: Severity, message: impl Into<String>) {
        let event = LogEvent::new(severity, message);

        match severity {
            Severity::Info | Severity::Success => tracing::info!("{}", event.message),
            Severity::Warning => tracing::warn!("{}", event.message),
            Severity::Error => tracing::error!("{}", event.message),
        }

        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.tx.try_send(event) {
            tracing::warn!("Log stream consumer lagging, dropped: {}", dropped.message);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(Severity::Success, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.publish(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(Severity::Error, message);
    }
}

impl LogStream {
    #[cfg(test)]
    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Next stream item, or `None` once all producers are gone and the
    /// queue is drained
    pub async fn next(&mut self) -> Option<StreamItem> {
        match tokio::time::timeout(self.keepalive, self.rx.recv()).await {
            Ok(Some(event)) => Some(StreamItem::Event(event)),
            Ok(None) => None,
            Err(_) => Some(StreamItem::KeepAlive),
        }
    }
}
