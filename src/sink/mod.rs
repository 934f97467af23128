//! Notification and audit sinks
//!
//! The engine reports denials and degraded lookups through these traits and
//! never formats UI markup itself. Audit delivery is fire-and-forget.

use crate::domain::{AuditEvent, Notification};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives user-facing messages (toast/banner) from the engine
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Receives audit records for external logging
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Hand an event to the audit sink without waiting for it.
pub(crate) fn spawn_audit(sink: &Option<Arc<dyn AuditSink>>, event: AuditEvent) {
    let Some(sink) = sink.clone() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = sink.record(&event).await {
            tracing::warn!(
                actor_id = %event.actor_id,
                action = %event.action,
                error = %e,
                "Failed to record audit event"
            );
        }
    });
}

/// Keeps notifications in memory so a caller can render them afterwards
#[derive(Debug, Default, Clone)]
pub struct BufferedNotificationSink {
    items: Arc<Mutex<Vec<Notification>>>,
}

impl BufferedNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered notification, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl NotificationSink for BufferedNotificationSink {
    fn notify(&self, notification: Notification) {
        self.items.lock().push(notification);
    }
}

/// Writes notifications to the log. Used where no UI layer collects them;
/// per-request messages travel with the response instead.
#[derive(Debug, Default, Clone)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            severity = ?notification.severity,
            message = %notification.message,
            "notification"
        );
    }
}

/// Writes audit events to the log
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        tracing::info!(
            actor_id = %event.actor_id,
            action = %event.action,
            resource = %event.resource,
            timestamp = %event.timestamp,
            "audit"
        );
        Ok(())
    }
}
