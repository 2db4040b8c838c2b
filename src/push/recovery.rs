use serde::Serialize;

use crate::error::EngineError;
use crate::ports::{PushSender, RecordStore, TimeProvider};
use crate::push::PushEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Pending notifications whose send date is still ahead.
    pub rescheduled: usize,
    /// Pending notifications whose send date passed while the process was down.
    pub overdue: usize,
    pub failed: usize,
}

impl<S, P, T> PushEngine<S, P, T>
where
    S: RecordStore,
    P: PushSender,
    T: TimeProvider,
{
    /// Re-registers a timer for every persisted `pending` notification.
    ///
    /// Overdue notifications fire immediately. A record that cannot be
    /// re-registered is logged and skipped.
    pub fn recover(&self) -> Result<RecoveryReport, EngineError> {
        let now = self.inner.time.now();
        tracing::info!(now = %now, "resilience check: looking for pending notifications");
        let pending = self.inner.store.pending_notifications()?;
        tracing::info!(count = pending.len(), "resilience check: found pending notifications");

        let mut report = RecoveryReport::default();
        for notification in pending {
            match self.schedule_delivery(notification.id, notification.send_date) {
                Ok(()) if notification.send_date > now => {
                    report.rescheduled += 1;
                    tracing::info!(
                        notification_id = notification.id,
                        send_date = %notification.send_date,
                        "resilience check: rescheduled notification"
                    );
                }
                Ok(()) => {
                    report.overdue += 1;
                    tracing::warn!(
                        notification_id = notification.id,
                        send_date = %notification.send_date,
                        "resilience check: notification overdue, sending now"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        notification_id = notification.id,
                        error = %err,
                        "resilience check: failed to reschedule notification"
                    );
                }
            }
        }
        Ok(report)
    }
}
