use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::EngineError;
use crate::ports::{PushSender, RecordStore, TimeProvider};
use crate::push::PushEngine;
use crate::types::push::{
    DeliveryReport, NewNotification, Notification, NotificationId, NotificationStatus,
    PushPayload,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub send_date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryRun {
    Completed(Notification),
    /// Another caller owns the notification or it already left `pending`.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ForceSendOutcome {
    Ignored {
        detail: &'static str,
    },
    Sent {
        successful_count: u32,
        failed_count: u32,
    },
    Failed {
        successful_count: u32,
        failed_count: u32,
    },
}

impl ForceSendOutcome {
    fn from_notification(notification: &Notification) -> Self {
        match notification.status {
            NotificationStatus::Sent => ForceSendOutcome::Sent {
                successful_count: notification.successful_count,
                failed_count: notification.failed_count,
            },
            NotificationStatus::Failed => ForceSendOutcome::Failed {
                successful_count: notification.successful_count,
                failed_count: notification.failed_count,
            },
            NotificationStatus::Pending => ForceSendOutcome::Ignored {
                detail: NOT_PENDING,
            },
        }
    }
}

const NOT_PENDING: &str = "Notification is not pending";
const STORE_RETRY_DELAY: time::Duration = time::Duration::seconds(30);

/// Notification ids currently owned by a delivery run.
#[derive(Default)]
pub(crate) struct InFlight {
    ids: Mutex<HashSet<NotificationId>>,
}

pub(crate) struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
    id: NotificationId,
}

impl InFlight {
    pub(crate) fn acquire(&self, id: NotificationId) -> Option<InFlightGuard<'_>> {
        let inserted = self.ids.lock().expect("in-flight lock").insert(id);
        inserted.then_some(InFlightGuard {
            in_flight: self,
            id,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .ids
            .lock()
            .expect("in-flight lock")
            .remove(&self.id);
    }
}

impl<S, P, T> PushEngine<S, P, T>
where
    S: RecordStore,
    P: PushSender,
    T: TimeProvider,
{
    /// Persists a notification and either delivers it now or schedules it.
    ///
    /// A `send_date` that is absent or not in the future means "now".
    pub async fn create_and_dispatch(
        &self,
        request: SendRequest,
    ) -> Result<Notification, EngineError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(EngineError::InvalidInput("title must not be empty.".to_string()));
        }
        let now = self.inner.time.now();
        let scheduled_for = request.send_date.filter(|send_date| *send_date > now);

        if scheduled_for.is_none()
            && self.inner.registry.count()? > 0
            && self.inner.keys.get()?.is_none()
        {
            return Err(EngineError::MissingSigningKey);
        }

        let notification = self.inner.store.insert_notification(NewNotification {
            title: title.to_string(),
            body: request.body,
            image_url: request.image_url.filter(|url| !url.trim().is_empty()),
            send_date: scheduled_for.unwrap_or(now),
        })?;

        if let Some(send_date) = scheduled_for {
            tracing::info!(
                notification_id = notification.id,
                send_date = %send_date,
                "scheduling notification"
            );
            self.schedule_delivery(notification.id, send_date)?;
            return Ok(notification);
        }

        match self.run_delivery(notification.id).await? {
            DeliveryRun::Completed(notification) => Ok(notification),
            DeliveryRun::Skipped => self
                .inner
                .store
                .notification(notification.id)?
                .ok_or(EngineError::NotificationNotFound(notification.id)),
        }
    }

    /// Cancels the timer for a pending notification and delivers it now.
    pub async fn force_send_now(
        &self,
        id: NotificationId,
    ) -> Result<ForceSendOutcome, EngineError> {
        let notification = self
            .inner
            .store
            .notification(id)?
            .ok_or(EngineError::NotificationNotFound(id))?;
        if notification.status != NotificationStatus::Pending {
            return Ok(ForceSendOutcome::Ignored {
                detail: NOT_PENDING,
            });
        }

        tracing::info!(notification_id = id, "force sending notification");
        if !self.inner.scheduler.cancel(id) {
            tracing::debug!(notification_id = id, "no scheduled job to cancel");
        }

        match self.run_delivery(id).await? {
            DeliveryRun::Completed(notification) => {
                Ok(ForceSendOutcome::from_notification(&notification))
            }
            DeliveryRun::Skipped => Ok(ForceSendOutcome::Ignored {
                detail: NOT_PENDING,
            }),
        }
    }

    /// Registers the timer for a pending notification.
    ///
    /// A fire that fails on storage re-arms the timer after
    /// `STORE_RETRY_DELAY`, so a pending record always keeps a job.
    pub(crate) fn schedule_delivery(
        &self,
        id: NotificationId,
        run_at: OffsetDateTime,
    ) -> Result<(), EngineError> {
        let engine = self.clone();
        self.inner.scheduler.schedule(id, run_at, move |id| async move {
            tracing::info!(notification_id = id, "sending scheduled notification");
            match engine.run_delivery(id).await {
                Ok(DeliveryRun::Completed(notification)) => tracing::info!(
                    notification_id = id,
                    status = notification.status.as_str(),
                    "scheduled notification delivered"
                ),
                Ok(DeliveryRun::Skipped) => {
                    tracing::debug!(notification_id = id, "scheduled notification skipped")
                }
                Err(EngineError::MissingSigningKey) => tracing::error!(
                    notification_id = id,
                    "scheduled notification failed: no active signing keypair"
                ),
                Err(err) => {
                    let retry_at = engine.now() + STORE_RETRY_DELAY;
                    tracing::error!(
                        notification_id = id,
                        error = %err,
                        retry_at = %retry_at,
                        "error sending scheduled notification, retrying"
                    );
                    if let Err(err) = engine.schedule_delivery(id, retry_at) {
                        tracing::error!(
                            notification_id = id,
                            error = %err,
                            "failed to reschedule notification"
                        );
                    }
                }
            }
        })?;
        Ok(())
    }

    /// The one delivery path for a notification id.
    ///
    /// Only the caller that holds the id and still observes `pending` runs
    /// the fanout; the terminal transition is a conditional update, so a
    /// notification is delivered at most once.
    pub(crate) async fn run_delivery(&self, id: NotificationId) -> Result<DeliveryRun, EngineError> {
        let Some(_guard) = self.inner.in_flight.acquire(id) else {
            tracing::debug!(notification_id = id, "delivery already in progress");
            return Ok(DeliveryRun::Skipped);
        };

        let notification = match self.inner.store.notification(id)? {
            Some(notification) if notification.status == NotificationStatus::Pending => {
                notification
            }
            _ => return Ok(DeliveryRun::Skipped),
        };

        let subscribers = self.inner.registry.list_all()?;
        let payload = PushPayload::for_notification(&notification);
        let report = match self.inner.fanout.deliver(&payload, &subscribers).await {
            Ok(report) => report,
            Err(EngineError::MissingSigningKey) => {
                self.inner
                    .store
                    .complete_notification(id, DeliveryReport::default())?;
                return Err(EngineError::MissingSigningKey);
            }
            Err(err) => return Err(err),
        };

        match self.inner.store.complete_notification(id, report)? {
            Some(notification) => Ok(DeliveryRun::Completed(notification)),
            None => Ok(DeliveryRun::Skipped),
        }
    }
}
