use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::oneshot;

use crate::adapters::JsonFileStore;
use crate::ports;
use crate::ports::{DeliveryError, RecordStore, StoreError};
use crate::types::push::{
    DeliveryReport, NewNotification, NewSubscription, Notification, NotificationId,
    NotificationPage, NotificationStatus, SigningKeyPair, Subscription, SubscriptionId,
};

pub(crate) fn fixed_now() -> OffsetDateTime {
    OffsetDateTime::parse("2025-01-12T09:30:00Z", &Rfc3339).expect("parse now")
}

/// Clock whose sleeps only complete when the test triggers them.
#[derive(Clone)]
pub(crate) struct TestTime {
    now: OffsetDateTime,
    sleeps: Arc<Mutex<Vec<oneshot::Sender<()>>>>,
    durations: Arc<Mutex<Vec<Duration>>>,
}

impl TestTime {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self {
            now,
            sleeps: Arc::new(Mutex::new(Vec::new())),
            durations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn sleep_durations(&self) -> Vec<Duration> {
        self.durations.lock().expect("durations lock").clone()
    }

    pub(crate) fn trigger_all(&self) {
        let mut sends = self.sleeps.lock().expect("sleeps lock");
        for sender in sends.drain(..) {
            let _ = sender.send(());
        }
    }
}

pub(crate) struct ManualSleep {
    receiver: oneshot::Receiver<()>,
}

impl Future for ManualSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl ports::TimeProvider for TestTime {
    type Sleep<'a>
        = ManualSleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        self.now
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        let (sender, receiver) = oneshot::channel();
        self.durations
            .lock()
            .expect("durations lock")
            .push(duration);
        self.sleeps.lock().expect("sleeps lock").push(sender);
        ManualSleep { receiver }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TestFailure {
    Gone,
    Rejected,
    TimedOut,
}

#[derive(Debug, Clone)]
pub(crate) struct PushAttempt {
    pub(crate) endpoint: String,
    pub(crate) public_key: String,
    pub(crate) payload: Vec<u8>,
}

/// Records every attempt and fails the endpoints it was told to fail.
#[derive(Clone, Default)]
pub(crate) struct TestSender {
    attempts: Arc<Mutex<Vec<PushAttempt>>>,
    failures: Arc<Mutex<HashMap<String, TestFailure>>>,
}

impl TestSender {
    pub(crate) fn fail(&self, endpoint: &str, failure: TestFailure) {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(endpoint.to_string(), failure);
    }

    pub(crate) fn attempts(&self) -> Vec<PushAttempt> {
        self.attempts.lock().expect("attempts lock").clone()
    }
}

impl ports::PushSender for TestSender {
    type Fut<'a>
        = std::future::Ready<Result<(), DeliveryError>>
    where
        Self: 'a;

    fn send<'a>(
        &'a self,
        signing_key: &'a SigningKeyPair,
        subscription: &'a Subscription,
        payload: &'a [u8],
    ) -> Self::Fut<'a> {
        self.attempts
            .lock()
            .expect("attempts lock")
            .push(PushAttempt {
                endpoint: subscription.endpoint.clone(),
                public_key: signing_key.public_key.clone(),
                payload: payload.to_vec(),
            });
        let failure = self
            .failures
            .lock()
            .expect("failures lock")
            .get(&subscription.endpoint)
            .copied();
        std::future::ready(match failure {
            None => Ok(()),
            Some(TestFailure::Gone) => Err(DeliveryError::Gone("410 Gone".to_string())),
            Some(TestFailure::Rejected) => {
                Err(DeliveryError::Rejected("429 Too Many Requests".to_string()))
            }
            Some(TestFailure::TimedOut) => Err(DeliveryError::TimedOut(Duration::from_secs(10))),
        })
    }
}

/// Wraps an in-memory store; subscriber reads fail while `fail_reads` is set.
pub(crate) struct FlakyStore {
    inner: JsonFileStore,
    fail_reads: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: JsonFileStore::in_memory(),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

impl ports::RecordStore for FlakyStore {
    fn signing_keys(&self) -> Result<Option<SigningKeyPair>, StoreError> {
        self.inner.signing_keys()
    }

    fn replace_signing_keys(&self, keys: SigningKeyPair) -> Result<(), StoreError> {
        self.inner.replace_signing_keys(keys)
    }

    fn upsert_subscription(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<Subscription, StoreError> {
        self.inner.upsert_subscription(subscription, now)
    }

    fn insert_subscription_if_absent(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        self.inner.insert_subscription_if_absent(subscription, now)
    }

    fn subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk unavailable")));
        }
        self.inner.subscriptions()
    }

    fn count_subscriptions(&self) -> Result<usize, StoreError> {
        self.inner.count_subscriptions()
    }

    fn remove_subscriptions(&self, ids: &[SubscriptionId]) -> Result<usize, StoreError> {
        self.inner.remove_subscriptions(ids)
    }

    fn delete_subscription(&self, endpoint: &str) -> Result<bool, StoreError> {
        self.inner.delete_subscription(endpoint)
    }

    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        self.inner.insert_notification(notification)
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        self.inner.notification(id)
    }

    fn notifications(
        &self,
        status: Option<NotificationStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<NotificationPage, StoreError> {
        self.inner.notifications(status, offset, limit)
    }

    fn pending_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        self.inner.pending_notifications()
    }

    fn complete_notification(
        &self,
        id: NotificationId,
        report: DeliveryReport,
    ) -> Result<Option<Notification>, StoreError> {
        self.inner.complete_notification(id, report)
    }

    fn record_view(&self, id: NotificationId) -> Result<bool, StoreError> {
        self.inner.record_view(id)
    }
}
