use crate::error::EngineError;
use crate::ports::{PushSender, RecordStore, TimeProvider};
use crate::types::push::{
    NewSubscription, Notification, NotificationId, NotificationPage, NotificationStatus,
    SigningKeyPair, Subscription,
};

mod dispatch;
mod fanout;
mod keys;
mod recovery;
mod registry;
mod scheduler;

use std::sync::Arc;

use dispatch::InFlight;
use fanout::Fanout;
use keys::KeyStore;
use registry::SubscriptionRegistry;
use scheduler::Scheduler;

pub use dispatch::{DeliveryRun, ForceSendOutcome, SendRequest};
pub use recovery::RecoveryReport;
pub use scheduler::{ScheduleError, ScheduledJobInfo};

/// Rotates the keypair held by `store` without a running engine.
pub fn rotate_keys<S: RecordStore>(
    store: Arc<S>,
    subject: &str,
    now: time::OffsetDateTime,
) -> Result<SigningKeyPair, EngineError> {
    KeyStore::new(store, subject).generate(now)
}

fn is_complete(subscription: &NewSubscription) -> bool {
    !(subscription.endpoint.trim().is_empty()
        || subscription.p256dh.trim().is_empty()
        || subscription.auth.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub subject: String,
    pub fanout_concurrency: usize,
}

/// Notification dispatch and scheduling engine.
///
/// Cheap to clone; every clone drives the same key cache, subscriber set and
/// timer set.
pub struct PushEngine<S, P, T> {
    inner: Arc<Inner<S, P, T>>,
}

impl<S, P, T> Clone for PushEngine<S, P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, P, T> {
    store: Arc<S>,
    keys: Arc<KeyStore<S>>,
    registry: Arc<SubscriptionRegistry<S>>,
    fanout: Fanout<S, P>,
    scheduler: Scheduler<T>,
    time: T,
    in_flight: InFlight,
}

impl<S, P, T> PushEngine<S, P, T>
where
    S: RecordStore,
    P: PushSender,
    T: TimeProvider,
{
    pub fn new(store: Arc<S>, sender: P, time: T, settings: EngineSettings) -> Self {
        let keys = Arc::new(KeyStore::new(Arc::clone(&store), settings.subject));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&store)));
        let fanout = Fanout::new(
            Arc::clone(&keys),
            Arc::clone(&registry),
            sender,
            settings.fanout_concurrency,
        );
        Self {
            inner: Arc::new(Inner {
                store,
                keys,
                registry,
                fanout,
                scheduler: Scheduler::new(time.clone()),
                time,
                in_flight: InFlight::default(),
            }),
        }
    }

    pub fn vapid_public_key(&self) -> Result<Option<String>, EngineError> {
        Ok(self.inner.keys.get()?.map(|keys| keys.public_key))
    }

    pub fn signing_keys(&self) -> Result<Option<SigningKeyPair>, EngineError> {
        self.inner.keys.get()
    }

    /// Rotates to a fresh keypair. Every existing subscription is deleted.
    pub fn generate_keys(&self) -> Result<SigningKeyPair, EngineError> {
        self.inner.keys.generate(self.inner.time.now())
    }

    /// Installs a caller-supplied keypair. Every existing subscription is deleted.
    pub fn import_keys(
        &self,
        public_key: String,
        private_key: String,
    ) -> Result<SigningKeyPair, EngineError> {
        if public_key.trim().is_empty() || private_key.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "publicKey and privateKey are required.".to_string(),
            ));
        }
        self.inner
            .keys
            .import(public_key, private_key, self.inner.time.now())
    }

    pub fn subscribe(&self, subscription: NewSubscription) -> Result<Subscription, EngineError> {
        if !is_complete(&subscription) {
            return Err(EngineError::InvalidInput(
                "endpoint, p256dh, and auth are required.".to_string(),
            ));
        }
        self.inner
            .registry
            .subscribe(subscription, self.inner.time.now())
    }

    pub fn unsubscribe(&self, endpoint: &str) -> Result<bool, EngineError> {
        self.inner.registry.unsubscribe(endpoint)
    }

    pub fn import_subscribers(
        &self,
        subscriptions: Vec<NewSubscription>,
    ) -> Result<usize, EngineError> {
        let total = subscriptions.len();
        let complete: Vec<NewSubscription> =
            subscriptions.into_iter().filter(is_complete).collect();
        let imported = self
            .inner
            .registry
            .import(complete, self.inner.time.now())?;
        tracing::info!(total, imported, "imported subscribers");
        Ok(imported)
    }

    pub fn subscribers(&self) -> Result<Vec<Subscription>, EngineError> {
        self.inner.registry.list_all()
    }

    pub fn subscriber_count(&self) -> Result<usize, EngineError> {
        self.inner.registry.count()
    }

    pub fn notification(&self, id: NotificationId) -> Result<Option<Notification>, EngineError> {
        Ok(self.inner.store.notification(id)?)
    }

    pub fn notifications(
        &self,
        status: Option<NotificationStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<NotificationPage, EngineError> {
        Ok(self.inner.store.notifications(status, offset, limit)?)
    }

    /// Silently ignores unknown notifications.
    pub fn record_view(&self, id: NotificationId) -> Result<(), EngineError> {
        if !self.inner.store.record_view(id)? {
            tracing::debug!(notification_id = id, "view for unknown notification");
        }
        Ok(())
    }

    pub fn scheduled_jobs(&self) -> Vec<ScheduledJobInfo> {
        self.inner.scheduler.jobs()
    }

    pub fn now(&self) -> time::OffsetDateTime {
        self.inner.time.now()
    }

    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }
}
