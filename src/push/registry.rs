use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::EngineError;
use crate::ports::RecordStore;
use crate::types::push::{NewSubscription, Subscription, SubscriptionId};

/// The set of browser endpoints notifications fan out to.
pub(crate) struct SubscriptionRegistry<S> {
    store: Arc<S>,
}

impl<S: RecordStore> SubscriptionRegistry<S> {
    pub(crate) fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub(crate) fn subscribe(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<Subscription, EngineError> {
        Ok(self.store.upsert_subscription(subscription, now)?)
    }

    pub(crate) fn unsubscribe(&self, endpoint: &str) -> Result<bool, EngineError> {
        Ok(self.store.delete_subscription(endpoint)?)
    }

    /// Adds endpoints not registered yet and returns how many were added.
    pub(crate) fn import(
        &self,
        subscriptions: Vec<NewSubscription>,
        now: OffsetDateTime,
    ) -> Result<usize, EngineError> {
        let mut imported = 0;
        for subscription in subscriptions {
            if self.store.insert_subscription_if_absent(subscription, now)? {
                imported += 1;
            }
        }
        Ok(imported)
    }

    pub(crate) fn list_all(&self) -> Result<Vec<Subscription>, EngineError> {
        Ok(self.store.subscriptions()?)
    }

    pub(crate) fn count(&self) -> Result<usize, EngineError> {
        Ok(self.store.count_subscriptions()?)
    }

    pub(crate) fn remove(&self, ids: &[SubscriptionId]) -> Result<usize, EngineError> {
        Ok(self.store.remove_subscriptions(ids)?)
    }
}
