use time::OffsetDateTime;

use crate::types::push::{
    DeliveryReport, NewNotification, NewSubscription, Notification, NotificationId,
    NotificationPage, NotificationStatus, SigningKeyPair, Subscription, SubscriptionId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Transactional access to the three persisted record types.
///
/// Every method is one atomic unit: it either applies completely or leaves
/// the stored records untouched.
pub trait RecordStore: Send + Sync + 'static {
    fn signing_keys(&self) -> Result<Option<SigningKeyPair>, StoreError>;

    /// Deletes the active keypair and every subscription, then stores `keys`.
    fn replace_signing_keys(&self, keys: SigningKeyPair) -> Result<(), StoreError>;

    /// Inserts a subscription, or overwrites the key material of the one
    /// with the same endpoint while keeping its id and creation time.
    fn upsert_subscription(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<Subscription, StoreError>;

    /// Returns `false` when the endpoint is already registered.
    fn insert_subscription_if_absent(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Newest first.
    fn subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    fn count_subscriptions(&self) -> Result<usize, StoreError>;

    /// Removes all listed subscriptions in one commit, returning how many existed.
    fn remove_subscriptions(&self, ids: &[SubscriptionId]) -> Result<usize, StoreError>;

    fn delete_subscription(&self, endpoint: &str) -> Result<bool, StoreError>;

    /// Stores a new `pending` notification with zero counts.
    fn insert_notification(&self, notification: NewNotification)
    -> Result<Notification, StoreError>;

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, StoreError>;

    /// Newest first, optionally restricted to one status.
    fn notifications(
        &self,
        status: Option<NotificationStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<NotificationPage, StoreError>;

    fn pending_notifications(&self) -> Result<Vec<Notification>, StoreError>;

    /// Moves a `pending` notification to its terminal status with the given
    /// counts. Returns `None`, changing nothing, when the notification is
    /// missing or no longer pending.
    fn complete_notification(
        &self,
        id: NotificationId,
        report: DeliveryReport,
    ) -> Result<Option<Notification>, StoreError>;

    /// Returns `false` when the notification does not exist.
    fn record_view(&self, id: NotificationId) -> Result<bool, StoreError>;
}
