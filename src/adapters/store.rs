use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ports::{RecordStore, StoreError};
use crate::types::push::{
    DeliveryReport, NewNotification, NewSubscription, Notification, NotificationId,
    NotificationPage, NotificationStatus, SigningKeyPair, Subscription, SubscriptionId,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Records {
    next_subscription_id: SubscriptionId,
    next_notification_id: NotificationId,
    signing_keys: Option<SigningKeyPair>,
    subscriptions: Vec<Subscription>,
    notifications: Vec<Notification>,
}

impl Records {
    fn allocate_subscription_id(&mut self) -> SubscriptionId {
        self.next_subscription_id += 1;
        self.next_subscription_id
    }

    fn allocate_notification_id(&mut self) -> NotificationId {
        self.next_notification_id += 1;
        self.next_notification_id
    }

    fn insert_subscription(
        &mut self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Subscription {
        let stored = Subscription {
            id: self.allocate_subscription_id(),
            endpoint: subscription.endpoint,
            p256dh: subscription.p256dh,
            auth: subscription.auth,
            created_at: now,
        };
        self.subscriptions.push(stored.clone());
        stored
    }
}

/// Record store keeping every record in a single JSON document.
///
/// Mutations are applied to a copy, written to `<path>.tmp`, renamed over the
/// data file and only then made visible. Without a path the store lives in
/// memory only.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    records: Mutex<Records>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Records::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Records::default()),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&Records) -> R) -> R {
        let guard = self.records.lock().expect("records lock");
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut Records) -> R) -> Result<R, StoreError> {
        let mut guard = self.records.lock().expect("records lock");
        let mut next = guard.clone();
        let result = f(&mut next);
        if let Some(path) = self.path.as_deref() {
            persist(path, &next)?;
        }
        *guard = next;
        Ok(result)
    }
}

/// Writes the records next to `path`, flushes them to disk and renames
/// them into place, so a crash leaves either the old or the new file.
fn persist(path: &Path, records: &Records) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(records)?;
    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    sync_parent_dir(path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => File::open(".")?.sync_all(),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl RecordStore for JsonFileStore {
    fn signing_keys(&self) -> Result<Option<SigningKeyPair>, StoreError> {
        Ok(self.read(|records| records.signing_keys.clone()))
    }

    fn replace_signing_keys(&self, keys: SigningKeyPair) -> Result<(), StoreError> {
        self.write(|records| {
            records.subscriptions.clear();
            records.signing_keys = Some(keys);
        })
    }

    fn upsert_subscription(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<Subscription, StoreError> {
        self.write(|records| {
            match records
                .subscriptions
                .iter_mut()
                .find(|existing| existing.endpoint == subscription.endpoint)
            {
                Some(existing) => {
                    existing.p256dh = subscription.p256dh;
                    existing.auth = subscription.auth;
                    existing.clone()
                }
                None => records.insert_subscription(subscription, now),
            }
        })
    }

    fn insert_subscription_if_absent(
        &self,
        subscription: NewSubscription,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let exists = self.read(|records| {
            records
                .subscriptions
                .iter()
                .any(|existing| existing.endpoint == subscription.endpoint)
        });
        if exists {
            return Ok(false);
        }
        self.write(|records| {
            if records
                .subscriptions
                .iter()
                .any(|existing| existing.endpoint == subscription.endpoint)
            {
                return false;
            }
            records.insert_subscription(subscription, now);
            true
        })
    }

    fn subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.read(|records| {
            let mut subscriptions = records.subscriptions.clone();
            subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            subscriptions
        }))
    }

    fn count_subscriptions(&self) -> Result<usize, StoreError> {
        Ok(self.read(|records| records.subscriptions.len()))
    }

    fn remove_subscriptions(&self, ids: &[SubscriptionId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.write(|records| {
            let before = records.subscriptions.len();
            records
                .subscriptions
                .retain(|subscription| !ids.contains(&subscription.id));
            before - records.subscriptions.len()
        })
    }

    fn delete_subscription(&self, endpoint: &str) -> Result<bool, StoreError> {
        let exists = self.read(|records| {
            records
                .subscriptions
                .iter()
                .any(|subscription| subscription.endpoint == endpoint)
        });
        if !exists {
            return Ok(false);
        }
        self.write(|records| {
            let before = records.subscriptions.len();
            records
                .subscriptions
                .retain(|subscription| subscription.endpoint != endpoint);
            before != records.subscriptions.len()
        })
    }

    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        self.write(|records| {
            let stored = Notification {
                id: records.allocate_notification_id(),
                title: notification.title,
                body: notification.body,
                image_url: notification.image_url,
                send_date: notification.send_date,
                status: NotificationStatus::Pending,
                successful_count: 0,
                failed_count: 0,
                views: 0,
            };
            records.notifications.push(stored.clone());
            stored
        })
    }

    fn notification(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        Ok(self.read(|records| {
            records
                .notifications
                .iter()
                .find(|notification| notification.id == id)
                .cloned()
        }))
    }

    fn notifications(
        &self,
        status: Option<NotificationStatus>,
        offset: usize,
        limit: usize,
    ) -> Result<NotificationPage, StoreError> {
        Ok(self.read(|records| {
            let mut matching: Vec<&Notification> = records
                .notifications
                .iter()
                .filter(|notification| status.is_none_or(|status| notification.status == status))
                .collect();
            matching.sort_by(|a, b| b.id.cmp(&a.id));
            let total = matching.len();
            let notifications: Vec<Notification> = matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect();
            let has_more = offset + notifications.len() < total;
            NotificationPage {
                notifications,
                total,
                has_more,
            }
        }))
    }

    fn pending_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        Ok(self.read(|records| {
            records
                .notifications
                .iter()
                .filter(|notification| notification.status == NotificationStatus::Pending)
                .cloned()
                .collect()
        }))
    }

    fn complete_notification(
        &self,
        id: NotificationId,
        report: DeliveryReport,
    ) -> Result<Option<Notification>, StoreError> {
        let pending = self.read(|records| {
            records
                .notifications
                .iter()
                .any(|n| n.id == id && n.status == NotificationStatus::Pending)
        });
        if !pending {
            return Ok(None);
        }
        self.write(|records| {
            let notification = records
                .notifications
                .iter_mut()
                .find(|notification| notification.id == id)?;
            if notification.status != NotificationStatus::Pending {
                return None;
            }
            notification.status = NotificationStatus::from_report(&report);
            notification.successful_count = report.sent;
            notification.failed_count = report.failed;
            Some(notification.clone())
        })
    }

    fn record_view(&self, id: NotificationId) -> Result<bool, StoreError> {
        let exists = self.read(|records| records.notifications.iter().any(|n| n.id == id));
        if !exists {
            return Ok(false);
        }
        self.write(|records| {
            match records
                .notifications
                .iter_mut()
                .find(|notification| notification.id == id)
            {
                Some(notification) => {
                    notification.views += 1;
                    true
                }
                None => false,
            }
        })
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn create_temp_dir(name: &str) -> PathBuf {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let dir = std::env::temp_dir().join(format!("herald-{name}-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn new_subscription(endpoint: &str, p256dh: &str) -> NewSubscription {
        NewSubscription {
            endpoint: endpoint.to_string(),
            p256dh: p256dh.to_string(),
            auth: "auth".to_string(),
        }
    }

    fn new_notification(title: &str) -> NewNotification {
        NewNotification {
            title: title.to_string(),
            body: "body".to_string(),
            image_url: None,
            send_date: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn signing_keys(public_key: &str) -> SigningKeyPair {
        SigningKeyPair {
            public_key: public_key.to_string(),
            private_key: "private".to_string(),
            subject: "mailto:admin@example.com".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn upsert_subscription__should_update_keys_in_place_for_known_endpoint() {
        // Given
        let store = JsonFileStore::in_memory();
        let first = store
            .upsert_subscription(new_subscription("https://push.example/a", "old"), OffsetDateTime::UNIX_EPOCH)
            .expect("insert");

        // When
        let second = store
            .upsert_subscription(
                new_subscription("https://push.example/a", "new"),
                OffsetDateTime::now_utc(),
            )
            .expect("update");

        // Then
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.p256dh, "new");
        assert_eq!(store.count_subscriptions().expect("count"), 1);
    }

    #[test]
    fn replace_signing_keys__should_drop_every_subscription() {
        // Given
        let store = JsonFileStore::in_memory();
        store.replace_signing_keys(signing_keys("old")).expect("first keys");
        for endpoint in ["https://push.example/a", "https://push.example/b"] {
            store
                .upsert_subscription(new_subscription(endpoint, "p"), OffsetDateTime::UNIX_EPOCH)
                .expect("subscribe");
        }

        // When
        store.replace_signing_keys(signing_keys("new")).expect("rotate");

        // Then
        assert!(store.subscriptions().expect("list").is_empty());
        assert_eq!(
            store.signing_keys().expect("keys").map(|keys| keys.public_key),
            Some("new".to_string())
        );
    }

    #[test]
    fn complete_notification__should_only_transition_pending_records() {
        // Given
        let store = JsonFileStore::in_memory();
        let notification = store.insert_notification(new_notification("T")).expect("insert");

        // When
        let first = store
            .complete_notification(notification.id, DeliveryReport { sent: 2, failed: 1 })
            .expect("complete");
        let second = store
            .complete_notification(notification.id, DeliveryReport { sent: 0, failed: 5 })
            .expect("complete again");

        // Then
        let first = first.expect("first completion applies");
        assert_eq!(first.status, NotificationStatus::Sent);
        assert_eq!(first.successful_count, 2);
        assert_eq!(first.failed_count, 1);
        assert!(second.is_none());
        let stored = store.notification(notification.id).expect("read").expect("exists");
        assert_eq!(stored.failed_count, 1);
    }

    #[test]
    fn notifications__should_page_newest_first_with_status_filter() {
        // Given
        let store = JsonFileStore::in_memory();
        for title in ["one", "two", "three"] {
            store.insert_notification(new_notification(title)).expect("insert");
        }
        store
            .complete_notification(1, DeliveryReport { sent: 1, failed: 0 })
            .expect("complete");

        // When
        let pending = store
            .notifications(Some(NotificationStatus::Pending), 0, 1)
            .expect("page");
        let all = store.notifications(None, 1, 10).expect("page");

        // Then
        assert_eq!(pending.total, 2);
        assert!(pending.has_more);
        assert_eq!(pending.notifications[0].title, "three");
        assert_eq!(all.total, 3);
        assert!(!all.has_more);
        let titles: Vec<&str> = all.notifications.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "one"]);
    }

    #[test]
    fn insert_subscription_if_absent__should_skip_known_endpoints() {
        let store = JsonFileStore::in_memory();
        let now = OffsetDateTime::UNIX_EPOCH;

        assert!(store
            .insert_subscription_if_absent(new_subscription("https://push.example/a", "p"), now)
            .expect("insert"));
        assert!(!store
            .insert_subscription_if_absent(new_subscription("https://push.example/a", "q"), now)
            .expect("insert again"));
        assert_eq!(store.subscriptions().expect("list")[0].p256dh, "p");
    }

    #[test]
    fn record_view__should_ignore_unknown_notifications() {
        let store = JsonFileStore::in_memory();
        let notification = store.insert_notification(new_notification("T")).expect("insert");

        assert!(store.record_view(notification.id).expect("view"));
        assert!(!store.record_view(999).expect("view unknown"));
        assert_eq!(
            store.notification(notification.id).expect("read").expect("exists").views,
            1
        );
    }

    #[test]
    fn open__should_reload_records_written_by_previous_instance() {
        // Given
        let dir = create_temp_dir("store-reopen");
        let path = dir.join("herald.json");
        {
            let store = JsonFileStore::open(&path).expect("open");
            store.replace_signing_keys(signing_keys("pub")).expect("keys");
            store
                .upsert_subscription(
                    new_subscription("https://push.example/a", "p"),
                    OffsetDateTime::UNIX_EPOCH,
                )
                .expect("subscribe");
            store.insert_notification(new_notification("T")).expect("insert");
        }

        // When
        let reopened = JsonFileStore::open(&path).expect("reopen");
        let next = reopened.insert_notification(new_notification("U")).expect("insert");

        // Then
        assert_eq!(reopened.count_subscriptions().expect("count"), 1);
        assert_eq!(reopened.pending_notifications().expect("pending").len(), 2);
        assert_eq!(next.id, 2);
        assert!(reopened.signing_keys().expect("keys").is_some());

        std::fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn persist__should_replace_data_file_without_leaving_temp_file() {
        // Given
        let dir = create_temp_dir("store-persist");
        let path = dir.join("herald.json");
        std::fs::write(&path, b"{ stale").expect("seed stale file");
        let records = Records {
            next_notification_id: 4,
            ..Records::default()
        };

        // When
        persist(&path, &records).expect("persist");

        // Then
        assert!(!temp_path(&path).exists());
        let written: Records =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("decode");
        assert_eq!(written.next_notification_id, 4);

        std::fs::remove_dir_all(&dir).expect("cleanup");
    }
}
