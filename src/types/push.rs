use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type SubscriptionId = i64;
pub type NotificationId = i64;

/// The VAPID keypair every push is signed with. At most one is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyPair {
    /// URL-safe unpadded base64 of the uncompressed P-256 point.
    pub public_key: String,
    /// PKCS#8 PEM, or a raw URL-safe base64 scalar when imported that way.
    pub private_key: String,
    pub subject: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(NotificationStatus::Pending),
            "sent" => Some(NotificationStatus::Sent),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }

    /// Terminal status after one delivery attempt.
    pub fn from_report(report: &DeliveryReport) -> Self {
        if report.sent > 0 {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub send_date: OffsetDateTime,
    pub status: NotificationStatus,
    pub successful_count: u32,
    pub failed_count: u32,
    pub views: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub send_date: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: usize,
    pub has_more: bool,
}

/// Aggregate outcome of one fanout pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub sent: u32,
    pub failed: u32,
}

/// The JSON document every subscriber receives for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub image: Option<String>,
    pub url: String,
}

impl PushPayload {
    pub fn for_notification(notification: &Notification) -> Self {
        Self {
            title: notification.title.clone(),
            body: notification.body.clone(),
            image: notification.image_url.clone(),
            url: format!("/notification?id={}", notification.id),
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    fn notification(id: NotificationId, image_url: Option<&str>) -> Notification {
        Notification {
            id,
            title: "T".to_string(),
            body: "B".to_string(),
            image_url: image_url.map(str::to_string),
            send_date: OffsetDateTime::UNIX_EPOCH,
            status: NotificationStatus::Pending,
            successful_count: 0,
            failed_count: 0,
            views: 0,
        }
    }

    #[test]
    fn push_payload__should_serialize_null_image_and_deep_link() {
        // Given
        let payload = PushPayload::for_notification(&notification(42, None));

        // When
        let json: serde_json::Value = serde_json::to_value(&payload).expect("serialize payload");

        // Then
        assert_eq!(
            json,
            serde_json::json!({
                "title": "T",
                "body": "B",
                "image": null,
                "url": "/notification?id=42",
            })
        );
    }

    #[test]
    fn notification_status__should_be_failed_without_successes() {
        assert_eq!(
            NotificationStatus::from_report(&DeliveryReport { sent: 0, failed: 0 }),
            NotificationStatus::Failed
        );
        assert_eq!(
            NotificationStatus::from_report(&DeliveryReport { sent: 0, failed: 3 }),
            NotificationStatus::Failed
        );
        assert_eq!(
            NotificationStatus::from_report(&DeliveryReport { sent: 1, failed: 3 }),
            NotificationStatus::Sent
        );
    }

    #[test]
    fn notification_status__should_round_trip_wire_names() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
        ] {
            assert_eq!(NotificationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(NotificationStatus::parse("all"), None);
    }
}
