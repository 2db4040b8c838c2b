use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::ports;
use crate::ports::DeliveryError;
use crate::types::push::{SigningKeyPair, Subscription};

mod store;

pub use store::JsonFileStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimeProvider;

impl ports::TimeProvider for TokioTimeProvider {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}

#[derive(Clone)]
pub struct WebPushSender {
    client: Arc<web_push::WebPushClient>,
    ttl: u32,
    timeout: Duration,
}

impl WebPushSender {
    pub fn new(ttl: u32, timeout: Duration) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            client: Arc::new(client),
            ttl,
            timeout,
        })
    }

    fn build_message(
        &self,
        signing_key: &SigningKeyPair,
        subscription_info: &web_push::SubscriptionInfo,
        payload: &[u8],
    ) -> Result<web_push::WebPushMessage, web_push::WebPushError> {
        let mut builder = web_push::WebPushMessageBuilder::new(subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(self.ttl);
        let mut signature_builder = signature_builder(signing_key, subscription_info)?;
        signature_builder.add_claim("sub", signing_key.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        builder.build()
    }
}

fn signature_builder<'a>(
    signing_key: &SigningKeyPair,
    subscription_info: &'a web_push::SubscriptionInfo,
) -> Result<web_push::VapidSignatureBuilder<'a>, web_push::WebPushError> {
    let private_key = signing_key.private_key.trim();
    if private_key.starts_with("-----BEGIN") {
        web_push::VapidSignatureBuilder::from_pem(private_key.as_bytes(), subscription_info)
    } else {
        web_push::VapidSignatureBuilder::from_base64(
            private_key,
            web_push::URL_SAFE_NO_PAD,
            subscription_info,
        )
    }
}

fn classify(err: web_push::WebPushError) -> DeliveryError {
    use web_push::WebPushError;

    match &err {
        WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. } => {
            DeliveryError::Gone(err.to_string())
        }
        // 403 reaches us as `Other` carrying the status line.
        WebPushError::Other(status) if is_forbidden(status) => {
            DeliveryError::Gone(format!("forbidden: {status}"))
        }
        _ => DeliveryError::Rejected(err.to_string()),
    }
}

fn is_forbidden(status: &str) -> bool {
    status.trim_start().starts_with("403")
}

impl ports::PushSender for WebPushSender {
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>
    where
        Self: 'a;

    fn send<'a>(
        &'a self,
        signing_key: &'a SigningKeyPair,
        subscription: &'a Subscription,
        payload: &'a [u8],
    ) -> Self::Fut<'a> {
        Box::pin(async move {
            let subscription_info = web_push::SubscriptionInfo::new(
                subscription.endpoint.clone(),
                subscription.p256dh.clone(),
                subscription.auth.clone(),
            );
            let message = self
                .build_message(signing_key, &subscription_info, payload)
                .map_err(|err| DeliveryError::Rejected(err.to_string()))?;
            match tokio::time::timeout(self.timeout, self.client.send(message)).await {
                Ok(result) => result.map_err(classify),
                Err(_) => Err(DeliveryError::TimedOut(self.timeout)),
            }
        })
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn classify__should_treat_gone_and_unknown_endpoints_as_permanent() {
        assert!(classify(web_push::WebPushError::EndpointNotValid).is_permanent());
        assert!(classify(web_push::WebPushError::EndpointNotFound).is_permanent());
        assert!(classify(web_push::WebPushError::Other("403".to_string())).is_permanent());
        assert!(
            classify(web_push::WebPushError::Other("403 Forbidden".to_string())).is_permanent()
        );
    }

    #[test]
    fn classify__should_keep_subscription_when_signature_is_rejected() {
        assert!(!classify(web_push::WebPushError::Unauthorized).is_permanent());
        assert!(!classify(web_push::WebPushError::Other("429".to_string())).is_permanent());
    }

    #[test]
    fn classify__should_treat_other_failures_as_transient() {
        assert!(!classify(web_push::WebPushError::InvalidResponse).is_permanent());
        assert!(!classify(web_push::WebPushError::PayloadTooLarge).is_permanent());
        assert!(!classify(web_push::WebPushError::InvalidCryptoKeys).is_permanent());
    }
}
