use std::sync::Arc;

use futures::StreamExt;
use futures::stream;

use crate::error::EngineError;
use crate::ports::{DeliveryError, PushSender, RecordStore};
use crate::push::keys::KeyStore;
use crate::push::registry::SubscriptionRegistry;
use crate::types::push::{
    DeliveryReport, PushPayload, SigningKeyPair, Subscription, SubscriptionId,
};

const ENDPOINT_LOG_PREFIX: usize = 30;

pub(crate) fn endpoint_prefix(endpoint: &str) -> &str {
    match endpoint.char_indices().nth(ENDPOINT_LOG_PREFIX) {
        Some((index, _)) => &endpoint[..index],
        None => endpoint,
    }
}

/// Delivers one payload to many subscribers, isolating each attempt.
pub(crate) struct Fanout<S, P> {
    keys: Arc<KeyStore<S>>,
    registry: Arc<SubscriptionRegistry<S>>,
    sender: P,
    concurrency: usize,
}

impl<S, P> Fanout<S, P>
where
    S: RecordStore,
    P: PushSender,
{
    pub(crate) fn new(
        keys: Arc<KeyStore<S>>,
        registry: Arc<SubscriptionRegistry<S>>,
        sender: P,
        concurrency: usize,
    ) -> Self {
        Self {
            keys,
            registry,
            sender,
            concurrency: concurrency.max(1),
        }
    }

    /// Pushes `payload` to every subscriber and prunes those the push service
    /// reports as permanently invalid, in one removal after the pass.
    ///
    /// `sent + failed` always equals `subscribers.len()`.
    pub(crate) async fn deliver(
        &self,
        payload: &PushPayload,
        subscribers: &[Subscription],
    ) -> Result<DeliveryReport, EngineError> {
        if subscribers.is_empty() {
            tracing::info!("no subscriptions to deliver to");
            return Ok(DeliveryReport::default());
        }

        let signing_key = self.keys.get()?.ok_or(EngineError::MissingSigningKey)?;
        let body = serde_json::to_vec(payload)
            .map_err(|err| EngineError::InvalidInput(format!("unserializable payload: {err}")))?;

        let attempts: Vec<_> = subscribers
            .iter()
            .map(|subscription| self.attempt(&signing_key, subscription, &body))
            .collect();
        let outcomes: Vec<(&Subscription, Result<(), DeliveryError>)> = stream::iter(attempts)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = DeliveryReport::default();
        let mut dead: Vec<SubscriptionId> = Vec::new();
        for (subscription, outcome) in outcomes {
            match outcome {
                Ok(()) => report.sent += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        endpoint = endpoint_prefix(&subscription.endpoint),
                        error = %err,
                        "push delivery failed"
                    );
                    if err.is_permanent() {
                        tracing::info!(
                            endpoint = endpoint_prefix(&subscription.endpoint),
                            "removing invalid subscription"
                        );
                        dead.push(subscription.id);
                    }
                }
            }
        }

        // Deliveries already went out; a failed prune is retried by the next pass.
        if let Err(err) = self.registry.remove(&dead) {
            tracing::error!(error = %err, count = dead.len(), "failed to remove invalid subscriptions");
        }

        tracing::info!(
            sent = report.sent,
            failed = report.failed,
            "notification fanout finished"
        );
        Ok(report)
    }

    async fn attempt<'a>(
        &'a self,
        signing_key: &'a SigningKeyPair,
        subscription: &'a Subscription,
        body: &'a [u8],
    ) -> (&'a Subscription, Result<(), DeliveryError>) {
        let outcome = self.sender.send(signing_key, subscription, body).await;
        (subscription, outcome)
    }
}
