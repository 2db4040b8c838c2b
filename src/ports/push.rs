use std::time::Duration;

use crate::types::push::{SigningKeyPair, Subscription};

/// Outcome of a single push attempt that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The push service reports the endpoint as gone, unknown or forbidden.
    #[error("subscription no longer valid: {0}")]
    Gone(String),
    #[error("push attempt timed out after {0:?}")]
    TimedOut(Duration),
    #[error("push rejected: {0}")]
    Rejected(String),
}

impl DeliveryError {
    /// Permanent failures prune the subscription; everything else leaves it in place.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Gone(_))
    }
}

pub trait PushSender: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = Result<(), DeliveryError>> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(
        &'a self,
        signing_key: &'a SigningKeyPair,
        subscription: &'a Subscription,
        payload: &'a [u8],
    ) -> Self::Fut<'a>;
}
