//! Push delivery.
//!
//! [`PushService`] is the seam: the API hands it a stored subscription and
//! a payload, it talks to the browser vendor's push relay. [`WebPush`] is the
//! real thing (RFC 8291 `aes128gcm` payload encryption, RFC 8292 VAPID);
//! tests substitute their own.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, VapidSignatureBuilder,
    WebPushClient, WebPushError, WebPushMessageBuilder,
};

use crate::vapid::{KeyError, VapidKey};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("stored subscription is not usable: {0}")]
    InvalidSubscription(#[from] serde_json::Error),

    #[error("{0}")]
    Relay(#[from] WebPushError),
}

/// Delivers one notification to one subscription. No retries.
#[async_trait]
pub trait PushService: Send + Sync {
    async fn send(&self, subscription: &Value, payload: &[u8]) -> Result<(), PushError>;
}

/// The shared-resource form of a push service.
pub type Pusher = Box<dyn PushService>;

/// Web Push over HTTPS, signed with the server's VAPID key.
pub struct WebPush {
    pem: String,
    subject: String,
    client: HyperWebPushClient,
}

impl WebPush {
    /// `subject` is the contact claim push services may use to reach the
    /// operator, usually a `mailto:` URI.
    pub fn new(key: &VapidKey, subject: impl Into<String>) -> Result<Self, KeyError> {
        Ok(Self { pem: key.to_pem()?, subject: subject.into(), client: HyperWebPushClient::new() })
    }
}

#[async_trait]
impl PushService for WebPush {
    async fn send(&self, subscription: &Value, payload: &[u8]) -> Result<(), PushError> {
        let info: SubscriptionInfo = serde_json::from_value(subscription.clone())?;

        let mut signature = VapidSignatureBuilder::from_pem(self.pem.as_bytes(), &info)?;
        signature.add_claim("sub", self.subject.as_str());

        let mut message = WebPushMessageBuilder::new(&info);
        message.set_payload(ContentEncoding::Aes128Gcm, payload);
        message.set_vapid_signature(signature.build()?);

        self.client.send(message.build()?).await?;
        debug!(endpoint = %info.endpoint, bytes = payload.len(), "notification delivered to relay");
        Ok(())
    }
}
