use std::time::Duration;

use serde::Serialize;

use crate::channel::publisher::Publisher;
use crate::config::ChannelSettings;

/// Delayed redelivery through the retry exchange.
///
/// A message republished here carries a time-to-live: it is routed through
/// the retry exchange's bindings (same routing keys as the primary
/// exchange) and only becomes visible to consumers once the TTL expires.
/// That gives "retry this later" semantics with no external scheduler.
#[derive(Clone)]
pub struct RetryPublisher {
    publisher: Publisher,
    retry_exchange: String,
}

impl RetryPublisher {
    pub fn new(publisher: Publisher, settings: &ChannelSettings) -> Self {
        Self {
            publisher,
            retry_exchange: settings.retry_exchange.clone(),
        }
    }

    /// Republish `msg` so it is redelivered after `ttl`.
    pub async fn publish_for_retry<T: Serialize>(
        &self,
        routing_key: &str,
        msg: &T,
        ttl: Duration,
    ) -> anyhow::Result<u32> {
        tracing::info!(
            exchange = %self.retry_exchange,
            routing_key,
            ttl_ms = ttl.as_millis() as u64,
            "scheduling delayed redelivery"
        );
        self.publisher
            .publish_delayed(&self.retry_exchange, routing_key, msg, ttl)
            .await
    }
}
