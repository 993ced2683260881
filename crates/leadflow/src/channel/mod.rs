pub mod codec;
pub mod consumer;
pub mod delay;
pub mod publisher;
pub mod topic;

pub use codec::{decode_created_msg, DecodeError};
pub use consumer::{Consumer, Delivery};
pub use delay::RetryPublisher;
pub use publisher::{publish_message, Publisher};

use sqlx::PgPool;

use crate::config::ChannelSettings;

/// Declare the channel topology: the worker queue bound to the primary
/// exchange and to the retry exchange under the configured routing key.
/// Idempotent; run at server startup.
pub async fn declare_topology(pool: &PgPool, settings: &ChannelSettings) -> anyhow::Result<()> {
    for exchange in [&settings.exchange, &settings.retry_exchange] {
        sqlx::query(
            r#"
            INSERT INTO channel_bindings (queue, exchange, routing_key)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&settings.queue)
        .bind(exchange)
        .bind(&settings.routing_key)
        .execute(pool)
        .await?;
    }

    tracing::info!(
        exchange = %settings.exchange,
        retry_exchange = %settings.retry_exchange,
        queue = %settings.queue,
        routing_key = %settings.routing_key,
        "channel topology declared"
    );

    Ok(())
}
