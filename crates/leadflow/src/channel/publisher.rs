use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::channel::topic::topic_matches;

/// Publishes messages to a topic exchange.
///
/// A publish fans the serialized body out to every queue bound to the
/// exchange under a pattern matching the routing key; each copy is a
/// durable row. With no matching binding the message is dropped, which is
/// what a topic exchange does.
#[derive(Clone)]
pub struct Publisher {
    pool: PgPool,
}

impl Publisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        msg: &T,
    ) -> anyhow::Result<u32> {
        let body = serde_json::to_string(msg)?;
        let mut tx = self.pool.begin().await?;
        let n = publish_message(&mut tx, exchange, routing_key, &body, Utc::now()).await?;
        tx.commit().await?;
        Ok(n)
    }

    /// Publish with a future visibility time; consumers will not see the
    /// message before `now() + delay`.
    pub async fn publish_delayed<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        msg: &T,
        delay: std::time::Duration,
    ) -> anyhow::Result<u32> {
        let body = serde_json::to_string(msg)?;
        let available_at = Utc::now() + Duration::milliseconds(delay.as_millis() as i64);
        let mut tx = self.pool.begin().await?;
        let n = publish_message(&mut tx, exchange, routing_key, &body, available_at).await?;
        tx.commit().await?;
        Ok(n)
    }
}

/// Publish on an existing connection or transaction.
///
/// Dispatch uses this inside its record-store transaction so the record
/// and its message commit or roll back together.
pub async fn publish_message(
    conn: &mut PgConnection,
    exchange: &str,
    routing_key: &str,
    body: &str,
    available_at: DateTime<Utc>,
) -> anyhow::Result<u32> {
    let bindings = sqlx::query(
        r#"
        SELECT queue, routing_key
        FROM channel_bindings
        WHERE exchange = $1
        "#,
    )
    .bind(exchange)
    .fetch_all(&mut *conn)
    .await?;

    let mut published = 0u32;
    for row in bindings {
        let queue: String = row.get("queue");
        let pattern: String = row.get("routing_key");
        if !topic_matches(&pattern, routing_key) {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO channel_messages (id, queue, exchange, routing_key, body, available_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&queue)
        .bind(exchange)
        .bind(routing_key)
        .bind(body)
        .bind(available_at)
        .execute(&mut *conn)
        .await?;

        published += 1;
    }

    if published == 0 {
        tracing::debug!(exchange, routing_key, "no binding matched; message dropped");
    }

    Ok(published)
}
