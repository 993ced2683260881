use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::config::ChannelSettings;
use crate::db;

/// One leased message. Invisible to other consumers until acked, nacked,
/// or the visibility window lapses.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub body: String,
    pub delivery_count: i32,
}

impl Delivery {
    /// True once the broker has handed this message out more than once.
    pub fn redelivered(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Pull-based consumer over one durable queue.
///
/// Leasing uses `FOR UPDATE SKIP LOCKED` plus a visibility window, so a
/// crashed consumer releases its messages by timeout rather than holding
/// them forever. At-least-once: a message can be seen again after a
/// requeue or an expired window.
#[derive(Clone)]
pub struct Consumer {
    pool: PgPool,
    queue: String,
    visibility_secs: i64,
    prefetch_count: u32,
    in_flight: Arc<AtomicU32>,
}

impl Consumer {
    /// Connect to the broker and verify the connection is usable.
    pub async fn connect(settings: &ChannelSettings) -> anyhow::Result<Self> {
        let pool = db::make_pool(&settings.database_url).await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self::with_pool(pool, settings))
    }

    pub fn with_pool(pool: PgPool, settings: &ChannelSettings) -> Self {
        Self {
            pool,
            queue: settings.queue.clone(),
            visibility_secs: settings.visibility_secs,
            prefetch_count: settings.prefetch_count as u32,
            in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Lease the oldest visible message, if any.
    ///
    /// Returns `None` when the queue is empty or the prefetch window is
    /// full (unacked deliveries count against it).
    pub async fn fetch_one(&self) -> anyhow::Result<Option<Delivery>> {
        if self.in_flight.load(Ordering::SeqCst) >= self.prefetch_count {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query(
            r#"
            SELECT id
            FROM channel_messages
            WHERE queue = $1
              AND available_at <= now()
              AND (locked_until IS NULL OR locked_until < now())
            ORDER BY available_at ASC, published_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(&self.queue)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };
        let id: Uuid = row.get("id");

        let leased = sqlx::query(
            r#"
            UPDATE channel_messages
            SET locked_until = now() + ($2::bigint * interval '1 second'),
                delivery_count = delivery_count + 1
            WHERE id = $1
            RETURNING id, body, delivery_count
            "#,
        )
        .bind(id)
        .bind(self.visibility_secs)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        Ok(Some(Delivery {
            id: leased.get("id"),
            body: leased.get("body"),
            delivery_count: leased.get("delivery_count"),
        }))
    }

    /// Acknowledge: the message is consumed and removed for good.
    pub async fn ack(&self, delivery: &Delivery) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM channel_messages WHERE id = $1")
            .bind(delivery.id)
            .execute(&self.pool)
            .await?;
        self.release_slot();
        Ok(())
    }

    /// Negative-acknowledge. `requeue` makes the message immediately
    /// visible again for any consumer, at the back of the queue, so a
    /// consumer skipping someone else's message cannot starve behind it.
    /// Without `requeue` the message is rejected permanently (poison, or
    /// already consumed elsewhere).
    pub async fn nack(&self, delivery: &Delivery, requeue: bool) -> anyhow::Result<()> {
        if requeue {
            sqlx::query(
                "UPDATE channel_messages SET locked_until = NULL, available_at = now() WHERE id = $1",
            )
            .bind(delivery.id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM channel_messages WHERE id = $1")
                .bind(delivery.id)
                .execute(&self.pool)
                .await?;
        }
        self.release_slot();
        Ok(())
    }

    fn release_slot(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Release the broker connection. Single-shot workers call this on
    /// their way out.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
