use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::lead_lists::model::{LeadList, LeadListStatus};

#[derive(Clone)]
pub struct LeadListsRepo {
    pool: PgPool,
}

impl LeadListsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get(&self, id: Uuid) -> sqlx::Result<Option<LeadList>> {
        sqlx::query_as::<_, LeadList>("SELECT * FROM lead_lists WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Page-numbered listing, newest first, with a total count.
    ///
    /// - `status` filters exactly; `q` searches the name
    /// - `page` is 1-based; `page_size` is clamped to [1, 100]
    pub async fn list(
        &self,
        status: Option<LeadListStatus>,
        q: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> sqlx::Result<(Vec<LeadList>, i64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let status = status.map(|s| s.as_str());
        let pattern = q.map(|q| format!("%{}%", q.trim()));

        let items = match (status, pattern.as_deref()) {
            (Some(st), Some(p)) => {
                sqlx::query_as::<_, LeadList>(
                    r#"
                    SELECT * FROM lead_lists
                    WHERE status = $1 AND name ILIKE $2
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(st)
                .bind(p)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(st), None) => {
                sqlx::query_as::<_, LeadList>(
                    r#"
                    SELECT * FROM lead_lists
                    WHERE status = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(st)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(p)) => {
                sqlx::query_as::<_, LeadList>(
                    r#"
                    SELECT * FROM lead_lists
                    WHERE name ILIKE $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(p)
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query_as::<_, LeadList>(
                    r#"
                    SELECT * FROM lead_lists
                    ORDER BY created_at DESC, id DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(page_size)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let total: i64 = match (status, pattern.as_deref()) {
            (Some(st), Some(p)) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lead_lists WHERE status = $1 AND name ILIKE $2")
                    .bind(st)
                    .bind(p)
                    .fetch_one(&self.pool)
                    .await?
            }
            (Some(st), None) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lead_lists WHERE status = $1")
                    .bind(st)
                    .fetch_one(&self.pool)
                    .await?
            }
            (None, Some(p)) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lead_lists WHERE name ILIKE $1")
                    .bind(p)
                    .fetch_one(&self.pool)
                    .await?
            }
            (None, None) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lead_lists")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok((items, total))
    }

    /// Counts per status for the metrics endpoint:
    /// (pending, processing, completed, failed).
    pub async fn metrics_snapshot(&self) -> sqlx::Result<(i64, i64, i64, i64)> {
        let mut counts = [0i64; 4];
        for (i, status) in ["pending", "processing", "completed", "failed"]
            .iter()
            .enumerate()
        {
            counts[i] = sqlx::query_scalar("SELECT COUNT(*) FROM lead_lists WHERE status = $1")
                .bind(*status)
                .fetch_one(&self.pool)
                .await?;
        }
        Ok((counts[0], counts[1], counts[2], counts[3]))
    }

    // ----------------------------
    // Dispatch-side writes
    // ----------------------------

    pub async fn insert_on(conn: &mut PgConnection, lead_list: &LeadList) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lead_lists
                (id, name, source_url, status, processed_count, error_message,
                 correlation_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(lead_list.id)
        .bind(&lead_list.name)
        .bind(&lead_list.source_url)
        .bind(&lead_list.status)
        .bind(lead_list.processed_count)
        .bind(&lead_list.error_message)
        .bind(lead_list.correlation_id)
        .bind(lead_list.created_at)
        .bind(lead_list.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update_details(
        &self,
        id: Uuid,
        name: &str,
        source_url: &str,
    ) -> sqlx::Result<Option<LeadList>> {
        sqlx::query_as::<_, LeadList>(
            r#"
            UPDATE lead_lists
            SET name = $2, source_url = $3, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(source_url)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(&self, id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query("DELETE FROM lead_lists WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Reset a failed record for another run: back to pending, counters
    /// cleared, fresh correlation id. Part of the dispatch transaction;
    /// the status predicate keeps two concurrent reprocess calls from
    /// both dispatching.
    pub async fn reset_for_reprocess_on(
        conn: &mut PgConnection,
        id: Uuid,
        new_correlation_id: Uuid,
    ) -> sqlx::Result<Option<LeadList>> {
        sqlx::query_as::<_, LeadList>(
            r#"
            UPDATE lead_lists
            SET status = $2,
                processed_count = 0,
                error_message = NULL,
                correlation_id = $3,
                updated_at = now()
            WHERE id = $1 AND status = 'failed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(LeadListStatus::Pending.as_str())
        .bind(new_correlation_id)
        .fetch_optional(conn)
        .await
    }

    // ----------------------------
    // Worker-side transitions
    // ----------------------------
    //
    // Every transition is guarded by the live correlation id. A stale
    // worker (superseded by a reprocess) matches zero rows and its write
    // is silently dropped, which is exactly what must happen.

    pub async fn mark_processing(&self, id: Uuid, correlation_id: Uuid) -> sqlx::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE lead_lists
            SET status = $3, updated_at = now()
            WHERE id = $1 AND correlation_id = $2
            "#,
        )
        .bind(id)
        .bind(correlation_id)
        .bind(LeadListStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn mark_completed(
        &self,
        id: Uuid,
        correlation_id: Uuid,
        processed_count: i32,
    ) -> sqlx::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE lead_lists
            SET status = $3,
                processed_count = $4,
                error_message = NULL,
                updated_at = now()
            WHERE id = $1 AND correlation_id = $2
            "#,
        )
        .bind(id)
        .bind(correlation_id)
        .bind(LeadListStatus::Completed.as_str())
        .bind(processed_count)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn mark_failed(
        &self,
        id: Uuid,
        correlation_id: Uuid,
        error_message: &str,
    ) -> sqlx::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE lead_lists
            SET status = $3, error_message = $4, updated_at = now()
            WHERE id = $1 AND correlation_id = $2
            "#,
        )
        .bind(id)
        .bind(correlation_id)
        .bind(LeadListStatus::Failed.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}

/// Build a fresh pending record for dispatch.
pub fn new_pending(name: &str, source_url: &str) -> LeadList {
    let now = Utc::now();
    LeadList {
        id: Uuid::new_v4(),
        name: name.trim().to_string(),
        source_url: source_url.trim().to_string(),
        status: LeadListStatus::Pending.as_str().to_string(),
        processed_count: 0,
        error_message: None,
        correlation_id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    }
}
