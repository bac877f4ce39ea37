//! services/queue_store_service.rs
//! Acceso a la cola persistente (queue_items) y a los registros de estado de entrega.
//! Toda transición de `status` es un UPDATE condicional sobre el estado previo esperado.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Executor, Pool, Sqlite};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{
    delivery_status_model::{
        DeliveryStatusRecord, PendingStatusCheck, PendingStatusCheckRow, ReportedStatus,
    },
    format_ts, parse_opt_ts, parse_ts,
    queue_model::{Channel, NewQueueItem, QueueItem, QueueItemRow, QueueStatus},
};

const QUEUE_ITEM_COLUMNS: &str = r#"
    id, channel, recipient_id, sender_id, store_id, payload, status, send_tries,
    created_at, updated_at, sent_at, is_deleted_by_recipient, external_ref, last_error
"#;

#[derive(Clone, Debug)]
pub struct QueueStoreService {
    db_pool: Pool<Sqlite>,
}

impl QueueStoreService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        QueueStoreService { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Failed to run queue store migrations")?;
        Ok(())
    }

    // ========================================================================
    // queue_items
    // ========================================================================

    /// Inserta un item nuevo en estado pending.
    pub async fn enqueue(&self, new_item: NewQueueItem) -> Result<QueueItem> {
        let item = pending_item(new_item, Utc::now());
        insert_item(&self.db_pool, &item).await?;
        Ok(item)
    }

    /// Inserta varios items en una sola transacción: o entran todos o ninguno.
    pub async fn enqueue_all(&self, new_items: Vec<NewQueueItem>) -> Result<Vec<QueueItem>> {
        let now = Utc::now();
        let items: Vec<QueueItem> = new_items
            .into_iter()
            .map(|new_item| pending_item(new_item, now))
            .collect();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Failed to begin enqueue transaction")?;
        for item in &items {
            insert_item(&mut *tx, item).await?;
        }
        tx.commit()
            .await
            .context("Failed to commit enqueue transaction")?;

        Ok(items)
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {QUEUE_ITEM_COLUMNS} FROM queue_items WHERE id = ?1");
        let row = sqlx::query_as::<_, QueueItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Failed to load queue item")?;

        row.map(QueueItem::try_from).transpose()
    }

    /// Cantidad de items despachables por canal.
    pub async fn pending_counts(&self, max_tries: u32) -> Result<HashMap<Channel, u64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT channel, COUNT(*)
            FROM queue_items
            WHERE status = 'pending'
              AND is_deleted_by_recipient = 0
              AND send_tries < ?1
            GROUP BY channel
            "#,
        )
        .bind(i64::from(max_tries))
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to count pending queue items")?;

        let mut counts = HashMap::new();
        for (channel, count) in rows {
            counts.insert(channel.parse()?, u64::try_from(count)?);
        }
        Ok(counts)
    }

    /// Selección FIFO por canal. No bloquea: el claim posterior decide quién procesa.
    pub async fn select_pending(
        &self,
        channel: Channel,
        limit: u32,
        max_tries: u32,
    ) -> Result<Vec<QueueItem>> {
        let sql = format!(
            r#"
            SELECT {QUEUE_ITEM_COLUMNS}
            FROM queue_items
            WHERE channel = ?1
              AND status = 'pending'
              AND is_deleted_by_recipient = 0
              AND send_tries < ?2
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?3
            "#
        );
        let rows = sqlx::query_as::<_, QueueItemRow>(&sql)
            .bind(channel.as_str())
            .bind(i64::from(max_tries))
            .bind(i64::from(limit))
            .fetch_all(&self.db_pool)
            .await
            .with_context(|| format!("Failed to select pending items for {channel}"))?;

        rows.into_iter().map(QueueItem::try_from).collect()
    }

    /// pending -> in_flight, incrementando send_tries antes del envío.
    /// Devuelve false si otro proceso ganó el claim.
    pub async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'in_flight',
                send_tries = send_tries + 1,
                updated_at = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(format_ts(now))
        .execute(&self.db_pool)
        .await
        .context("Failed to claim queue item")?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn mark_sent(
        &self,
        id: &str,
        external_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let ts = format_ts(now);
        let res = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = 'sent',
                sent_at = ?2,
                updated_at = ?2,
                external_ref = ?3,
                last_error = NULL
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(id)
        .bind(ts)
        .bind(external_ref)
        .execute(&self.db_pool)
        .await
        .context("Failed to mark queue item as sent")?;

        Ok(res.rows_affected() == 1)
    }

    pub async fn mark_failed(&self, id: &str, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        self.transition_from_in_flight(id, QueueStatus::Failed, reason, now)
            .await
    }

    /// Devuelve el item a pending para el próximo ciclo (error transitorio).
    pub async fn release(&self, id: &str, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        self.transition_from_in_flight(id, QueueStatus::Pending, reason, now)
            .await
    }

    async fn transition_from_in_flight(
        &self,
        id: &str,
        status: QueueStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = ?2,
                last_error = ?3,
                updated_at = ?4
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reason)
        .bind(format_ts(now))
        .execute(&self.db_pool)
        .await
        .with_context(|| format!("Failed to move queue item to {status}"))?;

        Ok(res.rows_affected() == 1)
    }

    /// Claims abandonados (crash a mitad de envío) vuelven a pending.
    /// El intento ya quedó contado en send_tries; si era el último, el item pasa a failed.
    pub async fn release_stale_claims(&self, cutoff: DateTime<Utc>, max_tries: u32) -> Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE queue_items
            SET status = CASE WHEN send_tries >= ?3 THEN 'failed' ELSE 'pending' END,
                last_error = CASE
                    WHEN send_tries >= ?3 THEN 'claim expired after max attempts (' || ?3 || ')'
                    ELSE 'claim expired'
                END,
                updated_at = ?2
            WHERE status = 'in_flight' AND updated_at < ?1
            "#,
        )
        .bind(format_ts(cutoff))
        .bind(format_ts(Utc::now()))
        .bind(i64::from(max_tries))
        .execute(&self.db_pool)
        .await
        .context("Failed to release stale claims")?;

        Ok(res.rows_affected())
    }

    /// Borrado lógico por parte del destinatario.
    pub async fn mark_deleted_by_recipient(&self, id: &str, recipient_id: &str) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE queue_items
            SET is_deleted_by_recipient = 1,
                updated_at = ?3
            WHERE id = ?1 AND recipient_id = ?2
            "#,
        )
        .bind(id)
        .bind(recipient_id)
        .bind(format_ts(Utc::now()))
        .execute(&self.db_pool)
        .await
        .context("Failed to soft delete queue item")?;

        Ok(res.rows_affected() == 1)
    }

    /// Borrado físico de items terminales que el destinatario ya descartó.
    /// Un item con registro de estado de entrega se conserva.
    pub async fn purge_deleted(&self) -> Result<u64> {
        let res = sqlx::query(
            r#"
            DELETE FROM queue_items
            WHERE is_deleted_by_recipient = 1
              AND status IN ('sent', 'failed', 'cancelled')
              AND NOT EXISTS (
                  SELECT 1 FROM delivery_status d WHERE d.queue_item_id = queue_items.id
              )
            "#,
        )
        .execute(&self.db_pool)
        .await
        .context("Failed to purge queue items")?;

        Ok(res.rows_affected())
    }

    // ========================================================================
    // delivery_status
    // ========================================================================

    pub async fn create_delivery_status(&self, queue_item_id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO delivery_status (queue_item_id, reported_status, created_at)
            VALUES (?1, 'queued', ?2)
            "#,
        )
        .bind(queue_item_id)
        .bind(format_ts(now))
        .execute(&self.db_pool)
        .await
        .context("Failed to create delivery status record")?;

        Ok(())
    }

    pub async fn get_delivery_status(&self, queue_item_id: &str) -> Result<Option<DeliveryStatusRecord>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>, String)>(
            r#"
            SELECT queue_item_id, reported_status, last_checked_at, raw_provider_payload, created_at
            FROM delivery_status
            WHERE queue_item_id = ?1
            "#,
        )
        .bind(queue_item_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to load delivery status record")?;

        row.map(
            |(queue_item_id, status, checked, raw, created)| -> Result<DeliveryStatusRecord> {
            Ok(DeliveryStatusRecord {
                queue_item_id,
                reported_status: status.parse()?,
                last_checked_at: parse_opt_ts(checked)?,
                raw_provider_payload: raw,
                created_at: parse_ts(&created)?,
            })
            },
        )
        .transpose()
    }

    /// Registros todavía no terminales, los menos consultados primero.
    pub async fn list_open_status_checks(&self, limit: u32) -> Result<Vec<PendingStatusCheck>> {
        let rows = sqlx::query_as::<_, PendingStatusCheckRow>(
            r#"
            SELECT d.queue_item_id, d.reported_status, d.last_checked_at,
                   d.raw_provider_payload, d.created_at, q.channel, q.external_ref
            FROM delivery_status d
            JOIN queue_items q ON q.id = d.queue_item_id
            WHERE d.reported_status IN ('queued', 'unknown')
              AND q.external_ref IS NOT NULL
            ORDER BY COALESCE(d.last_checked_at, '') ASC, d.created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to list open delivery status records")?;

        rows.into_iter().map(PendingStatusCheck::try_from).collect()
    }

    /// Actualiza el estado reportado; un registro terminal ya no se toca.
    pub async fn update_delivery_status(
        &self,
        queue_item_id: &str,
        status: ReportedStatus,
        raw: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE delivery_status
            SET reported_status = ?2,
                raw_provider_payload = COALESCE(?3, raw_provider_payload),
                last_checked_at = ?4
            WHERE queue_item_id = ?1
              AND reported_status IN ('queued', 'unknown')
            "#,
        )
        .bind(queue_item_id)
        .bind(status.as_str())
        .bind(raw)
        .bind(format_ts(now))
        .execute(&self.db_pool)
        .await
        .context("Failed to update delivery status record")?;

        Ok(res.rows_affected() == 1)
    }

    /// Solo marca la consulta (p.e. el proveedor no respondió).
    pub async fn touch_delivery_status(&self, queue_item_id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE delivery_status SET last_checked_at = ?2 WHERE queue_item_id = ?1")
            .bind(queue_item_id)
            .bind(format_ts(now))
            .execute(&self.db_pool)
            .await
            .context("Failed to touch delivery status record")?;

        Ok(())
    }
}

fn pending_item(new_item: NewQueueItem, now: DateTime<Utc>) -> QueueItem {
    QueueItem {
        id: Uuid::new_v4().to_string(),
        channel: new_item.channel,
        recipient_id: new_item.recipient_id,
        sender_id: new_item.sender_id,
        store_id: new_item.store_id,
        payload: new_item.payload,
        status: QueueStatus::Pending,
        send_tries: 0,
        created_at: now,
        updated_at: now,
        sent_at: None,
        is_deleted_by_recipient: false,
        external_ref: None,
        last_error: None,
    }
}

async fn insert_item<'e, E>(executor: E, item: &QueueItem) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let payload_json = serde_json::to_string(&item.payload)?;
    sqlx::query(
        r#"
        INSERT INTO queue_items (
            id, channel, recipient_id, sender_id, store_id, payload,
            status, send_tries, created_at, updated_at, is_deleted_by_recipient
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?7, 0)
        "#,
    )
    .bind(&item.id)
    .bind(item.channel.as_str())
    .bind(&item.recipient_id)
    .bind(&item.sender_id)
    .bind(&item.store_id)
    .bind(payload_json)
    .bind(format_ts(item.created_at))
    .execute(executor)
    .await
    .context("Failed to insert queue item")?;
    Ok(())
}
