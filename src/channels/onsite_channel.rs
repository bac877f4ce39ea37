//! channels/onsite_channel.rs
//! Canal on-site: deja el mensaje en la bandeja interna (`site_messages`).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::channels::{ChannelAdapter, SendResult};
use crate::models::{format_ts, queue_model::{Channel, QueueItem}};

#[derive(Clone)]
pub struct OnSiteChannel {
    db_pool: Pool<Sqlite>,
}

impl OnSiteChannel {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ChannelAdapter for OnSiteChannel {
    fn channel(&self) -> Channel {
        Channel::OnSite
    }

    async fn send(&self, item: &QueueItem) -> SendResult {
        let message_id = Uuid::new_v4().to_string();
        let metadata = item.payload.metadata.to_string();

        // queue_item_id es UNIQUE: un reintento no duplica el mensaje en la bandeja
        let res = sqlx::query(
            r#"
            INSERT OR IGNORE INTO site_messages (
                id, queue_item_id, recipient_id, title, body, metadata, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&message_id)
        .bind(&item.id)
        .bind(&item.recipient_id)
        .bind(&item.payload.title)
        .bind(&item.payload.body)
        .bind(metadata)
        .bind(format_ts(Utc::now()))
        .execute(&self.db_pool)
        .await;

        match res {
            Ok(_) => SendResult::Accepted(None),
            Err(e) => {
                log::error!(
                    "(onsite_send) No se pudo guardar el mensaje on-site item={}: {:?}",
                    item.id,
                    e
                );
                SendResult::TransientError(format!("site message insert failed: {e}"))
            }
        }
    }
}
