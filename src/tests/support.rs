//! tests/support.rs
//! Helpers compartidos: pool SQLite en memoria, adaptadores con guion y datos de ejemplo.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::channels::{ChannelAdapter, ChannelRegistry, SendResult};
use crate::config::engine_config::EngineConfig;
use crate::models::{
    delivery_status_model::StatusReport,
    event_model::{DisplayFields, EventType, NotificationEvent, Recipient},
    queue_model::{Channel, NewQueueItem, QueueItem, QueuePayload},
    reservation_model::Reservation,
};
use crate::services::{
    message_catalog_service::{MessageCatalog, StaticMessageCatalog},
    notification_router_service::NotificationRouterService,
    preference_service::PreferenceService, queue_store_service::QueueStoreService,
};

pub const CRON_SECRET: &str = "cron-secret-for-tests";
pub const ADMIN_KEY: &str = "admin-key-for-tests";

/// Una sola conexión: cada conexión nueva a `sqlite::memory:` sería otra base.
pub async fn test_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    QueueStoreService::new(pool.clone())
        .run_migrations()
        .await
        .expect("migrations");
    pool
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        cron_secret: Some(CRON_SECRET.to_string()),
        admin_api_key: Some(ADMIN_KEY.to_string()),
        max_send_tries: 3,
        ..EngineConfig::default()
    }
}

pub fn router(pool: &Pool<Sqlite>) -> NotificationRouterService {
    router_with_catalog(pool, Arc::new(catalog()))
}

pub fn router_with_catalog(
    pool: &Pool<Sqlite>,
    catalog: Arc<dyn MessageCatalog>,
) -> NotificationRouterService {
    NotificationRouterService::new(
        QueueStoreService::new(pool.clone()),
        PreferenceService::new(pool.clone()),
        catalog,
    )
}

pub fn catalog() -> StaticMessageCatalog {
    StaticMessageCatalog::new().expect("catalog templates")
}

/// Catálogo real al que le faltan las claves terminadas en `missing_suffix`
/// ("" = le faltan todas).
pub struct GappyCatalog {
    pub inner: StaticMessageCatalog,
    pub missing_suffix: &'static str,
}

impl MessageCatalog for GappyCatalog {
    fn locales(&self) -> Vec<&str> {
        self.inner.locales()
    }

    fn has_template(&self, locale: &str, key: &str) -> bool {
        !key.ends_with(self.missing_suffix) && self.inner.has_template(locale, key)
    }

    fn render_template(&self, locale: &str, key: &str, params: &serde_json::Value) -> Result<String> {
        self.inner.render_template(locale, key, params)
    }
}

pub fn gappy_catalog(missing_suffix: &'static str) -> Arc<dyn MessageCatalog> {
    Arc::new(GappyCatalog {
        inner: catalog(),
        missing_suffix,
    })
}

pub fn new_item(channel: Channel, title: &str) -> NewQueueItem {
    NewQueueItem {
        channel,
        recipient_id: "user-1".to_string(),
        sender_id: None,
        store_id: Some("store-1".to_string()),
        payload: QueuePayload {
            title: title.to_string(),
            body: format!("body of {title}"),
            address: Some("someone@example.com".to_string()),
            event_type: EventType::Created,
            reference_id: Some("res-1".to_string()),
            metadata: json!({}),
        },
    }
}

pub fn recipient() -> Recipient {
    Recipient {
        id: "user-1".to_string(),
        name: "Mika".to_string(),
        email: Some("mika@example.com".to_string()),
        line_user_id: Some("U123".to_string()),
        phone: Some("+886900000000".to_string()),
        push_token: Some("ExponentPushToken[abc]".to_string()),
        locale: "en".to_string(),
    }
}

pub fn event(event_type: EventType) -> NotificationEvent {
    NotificationEvent {
        event_type,
        reference_id: "res-1".to_string(),
        store_id: "store-1".to_string(),
        sender_id: Some("store-owner".to_string()),
        recipient: recipient(),
        display: DisplayFields {
            store_name: "Hair Lab".to_string(),
            customer_name: "Mika".to_string(),
            reserved_at: "2025-03-01 10:00 UTC".to_string(),
            service_name: Some("Cut".to_string()),
        },
    }
}

pub fn reservation(id: &str, reserved_at: DateTime<Utc>, status: &str) -> Reservation {
    Reservation {
        id: id.to_string(),
        store_id: "store-1".to_string(),
        store_name: "Hair Lab".to_string(),
        customer_id: format!("customer-{id}"),
        customer_name: "Mika".to_string(),
        customer_email: Some("mika@example.com".to_string()),
        customer_line_id: None,
        customer_phone: None,
        customer_push_token: None,
        locale: "ja-JP".to_string(),
        service_name: None,
        reserved_at,
        status: status.to_string(),
        reminded_at: None,
    }
}

/// Adaptador que responde según un guion; al agotarse repite `fallback`.
pub struct ScriptedChannel {
    channel: Channel,
    script: Mutex<VecDeque<SendResult>>,
    fallback: SendResult,
    reports_status: bool,
    status_reply: Mutex<Option<Result<Option<StatusReport>, String>>>,
    sent: Mutex<Vec<String>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedChannel {
    pub fn always(channel: Channel, result: SendResult) -> Arc<Self> {
        Arc::new(Self {
            channel,
            script: Mutex::new(VecDeque::new()),
            fallback: result,
            reports_status: false,
            status_reply: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub fn accepting(channel: Channel) -> Arc<Self> {
        Self::always(channel, SendResult::Accepted(None))
    }

    /// Acepta con `external_ref` y responde `check_status` con `reply`.
    pub fn with_status(
        channel: Channel,
        external_ref: &str,
        reply: Result<Option<StatusReport>, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel,
            script: Mutex::new(VecDeque::new()),
            fallback: SendResult::Accepted(Some(external_ref.to_string())),
            reports_status: true,
            status_reply: Mutex::new(Some(reply)),
            sent: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Acepta, pero tarda `delay` en responder.
    pub fn slow(channel: Channel, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            channel,
            script: Mutex::new(VecDeque::new()),
            fallback: SendResult::Accepted(None),
            reports_status: false,
            status_reply: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn sent_ids(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedChannel {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, item: &QueueItem) -> SendResult {
        self.sent.lock().unwrap().push(item.id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn reports_status(&self) -> bool {
        self.reports_status
    }

    async fn check_status(&self, _external_ref: &str) -> Result<Option<StatusReport>> {
        match self.status_reply.lock().unwrap().clone() {
            Some(Ok(report)) => Ok(report),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Ok(None),
        }
    }
}

pub fn registry_with(adapters: Vec<Arc<ScriptedChannel>>) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    registry
}

pub async fn count_status(pool: &Pool<Sqlite>, status: &str) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queue_items WHERE status = ?1")
        .bind(status)
        .fetch_one(pool)
        .await
        .expect("count")
}

pub async fn enqueue_many(store: &QueueStoreService, channel: Channel, n: usize) -> Vec<QueueItem> {
    let mut items = Vec::with_capacity(n);
    for i in 0..n {
        items.push(
            store
                .enqueue(new_item(channel, &format!("msg-{i}")))
                .await
                .expect("enqueue"),
        );
    }
    items
}
