//! tests/queue_manager_tests.rs
//! Pruebas de `QueueManagerService` con adaptadores con guion.

use actix_rt::test;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::channels::{ChannelAdapter, ChannelRegistry, SendResult};
use crate::config::engine_config::EngineConfig;
use crate::models::{
    delivery_status_model::ReportedStatus,
    queue_model::{Channel, QueueItem, QueueStatus},
};
use crate::services::{
    queue_manager_service::{ConfigurationError, QueueManagerService, RequeueOutcome},
    queue_store_service::QueueStoreService,
};
use crate::tests::support::{
    count_status, enqueue_many, registry_with, test_config, test_pool, ScriptedChannel,
};

#[test]
async fn batch_dispatches_exactly_n_oldest_first() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let items = enqueue_many(&store, Channel::OnSite, 5).await;

    let adapter = ScriptedChannel::accepting(Channel::OnSite);
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter.clone()]), &test_config());

    let counters = manager.process_batch(3).await.unwrap();
    assert_eq!(counters.processed, 3);
    assert_eq!(counters.successful, 3);
    assert_eq!(count_status(&pool, "sent").await, 3);
    assert_eq!(count_status(&pool, "pending").await, 2);

    let mut expected: Vec<String> = items[..3].iter().map(|i| i.id.clone()).collect();
    let mut sent = adapter.sent_ids();
    expected.sort();
    sent.sort();
    assert_eq!(sent, expected);

    let first = store.get_item(&items[0].id).await.unwrap().unwrap();
    assert_eq!(first.send_tries, 1);
    assert!(first.sent_at.is_some());
}

#[test]
async fn always_transient_fails_at_ceiling_and_is_excluded() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Line, 1).await.remove(0);

    let adapter = ScriptedChannel::always(
        Channel::Line,
        SendResult::TransientError("HTTP 503".to_string()),
    );
    let config = test_config();
    assert_eq!(config.max_send_tries, 3);
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter.clone()]), &config);

    let mut last_tries = 0;
    for round in 1..=2 {
        let counters = manager.process_batch(10).await.unwrap();
        assert_eq!(counters.retrying, 1, "round {round}");
        let current = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(current.status, QueueStatus::Pending);
        assert!(current.send_tries > last_tries);
        last_tries = current.send_tries;
    }

    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.failed, 1);
    let failed = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.send_tries, 3);
    assert!(failed.last_error.unwrap().contains("max attempts"));

    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.processed, 0);
    assert_eq!(adapter.calls(), 3);
}

#[test]
async fn rejection_is_terminal_without_retry() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Sms, 1).await.remove(0);

    let adapter = ScriptedChannel::always(
        Channel::Sms,
        SendResult::Rejected("invalid 'To' number".to_string()),
    );
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter.clone()]), &test_config());

    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.failed, 1);

    let failed = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.send_tries, 1);
    assert_eq!(failed.last_error.as_deref(), Some("invalid 'To' number"));

    manager.process_batch(10).await.unwrap();
    assert_eq!(adapter.calls(), 1);
}

#[test]
async fn status_reporting_channel_gets_delivery_record() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Sms, 1).await.remove(0);

    let adapter = ScriptedChannel::with_status(Channel::Sms, "SM123", Ok(None));
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter]), &test_config());

    manager.process_batch(10).await.unwrap();

    let sent = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(sent.status, QueueStatus::Sent);
    assert_eq!(sent.external_ref.as_deref(), Some("SM123"));

    let record = store.get_delivery_status(&item.id).await.unwrap().unwrap();
    assert_eq!(record.reported_status, ReportedStatus::Queued);
    assert!(record.last_checked_at.is_none());
}

#[test]
async fn missing_adapter_aborts_before_touching_items() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    enqueue_many(&store, Channel::OnSite, 2).await;
    let email = enqueue_many(&store, Channel::Email, 1).await.remove(0);

    let onsite = ScriptedChannel::accepting(Channel::OnSite);
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![onsite.clone()]), &test_config());

    let err = manager.process_batch(10).await.unwrap_err();
    assert!(err.downcast_ref::<ConfigurationError>().is_some());
    assert!(err.to_string().contains("email"));

    assert_eq!(onsite.calls(), 0);
    assert_eq!(count_status(&pool, "pending").await, 3);
    let untouched = store.get_item(&email.id).await.unwrap().unwrap();
    assert_eq!(untouched.send_tries, 0);
}

#[test]
async fn channels_are_isolated_and_counters_aggregate() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    enqueue_many(&store, Channel::OnSite, 2).await;
    enqueue_many(&store, Channel::Push, 2).await;
    enqueue_many(&store, Channel::Line, 1).await;

    let manager = QueueManagerService::new(
        store.clone(),
        registry_with(vec![
            ScriptedChannel::accepting(Channel::OnSite),
            ScriptedChannel::always(Channel::Push, SendResult::Rejected("DeviceNotRegistered".into())),
            ScriptedChannel::always(Channel::Line, SendResult::TransientError("429".into())),
        ]),
        &test_config(),
    );

    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.processed, 5);
    assert_eq!(counters.successful, 2);
    assert_eq!(counters.failed, 2);
    assert_eq!(counters.retrying, 1);
}

#[test]
async fn sent_items_are_never_dispatched_again() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::OnSite, 1).await.remove(0);

    let adapter = ScriptedChannel::accepting(Channel::OnSite);
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter.clone()]), &test_config());

    manager.process_batch(10).await.unwrap();
    manager.process_batch(10).await.unwrap();

    assert_eq!(adapter.calls(), 1);
    let sent = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(sent.status, QueueStatus::Sent);
    assert_eq!(sent.send_tries, 1);
}

#[test]
async fn process_channel_only_drains_that_channel() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    enqueue_many(&store, Channel::Email, 4).await;
    enqueue_many(&store, Channel::OnSite, 2).await;

    let email = ScriptedChannel::accepting(Channel::Email);
    let onsite = ScriptedChannel::accepting(Channel::OnSite);
    let manager = QueueManagerService::new(
        store.clone(),
        registry_with(vec![email.clone(), onsite.clone()]),
        &test_config(),
    );

    let counters = manager.process_channel(Channel::Email, 3, 2).await.unwrap();
    assert_eq!(counters.successful, 3);
    assert_eq!(email.calls(), 3);
    assert_eq!(onsite.calls(), 0);
    assert_eq!(count_status(&pool, "pending").await, 3);
}

#[test]
async fn requeue_creates_new_item_and_keeps_failed_sticky() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Email, 1).await.remove(0);

    let manager = QueueManagerService::new(
        store.clone(),
        registry_with(vec![ScriptedChannel::always(
            Channel::Email,
            SendResult::Rejected("550 mailbox unavailable".into()),
        )]),
        &test_config(),
    );
    manager.process_batch(10).await.unwrap();

    let requeued = match manager.requeue_failed(&item.id).await.unwrap() {
        RequeueOutcome::Requeued(new_item) => new_item,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_ne!(requeued.id, item.id);
    assert_eq!(requeued.status, QueueStatus::Pending);
    assert_eq!(requeued.send_tries, 0);
    assert_eq!(requeued.payload.metadata["requeued_from"], item.id.as_str());

    let original = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(original.status, QueueStatus::Failed);

    assert!(matches!(
        manager.requeue_failed(&requeued.id).await.unwrap(),
        RequeueOutcome::NotFailed(QueueStatus::Pending)
    ));
    assert!(matches!(
        manager.requeue_failed("does-not-exist").await.unwrap(),
        RequeueOutcome::NotFound
    ));
}

#[test]
async fn onsite_channel_writes_inbox_once_per_item() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let items = enqueue_many(&store, Channel::OnSite, 2).await;

    let mut registry = crate::channels::ChannelRegistry::new();
    registry.register(std::sync::Arc::new(
        crate::channels::onsite_channel::OnSiteChannel::new(pool.clone()),
    ));
    let manager = QueueManagerService::new(store.clone(), registry, &test_config());
    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.successful, 2);

    let (count, title): (i64, String) = sqlx::query_as(
        "SELECT COUNT(*), MIN(title) FROM site_messages WHERE recipient_id = 'user-1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 2);
    assert_eq!(title, "msg-0");

    let sent = store.get_item(&items[1].id).await.unwrap().unwrap();
    assert_eq!(sent.status, QueueStatus::Sent);
    assert!(sent.external_ref.is_none());
}

#[test]
async fn adapter_timeout_is_retried_later() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Push, 1).await.remove(0);

    let adapter = ScriptedChannel::slow(Channel::Push, std::time::Duration::from_millis(500));
    let config = EngineConfig {
        send_timeout: std::time::Duration::from_millis(20),
        ..test_config()
    };
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter.clone()]), &config);

    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.retrying, 1);
    assert_eq!(counters.successful, 0);
    assert_eq!(adapter.calls(), 1);

    let pending = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(pending.status, QueueStatus::Pending);
    assert_eq!(pending.send_tries, 1);
    assert!(pending.last_error.unwrap().contains("timed out"));
}

#[test]
async fn expired_claim_on_last_try_ends_failed_instead_of_stuck() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Line, 1).await.remove(0);
    let long_ago = Utc::now() - Duration::minutes(30);

    for _ in 0..2 {
        store.claim(&item.id, long_ago).await.unwrap();
        store.release(&item.id, "HTTP 503", long_ago).await.unwrap();
    }
    // Tercer intento: el proceso muere con el item in_flight
    store.claim(&item.id, long_ago).await.unwrap();

    let adapter = ScriptedChannel::accepting(Channel::Line);
    let manager = QueueManagerService::new(store.clone(), registry_with(vec![adapter.clone()]), &test_config());

    for _ in 0..2 {
        let counters = manager.process_batch(10).await.unwrap();
        assert_eq!(counters.processed, 0);
    }

    let failed = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.send_tries, 3);
    assert_eq!(adapter.calls(), 0);
}

/// Acepta el envío, pero mientras tanto su claim vence y el item vuelve a pending.
struct ExpiringClaimChannel {
    store: QueueStoreService,
}

#[async_trait]
impl ChannelAdapter for ExpiringClaimChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, _item: &QueueItem) -> SendResult {
        self.store
            .release_stale_claims(Utc::now() + Duration::seconds(1), 10)
            .await
            .unwrap();
        SendResult::Accepted(Some("SM9".to_string()))
    }

    fn reports_status(&self) -> bool {
        true
    }
}

#[test]
async fn accepted_send_with_lost_claim_is_not_counted_or_recorded() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool.clone());
    let item = enqueue_many(&store, Channel::Sms, 1).await.remove(0);

    let mut registry = ChannelRegistry::new();
    registry.register(std::sync::Arc::new(ExpiringClaimChannel {
        store: store.clone(),
    }));
    let manager = QueueManagerService::new(store.clone(), registry, &test_config());

    let counters = manager.process_batch(10).await.unwrap();
    assert_eq!(counters.processed, 0);
    assert_eq!(counters.successful, 0);

    let current = store.get_item(&item.id).await.unwrap().unwrap();
    assert_eq!(current.status, QueueStatus::Pending);
    assert!(current.external_ref.is_none());
    assert!(store.get_delivery_status(&item.id).await.unwrap().is_none());
}
