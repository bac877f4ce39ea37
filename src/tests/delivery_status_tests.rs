//! tests/delivery_status_tests.rs

use actix_rt::test;

use crate::models::{
    delivery_status_model::{ReportedStatus, StatusReport},
    queue_model::Channel,
};
use crate::services::{
    delivery_status_service::DeliveryStatusService, queue_manager_service::QueueManagerService,
    queue_store_service::QueueStoreService,
};
use crate::tests::support::{enqueue_many, registry_with, test_config, test_pool, ScriptedChannel};

/// Envía un item SMS con el adaptador dado y devuelve su id.
async fn sent_sms(store: &QueueStoreService, adapter: std::sync::Arc<ScriptedChannel>) -> String {
    let item = enqueue_many(store, Channel::Sms, 1).await.remove(0);
    QueueManagerService::new(store.clone(), registry_with(vec![adapter]), &test_config())
        .process_batch(10)
        .await
        .unwrap();
    item.id
}

#[test]
async fn delivered_report_updates_record_once() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool);
    let adapter = ScriptedChannel::with_status(
        Channel::Sms,
        "SM1",
        Ok(Some(StatusReport {
            status: ReportedStatus::Delivered,
            raw: Some(r#"{"status":"delivered"}"#.to_string()),
        })),
    );
    let item_id = sent_sms(&store, adapter.clone()).await;

    let sync = DeliveryStatusService::new(store.clone(), registry_with(vec![adapter]), &test_config());
    let counters = sync.sync_delivery_status().await.unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.updated, 1);
    assert_eq!(counters.failed, 0);

    let record = store.get_delivery_status(&item_id).await.unwrap().unwrap();
    assert_eq!(record.reported_status, ReportedStatus::Delivered);
    assert!(record.last_checked_at.is_some());
    assert_eq!(record.raw_provider_payload.as_deref(), Some(r#"{"status":"delivered"}"#));

    // Terminal: ya no se consulta
    let again = sync.sync_delivery_status().await.unwrap();
    assert_eq!(again.processed, 0);
}

#[test]
async fn poll_error_counts_failed_and_touches_record() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool);
    let adapter = ScriptedChannel::with_status(Channel::Sms, "SM2", Err("HTTP 503".to_string()));
    let item_id = sent_sms(&store, adapter.clone()).await;

    let sync = DeliveryStatusService::new(store.clone(), registry_with(vec![adapter]), &test_config());
    let counters = sync.sync_delivery_status().await.unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.updated, 0);
    assert_eq!(counters.failed, 1);

    let record = store.get_delivery_status(&item_id).await.unwrap().unwrap();
    assert_eq!(record.reported_status, ReportedStatus::Queued);
    assert!(record.last_checked_at.is_some());
}

#[test]
async fn unchanged_status_is_not_counted_as_update() {
    let pool = test_pool().await;
    let store = QueueStoreService::new(pool);
    let adapter = ScriptedChannel::with_status(
        Channel::Sms,
        "SM3",
        Ok(Some(StatusReport {
            status: ReportedStatus::Queued,
            raw: None,
        })),
    );
    sent_sms(&store, adapter.clone()).await;

    let sync = DeliveryStatusService::new(store, registry_with(vec![adapter]), &test_config());
    let counters = sync.sync_delivery_status().await.unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.updated, 0);
    assert_eq!(counters.failed, 0);
}
