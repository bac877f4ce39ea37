//! services/delivery_status_service.rs
//! Consulta a los proveedores con estado asíncrono y actualiza delivery_status.

use anyhow::Result;
use chrono::Utc;

use crate::channels::ChannelRegistry;
use crate::config::engine_config::EngineConfig;
use crate::models::delivery_status_model::{PendingStatusCheck, SyncCounters};
use crate::services::queue_store_service::QueueStoreService;

#[derive(Clone)]
pub struct DeliveryStatusService {
    store: QueueStoreService,
    registry: ChannelRegistry,
    sync_limit: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum CheckOutcome {
    Changed,
    Unchanged,
    Failed,
}

impl DeliveryStatusService {
    pub fn new(store: QueueStoreService, registry: ChannelRegistry, config: &EngineConfig) -> Self {
        Self {
            store,
            registry,
            sync_limit: config.status_sync_limit,
        }
    }

    pub async fn sync_delivery_status(&self) -> Result<SyncCounters> {
        let open = self.store.list_open_status_checks(self.sync_limit).await?;
        log::info!("(sync_delivery_status) {} registros abiertos", open.len());

        let mut counters = SyncCounters::default();
        for check in open {
            counters.processed += 1;
            match self.check_one(&check).await {
                CheckOutcome::Changed => counters.updated += 1,
                CheckOutcome::Unchanged => {}
                CheckOutcome::Failed => counters.failed += 1,
            }
        }

        log::info!("(sync_delivery_status) Terminado: {:?}", counters);
        Ok(counters)
    }

    async fn check_one(&self, check: &PendingStatusCheck) -> CheckOutcome {
        let item_id = check.record.queue_item_id.as_str();

        let Some(adapter) = self.registry.get(check.channel) else {
            log::warn!(
                "(sync_delivery_status) Sin adaptador para canal={} item={}",
                check.channel,
                item_id
            );
            return CheckOutcome::Failed;
        };

        let now = Utc::now();
        let report = match adapter.check_status(&check.external_ref).await {
            Ok(Some(report)) => report,
            Ok(None) => {
                self.touch(item_id, now).await;
                return CheckOutcome::Unchanged;
            }
            Err(e) => {
                log::warn!(
                    "(sync_delivery_status) Error consultando item={} canal={} ref={}: {:?}",
                    item_id,
                    check.channel,
                    check.external_ref,
                    e
                );
                self.touch(item_id, now).await;
                return CheckOutcome::Failed;
            }
        };

        match self
            .store
            .update_delivery_status(item_id, report.status, report.raw.as_deref(), now)
            .await
        {
            Ok(true) if report.status != check.record.reported_status => {
                log::info!(
                    "(sync_delivery_status) item={} canal={} {} -> {} (final={})",
                    item_id,
                    check.channel,
                    check.record.reported_status,
                    report.status,
                    report.status.is_terminal()
                );
                CheckOutcome::Changed
            }
            Ok(_) => CheckOutcome::Unchanged,
            Err(e) => {
                log::error!(
                    "(sync_delivery_status) Error guardando estado item={}: {:?}",
                    item_id,
                    e
                );
                CheckOutcome::Failed
            }
        }
    }

    async fn touch(&self, item_id: &str, now: chrono::DateTime<Utc>) {
        if let Err(e) = self.store.touch_delivery_status(item_id, now).await {
            log::error!(
                "(sync_delivery_status) No se pudo actualizar last_checked_at item={}: {:?}",
                item_id,
                e
            );
        }
    }
}
