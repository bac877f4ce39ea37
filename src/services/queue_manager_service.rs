//! services/queue_manager_service.rs
//! Drena la cola por lotes acotados: selecciona pending por canal (FIFO), hace claim,
//! invoca el adaptador y registra el resultado. Cada item se procesa de forma aislada.

use anyhow::{bail, Result};
use chrono::Utc;
use futures::future::join_all;
use futures_util::{stream, StreamExt};
use std::{fmt, time::Duration};

use crate::channels::{ChannelAdapter, ChannelRegistry, SendResult};
use crate::config::engine_config::EngineConfig;
use crate::models::queue_model::{BatchCounters, Channel, NewQueueItem, QueueItem, QueueStatus};
use crate::services::queue_store_service::QueueStoreService;

/// Falta configuración de un proveedor con trabajo pendiente.
/// Aborta la invocación completa antes de tocar cualquier item.
#[derive(Debug)]
pub struct ConfigurationError(pub String);

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigurationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Successful,
    Failed,
    Retrying,
    /// Otro proceso ganó el claim; no cuenta como procesado
    ClaimLost,
}

/// Resultado de `requeue_failed`.
#[derive(Debug)]
pub enum RequeueOutcome {
    Requeued(QueueItem),
    NotFound,
    NotFailed(QueueStatus),
}

#[derive(Clone)]
pub struct QueueManagerService {
    store: QueueStoreService,
    registry: ChannelRegistry,
    max_send_tries: u32,
    max_concurrent_sends: usize,
    claim_timeout: chrono::Duration,
    send_timeout: Duration,
}

impl QueueManagerService {
    pub fn new(store: QueueStoreService, registry: ChannelRegistry, config: &EngineConfig) -> Self {
        Self {
            store,
            registry,
            max_send_tries: config.max_send_tries.max(1),
            max_concurrent_sends: config.max_concurrent_sends.max(1),
            claim_timeout: config.claim_timeout,
            send_timeout: config.send_timeout,
        }
    }

    /// Procesa hasta `max_items_per_channel` items de cada canal, canales en paralelo.
    pub async fn process_batch(&self, max_items_per_channel: u32) -> Result<BatchCounters> {
        let channels = self.prepare(&Channel::ALL).await?;
        log::info!(
            "(process_batch) Iniciando lote max_items_per_channel={} canales={:?}",
            max_items_per_channel,
            channels
        );

        let results = join_all(channels.iter().map(|channel| {
            self.drain_channel(*channel, max_items_per_channel, self.max_concurrent_sends)
        }))
        .await;

        let counters = merge_results(results)?;
        log::info!("(process_batch) Lote terminado: {:?}", counters);
        Ok(counters)
    }

    /// Igual que `process_batch` pero limitado a un canal y con paralelismo propio.
    pub async fn process_channel(
        &self,
        channel: Channel,
        max_items: u32,
        max_concurrent: usize,
    ) -> Result<BatchCounters> {
        let channels = self.prepare(&[channel]).await?;
        if channels.is_empty() {
            log::info!("(process_channel) Sin pendientes para canal={}", channel);
            return Ok(BatchCounters::default());
        }

        let counters = self
            .drain_channel(channel, max_items, max_concurrent.max(1))
            .await?;
        log::info!(
            "(process_channel) canal={} terminado: {:?}",
            channel,
            counters
        );
        Ok(counters)
    }

    /// Libera claims vencidos y verifica que cada canal con trabajo tenga adaptador.
    /// Devuelve los canales (de `wanted`) que tienen pendientes.
    async fn prepare(&self, wanted: &[Channel]) -> Result<Vec<Channel>> {
        let released = self
            .store
            .release_stale_claims(Utc::now() - self.claim_timeout, self.max_send_tries)
            .await?;
        if released > 0 {
            log::warn!(
                "(prepare) {} items in_flight vencidos liberados (pending o failed si agotaron intentos)",
                released
            );
        }

        let counts = self.store.pending_counts(self.max_send_tries).await?;
        let with_work: Vec<Channel> = wanted
            .iter()
            .copied()
            .filter(|c| counts.get(c).copied().unwrap_or(0) > 0)
            .collect();

        let missing: Vec<String> = with_work
            .iter()
            .filter(|c| self.registry.get(**c).is_none())
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            let err = ConfigurationError(format!(
                "no provider configured for channel(s) with pending items: {}",
                missing.join(", ")
            ));
            log::error!("(prepare) {}", err);
            bail!(err);
        }

        Ok(with_work)
    }

    async fn drain_channel(
        &self,
        channel: Channel,
        limit: u32,
        max_concurrent: usize,
    ) -> Result<BatchCounters> {
        let Some(adapter) = self.registry.get(channel) else {
            bail!(ConfigurationError(format!("no provider configured for {channel}")));
        };

        let items = self
            .store
            .select_pending(channel, limit, self.max_send_tries)
            .await?;
        log::info!(
            "(drain_channel) canal={} seleccionados={} (limit={}, concurrencia={})",
            channel,
            items.len(),
            limit,
            max_concurrent
        );

        let outcomes: Vec<ItemOutcome> = stream::iter(items)
            .map(|item| self.dispatch_item(adapter.as_ref(), item))
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

        let mut counters = BatchCounters::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::ClaimLost => continue,
                ItemOutcome::Successful => counters.successful += 1,
                ItemOutcome::Failed => counters.failed += 1,
                ItemOutcome::Retrying => counters.retrying += 1,
            }
            counters.processed += 1;
        }
        Ok(counters)
    }

    /// Un item: claim -> send -> resultado. Nunca propaga errores al lote.
    async fn dispatch_item(&self, adapter: &dyn ChannelAdapter, item: QueueItem) -> ItemOutcome {
        match self.store.claim(&item.id, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => {
                log::debug!(
                    "(dispatch_item) Claim perdido item={} canal={}",
                    item.id,
                    item.channel
                );
                return ItemOutcome::ClaimLost;
            }
            Err(e) => {
                log::error!(
                    "(dispatch_item) Error al hacer claim item={} canal={} intento={}: {:?}",
                    item.id,
                    item.channel,
                    item.send_tries + 1,
                    e
                );
                return ItemOutcome::Retrying;
            }
        }
        let attempt = item.send_tries + 1;

        let result = match tokio::time::timeout(self.send_timeout, adapter.send(&item)).await {
            Ok(r) => r,
            Err(_) => SendResult::TransientError(format!(
                "adapter timed out after {:?}",
                self.send_timeout
            )),
        };

        let now = Utc::now();
        match result {
            SendResult::Accepted(external_ref) => {
                match self
                    .store
                    .mark_sent(&item.id, external_ref.as_deref(), now)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        // El claim venció durante el envío y otro ciclo ya es dueño del item
                        log::warn!(
                            "(dispatch_item) Enviado con claim vencido item={} canal={} intento={}, no se marca sent",
                            item.id,
                            item.channel,
                            attempt
                        );
                        return ItemOutcome::ClaimLost;
                    }
                    Err(e) => {
                        // El proveedor ya lo tiene; el claim vencido lo devolverá a pending
                        log::error!(
                            "(dispatch_item) Enviado pero no se pudo marcar sent item={} canal={} intento={}: {:?}",
                            item.id,
                            item.channel,
                            attempt,
                            e
                        );
                        return ItemOutcome::Successful;
                    }
                }

                if adapter.reports_status() {
                    match external_ref {
                        Some(_) => {
                            if let Err(e) = self.store.create_delivery_status(&item.id, now).await {
                                log::error!(
                                    "(dispatch_item) No se pudo crear delivery_status item={}: {:?}",
                                    item.id,
                                    e
                                );
                            }
                        }
                        None => log::warn!(
                            "(dispatch_item) Canal {} con estado asíncrono no devolvió referencia item={}",
                            item.channel,
                            item.id
                        ),
                    }
                }

                log::info!(
                    "(dispatch_item) Enviado item={} canal={} intento={}",
                    item.id,
                    item.channel,
                    attempt
                );
                ItemOutcome::Successful
            }
            SendResult::Rejected(reason) => {
                log::warn!(
                    "(dispatch_item) Rechazo permanente item={} canal={} intento={}: {}",
                    item.id,
                    item.channel,
                    attempt,
                    reason
                );
                self.finish_failed(&item, attempt, &reason).await
            }
            SendResult::TransientError(reason) if attempt >= self.max_send_tries => {
                log::warn!(
                    "(dispatch_item) Máximo de intentos alcanzado item={} canal={} intento={}: {}",
                    item.id,
                    item.channel,
                    attempt,
                    reason
                );
                let reason = format!("max attempts ({}) reached: {}", self.max_send_tries, reason);
                self.finish_failed(&item, attempt, &reason).await
            }
            SendResult::TransientError(reason) => {
                log::warn!(
                    "(dispatch_item) Error transitorio item={} canal={} intento={}: {}",
                    item.id,
                    item.channel,
                    attempt,
                    reason
                );
                if let Err(e) = self.store.release(&item.id, &reason, now).await {
                    log::error!(
                        "(dispatch_item) No se pudo devolver a pending item={}: {:?}",
                        item.id,
                        e
                    );
                }
                ItemOutcome::Retrying
            }
        }
    }

    async fn finish_failed(&self, item: &QueueItem, attempt: u32, reason: &str) -> ItemOutcome {
        if let Err(e) = self.store.mark_failed(&item.id, reason, Utc::now()).await {
            log::error!(
                "(dispatch_item) No se pudo marcar failed item={} canal={} intento={}: {:?}",
                item.id,
                item.channel,
                attempt,
                e
            );
        }
        ItemOutcome::Failed
    }

    /// Reencola un item failed creando uno nuevo; el original queda failed.
    pub async fn requeue_failed(&self, id: &str) -> Result<RequeueOutcome> {
        let Some(original) = self.store.get_item(id).await? else {
            return Ok(RequeueOutcome::NotFound);
        };
        if original.status != QueueStatus::Failed {
            return Ok(RequeueOutcome::NotFailed(original.status));
        }

        let mut payload = original.payload.clone();
        if let Some(meta) = payload.metadata.as_object_mut() {
            meta.insert("requeued_from".to_string(), original.id.clone().into());
        } else {
            payload.metadata = serde_json::json!({ "requeued_from": original.id });
        }

        let item = self
            .store
            .enqueue(NewQueueItem {
                channel: original.channel,
                recipient_id: original.recipient_id,
                sender_id: original.sender_id,
                store_id: original.store_id,
                payload,
            })
            .await?;

        log::info!(
            "(requeue_failed) item={} reencolado como item={}",
            id,
            item.id
        );
        Ok(RequeueOutcome::Requeued(item))
    }
}

fn merge_results(results: Vec<Result<BatchCounters>>) -> Result<BatchCounters> {
    let mut total = BatchCounters::default();
    let mut first_err = None;
    for res in results {
        match res {
            Ok(c) => total.merge(c),
            Err(e) => {
                log::error!("(process_batch) Error drenando canal: {:?}", e);
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        // El progreso parcial ya quedó persistido; el error se reporta igual
        Some(e) => Err(e),
        None => Ok(total),
    }
}
