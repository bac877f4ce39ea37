//! handlers/delivery_status_handler.rs

use actix_web::{web, HttpRequest, HttpResponse};

use crate::config::engine_config::EngineConfig;
use crate::handlers::{auth::check_cron_secret, counters_ok, internal_error};
use crate::services::delivery_status_service::DeliveryStatusService;

/// GET /delivery-status/sync
pub async fn sync_delivery_status_endpoint(
    req: HttpRequest,
    config: web::Data<EngineConfig>,
    delivery_status: web::Data<DeliveryStatusService>,
) -> HttpResponse {
    if let Err(resp) = check_cron_secret(&req, &config) {
        return resp;
    }

    match delivery_status.sync_delivery_status().await {
        Ok(counters) => counters_ok(counters),
        Err(e) => internal_error("sync_delivery_status", e),
    }
}
