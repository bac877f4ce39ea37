//! handlers/admin_handler.rs
//! Operaciones de administración. El gateway de la plataforma inyecta `X-Admin-Key`.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::config::engine_config::{EngineConfig, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use crate::handlers::{auth::check_admin_key, bad_request, counters_ok, internal_error};
use crate::models::preference_model::ChannelPreferences;
use crate::services::{
    preference_service::PreferenceService,
    queue_manager_service::{QueueManagerService, RequeueOutcome},
    queue_store_service::QueueStoreService,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessQueueRequest {
    batch_size: Option<i64>,
}

/// POST /admin/queue/process  body: { "batchSize": 1..500 }
pub async fn admin_process_queue_endpoint(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<EngineConfig>,
    queue_manager: web::Data<QueueManagerService>,
) -> HttpResponse {
    if let Err(resp) = check_admin_key(&req, &config) {
        return resp;
    }

    let request: ProcessQueueRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ProcessQueueRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return bad_request(format!("Invalid body: {e}")),
        }
    };

    let batch_size = match request.batch_size {
        None => config.default_batch_size,
        Some(n) if (i64::from(MIN_BATCH_SIZE)..=i64::from(MAX_BATCH_SIZE)).contains(&n) => n as u32,
        Some(_) => {
            return bad_request(format!(
                "batchSize must be an integer between {MIN_BATCH_SIZE} and {MAX_BATCH_SIZE}"
            ))
        }
    };

    log::info!("(admin_process_queue) Disparo manual batchSize={}", batch_size);
    match queue_manager.process_batch(batch_size).await {
        Ok(counters) => counters_ok(counters),
        Err(e) => internal_error("admin_process_queue", e),
    }
}

/// POST /admin/queue/{id}/requeue
pub async fn requeue_item_endpoint(
    req: HttpRequest,
    path: web::Path<String>,
    config: web::Data<EngineConfig>,
    queue_manager: web::Data<QueueManagerService>,
) -> HttpResponse {
    if let Err(resp) = check_admin_key(&req, &config) {
        return resp;
    }

    let item_id = path.into_inner();
    match queue_manager.requeue_failed(&item_id).await {
        Ok(RequeueOutcome::Requeued(item)) => HttpResponse::Ok().json(json!({
            "success": true,
            "original_id": item_id,
            "item": item
        })),
        Ok(RequeueOutcome::NotFound) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": format!("Queue item {item_id} not found")
        })),
        Ok(RequeueOutcome::NotFailed(status)) => HttpResponse::Conflict().json(json!({
            "success": false,
            "error": format!("Only failed items can be re-queued (current status: {status})")
        })),
        Err(e) => internal_error("requeue_item", e),
    }
}

/// POST /admin/queue/purge
pub async fn purge_queue_endpoint(
    req: HttpRequest,
    config: web::Data<EngineConfig>,
    store: web::Data<QueueStoreService>,
) -> HttpResponse {
    if let Err(resp) = check_admin_key(&req, &config) {
        return resp;
    }

    match store.purge_deleted().await {
        Ok(purged) => {
            log::info!("(purge_queue) {} items eliminados", purged);
            HttpResponse::Ok().json(json!({ "success": true, "purged": purged }))
        }
        Err(e) => internal_error("purge_queue", e),
    }
}

/// GET /admin/queue/{id}
pub async fn get_queue_item_endpoint(
    req: HttpRequest,
    path: web::Path<String>,
    config: web::Data<EngineConfig>,
    store: web::Data<QueueStoreService>,
) -> HttpResponse {
    if let Err(resp) = check_admin_key(&req, &config) {
        return resp;
    }

    let item_id = path.into_inner();
    let item = match store.get_item(&item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({
                "success": false,
                "error": format!("Queue item {item_id} not found")
            }))
        }
        Err(e) => return internal_error("get_queue_item", e),
    };

    match store.get_delivery_status(&item_id).await {
        Ok(delivery_status) => HttpResponse::Ok().json(json!({
            "success": true,
            "item": item,
            "delivery_status": delivery_status
        })),
        Err(e) => internal_error("get_queue_item", e),
    }
}

/// PUT /admin/preferences/users/{id}
pub async fn put_user_preferences_endpoint(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    config: web::Data<EngineConfig>,
    preferences: web::Data<PreferenceService>,
) -> HttpResponse {
    if let Err(resp) = check_admin_key(&req, &config) {
        return resp;
    }
    let prefs = match parse_preferences(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let user_id = path.into_inner();
    match preferences.upsert_user_preferences(&user_id, &prefs).await {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "preferences": prefs })),
        Err(e) => internal_error("put_user_preferences", e),
    }
}

/// PUT /admin/preferences/stores/{id}
pub async fn put_store_preferences_endpoint(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    config: web::Data<EngineConfig>,
    preferences: web::Data<PreferenceService>,
) -> HttpResponse {
    if let Err(resp) = check_admin_key(&req, &config) {
        return resp;
    }
    let prefs = match parse_preferences(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let store_id = path.into_inner();
    match preferences.upsert_store_preferences(&store_id, &prefs).await {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true, "preferences": prefs })),
        Err(e) => internal_error("put_store_preferences", e),
    }
}

fn parse_preferences(body: &[u8]) -> Result<ChannelPreferences, HttpResponse> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("Invalid preferences: {e}")))
}
