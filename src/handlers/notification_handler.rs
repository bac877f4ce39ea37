//! handlers/notification_handler.rs
//! Entrada de eventos de dominio y borrado de mensajes por el destinatario.

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::config::engine_config::EngineConfig;
use crate::handlers::{auth::check_cron_secret, bad_request, internal_error, query_params};
use crate::models::event_model::{NotificationEvent, RouteResponse};
use crate::services::{
    notification_router_service::NotificationRouterService,
    queue_store_service::QueueStoreService,
};

/// POST /notifications/route
pub async fn route_notification_endpoint(
    req: HttpRequest,
    body: web::Bytes,
    config: web::Data<EngineConfig>,
    router: web::Data<NotificationRouterService>,
) -> HttpResponse {
    if let Err(resp) = check_cron_secret(&req, &config) {
        return resp;
    }

    let event: NotificationEvent = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => return bad_request(format!("Invalid notification event: {e}")),
    };

    match router.route_notification(&event).await {
        Ok(items) => HttpResponse::Ok().json(RouteResponse {
            success: true,
            queued: items.len(),
            item_ids: items.into_iter().map(|i| i.id).collect(),
        }),
        Err(e) => internal_error("route_notification", e),
    }
}

/// DELETE /messages/{id}?recipientId=...
pub async fn delete_message_endpoint(
    req: HttpRequest,
    path: web::Path<String>,
    config: web::Data<EngineConfig>,
    store: web::Data<QueueStoreService>,
) -> HttpResponse {
    if let Err(resp) = check_cron_secret(&req, &config) {
        return resp;
    }

    let params = match query_params(&req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let Some(recipient_id) = params.get("recipientId").filter(|r| !r.is_empty()) else {
        return bad_request("recipientId is required");
    };

    let item_id = path.into_inner();
    match store.mark_deleted_by_recipient(&item_id, recipient_id).await {
        Ok(true) => HttpResponse::Ok().json(json!({ "success": true })),
        Ok(false) => HttpResponse::NotFound().json(json!({
            "success": false,
            "error": "Message not found for recipient"
        })),
        Err(e) => internal_error("delete_message", e),
    }
}
