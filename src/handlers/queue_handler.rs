//! handlers/queue_handler.rs
//! Triggers del scheduler para drenar la cola.

use actix_web::{web, HttpRequest, HttpResponse};

use crate::config::engine_config::{
    EngineConfig, MAX_BATCH_SIZE, MAX_MAIL_CONCURRENT, MIN_BATCH_SIZE, MIN_MAIL_CONCURRENT,
};
use crate::handlers::{auth::check_cron_secret, bounded_param, counters_ok, internal_error, query_params};
use crate::models::queue_model::Channel;
use crate::services::queue_manager_service::QueueManagerService;

/// GET /queue/process?batchSize=1..500
pub async fn process_queue_endpoint(
    req: HttpRequest,
    config: web::Data<EngineConfig>,
    queue_manager: web::Data<QueueManagerService>,
) -> HttpResponse {
    if let Err(resp) = check_cron_secret(&req, &config) {
        return resp;
    }

    let params = match query_params(&req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let batch_size = match bounded_param(
        params.get("batchSize").map(String::as_str),
        "batchSize",
        config.default_batch_size,
        MIN_BATCH_SIZE,
        MAX_BATCH_SIZE,
    ) {
        Ok(n) => n,
        Err(resp) => return resp,
    };

    match queue_manager.process_batch(batch_size).await {
        Ok(counters) => counters_ok(counters),
        Err(e) => internal_error("process_queue", e),
    }
}

/// GET /mail-queue/send?batchSize=1..500&maxConcurrent=1..10
pub async fn send_mail_queue_endpoint(
    req: HttpRequest,
    config: web::Data<EngineConfig>,
    queue_manager: web::Data<QueueManagerService>,
) -> HttpResponse {
    if let Err(resp) = check_cron_secret(&req, &config) {
        return resp;
    }

    let params = match query_params(&req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let batch_size = match bounded_param(
        params.get("batchSize").map(String::as_str),
        "batchSize",
        config.default_batch_size,
        MIN_BATCH_SIZE,
        MAX_BATCH_SIZE,
    ) {
        Ok(n) => n,
        Err(resp) => return resp,
    };
    let max_concurrent = match bounded_param(
        params.get("maxConcurrent").map(String::as_str),
        "maxConcurrent",
        config.mail_max_concurrent,
        MIN_MAIL_CONCURRENT,
        MAX_MAIL_CONCURRENT,
    ) {
        Ok(n) => n,
        Err(resp) => return resp,
    };

    match queue_manager
        .process_channel(Channel::Email, batch_size, max_concurrent)
        .await
    {
        Ok(counters) => counters_ok(counters),
        Err(e) => internal_error("send_mail_queue", e),
    }
}
