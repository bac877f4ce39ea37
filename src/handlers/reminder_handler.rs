//! handlers/reminder_handler.rs

use actix_web::{web, HttpRequest, HttpResponse};

use crate::config::engine_config::EngineConfig;
use crate::handlers::{auth::check_cron_secret, counters_ok, internal_error};
use crate::services::reminder_service::ReminderService;

/// GET /reminders/process
pub async fn process_reminders_endpoint(
    req: HttpRequest,
    config: web::Data<EngineConfig>,
    reminders: web::Data<ReminderService>,
) -> HttpResponse {
    if let Err(resp) = check_cron_secret(&req, &config) {
        return resp;
    }

    match reminders.process_due_reminders().await {
        Ok(counters) => counters_ok(counters),
        Err(e) => internal_error("process_reminders", e),
    }
}
