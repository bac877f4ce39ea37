//! handlers/mod.rs
//! Handlers HTTP: triggers del scheduler, ruteo de eventos y administración.
//! Son capas finas sobre los servicios; toda la lógica vive en `services`.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::json;
use std::{collections::HashMap, fmt::Display, str::FromStr};

use crate::services::queue_manager_service::ConfigurationError;

pub mod admin_handler;
pub mod auth;
pub mod delivery_status_handler;
pub mod notification_handler;
pub mod queue_handler;
pub mod reminder_handler;

/// Cuerpo común de los triggers: `success` más los contadores aplanados.
#[derive(Serialize)]
pub struct CountersResponse<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub counters: T,
}

pub fn counters_ok<T: Serialize>(counters: T) -> HttpResponse {
    HttpResponse::Ok().json(CountersResponse {
        success: true,
        counters,
    })
}

/// Error no manejado de un servicio -> 500 con JSON.
pub fn internal_error(operation: &str, err: anyhow::Error) -> HttpResponse {
    if err.downcast_ref::<ConfigurationError>().is_some() {
        log::error!("({operation}) Abortado por configuración: {err}");
    } else {
        log::error!("({operation}) Error: {:?}", err);
    }
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "error": err.to_string()
    }))
}

pub fn bad_request(message: impl Display) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "success": false,
        "error": message.to_string()
    }))
}

/// Query string como mapa. Se parsea a mano después de autenticar,
/// así un request sin credenciales siempre recibe 401.
pub fn query_params(req: &HttpRequest) -> Result<HashMap<String, String>, HttpResponse> {
    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .map_err(|e| bad_request(format!("Invalid query string: {e}")))
}

/// Parámetro numérico opcional dentro de [min, max].
pub fn bounded_param<T>(raw: Option<&str>, name: &str, default: T, min: T, max: T) -> Result<T, HttpResponse>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(v) if v >= min && v <= max => Ok(v),
        _ => Err(bad_request(format!(
            "{name} must be an integer between {min} and {max}"
        ))),
    }
}

/// GET /health
pub async fn health_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
