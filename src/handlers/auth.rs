//! handlers/auth.rs
//! Verificación de credenciales de los triggers (Bearer CRON_SECRET)
//! y de las rutas de administración (header X-Admin-Key).

use actix_web::{http::header, HttpRequest, HttpResponse};
use serde_json::json;

use crate::config::engine_config::EngineConfig;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Ok(()) si el request trae `Authorization: Bearer <CRON_SECRET>`.
pub fn check_cron_secret(req: &HttpRequest, config: &EngineConfig) -> Result<(), HttpResponse> {
    let Some(secret) = config.cron_secret.as_deref() else {
        log::error!("(auth) CRON_SECRET no configurado; se rechaza {}", req.path());
        return Err(not_configured("CRON_SECRET"));
    };

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if secrets_match(token.trim(), secret) => Ok(()),
        _ => {
            log::warn!("(auth) Bearer ausente o inválido en {}", req.path());
            Err(unauthorized())
        }
    }
}

/// Ok(()) si el request trae `X-Admin-Key: <ADMIN_API_KEY>`.
pub fn check_admin_key(req: &HttpRequest, config: &EngineConfig) -> Result<(), HttpResponse> {
    let Some(key) = config.admin_api_key.as_deref() else {
        log::error!("(auth) ADMIN_API_KEY no configurado; se rechaza {}", req.path());
        return Err(not_configured("ADMIN_API_KEY"));
    };

    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(value) if secrets_match(value.trim(), key) => Ok(()),
        _ => {
            log::warn!("(auth) X-Admin-Key ausente o inválida en {}", req.path());
            Err(unauthorized())
        }
    }
}

/// Comparación sin cortocircuito sobre el contenido.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({
        "success": false,
        "error": "Unauthorized"
    }))
}

fn not_configured(var: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "error": format!("{var} is not configured")
    }))
}
