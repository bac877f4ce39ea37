//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

pub mod delivery_status_model;
pub mod event_model;
pub mod preference_model;
pub mod queue_model;
pub mod reservation_model;

/// Formato único de timestamps en DB: RFC 3339 UTC con milisegundos.
/// Con ancho fijo el orden lexicográfico coincide con el cronológico.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in store: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}
