use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::models::{parse_opt_ts, parse_ts, queue_model::Channel};

/// Estado reportado por el proveedor para un mensaje ya aceptado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Queued,
    Delivered,
    Undelivered,
    Unknown,
}

impl ReportedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportedStatus::Queued => "queued",
            ReportedStatus::Delivered => "delivered",
            ReportedStatus::Undelivered => "undelivered",
            ReportedStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReportedStatus::Delivered | ReportedStatus::Undelivered)
    }
}

impl fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportedStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(ReportedStatus::Queued),
            "delivered" => Ok(ReportedStatus::Delivered),
            "undelivered" => Ok(ReportedStatus::Undelivered),
            "unknown" => Ok(ReportedStatus::Unknown),
            other => Err(anyhow!("Unknown reported status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatusRecord {
    pub queue_item_id: String,
    pub reported_status: ReportedStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub raw_provider_payload: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registro abierto junto con lo necesario para consultar al proveedor.
#[derive(Debug, Clone)]
pub struct PendingStatusCheck {
    pub record: DeliveryStatusRecord,
    pub channel: Channel,
    pub external_ref: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct PendingStatusCheckRow {
    pub queue_item_id: String,
    pub reported_status: String,
    pub last_checked_at: Option<String>,
    pub raw_provider_payload: Option<String>,
    pub created_at: String,
    pub channel: String,
    pub external_ref: String,
}

impl TryFrom<PendingStatusCheckRow> for PendingStatusCheck {
    type Error = anyhow::Error;

    fn try_from(row: PendingStatusCheckRow) -> Result<Self> {
        Ok(PendingStatusCheck {
            channel: row.channel.parse()?,
            external_ref: row.external_ref,
            record: DeliveryStatusRecord {
                reported_status: row.reported_status.parse()?,
                last_checked_at: parse_opt_ts(row.last_checked_at)?,
                created_at: parse_ts(&row.created_at)?,
                queue_item_id: row.queue_item_id,
                raw_provider_payload: row.raw_provider_payload,
            },
        })
    }
}

/// Respuesta del proveedor a una consulta de estado.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ReportedStatus,
    pub raw: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    pub processed: u64,
    pub updated: u64,
    pub failed: u64,
}
