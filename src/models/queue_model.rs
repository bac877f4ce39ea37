use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::models::{event_model::EventType, parse_opt_ts, parse_ts};

/// Canal de entrega.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    OnSite,
    Email,
    Line,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::OnSite,
        Channel::Email,
        Channel::Line,
        Channel::Sms,
        Channel::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::OnSite => "on_site",
            Channel::Email => "email",
            Channel::Line => "line",
            Channel::Sms => "sms",
            Channel::Push => "push",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown channel: {s}"))
    }
}

/// Estado de un item de la cola.
///
/// - pending -> in_flight -> sent | failed
/// - in_flight -> pending (error transitorio o claim vencido)
/// - sent, failed y cancelled son terminales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InFlight,
    Sent,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::InFlight => "in_flight",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "in_flight" => Ok(QueueStatus::InFlight),
            "sent" => Ok(QueueStatus::Sent),
            "failed" => Ok(QueueStatus::Failed),
            "cancelled" => Ok(QueueStatus::Cancelled),
            other => Err(anyhow!("Unknown queue status: {other}")),
        }
    }
}

/// Contenido ya renderizado del mensaje. Se guarda como JSON en `queue_items.payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePayload {
    /// Asunto (email) o título (on-site, push)
    pub title: String,
    pub body: String,
    /// Dirección específica del canal: email, LINE user id, teléfono, push token.
    /// On-site no la necesita.
    pub address: Option<String>,
    pub event_type: EventType,
    /// Id del objeto de dominio que disparó el mensaje (p.e. la reserva)
    pub reference_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub channel: Channel,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub store_id: Option<String>,
    pub payload: QueuePayload,
    pub status: QueueStatus,
    pub send_tries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub is_deleted_by_recipient: bool,
    pub external_ref: Option<String>,
    pub last_error: Option<String>,
}

/// Datos necesarios para encolar un item nuevo.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub channel: Channel,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub store_id: Option<String>,
    pub payload: QueuePayload,
}

/// Fila cruda de `queue_items` tal como la devuelve SQLx.
#[derive(Debug, sqlx::FromRow)]
pub struct QueueItemRow {
    pub id: String,
    pub channel: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub store_id: Option<String>,
    pub payload: String,
    pub status: String,
    pub send_tries: i64,
    pub created_at: String,
    pub updated_at: String,
    pub sent_at: Option<String>,
    pub is_deleted_by_recipient: bool,
    pub external_ref: Option<String>,
    pub last_error: Option<String>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = anyhow::Error;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        Ok(QueueItem {
            channel: row.channel.parse()?,
            payload: serde_json::from_str(&row.payload)?,
            status: row.status.parse()?,
            send_tries: u32::try_from(row.send_tries)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            sent_at: parse_opt_ts(row.sent_at)?,
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            store_id: row.store_id,
            is_deleted_by_recipient: row.is_deleted_by_recipient,
            external_ref: row.external_ref,
            last_error: row.last_error,
        })
    }
}

/// Contadores agregados de un `process_batch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    /// Errores transitorios que dejaron el item en pending para el próximo ciclo
    pub retrying: u64,
}

impl BatchCounters {
    pub fn merge(&mut self, other: BatchCounters) {
        self.processed += other.processed;
        self.successful += other.successful;
        self.failed += other.failed;
        self.retrying += other.retrying;
    }
}
