use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Tipo de evento de dominio que origina una notificación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Changed,
    Deleted,
    Reminder,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Changed => "changed",
            EventType::Deleted => "deleted",
            EventType::Reminder => "reminder",
        }
    }

    /// Eventos que justifican canales caros/intrusivos como SMS.
    pub fn is_time_sensitive(self) -> bool {
        matches!(
            self,
            EventType::Changed | EventType::Deleted | EventType::Reminder
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(EventType::Created),
            "changed" => Ok(EventType::Changed),
            "deleted" => Ok(EventType::Deleted),
            "reminder" => Ok(EventType::Reminder),
            other => Err(anyhow!("Unknown event type: {other}")),
        }
    }
}

/// Identidad y direcciones del destinatario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub line_user_id: Option<String>,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en".to_string()
}

/// Campos de presentación para renderizar sin más consultas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayFields {
    pub store_name: String,
    pub customer_name: String,
    /// Hora de la reserva ya formateada para el destinatario
    pub reserved_at: String,
    pub service_name: Option<String>,
}

/// Evento que recibe el Notification Router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: EventType,
    /// Id del objeto de dominio (reserva, pedido, ...)
    pub reference_id: String,
    pub store_id: String,
    pub sender_id: Option<String>,
    pub recipient: Recipient,
    pub display: DisplayFields,
}

/// Respuesta de POST /notifications/route
#[derive(Debug, Clone, Serialize)]
pub struct RouteResponse {
    pub success: bool,
    pub queued: usize,
    pub item_ids: Vec<String>,
}
