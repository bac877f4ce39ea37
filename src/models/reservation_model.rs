use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    event_model::{DisplayFields, EventType, NotificationEvent, Recipient},
    parse_opt_ts, parse_ts,
};

/// Estados de reserva que todavía merecen recordatorio.
pub const ACTIVE_RESERVATION_STATUSES: [&str; 2] = ["pending", "confirmed"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub store_id: String,
    pub store_name: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_line_id: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_push_token: Option<String>,
    pub locale: String,
    pub service_name: Option<String>,
    pub reserved_at: DateTime<Utc>,
    pub status: String,
    pub reminded_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Arma el evento `reminder` con todo lo necesario para renderizar.
    pub fn reminder_event(&self) -> NotificationEvent {
        NotificationEvent {
            event_type: EventType::Reminder,
            reference_id: self.id.clone(),
            store_id: self.store_id.clone(),
            sender_id: None,
            recipient: Recipient {
                id: self.customer_id.clone(),
                name: self.customer_name.clone(),
                email: self.customer_email.clone(),
                line_user_id: self.customer_line_id.clone(),
                phone: self.customer_phone.clone(),
                push_token: self.customer_push_token.clone(),
                locale: self.locale.clone(),
            },
            display: DisplayFields {
                store_name: self.store_name.clone(),
                customer_name: self.customer_name.clone(),
                reserved_at: self.reserved_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                service_name: self.service_name.clone(),
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReservationRow {
    pub id: String,
    pub store_id: String,
    pub store_name: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_line_id: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_push_token: Option<String>,
    pub locale: String,
    pub service_name: Option<String>,
    pub reserved_at: String,
    pub status: String,
    pub reminded_at: Option<String>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = anyhow::Error;

    fn try_from(row: ReservationRow) -> Result<Self> {
        Ok(Reservation {
            reserved_at: parse_ts(&row.reserved_at)?,
            reminded_at: parse_opt_ts(row.reminded_at)?,
            id: row.id,
            store_id: row.store_id,
            store_name: row.store_name,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_line_id: row.customer_line_id,
            customer_phone: row.customer_phone,
            customer_push_token: row.customer_push_token,
            locale: row.locale,
            service_name: row.service_name,
            status: row.status,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderCounters {
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
}
