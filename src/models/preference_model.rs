use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::{event_model::EventType, queue_model::Channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestFrequency {
    Immediate,
    Daily,
    Weekly,
    Never,
}

impl DigestFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestFrequency::Immediate => "immediate",
            DigestFrequency::Daily => "daily",
            DigestFrequency::Weekly => "weekly",
            DigestFrequency::Never => "never",
        }
    }
}

impl FromStr for DigestFrequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "immediate" => Ok(DigestFrequency::Immediate),
            "daily" => Ok(DigestFrequency::Daily),
            "weekly" => Ok(DigestFrequency::Weekly),
            "never" => Ok(DigestFrequency::Never),
            other => Err(anyhow!("Unknown digest frequency: {other}")),
        }
    }
}

/// Categoría de notificación a la que pertenece un evento.
pub fn event_category(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Created | EventType::Changed | EventType::Deleted => "reservation",
        EventType::Reminder => "reminder",
    }
}

/// Preferencias de canal (de usuario o de tienda).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreferences {
    pub on_site: bool,
    pub email: bool,
    pub line: bool,
    pub sms: bool,
    pub push: bool,
    /// Categorías habilitadas; vacío significa todas
    #[serde(default)]
    pub categories: Vec<String>,
    pub digest_frequency: DigestFrequency,
}

impl ChannelPreferences {
    /// Valores cuando la tienda no configuró nada: on-site + email.
    pub fn store_default() -> Self {
        Self {
            on_site: true,
            email: true,
            line: false,
            sms: false,
            push: false,
            categories: Vec::new(),
            digest_frequency: DigestFrequency::Immediate,
        }
    }

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::OnSite => self.on_site,
            Channel::Email => self.email,
            Channel::Line => self.line,
            Channel::Sms => self.sms,
            Channel::Push => self.push,
        }
    }

    pub fn category_enabled(&self, category: &str) -> bool {
        self.categories.is_empty() || self.categories.iter().any(|c| c == category)
    }

    /// Email se manda en el momento solo con frecuencia `immediate`;
    /// los recordatorios siempre salen salvo `never`.
    pub fn allows_immediate_email(&self, event_type: EventType) -> bool {
        match self.digest_frequency {
            DigestFrequency::Immediate => true,
            DigestFrequency::Never => false,
            DigestFrequency::Daily | DigestFrequency::Weekly => event_type == EventType::Reminder,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PreferenceRow {
    pub on_site: bool,
    pub email: bool,
    pub line: bool,
    pub sms: bool,
    pub push: bool,
    pub categories: String,
    pub digest_frequency: String,
}

impl TryFrom<PreferenceRow> for ChannelPreferences {
    type Error = anyhow::Error;

    fn try_from(row: PreferenceRow) -> Result<Self> {
        Ok(ChannelPreferences {
            on_site: row.on_site,
            email: row.email,
            line: row.line,
            sms: row.sms,
            push: row.push,
            categories: serde_json::from_str(&row.categories)?,
            digest_frequency: row.digest_frequency.parse()?,
        })
    }
}
