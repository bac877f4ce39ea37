//! config/engine_config.rs
//! Configuración global del motor de notificaciones (límites, secretos y proveedores).
//! Se carga desde variables de entorno (`.env` vía dotenv).

use anyhow::{Context, Result};
use std::{env, str::FromStr, time::Duration};

pub const MIN_BATCH_SIZE: u32 = 1;
pub const MAX_BATCH_SIZE: u32 = 500;
pub const MIN_MAIL_CONCURRENT: usize = 1;
pub const MAX_MAIL_CONCURRENT: usize = 10;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Remitente completo, p.e. "Reservas <no-reply@example.com>"
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct LineConfig {
    pub api_url: String,
    pub channel_token: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub api_url: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub port: u16,

    /// Secreto compartido con el scheduler (Bearer). `None` => los triggers responden 500.
    pub cron_secret: Option<String>,
    /// Clave que inyecta el gateway de administración (header X-Admin-Key).
    pub admin_api_key: Option<String>,

    pub max_send_tries: u32,
    pub default_batch_size: u32,
    pub max_concurrent_sends: usize,
    pub mail_max_concurrent: usize,
    pub reminder_lead: chrono::Duration,
    pub reminder_scan_limit: u32,
    /// Un item in_flight más viejo que esto se considera abandonado
    pub claim_timeout: chrono::Duration,
    pub send_timeout: Duration,
    pub http_timeout: Duration,
    pub status_sync_limit: u32,

    pub smtp: Option<SmtpConfig>,
    pub line: Option<LineConfig>,
    pub sms: Option<SmsConfig>,
    pub push: Option<PushConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_url: "sqlite:data/notifications.db".to_string(),
            bind_addr: "0.0.0.0".to_string(),
            port: 5022,
            cron_secret: None,
            admin_api_key: None,
            max_send_tries: 5,
            default_batch_size: 100,
            max_concurrent_sends: 5,
            mail_max_concurrent: 3,
            reminder_lead: chrono::Duration::minutes(60),
            reminder_scan_limit: 200,
            claim_timeout: chrono::Duration::seconds(600),
            send_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(15),
            status_sync_limit: 200,
            smtp: None,
            line: None,
            sms: None,
            push: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = EngineConfig::default();

        let smtp = match (opt_var("SMTP_HOST"), opt_var("SMTP_USER"), opt_var("SMTP_PASS")) {
            (Some(host), Some(user), Some(pass)) => Some(SmtpConfig {
                port: parse_var("SMTP_PORT", 587)?,
                from: opt_var("SMTP_FROM").unwrap_or_else(|| user.clone()),
                host,
                user,
                pass,
            }),
            _ => None,
        };

        let line = opt_var("LINE_CHANNEL_TOKEN").map(|channel_token| LineConfig {
            api_url: opt_var("LINE_API_URL")
                .unwrap_or_else(|| "https://api.line.me".to_string()),
            channel_token,
        });

        let sms = match (
            opt_var("SMS_ACCOUNT_SID"),
            opt_var("SMS_AUTH_TOKEN"),
            opt_var("SMS_FROM"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(SmsConfig {
                api_url: opt_var("SMS_API_URL")
                    .unwrap_or_else(|| "https://api.twilio.com/2010-04-01".to_string()),
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };

        let push = opt_var("PUSH_API_URL").map(|api_url| PushConfig {
            api_url,
            access_token: opt_var("PUSH_ACCESS_TOKEN"),
        });

        Ok(EngineConfig {
            database_url: opt_var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: opt_var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_var("PORT", defaults.port)?,
            cron_secret: opt_var("CRON_SECRET"),
            admin_api_key: opt_var("ADMIN_API_KEY"),
            max_send_tries: parse_var("MAX_SEND_TRIES", defaults.max_send_tries)?,
            default_batch_size: parse_var("DEFAULT_BATCH_SIZE", defaults.default_batch_size)?
                .clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            max_concurrent_sends: parse_var("MAX_CONCURRENT_SENDS", defaults.max_concurrent_sends)?
                .max(1),
            mail_max_concurrent: parse_var("MAIL_MAX_CONCURRENT", defaults.mail_max_concurrent)?
                .clamp(MIN_MAIL_CONCURRENT, MAX_MAIL_CONCURRENT),
            reminder_lead: chrono::Duration::minutes(parse_var("REMINDER_LEAD_MINUTES", 60i64)?),
            reminder_scan_limit: parse_var("REMINDER_SCAN_LIMIT", defaults.reminder_scan_limit)?,
            claim_timeout: chrono::Duration::seconds(parse_var("CLAIM_TIMEOUT_SECS", 600i64)?),
            send_timeout: Duration::from_secs(parse_var("SEND_TIMEOUT_SECS", 30u64)?),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 15u64)?),
            status_sync_limit: parse_var("STATUS_SYNC_LIMIT", defaults.status_sync_limit)?,
            smtp,
            line,
            sms,
            push,
        })
    }
}

fn opt_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match opt_var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}
