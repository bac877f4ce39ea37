//! channels/sms_channel.rs
//! Canal SMS sobre una API REST estilo Twilio. Informa estado de entrega asíncrono.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::channels::{
    classify_http_failure, classify_transport_error, require_address, truncate, ChannelAdapter,
    SendResult,
};
use crate::config::engine_config::SmsConfig;
use crate::models::{
    delivery_status_model::{ReportedStatus, StatusReport},
    queue_model::{Channel, QueueItem},
};

/// SMS concatenado razonable; el resto se corta
const SMS_TEXT_LIMIT: usize = 480;

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
    status: Option<String>,
}

/// Traduce el estado del proveedor al modelo propio.
pub fn map_sms_status(raw: &str) -> ReportedStatus {
    match raw {
        "accepted" | "scheduled" | "queued" | "sending" | "sent" => ReportedStatus::Queued,
        "delivered" => ReportedStatus::Delivered,
        "undelivered" | "failed" | "canceled" => ReportedStatus::Undelivered,
        _ => ReportedStatus::Unknown,
    }
}

#[derive(Clone)]
pub struct SmsChannel {
    http_client: Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl SmsChannel {
    pub fn new(cfg: &SmsConfig, http_client: Client) -> Self {
        Self {
            http_client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            account_sid: cfg.account_sid.clone(),
            auth_token: cfg.auth_token.clone(),
            from_number: cfg.from_number.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages", self.api_url, self.account_sid)
    }
}

#[async_trait]
impl ChannelAdapter for SmsChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, item: &QueueItem) -> SendResult {
        let to = match require_address(item) {
            Ok(a) => a,
            Err(rejected) => return rejected,
        };
        let body = truncate(&item.payload.body, SMS_TEXT_LIMIT);
        let form = [
            ("To", to),
            ("From", self.from_number.as_str()),
            ("Body", body.as_str()),
        ];

        let resp = match self
            .http_client
            .post(format!("{}.json", self.messages_url()))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return classify_transport_error(&e),
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return classify_http_failure(status, &body);
        }

        match resp.json::<MessageResource>().await {
            Ok(msg) => {
                log::debug!(
                    "(sms_send) Aceptado item={} sid={} status={:?}",
                    item.id,
                    msg.sid,
                    msg.status
                );
                SendResult::Accepted(Some(msg.sid))
            }
            // El proveedor ya lo aceptó: no reintentar aunque la respuesta no se pueda leer
            Err(e) => {
                log::warn!(
                    "(sms_send) Respuesta 2xx ilegible para item={}: {:?}",
                    item.id,
                    e
                );
                SendResult::Accepted(None)
            }
        }
    }

    fn reports_status(&self) -> bool {
        true
    }

    async fn check_status(&self, external_ref: &str) -> Result<Option<StatusReport>> {
        let resp = self
            .http_client
            .get(format!("{}/{}.json", self.messages_url(), external_ref))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .context("SMS status request failed")?;

        let status = resp.status();
        let raw = resp.text().await.context("SMS status body unreadable")?;
        if !status.is_success() {
            return Err(anyhow!("SMS status HTTP {}: {}", status, truncate(&raw, 300)));
        }

        let msg: MessageResource =
            serde_json::from_str(&raw).context("SMS status body is not a message resource")?;
        let reported = msg
            .status
            .as_deref()
            .map(map_sms_status)
            .unwrap_or(ReportedStatus::Unknown);

        Ok(Some(StatusReport {
            status: reported,
            raw: Some(raw),
        }))
    }
}
