//! channels/push_channel.rs
//! Canal push sobre un gateway estilo Expo: `push/send` devuelve un ticket
//! y `push/getReceipts` informa después si el dispositivo lo recibió.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::channels::{
    classify_http_failure, classify_transport_error, require_address, truncate, ChannelAdapter,
    SendResult,
};
use crate::config::engine_config::PushConfig;
use crate::models::{
    delivery_status_model::{ReportedStatus, StatusReport},
    queue_model::{Channel, QueueItem},
};

const PUSH_BODY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct PushChannel {
    http_client: Client,
    api_url: String,
    access_token: Option<String>,
}

impl PushChannel {
    pub fn new(cfg: &PushConfig, http_client: Client) -> Self {
        Self {
            http_client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            access_token: cfg.access_token.clone(),
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let req = self.http_client.post(format!("{}/{}", self.api_url, path));
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

/// Interpreta un ticket de envío ya recibido con HTTP 2xx.
pub fn interpret_ticket(body: &Value) -> SendResult {
    let ticket = body.get("data").unwrap_or(body);
    match ticket.get("status").and_then(Value::as_str) {
        Some("ok") => SendResult::Accepted(
            ticket.get("id").and_then(Value::as_str).map(str::to_string),
        ),
        Some("error") => {
            let code = ticket
                .pointer("/details/error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let message = ticket
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let reason = format!("push ticket error {code}: {message}");
            if code == "MessageRateExceeded" {
                SendResult::TransientError(reason)
            } else {
                SendResult::Rejected(reason)
            }
        }
        _ => SendResult::TransientError(format!(
            "unexpected push ticket: {}",
            truncate(&body.to_string(), 300)
        )),
    }
}

#[async_trait]
impl ChannelAdapter for PushChannel {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, item: &QueueItem) -> SendResult {
        let token = match require_address(item) {
            Ok(a) => a,
            Err(rejected) => return rejected,
        };
        let message = json!({
            "to": token,
            "title": item.payload.title,
            "body": truncate(&item.payload.body, PUSH_BODY_LIMIT),
            "data": item.payload.metadata,
        });

        let resp = match self.post("push/send").json(&message).send().await {
            Ok(r) => r,
            Err(e) => return classify_transport_error(&e),
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return classify_http_failure(status, &body);
        }

        match resp.json::<Value>().await {
            Ok(body) => interpret_ticket(&body),
            Err(e) => SendResult::TransientError(format!("push ticket unreadable: {e}")),
        }
    }

    fn reports_status(&self) -> bool {
        true
    }

    async fn check_status(&self, external_ref: &str) -> Result<Option<StatusReport>> {
        let resp = self
            .post("push/getReceipts")
            .json(&json!({ "ids": [external_ref] }))
            .send()
            .await
            .context("Push receipt request failed")?;

        let status = resp.status();
        let raw = resp.text().await.context("Push receipt body unreadable")?;
        if !status.is_success() {
            return Err(anyhow!("Push receipts HTTP {}: {}", status, truncate(&raw, 300)));
        }

        let body: Value = serde_json::from_str(&raw).context("Push receipt body is not JSON")?;
        // Sin recibo todavía: el gateway no terminó de entregar
        let Some(receipt) = body.pointer(&format!("/data/{external_ref}")) else {
            return Ok(None);
        };

        let reported = match receipt.get("status").and_then(Value::as_str) {
            Some("ok") => ReportedStatus::Delivered,
            Some("error") => ReportedStatus::Undelivered,
            _ => ReportedStatus::Unknown,
        };

        Ok(Some(StatusReport {
            status: reported,
            raw: Some(receipt.to_string()),
        }))
    }
}
