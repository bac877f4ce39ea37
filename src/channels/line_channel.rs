//! channels/line_channel.rs
//! Canal LINE: Messaging API push.
//! `X-Line-Retry-Key` = id del item, así un reintento nunca duplica el mensaje.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;

use crate::channels::{
    classify_http_failure, classify_transport_error, require_address, truncate, ChannelAdapter,
    SendResult,
};
use crate::config::engine_config::LineConfig;
use crate::models::queue_model::{Channel, QueueItem};

/// Límite de caracteres de un mensaje de texto en LINE
const LINE_TEXT_LIMIT: usize = 5000;

#[derive(Clone)]
pub struct LineChannel {
    http_client: Client,
    api_url: String,
    channel_token: String,
}

impl LineChannel {
    pub fn new(cfg: &LineConfig, http_client: Client) -> Self {
        Self {
            http_client,
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            channel_token: cfg.channel_token.clone(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for LineChannel {
    fn channel(&self) -> Channel {
        Channel::Line
    }

    async fn send(&self, item: &QueueItem) -> SendResult {
        let to = match require_address(item) {
            Ok(a) => a,
            Err(rejected) => return rejected,
        };

        let payload = json!({
            "to": to,
            "messages": [{
                "type": "text",
                "text": truncate(&item.payload.body, LINE_TEXT_LIMIT - 1),
            }]
        });

        let resp = match self
            .http_client
            .post(format!("{}/v2/bot/message/push", self.api_url))
            .bearer_auth(&self.channel_token)
            .header("X-Line-Retry-Key", item.id.as_str())
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return classify_transport_error(&e),
        };

        let status = resp.status();
        if status.is_success() {
            let body = resp.json::<serde_json::Value>().await.unwrap_or_default();
            let sent_id = body
                .pointer("/sentMessages/0/id")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return SendResult::Accepted(sent_id);
        }

        // 409 con la misma retry key: LINE ya aceptó este mensaje antes
        if status == StatusCode::CONFLICT {
            log::info!(
                "(line_send) Retry key ya aceptada por LINE, item={}",
                item.id
            );
            return SendResult::Accepted(None);
        }

        let body = resp.text().await.unwrap_or_default();
        classify_http_failure(status, &body)
    }
}
