//! channels/mod.rs
//! Adaptadores de canal: cada proveedor implementa `ChannelAdapter`.
//! El Queue Manager solo conoce el trait y el registro, nunca el tipo concreto.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::{collections::HashMap, sync::Arc};

use crate::models::{
    delivery_status_model::StatusReport,
    queue_model::{Channel, QueueItem},
};

pub mod email_channel;
pub mod line_channel;
pub mod onsite_channel;
pub mod push_channel;
pub mod sms_channel;

/// Resultado de un envío. Los fallos esperados del proveedor viajan aquí, no como `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    /// El proveedor tomó el mensaje (no implica entrega al usuario final)
    Accepted(Option<String>),
    /// Condición permanente: no se reintenta
    Rejected(String),
    /// Timeout, rate limit, 5xx: se reintenta en el próximo ciclo
    TransientError(String),
}

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, item: &QueueItem) -> SendResult;

    /// ¿El proveedor informa el estado de entrega de forma asíncrona?
    fn reports_status(&self) -> bool {
        false
    }

    /// Consulta el estado de un mensaje aceptado. `None` si no hay novedad.
    async fn check_status(&self, _external_ref: &str) -> Result<Option<StatusReport>> {
        Ok(None)
    }
}

/// Registro de adaptadores por canal.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza) el adaptador de su canal.
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(adapter.channel(), adapter);
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&channel).cloned()
    }

    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }
}

/// Clasificación común para proveedores HTTP cuando la respuesta no es 2xx.
pub fn classify_http_failure(status: StatusCode, body: &str) -> SendResult {
    let reason = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        SendResult::TransientError(reason)
    } else {
        SendResult::Rejected(reason)
    }
}

/// Errores de transporte (DNS, conexión, timeout) siempre son transitorios.
pub fn classify_transport_error(err: &reqwest::Error) -> SendResult {
    SendResult::TransientError(format!("transport error: {err}"))
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

/// Dirección obligatoria para canales externos; sin ella el envío es un rechazo permanente.
pub(crate) fn require_address(item: &QueueItem) -> Result<&str, SendResult> {
    item.payload
        .address
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| {
            SendResult::Rejected(format!("missing {} address for recipient", item.channel))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_failures_split_into_transient_and_permanent() {
        assert!(matches!(
            classify_http_failure(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            SendResult::TransientError(_)
        ));
        assert!(matches!(
            classify_http_failure(StatusCode::BAD_GATEWAY, ""),
            SendResult::TransientError(_)
        ));
        assert!(matches!(
            classify_http_failure(StatusCode::BAD_REQUEST, "invalid 'to'"),
            SendResult::Rejected(_)
        ));
        assert!(matches!(
            classify_http_failure(StatusCode::FORBIDDEN, ""),
            SendResult::Rejected(_)
        ));
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("hola", 10), "hola");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
