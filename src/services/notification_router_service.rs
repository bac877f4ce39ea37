//! services/notification_router_service.rs
//! Convierte un evento de dominio en un QueueItem por cada canal aplicable y habilitado.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::{
    event_model::{EventType, NotificationEvent, Recipient},
    preference_model::{event_category, ChannelPreferences},
    queue_model::{Channel, NewQueueItem, QueueItem, QueuePayload},
};
use crate::services::{
    message_catalog_service::MessageCatalog, preference_service::PreferenceService,
    queue_store_service::QueueStoreService,
};

#[derive(Clone)]
pub struct NotificationRouterService {
    store: QueueStoreService,
    preferences: PreferenceService,
    catalog: Arc<dyn MessageCatalog>,
}

/// Canal elegido junto con la dirección del destinatario para ese canal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub channel: Channel,
    pub address: Option<String>,
}

impl NotificationRouterService {
    pub fn new(
        store: QueueStoreService,
        preferences: PreferenceService,
        catalog: Arc<dyn MessageCatalog>,
    ) -> Self {
        Self {
            store,
            preferences,
            catalog,
        }
    }

    pub async fn route_notification(&self, event: &NotificationEvent) -> Result<Vec<QueueItem>> {
        let store_prefs = self
            .preferences
            .get_store_preferences(&event.store_id)
            .await?
            .unwrap_or_else(ChannelPreferences::store_default);
        let user_prefs = self
            .preferences
            .get_user_preferences(&event.recipient.id)
            .await?;

        let targets = select_channels(event, &store_prefs, user_prefs.as_ref());
        if targets.is_empty() {
            log::info!(
                "(route_notification) Sin canales habilitados evento={} ref={} destinatario={}",
                event.event_type,
                event.reference_id,
                event.recipient.id
            );
            return Ok(Vec::new());
        }

        // Render completo antes de la transacción
        let new_items = targets
            .iter()
            .map(|target| {
                Ok(NewQueueItem {
                    channel: target.channel,
                    recipient_id: event.recipient.id.clone(),
                    sender_id: event.sender_id.clone(),
                    store_id: Some(event.store_id.clone()),
                    payload: self.render_payload(event, target)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let items = self.store.enqueue_all(new_items).await?;
        for item in &items {
            log::info!(
                "(route_notification) Encolado item={} canal={} evento={} ref={}",
                item.id,
                item.channel,
                event.event_type,
                event.reference_id
            );
        }
        Ok(items)
    }

    fn render_payload(&self, event: &NotificationEvent, target: &ChannelTarget) -> Result<QueuePayload> {
        let locale = self.catalog.resolve_locale(&event.recipient.locale);
        let prefix = event.event_type.as_str();

        let params = json!({
            "store_name": event.display.store_name,
            "customer_name": event.display.customer_name,
            "reserved_at": event.display.reserved_at,
            "service_name": event.display.service_name,
        });

        let text = |key: &str| -> Result<String> {
            let full_key = format!("{prefix}.{key}");
            self.catalog
                .render(&locale, &full_key, &params)?
                .ok_or_else(|| anyhow!("Missing message template {full_key} for locale {locale}"))
        };

        let title = text("title")?;
        let (body, metadata) = match target.channel {
            Channel::Email => (
                self.long_body(text("body")?, event, &locale, &params)?,
                json!({ "locale": locale }),
            ),
            Channel::OnSite => (
                self.long_body(text("body")?, event, &locale, &params)?,
                json!({
                    "locale": locale,
                    "card": {
                        "type": "reservation",
                        "event_type": event.event_type,
                        "reference_id": event.reference_id,
                        "store_name": event.display.store_name,
                        "reserved_at": event.display.reserved_at,
                        "service_name": event.display.service_name,
                    }
                }),
            ),
            Channel::Line | Channel::Sms | Channel::Push => (
                text("short")?,
                json!({
                    "locale": locale,
                    "reference_id": event.reference_id,
                    "event_type": event.event_type,
                }),
            ),
        };

        Ok(QueuePayload {
            title,
            body,
            address: target.address.clone(),
            event_type: event.event_type,
            reference_id: Some(event.reference_id.clone()),
            metadata,
        })
    }

    fn long_body(
        &self,
        body: String,
        event: &NotificationEvent,
        locale: &str,
        params: &Value,
    ) -> Result<String> {
        if event.display.service_name.is_none() {
            return Ok(body);
        }
        Ok(match self.catalog.render(locale, "service_line", params)? {
            Some(line) => format!("{body}\n{line}"),
            None => body,
        })
    }
}

/// Decide los canales de un evento a partir de preferencias de tienda y usuario.
/// La tienda define qué ofrece; el usuario solo puede restringir.
pub fn select_channels(
    event: &NotificationEvent,
    store_prefs: &ChannelPreferences,
    user_prefs: Option<&ChannelPreferences>,
) -> Vec<ChannelTarget> {
    let category = event_category(event.event_type);
    let all_prefs = std::iter::once(store_prefs).chain(user_prefs);

    if !all_prefs.clone().all(|p| p.category_enabled(category)) {
        return Vec::new();
    }

    let mut targets = Vec::new();
    for channel in Channel::ALL {
        if !all_prefs.clone().all(|p| p.channel_enabled(channel)) {
            continue;
        }
        if !channel_applies(channel, event.event_type) {
            continue;
        }
        if channel == Channel::Email
            && !all_prefs
                .clone()
                .all(|p| p.allows_immediate_email(event.event_type))
        {
            continue;
        }

        let address = match channel {
            Channel::OnSite => None,
            _ => match recipient_address(&event.recipient, channel) {
                Some(a) => Some(a),
                None => {
                    log::info!(
                        "(select_channels) Destinatario {} sin dirección para canal={}, se omite",
                        event.recipient.id,
                        channel
                    );
                    continue;
                }
            },
        };
        targets.push(ChannelTarget { channel, address });
    }
    targets
}

/// SMS solo para eventos sensibles al tiempo; el resto de canales aplica siempre.
pub fn channel_applies(channel: Channel, event_type: EventType) -> bool {
    match channel {
        Channel::Sms => event_type.is_time_sensitive(),
        Channel::OnSite | Channel::Email | Channel::Line | Channel::Push => true,
    }
}

fn recipient_address(recipient: &Recipient, channel: Channel) -> Option<String> {
    let raw = match channel {
        Channel::OnSite => return None,
        Channel::Email => recipient.email.as_deref(),
        Channel::Line => recipient.line_user_id.as_deref(),
        Channel::Sms => recipient.phone.as_deref(),
        Channel::Push => recipient.push_token.as_deref(),
    };
    raw.map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}
