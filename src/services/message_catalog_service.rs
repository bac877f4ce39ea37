//! services/message_catalog_service.rs
//! Catálogo de textos localizados por (locale, key), renderizado con Handlebars.
//! Resolución de locale: exacto -> mismo idioma -> "en".

use anyhow::{anyhow, Result};
use handlebars::Handlebars;
use serde_json::Value;

pub const FALLBACK_LOCALE: &str = "en";

pub trait MessageCatalog: Send + Sync {
    /// Locales disponibles, tal como se registraron.
    fn locales(&self) -> Vec<&str>;

    fn has_template(&self, locale: &str, key: &str) -> bool;

    /// Renderiza la plantilla de un locale exacto.
    fn render_template(&self, locale: &str, key: &str, params: &Value) -> Result<String>;

    /// Locale efectivo para lo que pidió el destinatario.
    fn resolve_locale(&self, requested: &str) -> String {
        let locales = self.locales();
        let requested = requested.trim().replace('_', "-");

        if let Some(exact) = locales.iter().find(|l| l.eq_ignore_ascii_case(&requested)) {
            return exact.to_string();
        }

        let language = requested.split('-').next().unwrap_or_default();
        if !language.is_empty() {
            if let Some(same_lang) = locales.iter().find(|l| {
                l.split('-')
                    .next()
                    .is_some_and(|lang| lang.eq_ignore_ascii_case(language))
            }) {
                return same_lang.to_string();
            }
        }

        FALLBACK_LOCALE.to_string()
    }

    /// Renderiza `key` para el locale pedido. Si el locale no tiene la clave, usa "en";
    /// `None` si ninguno la tiene.
    fn render(&self, locale: &str, key: &str, params: &Value) -> Result<Option<String>> {
        let resolved = self.resolve_locale(locale);
        let chosen = if self.has_template(&resolved, key) {
            resolved.as_str()
        } else if self.has_template(FALLBACK_LOCALE, key) {
            FALLBACK_LOCALE
        } else {
            return Ok(None);
        };
        self.render_template(chosen, key, params).map(Some)
    }
}

/// Catálogo embebido con los textos de reservas (en, ja, zh-TW).
/// Cada plantilla se registra como `"{locale}.{key}"`.
pub struct StaticMessageCatalog {
    handlebars: Handlebars<'static>,
    locales: Vec<&'static str>,
}

impl StaticMessageCatalog {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // Texto plano: SMS, LINE y push no llevan HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);

        let catalogs: [(&'static str, &[(&str, &str)]); 3] =
            [("en", EN), ("ja", JA), ("zh-TW", ZH_TW)];
        for (locale, templates) in catalogs {
            for (key, template) in templates {
                let name = template_name(locale, key);
                handlebars
                    .register_template_string(&name, template)
                    .map_err(|e| anyhow!("Failed to register template {name}: {e}"))?;
            }
        }

        let mut locales: Vec<&'static str> = catalogs.iter().map(|(l, _)| *l).collect();
        locales.sort_unstable();
        Ok(StaticMessageCatalog { handlebars, locales })
    }
}

impl MessageCatalog for StaticMessageCatalog {
    fn locales(&self) -> Vec<&str> {
        self.locales.clone()
    }

    fn has_template(&self, locale: &str, key: &str) -> bool {
        self.handlebars.has_template(&template_name(locale, key))
    }

    fn render_template(&self, locale: &str, key: &str, params: &Value) -> Result<String> {
        let name = template_name(locale, key);
        self.handlebars
            .render(&name, params)
            .map_err(|e| anyhow!("Failed to render template {name}: {e}"))
    }
}

fn template_name(locale: &str, key: &str) -> String {
    format!("{locale}.{key}")
}

const EN: &[(&str, &str)] = &[
    ("created.title", "Reservation received at {{store_name}}"),
    ("created.body", "Hello {{customer_name}},\n\nYour reservation at {{store_name}} on {{reserved_at}} has been received."),
    ("created.short", "{{store_name}}: reservation on {{reserved_at}} received."),
    ("changed.title", "Reservation updated at {{store_name}}"),
    ("changed.body", "Hello {{customer_name}},\n\nYour reservation at {{store_name}} was changed. New time: {{reserved_at}}."),
    ("changed.short", "{{store_name}}: reservation moved to {{reserved_at}}."),
    ("deleted.title", "Reservation cancelled at {{store_name}}"),
    ("deleted.body", "Hello {{customer_name}},\n\nYour reservation at {{store_name}} on {{reserved_at}} has been cancelled."),
    ("deleted.short", "{{store_name}}: reservation on {{reserved_at}} cancelled."),
    ("reminder.title", "Reminder: your reservation at {{store_name}}"),
    ("reminder.body", "Hello {{customer_name}},\n\nThis is a reminder of your reservation at {{store_name}} on {{reserved_at}}."),
    ("reminder.short", "Reminder: {{store_name}} on {{reserved_at}}."),
    ("service_line", "Service: {{service_name}}"),
];

const JA: &[(&str, &str)] = &[
    ("created.title", "{{store_name}}のご予約を受け付けました"),
    ("created.body", "{{customer_name}}様\n\n{{store_name}}のご予約（{{reserved_at}}）を受け付けました。"),
    ("created.short", "{{store_name}}：{{reserved_at}}のご予約を受け付けました。"),
    ("changed.title", "{{store_name}}のご予約が変更されました"),
    ("changed.body", "{{customer_name}}様\n\n{{store_name}}のご予約が変更されました。新しい日時：{{reserved_at}}"),
    ("changed.short", "{{store_name}}：ご予約が{{reserved_at}}に変更されました。"),
    ("deleted.title", "{{store_name}}のご予約がキャンセルされました"),
    ("deleted.body", "{{customer_name}}様\n\n{{store_name}}のご予約（{{reserved_at}}）はキャンセルされました。"),
    ("deleted.short", "{{store_name}}：{{reserved_at}}のご予約はキャンセルされました。"),
    ("reminder.title", "【リマインダー】{{store_name}}のご予約"),
    ("reminder.body", "{{customer_name}}様\n\n{{store_name}}のご予約（{{reserved_at}}）のお知らせです。"),
    ("reminder.short", "リマインダー：{{store_name}} {{reserved_at}}"),
    ("service_line", "メニュー：{{service_name}}"),
];

const ZH_TW: &[(&str, &str)] = &[
    ("created.title", "已收到您在{{store_name}}的預約"),
    ("created.body", "{{customer_name}} 您好：\n\n已收到您在{{store_name}}的預約（{{reserved_at}}）。"),
    ("created.short", "{{store_name}}：已收到 {{reserved_at}} 的預約。"),
    ("changed.title", "您在{{store_name}}的預約已變更"),
    ("changed.body", "{{customer_name}} 您好：\n\n您在{{store_name}}的預約已變更，新的時間：{{reserved_at}}。"),
    ("changed.short", "{{store_name}}：預約已改至 {{reserved_at}}。"),
    ("deleted.title", "您在{{store_name}}的預約已取消"),
    ("deleted.body", "{{customer_name}} 您好：\n\n您在{{store_name}}的預約（{{reserved_at}}）已取消。"),
    ("deleted.short", "{{store_name}}：{{reserved_at}} 的預約已取消。"),
    ("reminder.title", "預約提醒：{{store_name}}"),
    ("reminder.body", "{{customer_name}} 您好：\n\n提醒您在{{store_name}}的預約時間為 {{reserved_at}}。"),
    ("reminder.short", "提醒：{{store_name}} {{reserved_at}}"),
    ("service_line", "服務項目：{{service_name}}"),
];
