//! channels/email_channel.rs
//! Canal email vía SMTP (lettre). El transporte se arma una sola vez al iniciar.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use crate::channels::{require_address, ChannelAdapter, SendResult};
use crate::config::engine_config::SmtpConfig;
use crate::models::queue_model::{Channel, QueueItem};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(cfg: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = cfg.from.parse().context("Invalid SMTP_FROM address")?;

        let tls_params = TlsParameters::new(cfg.host.clone())?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.user.clone(), cfg.pass.clone()))
            .tls(Tls::Required(tls_params))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { mailer, from })
    }

    fn build_message(&self, item: &QueueItem, to: Mailbox) -> Result<Message, SendResult> {
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&item.payload.title)
            // Message-ID estable: el MTA puede descartar duplicados de un reintento
            .message_id(Some(format!("<{}@notification-dispatch>", item.id)))
            .singlepart(SinglePart::plain(item.payload.body.clone()))
            .map_err(|e| SendResult::Rejected(format!("cannot build email: {e}")))
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, item: &QueueItem) -> SendResult {
        let address = match require_address(item) {
            Ok(a) => a,
            Err(rejected) => return rejected,
        };
        let to: Mailbox = match address.parse() {
            Ok(mb) => mb,
            Err(e) => return SendResult::Rejected(format!("invalid recipient address: {e}")),
        };
        let message = match self.build_message(item, to) {
            Ok(m) => m,
            Err(rejected) => return rejected,
        };

        match tokio::time::timeout(SMTP_TIMEOUT, self.mailer.send(message)).await {
            Ok(Ok(response)) => {
                log::debug!(
                    "(email_send) SMTP aceptó item={} code={}",
                    item.id,
                    response.code()
                );
                SendResult::Accepted(None)
            }
            Ok(Err(e)) if e.is_permanent() => SendResult::Rejected(format!("smtp permanent: {e}")),
            Ok(Err(e)) => SendResult::TransientError(format!("smtp: {e}")),
            Err(_) => SendResult::TransientError("smtp timeout".to_string()),
        }
    }
}
