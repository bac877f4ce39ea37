//! services/reminder_service.rs
//! Recorre reservas próximas y encola un recordatorio por reserva, una sola vez.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::config::engine_config::EngineConfig;
use crate::models::reservation_model::ReminderCounters;
use crate::services::{
    notification_router_service::NotificationRouterService,
    reservation_service::ReservationService,
};

#[derive(Clone)]
pub struct ReminderService {
    reservations: ReservationService,
    router: NotificationRouterService,
    lead: Duration,
    scan_limit: u32,
}

impl ReminderService {
    pub fn new(
        reservations: ReservationService,
        router: NotificationRouterService,
        config: &EngineConfig,
    ) -> Self {
        Self {
            reservations,
            router,
            lead: config.reminder_lead,
            scan_limit: config.reminder_scan_limit,
        }
    }

    pub async fn process_due_reminders(&self) -> Result<ReminderCounters> {
        self.process_due_reminders_at(Utc::now()).await
    }

    /// Igual que `process_due_reminders` con un "ahora" explícito.
    pub async fn process_due_reminders_at(&self, now: DateTime<Utc>) -> Result<ReminderCounters> {
        let due = self
            .reservations
            .find_due_reminders(now, self.lead, self.scan_limit)
            .await?;
        log::info!(
            "(process_due_reminders) {} reservas candidatas (lead={}m)",
            due.len(),
            self.lead.num_minutes()
        );

        let mut counters = ReminderCounters::default();
        for reservation in due {
            counters.processed += 1;

            match self.reservations.claim_reminder(&reservation.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    log::info!(
                        "(process_due_reminders) Recordatorio ya enviado reserva={}",
                        reservation.id
                    );
                    counters.skipped += 1;
                    continue;
                }
                Err(e) => {
                    log::error!(
                        "(process_due_reminders) Error en claim reserva={}: {:?}",
                        reservation.id,
                        e
                    );
                    counters.failed += 1;
                    continue;
                }
            }

            // El claim se mantiene aunque falle el ruteo: nunca se duplica un recordatorio
            match self.router.route_notification(&reservation.reminder_event()).await {
                Ok(items) => {
                    log::info!(
                        "(process_due_reminders) reserva={} encolados={}",
                        reservation.id,
                        items.len()
                    );
                    counters.sent += 1;
                }
                Err(e) => {
                    log::error!(
                        "(process_due_reminders) Error ruteando recordatorio reserva={}: {:?}",
                        reservation.id,
                        e
                    );
                    counters.failed += 1;
                }
            }
        }

        log::info!("(process_due_reminders) Terminado: {:?}", counters);
        Ok(counters)
    }
}
