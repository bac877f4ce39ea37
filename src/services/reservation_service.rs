//! services/reservation_service.rs
//! Lectura de reservas próximas y el claim atómico de `reminded_at`.
//! La tabla pertenece a la plataforma; aquí solo se escribe `reminded_at`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Sqlite};

use crate::models::{
    format_ts,
    reservation_model::{Reservation, ReservationRow, ACTIVE_RESERVATION_STATUSES},
};

#[derive(Clone, Debug)]
pub struct ReservationService {
    db_pool: Pool<Sqlite>,
}

impl ReservationService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        ReservationService { db_pool }
    }

    /// Reservas activas que empiezan dentro de `lead`. Incluye las ya recordadas
    /// (quedan al final) para que el claim las cuente como omitidas.
    pub async fn find_due_reminders(
        &self,
        now: DateTime<Utc>,
        lead: Duration,
        limit: u32,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, store_id, store_name, customer_id, customer_name, customer_email,
                   customer_line_id, customer_phone, customer_push_token, locale,
                   service_name, reserved_at, status, reminded_at
            FROM reservations
            WHERE status IN (?1, ?2)
              AND reserved_at > ?3
              AND reserved_at <= ?4
            ORDER BY reminded_at IS NOT NULL, reserved_at ASC
            LIMIT ?5
            "#,
        )
        .bind(ACTIVE_RESERVATION_STATUSES[0])
        .bind(ACTIVE_RESERVATION_STATUSES[1])
        .bind(format_ts(now))
        .bind(format_ts(now + lead))
        .bind(i64::from(limit))
        .fetch_all(&self.db_pool)
        .await
        .context("Failed to select due reservations")?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    /// Marca la reserva como recordada. false si otra invocación ya lo hizo.
    pub async fn claim_reminder(&self, reservation_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE reservations SET reminded_at = ?2 WHERE id = ?1 AND reminded_at IS NULL",
        )
        .bind(reservation_id)
        .bind(format_ts(now))
        .execute(&self.db_pool)
        .await
        .context("Failed to claim reservation reminder")?;

        Ok(res.rows_affected() == 1)
    }
}

/// En producción las reservas las escribe la plataforma.
#[cfg(test)]
impl ReservationService {
    pub async fn upsert_reservation(&self, r: &Reservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO reservations (
                id, store_id, store_name, customer_id, customer_name, customer_email,
                customer_line_id, customer_phone, customer_push_token, locale,
                service_name, reserved_at, status, reminded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&r.id)
        .bind(&r.store_id)
        .bind(&r.store_name)
        .bind(&r.customer_id)
        .bind(&r.customer_name)
        .bind(&r.customer_email)
        .bind(&r.customer_line_id)
        .bind(&r.customer_phone)
        .bind(&r.customer_push_token)
        .bind(&r.locale)
        .bind(&r.service_name)
        .bind(format_ts(r.reserved_at))
        .bind(&r.status)
        .bind(r.reminded_at.map(format_ts))
        .execute(&self.db_pool)
        .await
        .context("Failed to save reservation")?;

        Ok(())
    }

    pub async fn get_reservation(&self, id: &str) -> Result<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, store_id, store_name, customer_id, customer_name, customer_email,
                   customer_line_id, customer_phone, customer_push_token, locale,
                   service_name, reserved_at, status, reminded_at
            FROM reservations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to load reservation")?;

        row.map(Reservation::try_from).transpose()
    }
}
