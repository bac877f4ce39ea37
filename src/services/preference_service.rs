//! services/preference_service.rs
//! Preferencias de notificación por usuario y por tienda.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::{
    format_ts,
    preference_model::{ChannelPreferences, PreferenceRow},
};

const PREFERENCE_COLUMNS: &str = "on_site, email, line, sms, push, categories, digest_frequency";

#[derive(Clone, Debug)]
pub struct PreferenceService {
    db_pool: Pool<Sqlite>,
}

#[derive(Clone, Copy)]
enum Owner {
    User,
    Store,
}

impl Owner {
    fn table(self) -> &'static str {
        match self {
            Owner::User => "user_notification_preferences",
            Owner::Store => "store_notification_preferences",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Owner::User => "user_id",
            Owner::Store => "store_id",
        }
    }
}

impl PreferenceService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        PreferenceService { db_pool }
    }

    pub async fn get_user_preferences(&self, user_id: &str) -> Result<Option<ChannelPreferences>> {
        self.get(Owner::User, user_id).await
    }

    pub async fn get_store_preferences(&self, store_id: &str) -> Result<Option<ChannelPreferences>> {
        self.get(Owner::Store, store_id).await
    }

    pub async fn upsert_user_preferences(&self, user_id: &str, prefs: &ChannelPreferences) -> Result<()> {
        self.upsert(Owner::User, user_id, prefs).await
    }

    pub async fn upsert_store_preferences(&self, store_id: &str, prefs: &ChannelPreferences) -> Result<()> {
        self.upsert(Owner::Store, store_id, prefs).await
    }

    async fn get(&self, owner: Owner, id: &str) -> Result<Option<ChannelPreferences>> {
        let sql = format!(
            "SELECT {PREFERENCE_COLUMNS} FROM {} WHERE {} = ?1",
            owner.table(),
            owner.key()
        );
        let row = sqlx::query_as::<_, PreferenceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await
            .with_context(|| format!("Failed to load preferences from {}", owner.table()))?;

        row.map(ChannelPreferences::try_from).transpose()
    }

    async fn upsert(&self, owner: Owner, id: &str, prefs: &ChannelPreferences) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} ({key}, {PREFERENCE_COLUMNS}, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT({key}) DO UPDATE SET
                on_site = excluded.on_site,
                email = excluded.email,
                line = excluded.line,
                sms = excluded.sms,
                push = excluded.push,
                categories = excluded.categories,
                digest_frequency = excluded.digest_frequency,
                updated_at = excluded.updated_at
            "#,
            table = owner.table(),
            key = owner.key()
        );

        sqlx::query(&sql)
            .bind(id)
            .bind(prefs.on_site)
            .bind(prefs.email)
            .bind(prefs.line)
            .bind(prefs.sms)
            .bind(prefs.push)
            .bind(serde_json::to_string(&prefs.categories)?)
            .bind(prefs.digest_frequency.as_str())
            .bind(format_ts(Utc::now()))
            .execute(&self.db_pool)
            .await
            .with_context(|| format!("Failed to save preferences into {}", owner.table()))?;

        log::info!("(upsert_preferences) {} {} actualizado", owner.key(), id);
        Ok(())
    }
}
