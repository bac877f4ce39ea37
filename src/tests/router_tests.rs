//! tests/router_tests.rs
//! Resolución de canales y renderizado del Notification Router.

use actix_rt::test;

use crate::models::{
    event_model::EventType,
    preference_model::{ChannelPreferences, DigestFrequency},
    queue_model::Channel,
};
use crate::services::preference_service::PreferenceService;
use crate::tests::support::{count_status, event, gappy_catalog, router, router_with_catalog, test_pool};

fn all_channels() -> ChannelPreferences {
    ChannelPreferences {
        on_site: true,
        email: true,
        line: true,
        sms: true,
        push: true,
        categories: Vec::new(),
        digest_frequency: DigestFrequency::Immediate,
    }
}

fn nothing() -> ChannelPreferences {
    ChannelPreferences {
        on_site: false,
        email: false,
        line: false,
        sms: false,
        push: false,
        ..all_channels()
    }
}

fn channels_of(items: &[crate::models::queue_model::QueueItem]) -> Vec<Channel> {
    items.iter().map(|i| i.channel).collect()
}

#[test]
async fn store_without_preferences_uses_onsite_and_email() {
    let pool = test_pool().await;
    let items = router(&pool)
        .route_notification(&event(EventType::Created))
        .await
        .unwrap();

    assert_eq!(channels_of(&items), vec![Channel::OnSite, Channel::Email]);

    let onsite = &items[0];
    assert_eq!(onsite.payload.metadata["card"]["reference_id"], "res-1");
    assert!(onsite.payload.address.is_none());

    let email = &items[1];
    assert_eq!(email.payload.address.as_deref(), Some("mika@example.com"));
    assert_eq!(email.payload.title, "Reservation received at Hair Lab");
    assert!(email.payload.body.contains("Service: Cut"));
    assert_eq!(email.store_id.as_deref(), Some("store-1"));
    assert_eq!(email.sender_id.as_deref(), Some("store-owner"));
}

#[test]
async fn recipient_with_everything_disabled_gets_nothing() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool.clone());
    prefs.upsert_store_preferences("store-1", &all_channels()).await.unwrap();
    prefs.upsert_user_preferences("user-1", &nothing()).await.unwrap();

    let items = router(&pool)
        .route_notification(&event(EventType::Changed))
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[test]
async fn sms_only_for_time_sensitive_events() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool.clone());
    prefs.upsert_store_preferences("store-1", &all_channels()).await.unwrap();
    let router = router(&pool);

    let created = router.route_notification(&event(EventType::Created)).await.unwrap();
    assert!(!channels_of(&created).contains(&Channel::Sms));
    assert_eq!(created.len(), 4);

    let changed = router.route_notification(&event(EventType::Changed)).await.unwrap();
    assert_eq!(
        channels_of(&changed),
        vec![Channel::OnSite, Channel::Email, Channel::Line, Channel::Sms, Channel::Push]
    );
    let sms = changed.iter().find(|i| i.channel == Channel::Sms).unwrap();
    assert_eq!(sms.payload.address.as_deref(), Some("+886900000000"));
    assert_eq!(sms.payload.body, "Hair Lab: reservation moved to 2025-03-01 10:00 UTC.");
}

#[test]
async fn channel_without_address_is_skipped() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool.clone());
    prefs.upsert_store_preferences("store-1", &all_channels()).await.unwrap();

    let mut ev = event(EventType::Reminder);
    ev.recipient.line_user_id = None;
    ev.recipient.phone = Some("   ".to_string());

    let items = router(&pool).route_notification(&ev).await.unwrap();
    assert_eq!(
        channels_of(&items),
        vec![Channel::OnSite, Channel::Email, Channel::Push]
    );
}

#[test]
async fn digest_users_only_get_immediate_email_for_reminders() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool.clone());
    prefs
        .upsert_user_preferences(
            "user-1",
            &ChannelPreferences {
                digest_frequency: DigestFrequency::Daily,
                ..all_channels()
            },
        )
        .await
        .unwrap();
    let router = router(&pool);

    let created = router.route_notification(&event(EventType::Created)).await.unwrap();
    assert_eq!(channels_of(&created), vec![Channel::OnSite]);

    let reminder = router.route_notification(&event(EventType::Reminder)).await.unwrap();
    assert_eq!(channels_of(&reminder), vec![Channel::OnSite, Channel::Email]);
}

#[test]
async fn disabled_category_suppresses_every_channel() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool.clone());
    prefs
        .upsert_user_preferences(
            "user-1",
            &ChannelPreferences {
                categories: vec!["reservation".to_string()],
                ..all_channels()
            },
        )
        .await
        .unwrap();
    let router = router(&pool);

    assert!(router
        .route_notification(&event(EventType::Reminder))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        router
            .route_notification(&event(EventType::Deleted))
            .await
            .unwrap()
            .len(),
        2
    );
}

#[test]
async fn preferences_round_trip_through_store() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool);
    assert!(prefs.get_store_preferences("store-9").await.unwrap().is_none());

    let wanted = ChannelPreferences {
        line: true,
        categories: vec!["reminder".to_string()],
        digest_frequency: DigestFrequency::Weekly,
        ..nothing()
    };
    prefs.upsert_store_preferences("store-9", &wanted).await.unwrap();
    prefs.upsert_store_preferences("store-9", &wanted).await.unwrap();

    assert_eq!(prefs.get_store_preferences("store-9").await.unwrap(), Some(wanted));
}

#[test]
async fn render_failure_enqueues_nothing() {
    let pool = test_pool().await;
    let prefs = PreferenceService::new(pool.clone());
    prefs.upsert_store_preferences("store-1", &all_channels()).await.unwrap();

    // on-site y email se renderizan; LINE no tiene texto corto
    let router = router_with_catalog(&pool, gappy_catalog(".short"));
    let err = router
        .route_notification(&event(EventType::Changed))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("changed.short"));
    assert_eq!(count_status(&pool, "pending").await, 0);
}
