//! app.rs
use crate::handlers::{
    admin_handler, delivery_status_handler, health_endpoint, notification_handler, queue_handler,
    reminder_handler,
};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_endpoint))
        .route(
            "/queue/process",
            web::get().to(queue_handler::process_queue_endpoint),
        )
        .route(
            "/mail-queue/send",
            web::get().to(queue_handler::send_mail_queue_endpoint),
        )
        .route(
            "/reminders/process",
            web::get().to(reminder_handler::process_reminders_endpoint),
        )
        .route(
            "/delivery-status/sync",
            web::get().to(delivery_status_handler::sync_delivery_status_endpoint),
        )
        .route(
            "/notifications/route",
            web::post().to(notification_handler::route_notification_endpoint),
        )
        .route(
            "/messages/{id}",
            web::delete().to(notification_handler::delete_message_endpoint),
        )
        .service(
            web::scope("/admin")
                .service(
                    web::scope("/queue")
                        .route(
                            "/process",
                            web::post().to(admin_handler::admin_process_queue_endpoint),
                        )
                        .route(
                            "/purge",
                            web::post().to(admin_handler::purge_queue_endpoint),
                        )
                        .route(
                            "/{id}/requeue",
                            web::post().to(admin_handler::requeue_item_endpoint),
                        )
                        .route(
                            "/{id}",
                            web::get().to(admin_handler::get_queue_item_endpoint),
                        ),
                )
                .service(
                    web::scope("/preferences")
                        .route(
                            "/users/{id}",
                            web::put().to(admin_handler::put_user_preferences_endpoint),
                        )
                        .route(
                            "/stores/{id}",
                            web::put().to(admin_handler::put_store_preferences_endpoint),
                        ),
                ),
        );
}
