//! services/mod.rs
//! Capas de negocio: cola, ruteo, recordatorios y estado de entrega.

pub mod delivery_status_service;
pub mod message_catalog_service;
pub mod notification_router_service;
pub mod preference_service;
pub mod queue_manager_service;
pub mod queue_store_service;
pub mod reminder_service;
pub mod reservation_service;
