//! tests/mod.rs
//! Pruebas de integración sobre SQLite en memoria.

mod delivery_status_tests;
mod queue_manager_tests;
mod router_tests;
pub mod support;
