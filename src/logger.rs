//! logger.rs
//! Logger global con env_logger. Nivel desde RUST_LOG (default "info");
//! las consultas de sqlx se bajan a warn salvo que RUST_LOG diga otra cosa.

const DEFAULT_FILTER: &str = "info,sqlx=warn";

pub fn init_logger() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    // try_init: en tests el logger puede inicializarse más de una vez
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .format_target(true)
        .try_init();
}
