//! Restaurant seating waitlist server
//!
//! # Modules
//!
//! - [`waitlist`] - ledger, queue index, notification gateway, coordinator, workers
//! - [`directory`] - member / restaurant lookups
//! - [`api`] - axum routes and WebSocket endpoint
//! - [`auth`] - caller identity
//! - [`core`] - configuration, state, background tasks, server lifecycle
//! - [`utils`] - clock and logging

pub mod api;
pub mod auth;
pub mod core;
pub mod directory;
pub mod utils;
pub mod waitlist;

pub use crate::core::{Config, Server, ServerError, ServerState};
pub use crate::waitlist::{WaitlistCoordinator, WaitlistError};

/// Load `.env`, read configuration, prepare the work dir and start logging
pub fn setup_environment() -> Result<Config, ServerError> {
    let _ = dotenv::dotenv();

    let config = Config::from_env();
    config.ensure_work_dir_structure()?;

    let log_dir = config.log_dir();
    utils::init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        log_dir.to_str(),
    );
    Ok(config)
}

pub fn print_banner(config: &Config) {
    println!();
    println!("  Waitlist Server v{}", env!("CARGO_PKG_VERSION"));
    println!("  environment : {}", config.environment);
    println!("  work dir    : {}", config.work_dir);
    println!("  http port   : {}", config.http_port);
    println!("  timezone    : {}", config.default_timezone);
    println!();
}
