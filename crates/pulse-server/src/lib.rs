pub mod app;
pub mod cleanup;
pub mod config;
pub mod password;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "pulse=debug,pulse_server=debug,pulse_api=debug,pulse_gateway=debug,pulse_db=debug,tower_http=debug";

/// Install the global `tracing` subscriber.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();
}
