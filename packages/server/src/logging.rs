//! env_logger setup; `tracing` events reach it through the `log` feature

use std::sync::Once;

use log::info;

static INIT_LOGGER: Once = Once::new();

/// Process-wide logger initialization
pub struct Logging;

impl Logging {
    /// Initialize logging once at startup.
    ///
    /// Levels come from `RUST_LOG` and default to `info`:
    /// - `RUST_LOG=debug` - stage transitions of every issuance
    /// - `RUST_LOG=devcert_dispenser=debug,devcert_server=info` - per-crate levels
    pub fn init() {
        INIT_LOGGER.call_once(|| {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .format_timestamp_micros()
                .init();

            info!("Logging initialized");
        });
    }

    /// Initialize logging for tests, tolerating repeated calls
    pub fn init_test() {
        let _ = env_logger::Builder::from_default_env()
            .is_test(true)
            .try_init();
    }
}
