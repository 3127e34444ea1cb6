//! Logging setup shared by the sockbridge crates.
//!
//! Library code logs through the re-exported `tracing` macros under
//! [`TARGET`]. Binaries and tests call [`setup_log`] once. `RUST_LOG` wins
//! when set; otherwise only the adapters' own warnings are shown.
pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log target used by every event the adapters emit
pub const TARGET: &str = "sockbridge";

/// Directive used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "sockbridge=warn";

/// Installs the subscriber and a panic hook that logs the panic, then exits
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: TARGET, "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Installs the subscriber only. Later calls are no-ops
pub fn setup_log_no_panic_hook() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    install(filter)
}

/// Installs the subscriber with an explicit directive, ignoring `RUST_LOG`
pub fn setup_log_with_filter(directive: &str) {
    install(EnvFilter::new(directive))
}

fn install(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NONE)
        .finish()
        .try_init();
}
