//! JSON logs filtered by `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Install with a fallback directive used when `RUST_LOG` is unset or
/// unparsable.
pub fn init_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        ::tracing::debug!("tracing subscriber installed");
    }
}
