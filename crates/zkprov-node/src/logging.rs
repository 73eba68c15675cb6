//! Tracing setup for embedders that do not install their own subscriber.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Env var read before `RUST_LOG`.
pub const ENV_LOG: &str = "ZKPROV_LOG";

/// Initialize tracing with an env-driven filter (default INFO).
///
/// Filter source: `ZKPROV_LOG`, then `RUST_LOG`, then `info`. Safe to call
/// more than once; only the first global subscriber wins.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
