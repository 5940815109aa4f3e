//! Logging setup
//!
//! The crate logs through the `log` facade: sweep-cap and capacity overflows
//! at `warn`, per-view statistics at `trace`. Binaries and tests pick the
//! backend with the helpers here.

pub use log::{debug, error, info, trace, warn};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "cell_visibility=info";

/// Install `env_logger` for a binary
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Later calls are
/// ignored.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or(DEFAULT_FILTER);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Install a test-friendly logger that captures output per test
pub fn init_for_tests() {
    let _ = env_logger::Builder::from_default_env()
        .filter_module("cell_visibility", log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}
