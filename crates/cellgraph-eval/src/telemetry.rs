//! Log output for the optional `tracing` feature.
//!
//! Engine spans (`build_graph`, `evaluate_all`, `partial_run`,
//! `distributed_run`, `insert_lines`, `remove_lines`) are only emitted when
//! the crate is built with `--features tracing`. Without it, every function
//! here is a no-op.

/// Install a formatting subscriber filtered by `RUST_LOG`, defaulting to
/// `filter` when the variable is unset. Returns false if a global
/// subscriber was already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(filter: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing(_filter: &str) -> bool {
    false
}

pub fn tracing_enabled() -> bool {
    cfg!(feature = "tracing")
}
