pub mod app;
pub mod config_manager;
pub mod controls;
pub mod grid;
pub mod host;
mod page;

pub use app::ServiceRegistry;
pub use host::{
    ControlContext, ControlHost, ControlState, LifecycleError, OutputNotifier, Outputs,
    StandardControl, View,
};
pub use page::Page;

// Re-export the workspace crates for convenience
pub use pcf_event_bus as event_bus;
pub use pcf_services as services;
pub use pcf_types as types;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Install the global tracing subscriber; `log` records are forwarded to it
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it again is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init()
        .is_err()
    {
        log::debug!("Logging already initialized");
    }
}
