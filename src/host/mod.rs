mod container;
mod lifecycle;

pub use container::{ControlHost, ControlState, LifecycleError};
pub use lifecycle::{ControlContext, OutputNotifier, Outputs, StandardControl, View};
