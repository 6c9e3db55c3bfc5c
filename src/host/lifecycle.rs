//! Control lifecycle contract
//!
//! Every sample control implements [`StandardControl`]. The host calls
//! `init` once, then any number of `update_view`/`get_outputs`, then
//! `destroy`. [`crate::host::ControlHost`] enforces that order.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use serde_json::Value;

use pcf_event_bus::PageContext;

use crate::app::ServiceRegistry;

/// Values a control reports back to the host
pub type Outputs = BTreeMap<String, Value>;

/// Everything the host hands a control
#[derive(Clone)]
pub struct ControlContext {
    /// Identifier of this control instance on the page
    pub component_id: String,
    pub page: Arc<PageContext>,
    pub services: ServiceRegistry,
    /// Bound input properties
    pub parameters: BTreeMap<String, Value>,
}

impl ControlContext {
    pub fn new(
        component_id: impl Into<String>,
        page: Arc<PageContext>,
        services: ServiceRegistry,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            page,
            services,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// String parameter, `None` when absent or not a string
    pub fn string_parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }
}

impl fmt::Debug for ControlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlContext")
            .field("component_id", &self.component_id)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Lets a control tell the host its outputs changed
#[derive(Clone)]
pub struct OutputNotifier {
    changes: Arc<AtomicUsize>,
    callback: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl OutputNotifier {
    pub fn new() -> Self {
        Self {
            changes: Arc::new(AtomicUsize::new(0)),
            callback: None,
        }
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            changes: Arc::new(AtomicUsize::new(0)),
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn notify_output_changed(&self) {
        self.changes.fetch_add(1, Ordering::SeqCst);
        if let Some(callback) = &self.callback {
            callback();
        }
    }

    /// Number of notifications so far
    pub fn change_count(&self) -> usize {
        self.changes.load(Ordering::SeqCst)
    }
}

impl Default for OutputNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Text rendering of a control, one line per element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    pub lines: Vec<String>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

pub trait StandardControl: Send {
    /// Called once before anything else
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()>;

    /// Called whenever bound inputs change or the host re-renders
    fn update_view(&mut self, context: &ControlContext) -> View;

    fn get_outputs(&self) -> Outputs;

    /// Release subscriptions and timers; no calls follow
    fn destroy(&mut self);
}
