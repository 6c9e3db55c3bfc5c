use std::time::Duration;

use anyhow::{Context as _, Result};
use serde_json::{Value, json};

use pcf_event_bus::DebouncedSender;

use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

/// Text input whose label only follows the input once typing pauses
///
/// Needs a tokio runtime at `init`; the debounce timer runs as a task.
#[derive(Default)]
pub struct DebouncedInput {
    input: String,
    sender: Option<DebouncedSender<String>>,
}

impl DebouncedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input change handler; restarts the quiet period
    pub fn on_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        if let Some(sender) = &self.sender {
            sender.send(self.input.clone());
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Value shown in the label; empty until the first quiet period passes
    pub fn debounced_value(&self) -> String {
        self.sender
            .as_ref()
            .and_then(DebouncedSender::latest)
            .unwrap_or_default()
    }
}

impl StandardControl for DebouncedInput {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        tokio::runtime::Handle::try_current()
            .context("Debounced input needs a running tokio runtime")?;

        let delay_ms = match context.parameter("delayMs").and_then(Value::as_u64) {
            Some(delay) => delay,
            None => context.services.config().debounce.delay_ms,
        };

        self.sender = Some(DebouncedSender::spawn_with(
            Duration::from_millis(delay_ms),
            move |_: &String| notifier.notify_output_changed(),
        ));
        Ok(())
    }

    fn update_view(&mut self, _context: &ControlContext) -> View {
        View::new()
            .line(format!("Input: {}", self.input))
            .line(format!("Debounced Value: {}", self.debounced_value()))
    }

    fn get_outputs(&self) -> Outputs {
        Outputs::from([("value".to_string(), json!(self.debounced_value()))])
    }

    fn destroy(&mut self) {
        // Dropping the sender stops the timer task; a pending value is discarded
        self.sender = None;
    }
}
