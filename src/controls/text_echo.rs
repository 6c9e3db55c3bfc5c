use anyhow::Result;
use serde_json::json;

use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

pub const DEFAULT_ECHO_LABEL: &str = "Input text below";

/// Label that mirrors its input on every change
#[derive(Default)]
pub struct TextEcho {
    label: String,
    text: String,
    notifier: Option<OutputNotifier>,
}

impl TextEcho {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if let Some(notifier) = &self.notifier {
            notifier.notify_output_changed();
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl StandardControl for TextEcho {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        self.label = context
            .string_parameter("label")
            .unwrap_or(DEFAULT_ECHO_LABEL)
            .to_string();
        self.notifier = Some(notifier);
        Ok(())
    }

    fn update_view(&mut self, context: &ControlContext) -> View {
        if let Some(label) = context.string_parameter("label") {
            self.label = label.to_string();
        }
        View::new().line(&self.label).line(&self.text)
    }

    fn get_outputs(&self) -> Outputs {
        Outputs::from([("text".to_string(), json!(self.text))])
    }

    fn destroy(&mut self) {
        self.notifier = None;
    }
}
