use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde_json::{Value, json};

use pcf_event_bus::{HandlerResult, NotificationPayload, Subscription};

use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

#[derive(Debug, Default)]
struct Received {
    count: usize,
    last: Option<NotificationPayload>,
}

/// Counts peer notifications from other controls on the page
///
/// By default notifications published under its own component id are
/// ignored. The `ignoreSource` parameter names a different id to ignore;
/// setting it to `null` disables filtering.
#[derive(Default)]
pub struct EventReceiver {
    received: Arc<Mutex<Received>>,
    subscription: Option<Subscription>,
    ignore_source: Option<String>,
}

impl EventReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.received().count
    }

    pub fn last_payload(&self) -> Option<NotificationPayload> {
        self.received().last.clone()
    }

    pub fn is_listening(&self) -> bool {
        self.subscription.is_some()
    }

    fn received(&self) -> std::sync::MutexGuard<'_, Received> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StandardControl for EventReceiver {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        let channel = context.page.ensure_channel();

        self.ignore_source = match context.parameter("ignoreSource") {
            Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            _ => Some(context.component_id.clone()),
        };

        let received = self.received.clone();
        let handler = move |payload: &NotificationPayload| -> HandlerResult {
            log::debug!("Received peer event: {:?}", payload);
            {
                let mut received = received.lock().unwrap_or_else(PoisonError::into_inner);
                received.count += 1;
                received.last = Some(payload.clone());
            }
            notifier.notify_output_changed();
            Ok(())
        };

        let subscription = match &self.ignore_source {
            Some(ignored) => channel.subscribe_excluding_source(ignored.clone(), handler),
            None => channel.subscribe(handler),
        };
        self.subscription = Some(subscription);
        Ok(())
    }

    fn update_view(&mut self, _context: &ControlContext) -> View {
        View::new()
            .line("Event Receiver Component")
            .line(format!("Event Count: {}", self.event_count()))
    }

    fn get_outputs(&self) -> Outputs {
        let received = self.received();
        Outputs::from([
            ("eventCount".to_string(), json!(received.count)),
            (
                "lastMessage".to_string(),
                received
                    .last
                    .as_ref()
                    .map(|p| json!(p.message))
                    .unwrap_or(Value::Null),
            ),
        ])
    }

    fn destroy(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
    }
}
