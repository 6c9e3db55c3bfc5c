use anyhow::{Result, anyhow};
use serde_json::json;

use pcf_event_bus::{DispatchReport, NotificationPayload, SharedChannel};

use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

pub const PASSER_MESSAGE: &str = "Hello from PCF EventPasser";
pub const PASSER_COMPONENT_TYPE: &str = "PCF in Power Pages";
pub const DEFAULT_PASSER_ID: &str = "EventPasserPCF";

/// Publishes a greeting on the page channel each time its button is clicked
#[derive(Default)]
pub struct EventPasser {
    source_id: String,
    channel: Option<SharedChannel>,
    notifier: Option<OutputNotifier>,
    events_sent: usize,
    last_report: Option<DispatchReport>,
}

impl EventPasser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Button handler: publish one notification and flag outputs as changed
    pub fn click(&mut self) -> Result<DispatchReport> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| anyhow!("EventPasser clicked before init"))?;

        let report = channel.publish(NotificationPayload::new(
            PASSER_MESSAGE,
            PASSER_COMPONENT_TYPE,
            self.source_id.clone(),
        ));
        self.events_sent += 1;
        self.last_report = Some(report.clone());

        if let Some(notifier) = &self.notifier {
            notifier.notify_output_changed();
        }
        Ok(report)
    }

    pub fn events_sent(&self) -> usize {
        self.events_sent
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

impl StandardControl for EventPasser {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        self.source_id = context
            .string_parameter("sourceComponent")
            .unwrap_or(DEFAULT_PASSER_ID)
            .to_string();
        self.channel = Some(context.page.ensure_channel());
        self.notifier = Some(notifier);
        Ok(())
    }

    fn update_view(&mut self, _context: &ControlContext) -> View {
        let mut view = View::new()
            .line("[Send Event]")
            .line(format!("Events sent: {}", self.events_sent));
        if let Some(report) = &self.last_report {
            view = view.line(format!("Last event reached {} listener(s)", report.delivered));
        }
        view
    }

    fn get_outputs(&self) -> Outputs {
        Outputs::from([("eventsSent".to_string(), json!(self.events_sent))])
    }

    fn destroy(&mut self) {
        self.channel = None;
        self.notifier = None;
    }
}
