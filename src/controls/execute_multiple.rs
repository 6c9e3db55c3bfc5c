//! ExecuteMultiple sample control
//!
//! Three buttons exercising the host Web API: a single Create, a plain batch
//! of Creates, and a batch mixing independent Creates with a change set.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};

use pcf_services::{BatchOutcome, ExecuteError, ExecuteService, WebApiResponse};
use pcf_types::{BatchItem, ExecuteRequest};

use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

pub const SAMPLE_ENTITY: &str = "account";
const BULK_RECORD_COUNT: usize = 3;

/// The record every sample request creates
pub fn sample_account() -> Value {
    json!({
        "name": "Fabrikam Inc.",
        "telephone1": "555-0100",
        "description": "Created via PCF ExecuteMultiple Sample"
    })
}

fn create_sample_account() -> ExecuteRequest {
    ExecuteRequest::create(SAMPLE_ENTITY, sample_account())
}

/// Result of the last button press, kept for display
#[derive(Debug, Clone, PartialEq)]
pub enum SampleStatus {
    Idle,
    Created(WebApiResponse),
    Executed(BatchOutcome),
    Failed(String),
}

impl SampleStatus {
    pub fn summary(&self) -> String {
        match self {
            Self::Idle => "Ready".to_string(),
            Self::Created(_) => "Record created".to_string(),
            Self::Executed(outcome) => format!(
                "Executed {} requests ({} failed)",
                outcome.submitted,
                outcome.failed()
            ),
            Self::Failed(message) => format!("Error: {}", message),
        }
    }
}

pub struct ExecuteMultipleSample {
    service: Option<Arc<ExecuteService>>,
    notifier: Option<OutputNotifier>,
    status: SampleStatus,
    requests_submitted: usize,
}

impl ExecuteMultipleSample {
    pub fn new() -> Self {
        Self {
            service: None,
            notifier: None,
            status: SampleStatus::Idle,
            requests_submitted: 0,
        }
    }

    pub fn status(&self) -> &SampleStatus {
        &self.status
    }

    /// "Basic" button: one Create through `execute`
    pub async fn run_basic(&mut self) -> Result<WebApiResponse, ExecuteError> {
        let service = self.service()?;
        let result = service.execute(&create_sample_account()).await;

        self.requests_submitted += 1;
        self.record(match &result {
            Ok(response) => SampleStatus::Created(response.clone()),
            Err(e) => SampleStatus::Failed(e.to_string()),
        });
        result
    }

    /// "Bulk" button: independent Creates in one batch
    pub async fn run_bulk(&mut self) -> Result<BatchOutcome, ExecuteError> {
        let items: Vec<BatchItem> = (0..BULK_RECORD_COUNT)
            .map(|_| BatchItem::from(create_sample_account()))
            .collect();
        self.run_batch(items).await
    }

    /// "Advanced" button: independent Creates followed by the same Creates
    /// applied atomically as one change set
    pub async fn run_advanced(&mut self) -> Result<BatchOutcome, ExecuteError> {
        let mut items: Vec<BatchItem> = (0..BULK_RECORD_COUNT)
            .map(|_| BatchItem::from(create_sample_account()))
            .collect();
        items.push(BatchItem::ChangeSet(
            (0..BULK_RECORD_COUNT).map(|_| create_sample_account()).collect(),
        ));
        self.run_batch(items).await
    }

    async fn run_batch(&mut self, items: Vec<BatchItem>) -> Result<BatchOutcome, ExecuteError> {
        let service = self.service()?;
        let result = service.execute_multiple(&items).await;

        if let Ok(outcome) = &result {
            self.requests_submitted += outcome.submitted;
        }
        self.record(match &result {
            Ok(outcome) => SampleStatus::Executed(outcome.clone()),
            Err(e) => SampleStatus::Failed(e.to_string()),
        });
        result
    }

    fn service(&self) -> Result<Arc<ExecuteService>, ExecuteError> {
        self.service
            .clone()
            .ok_or_else(|| ExecuteError::Host(anyhow::anyhow!("ExecuteMultiple sample is not initialized")))
    }

    fn record(&mut self, status: SampleStatus) {
        match &status {
            SampleStatus::Failed(message) => log::error!("ExecuteMultiple sample: {}", message),
            other => log::info!("ExecuteMultiple sample: {}", other.summary()),
        }
        self.status = status;
        if let Some(notifier) = &self.notifier {
            notifier.notify_output_changed();
        }
    }
}

impl Default for ExecuteMultipleSample {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardControl for ExecuteMultipleSample {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        let web_api = context.services.web_api()?.clone();
        let max_batch_size = context.services.config().web_api.max_batch_size;

        let service = ExecuteService::new(web_api, max_batch_size)
            .with_notifier(context.page.ensure_channel(), context.component_id.clone());
        self.service = Some(Arc::new(service));
        self.notifier = Some(notifier);
        Ok(())
    }

    fn update_view(&mut self, _context: &ControlContext) -> View {
        View::new()
            .line("[Basic] [Bulk] [Advanced]")
            .line(self.status.summary())
    }

    fn get_outputs(&self) -> Outputs {
        Outputs::from([
            ("requestsSubmitted".to_string(), json!(self.requests_submitted)),
            ("lastStatus".to_string(), json!(self.status.summary())),
        ])
    }

    fn destroy(&mut self) {
        self.service = None;
        self.notifier = None;
    }
}
