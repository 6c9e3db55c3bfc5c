//! Web API sample control
//!
//! Creates an account, queries contacts, and calls two unbound functions.
//! Every call goes straight to the OData endpoint when a base URL is
//! configured and through the host Web API otherwise.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use pcf_services::{ODataClient, ODataQuery, WebApi, WebApiResponse};
use pcf_types::ExecuteRequest;

use crate::host::{ControlContext, OutputNotifier, Outputs, StandardControl, View};

pub const ENVIRONMENT_VARIABLE_NAME: &str = "ktcs_ExampleEV";
pub const SAMPLE_FETCH_XML: &str = r#"<fetch top="50"><entity name="contact" /></fetch>"#;

/// Entity sets addressed over HTTP
pub const ACCOUNT_ENTITY_SET: &str = "accounts";
pub const CONTACT_ENTITY_SET: &str = "contacts";

pub fn sample_contact_query(page_size: usize) -> ODataQuery {
    ODataQuery::new()
        .select(["fullname", "contactid", "emailaddress1"])
        .top(page_size)
}

#[derive(Default)]
pub struct WebApiSample {
    web_api: Option<Arc<dyn WebApi>>,
    odata_client: Option<Arc<ODataClient>>,
    page_size: usize,
    last_status: Option<String>,
    notifier: Option<OutputNotifier>,
}

impl WebApiSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    /// Create one account record
    pub async fn create_account(&mut self) -> Result<WebApiResponse> {
        let request = ExecuteRequest::create(
            "account",
            json!({
                "name": "Fabrikam Inc.",
                "telephone1": "555-0100",
                "description": "Created via PCF Execute Sample"
            }),
        );
        request.validate()?;

        let result = match &self.odata_client {
            Some(client) => client
                .create(ACCOUNT_ENTITY_SET, &request.payload)
                .await
                .map(|entity_id| WebApiResponse::success(204, json!({ "entityId": entity_id }))),
            None => self.web_api()?.execute(&request).await,
        };
        let result = result.and_then(|response| {
            if response.ok {
                Ok(response)
            } else {
                Err(anyhow!(
                    "Error creating account: {}",
                    response.error_message().unwrap_or("Unknown error")
                ))
            }
        });
        self.record(&result, |_| "Account created".to_string());
        result
    }

    /// Query the first page of contacts; returns how many came back
    pub async fn retrieve_contacts(&mut self) -> Result<usize> {
        let query = sample_contact_query(self.page_size);
        let result = match &self.odata_client {
            Some(client) => client.retrieve_multiple(CONTACT_ENTITY_SET, &query).await,
            None => {
                self.web_api()?
                    .retrieve_multiple_records("contact", &query.to_query_string())
                    .await
            }
        }
        .map(|collection| collection.entities.len());

        self.record(&result, |count| {
            format!("Retrieved {} contacts via Dataverse Web API", count)
        });
        result
    }

    pub async fn retrieve_environment_variable(&mut self) -> Result<Value> {
        let result = self
            .call_function(
                "RetrieveEnvironmentVariableValue",
                "DefinitionSchemaName",
                ENVIRONMENT_VARIABLE_NAME,
            )
            .await;
        self.record(&result, |body| {
            format!("{} = {}", ENVIRONMENT_VARIABLE_NAME, body["Value"])
        });
        result
    }

    pub async fn validate_fetch_xml(&mut self) -> Result<Value> {
        let result = self
            .call_function("ValidateFetchXmlExpression", "FetchXml", SAMPLE_FETCH_XML)
            .await;
        self.record(&result, |body| {
            format!(
                "FetchXml valid: {}",
                body.pointer("/ValidationResult/IsValid")
                    .unwrap_or(&Value::Null)
            )
        });
        result
    }

    async fn call_function(&self, name: &str, parameter: &str, value: &str) -> Result<Value> {
        if let Some(client) = &self.odata_client {
            return client.call_function(name, &[(parameter, value)]).await;
        }

        let request = ExecuteRequest::function(name, json!({ parameter: value }));
        request.validate()?;
        let response = self.web_api()?.execute(&request).await?;
        if !response.ok {
            return Err(anyhow!(
                "Function '{}' failed ({}): {}",
                name,
                response.status,
                response.error_message().unwrap_or("Unknown error")
            ));
        }
        Ok(response.body)
    }

    fn web_api(&self) -> Result<Arc<dyn WebApi>> {
        self.web_api
            .clone()
            .ok_or_else(|| anyhow!("Web API sample is not initialized"))
    }

    fn record<T>(&mut self, result: &Result<T>, describe: impl FnOnce(&T) -> String) {
        let status = match result {
            Ok(value) => describe(value),
            Err(e) => {
                log::error!("Web API sample: {:#}", e);
                format!("Error: {}", e)
            }
        };
        self.last_status = Some(status);
        if let Some(notifier) = &self.notifier {
            notifier.notify_output_changed();
        }
    }
}

impl StandardControl for WebApiSample {
    fn init(&mut self, context: &ControlContext, notifier: OutputNotifier) -> Result<()> {
        self.web_api = Some(context.services.web_api()?.clone());
        self.odata_client = context.services.odata_client().ok().cloned();
        self.page_size = context.services.config().web_api.page_size;
        self.notifier = Some(notifier);
        Ok(())
    }

    fn update_view(&mut self, _context: &ControlContext) -> View {
        let view = View::new().line(
            "[Click Me!] [Click Me Too!] [Click Me Three!] [Retrieve Contacts (Dataverse)]",
        );
        match &self.last_status {
            Some(status) => view.line(status),
            None => view,
        }
    }

    fn get_outputs(&self) -> Outputs {
        Outputs::from([(
            "lastStatus".to_string(),
            self.last_status
                .as_ref()
                .map(|s| json!(s))
                .unwrap_or(Value::Null),
        )])
    }

    fn destroy(&mut self) {
        self.web_api = None;
        self.odata_client = None;
        self.notifier = None;
    }
}
