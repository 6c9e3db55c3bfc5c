// Sample controls driven through the host lifecycle
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use pcf_samples::controls::{
    DebouncedInput, ENVIRONMENT_VARIABLE_NAME, EventPasser, EventReceiver, ExecuteMultipleSample,
    LazyLoaderGrid, PASSER_COMPONENT_TYPE, PASSER_MESSAGE, SampleStatus, TextEcho, WebApiSample,
};
use pcf_samples::services::{EntityCollection, InMemoryWebApi, WebApi, WebApiResponse};
use pcf_samples::types::{BatchItem, Config, ExecuteRequest};
use pcf_samples::{ControlState, LifecycleError, Page};

fn page_with(web_api: Arc<dyn WebApi>) -> Page {
    Page::with_web_api(Config::default(), web_api).unwrap()
}

fn page() -> (Page, Arc<InMemoryWebApi>) {
    let web_api = Arc::new(InMemoryWebApi::new());
    (page_with(web_api.clone()), web_api)
}

#[test]
fn test_passer_reaches_receiver_until_destroyed() {
    let (page, _) = page();
    let mut receiver = page
        .mount(EventReceiver::new(), page.control_context("EventReceiverPCF"))
        .unwrap();
    let mut passer = page
        .mount(EventPasser::new(), page.control_context("EventPasserPCF"))
        .unwrap();

    passer.control_mut().unwrap().click().unwrap();
    passer.control_mut().unwrap().click().unwrap();

    let view = receiver.update_view().unwrap();
    assert_eq!(
        view.lines,
        vec!["Event Receiver Component".to_string(), "Event Count: 2".to_string()]
    );
    let outputs = receiver.get_outputs().unwrap();
    assert_eq!(outputs["eventCount"], json!(2));
    assert_eq!(outputs["lastMessage"], json!(PASSER_MESSAGE));
    assert_eq!(passer.get_outputs().unwrap()["eventsSent"], json!(2));

    let last = receiver.control().unwrap().last_payload().unwrap();
    assert_eq!(last.component_type, PASSER_COMPONENT_TYPE);
    assert_eq!(last.source_component, "EventPasserPCF");

    // Both the click and each delivery flag outputs as changed
    assert_eq!(passer.output_changes(), 2);
    assert_eq!(receiver.output_changes(), 2);

    receiver.destroy().unwrap();
    assert_eq!(page.context().ensure_channel().subscriber_count(), 0);

    let report = passer.control_mut().unwrap().click().unwrap();
    assert_eq!(report.delivered, 0);
}

#[test]
fn test_receiver_ignores_its_own_id_by_default() {
    let (page, _) = page();
    let mut receiver = page
        .mount(EventReceiver::new(), page.control_context("Shared"))
        .unwrap();

    // A passer publishing under the receiver's id is treated as self
    let passer_context = page
        .control_context("Passer")
        .with_parameter("sourceComponent", json!("Shared"));
    let mut passer = page.mount(EventPasser::new(), passer_context).unwrap();
    passer.control_mut().unwrap().click().unwrap();

    assert_eq!(receiver.control().unwrap().event_count(), 0);
}

#[test]
fn test_receiver_without_filter_hears_everything() {
    let (page, _) = page();
    let context = page
        .control_context("EventPasserPCF")
        .with_parameter("ignoreSource", Value::Null);
    let receiver = page.mount(EventReceiver::new(), context).unwrap();
    let mut passer = page
        .mount(EventPasser::new(), page.control_context("EventPasserPCF"))
        .unwrap();

    passer.control_mut().unwrap().click().unwrap();
    assert_eq!(receiver.control().unwrap().event_count(), 1);
}

#[test]
fn test_lifecycle_order_is_enforced() {
    let (page, _) = page();
    let mut host = pcf_samples::ControlHost::new(
        EventReceiver::new(),
        page.control_context("EventReceiverPCF"),
    );

    assert!(matches!(
        host.update_view(),
        Err(LifecycleError::NotInitialized { .. })
    ));
    host.init().unwrap();
    assert!(host.control().unwrap().is_listening());
    host.destroy().unwrap();

    assert_eq!(host.state(), ControlState::Destroyed);
    assert!(matches!(host.get_outputs(), Err(LifecycleError::Destroyed { .. })));
}

#[test]
fn test_execute_sample_without_web_api_fails_init() {
    let page = Page::new(pcf_samples::ServiceRegistry::new(Arc::new(Config::default())));
    let result = page.mount(
        ExecuteMultipleSample::new(),
        page.control_context("ExecuteMultiplePCF"),
    );
    assert!(matches!(result, Err(LifecycleError::InitFailed { .. })));
}

#[tokio::test]
async fn test_execute_multiple_sample_buttons() {
    let (page, web_api) = page();
    let channel = page.context().ensure_channel();
    let summaries = Arc::new(std::sync::Mutex::new(Vec::new()));
    let summaries_clone = summaries.clone();
    let _listener = channel.subscribe(move |payload| {
        summaries_clone.lock().unwrap().push(payload.message.clone());
        Ok(())
    });

    let mut sample = page
        .mount(
            ExecuteMultipleSample::new(),
            page.control_context("ExecuteMultiplePCF"),
        )
        .unwrap();

    let created = sample.control_mut().unwrap().run_basic().await.unwrap();
    assert!(created.ok);
    assert_eq!(web_api.records("account").len(), 1);

    let bulk = sample.control_mut().unwrap().run_bulk().await.unwrap();
    assert_eq!(bulk.submitted, 3);
    assert_eq!(web_api.records("account").len(), 4);

    let advanced = sample.control_mut().unwrap().run_advanced().await.unwrap();
    assert_eq!(advanced.submitted, 6);
    assert_eq!(advanced.failed(), 0);

    let accounts = web_api.records("account");
    assert_eq!(accounts.len(), 10);
    assert!(accounts.iter().all(|a| a["name"] == "Fabrikam Inc."
        && a["telephone1"] == "555-0100"
        && a["description"] == "Created via PCF ExecuteMultiple Sample"));

    assert!(
        sample
            .update_view()
            .unwrap()
            .contains("Executed 6 requests (0 failed)")
    );
    assert_eq!(
        sample.get_outputs().unwrap()["requestsSubmitted"],
        json!(10)
    );
    assert_eq!(
        *summaries.lock().unwrap(),
        vec![
            "Executed 3 requests (0 failed)".to_string(),
            "Executed 6 requests (0 failed)".to_string()
        ]
    );
}

struct OfflineWebApi;

#[async_trait]
impl WebApi for OfflineWebApi {
    async fn execute(&self, _: &ExecuteRequest) -> Result<WebApiResponse> {
        anyhow::bail!("host unavailable")
    }

    async fn execute_multiple(&self, _: &[BatchItem]) -> Result<Vec<WebApiResponse>> {
        anyhow::bail!("host unavailable")
    }

    async fn retrieve_multiple_records(&self, _: &str, _: &str) -> Result<EntityCollection> {
        anyhow::bail!("host unavailable")
    }
}

#[tokio::test]
async fn test_host_failures_are_reported_not_raised() {
    let page = page_with(Arc::new(OfflineWebApi));
    let mut sample = page
        .mount(
            ExecuteMultipleSample::new(),
            page.control_context("ExecuteMultiplePCF"),
        )
        .unwrap();

    assert!(sample.control_mut().unwrap().run_bulk().await.is_err());
    match sample.control().unwrap().status() {
        SampleStatus::Failed(message) => assert!(message.contains("batch aborted")),
        other => panic!("unexpected status: {:?}", other),
    }

    let mut web = page
        .mount(WebApiSample::new(), page.control_context("WebAPISample"))
        .unwrap();
    assert!(web.control_mut().unwrap().retrieve_contacts().await.is_err());
    assert!(web.update_view().unwrap().contains("Error: host unavailable"));
}

#[tokio::test(start_paused = true)]
async fn test_debounced_input_settles_after_quiet_period() {
    let (page, _) = page();
    let mut input = page
        .mount(DebouncedInput::new(), page.control_context("DebouncerPCF"))
        .unwrap();

    for text in ["d", "de", "deb"] {
        input.control_mut().unwrap().on_input(text);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(input.update_view().unwrap().contains("Debounced Value: "));
    assert_eq!(input.control().unwrap().debounced_value(), "");

    tokio::time::sleep(Duration::from_millis(250)).await;
    let view = input.update_view().unwrap();
    assert_eq!(view.lines[1], "Debounced Value: deb");
    assert_eq!(input.get_outputs().unwrap()["value"], json!("deb"));
    assert_eq!(input.output_changes(), 1);

    input.destroy().unwrap();
}

#[test]
fn test_debounced_input_needs_runtime() {
    let (page, _) = page();
    let result = page.mount(DebouncedInput::new(), page.control_context("DebouncerPCF"));
    assert!(matches!(result, Err(LifecycleError::InitFailed { .. })));
}

#[test]
fn test_text_echo_mirrors_input() {
    let (page, _) = page();
    let mut echo = page
        .mount(TextEcho::new(), page.control_context("PowerPagesVirtual"))
        .unwrap();

    echo.control_mut().unwrap().set_text("hello");
    let view = echo.update_view().unwrap();
    assert_eq!(view.lines, vec!["Input text below".to_string(), "hello".to_string()]);
    assert_eq!(echo.get_outputs().unwrap()["text"], json!("hello"));
}

#[test]
fn test_lazy_loader_renders_a_window() {
    let (page, _) = page();
    let mut grid = page
        .mount(LazyLoaderGrid::new(), page.control_context("LazyLoader"))
        .unwrap();

    let view = grid.update_view().unwrap();
    assert_eq!(view.lines[1], "ID | Name | Email");
    assert_eq!(view.lines[2], "1 | User 1 | user1@example.com");
    assert!(view.lines.len() < 30);

    grid.control_mut().unwrap().click_header("id").unwrap();
    grid.control_mut().unwrap().click_header("id").unwrap();
    let outputs = grid.get_outputs().unwrap();
    assert_eq!(outputs["rowCount"], json!(1000));
    assert_eq!(outputs["firstRenderedRowId"], json!("1000"));
    assert_eq!(outputs["sort"]["descending"], json!(true));

    assert!(grid.control_mut().unwrap().click_header("phone").is_err());
}

#[tokio::test]
async fn test_web_api_sample_prefers_configured_endpoint() {
    // Nothing listens on the discard port, so every HTTP call fails fast
    let mut config = Config::default();
    config.web_api.base_url = "http://127.0.0.1:9/api/data/v9.2".to_string();
    let web_api = Arc::new(InMemoryWebApi::new());
    let page = Page::with_web_api(config, web_api.clone()).unwrap();
    assert!(page.services().has_odata_client());

    let mut sample = page
        .mount(WebApiSample::new(), page.control_context("WebAPISample"))
        .unwrap();
    let control = sample.control_mut().unwrap();

    assert!(control.create_account().await.is_err());
    assert!(control.retrieve_contacts().await.is_err());
    assert!(control.retrieve_environment_variable().await.is_err());
    assert!(
        control
            .last_status()
            .unwrap_or_default()
            .starts_with("Error: Function 'RetrieveEnvironmentVariableValue' failed")
    );

    // The host was never consulted
    assert_eq!(web_api.call_count(), 0);
    assert!(web_api.records("account").is_empty());
}

#[tokio::test]
async fn test_web_api_sample_through_host() {
    let (page, web_api) = page();
    for i in 0..60 {
        web_api
            .seed("contact", json!({ "fullname": format!("Contact {}", i) }))
            .unwrap();
    }
    web_api.set_environment_variable(ENVIRONMENT_VARIABLE_NAME, "configured");

    let mut sample = page
        .mount(WebApiSample::new(), page.control_context("WebAPISample"))
        .unwrap();
    let control = sample.control_mut().unwrap();

    assert!(control.create_account().await.unwrap().ok);
    assert_eq!(control.retrieve_contacts().await.unwrap(), 50);
    assert_eq!(
        control.last_status(),
        Some("Retrieved 50 contacts via Dataverse Web API")
    );

    let variable = control.retrieve_environment_variable().await.unwrap();
    assert_eq!(variable["Value"], "configured");

    let validation = control.validate_fetch_xml().await.unwrap();
    assert_eq!(validation["ValidationResult"]["IsValid"], true);

    assert_eq!(web_api.records("account").len(), 1);
}
