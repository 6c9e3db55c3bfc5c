use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::Instrument as _;

use pcf_samples::config_manager;
use pcf_samples::controls::{
    DebouncedInput, ENVIRONMENT_VARIABLE_NAME, EventPasser, EventReceiver, ExecuteMultipleSample,
    LazyLoaderGrid, TextEcho, WebApiSample,
};
use pcf_samples::services::InMemoryWebApi;
use pcf_samples::{ControlHost, Page, StandardControl};

#[tokio::main]
async fn main() -> Result<()> {
    pcf_samples::init_logging();

    let config_path = config_manager::resolve_config_path(parse_config_path());
    let config = config_manager::load_config_or_default(&config_path)?;
    println!("Config loaded from {}", config_path.display());

    let web_api = Arc::new(InMemoryWebApi::new());
    seed_demo_data(&web_api)?;

    let page = Page::with_web_api(config, web_api.clone())?;

    run_event_demo(&page)?;
    run_execute_demo(&page, &web_api)
        .instrument(tracing::info_span!("execute_multiple"))
        .await?;
    run_debounce_demo(&page).await?;
    run_text_echo_demo(&page)?;
    run_grid_demo(&page)?;
    run_web_api_demo(&page).await?;

    Ok(())
}

/// Parse config path from command line arguments
fn parse_config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);

    while let Some(flag) = args.next() {
        if flag == "--config" {
            if let Some(value) = args.next() {
                return Some(PathBuf::from(value));
            }
        }
    }
    None
}

fn seed_demo_data(web_api: &InMemoryWebApi) -> Result<()> {
    for (name, email) in [
        ("Nancy Anderson", "nancy@contoso.com"),
        ("Ravi Kumar", "ravi@contoso.com"),
        ("Yvonne McKay", "yvonne@contoso.com"),
    ] {
        web_api.seed(
            "contact",
            json!({ "fullname": name, "emailaddress1": email }),
        )?;
    }
    web_api.set_environment_variable(ENVIRONMENT_VARIABLE_NAME, "Hello from the environment");
    Ok(())
}

fn show<C: StandardControl>(host: &mut ControlHost<C>) -> Result<()> {
    println!("--- {} ---", host.context().component_id);
    println!("{}", host.update_view()?);
    Ok(())
}

fn run_event_demo(page: &Page) -> Result<()> {
    let _span = tracing::info_span!("event_bus").entered();

    let mut receiver = page.mount(EventReceiver::new(), page.control_context("EventReceiverPCF"))?;
    let mut passer = page.mount(EventPasser::new(), page.control_context("EventPasserPCF"))?;

    for _ in 0..2 {
        let report = passer.control_mut()?.click()?;
        log::info!("Event delivered to {} listener(s)", report.delivered);
    }

    show(&mut passer)?;
    show(&mut receiver)?;
    println!("{:?}", receiver.get_outputs()?);

    passer.destroy()?;
    receiver.destroy()?;
    Ok(())
}

async fn run_execute_demo(page: &Page, web_api: &InMemoryWebApi) -> Result<()> {
    let mut sample = page.mount(
        ExecuteMultipleSample::new(),
        page.control_context("ExecuteMultiplePCF"),
    )?;

    sample.control_mut()?.run_basic().await?;
    sample.control_mut()?.run_bulk().await?;
    sample.control_mut()?.run_advanced().await?;

    show(&mut sample)?;
    println!("{} account record(s) stored", web_api.records("account").len());
    log::info!("Host tables: {:?}", web_api.entity_names());

    sample.destroy()?;
    Ok(())
}

async fn run_debounce_demo(page: &Page) -> Result<()> {
    let mut input = page.mount(DebouncedInput::new(), page.control_context("DebouncerPCF"))?;
    let delay = Duration::from_millis(page.services().config().debounce.delay_ms);

    for text in ["H", "He", "Hel", "Hell", "Hello"] {
        input.control_mut()?.on_input(text);
        tokio::time::sleep(delay / 4).await;
    }
    show(&mut input)?;

    tokio::time::sleep(delay * 2).await;
    show(&mut input)?;

    input.destroy()?;
    Ok(())
}

fn run_text_echo_demo(page: &Page) -> Result<()> {
    let context = page
        .control_context("FluentExample")
        .with_parameter("label", json!("Input label for Fluent example"));
    let mut echo = page.mount(TextEcho::new(), context)?;

    echo.control_mut()?.set_text("Mirrored as you type");
    show(&mut echo)?;

    echo.destroy()?;
    Ok(())
}

fn run_grid_demo(page: &Page) -> Result<()> {
    let mut grid = page.mount(LazyLoaderGrid::new(), page.control_context("LazyLoader"))?;

    grid.control_mut()?.click_header("id")?;
    grid.control_mut()?.click_header("id")?;
    grid.control_mut()?.scroll_to(44 * 10);
    show(&mut grid)?;
    println!("{:?}", grid.get_outputs()?);

    grid.destroy()?;
    Ok(())
}

async fn run_web_api_demo(page: &Page) -> Result<()> {
    let mut sample = page.mount(WebApiSample::new(), page.control_context("WebAPISample"))?;

    // Each button reports its own failure in the view; keep going
    let control = sample.control_mut()?;
    let _ = control.create_account().await;
    let _ = control.retrieve_contacts().await;
    let _ = control.retrieve_environment_variable().await;
    let _ = control.validate_fetch_xml().await;

    show(&mut sample)?;

    sample.destroy()?;
    Ok(())
}
