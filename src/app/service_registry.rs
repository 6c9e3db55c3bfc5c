use std::sync::Arc;

use pcf_services::{ODataClient, WebApi};
use pcf_types::Config;

/// A clonable container for the services the host offers its controls.
///
/// `ServiceRegistry` can be cheaply cloned into every [`crate::host::ControlContext`]
/// and captured in async closures.
#[derive(Clone)]
pub struct ServiceRegistry {
    config: Arc<Config>,
    web_api: Option<Arc<dyn WebApi>>,
    odata_client: Option<Arc<ODataClient>>,
}

impl ServiceRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            web_api: None,
            odata_client: None,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn web_api(&self) -> anyhow::Result<&Arc<dyn WebApi>> {
        self.web_api
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("WebApi not initialized"))
    }

    /// HTTP client for direct OData calls; only present when a base URL is configured
    pub fn odata_client(&self) -> anyhow::Result<&Arc<ODataClient>> {
        self.odata_client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("ODataClient not initialized"))
    }

    pub fn has_odata_client(&self) -> bool {
        self.odata_client.is_some()
    }

    // --- Setters (used by the page host during initialization) ---

    pub fn set_web_api(&mut self, web_api: Arc<dyn WebApi>) {
        self.web_api = Some(web_api);
    }

    /// Build the OData client from `web_api.base_url`, if one is configured
    pub fn init_odata_client(&mut self) -> anyhow::Result<()> {
        let base_url = self.config.web_api.base_url.trim();
        if base_url.is_empty() {
            return Ok(());
        }
        let client = ODataClient::new(base_url)?;
        log::info!("OData client configured for {}", client.base_url());
        self.odata_client = Some(Arc::new(client));
        Ok(())
    }
}
