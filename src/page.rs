use std::sync::Arc;

use anyhow::Result;

use pcf_event_bus::PageContext;
use pcf_services::WebApi;
use pcf_types::Config;

use crate::app::ServiceRegistry;
use crate::host::{ControlContext, ControlHost, LifecycleError, StandardControl};

/// One hosted page: the shared page context plus the services every
/// control on it receives
pub struct Page {
    context: Arc<PageContext>,
    services: ServiceRegistry,
}

impl Page {
    pub fn new(services: ServiceRegistry) -> Self {
        let context = PageContext::new(services.config().event_bus.clone());
        Self {
            context: Arc::new(context),
            services,
        }
    }

    /// Page backed by `web_api`, with an OData client when the config names an endpoint
    pub fn with_web_api(config: Config, web_api: Arc<dyn WebApi>) -> Result<Self> {
        let mut services = ServiceRegistry::new(Arc::new(config));
        services.set_web_api(web_api);
        services.init_odata_client()?;
        Ok(Self::new(services))
    }

    pub fn context(&self) -> &Arc<PageContext> {
        &self.context
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn control_context(&self, component_id: impl Into<String>) -> ControlContext {
        ControlContext::new(component_id, self.context.clone(), self.services.clone())
    }

    /// Construct a host for `control` and initialize it
    pub fn mount<C>(&self, control: C, context: ControlContext) -> Result<ControlHost<C>, LifecycleError>
    where
        C: StandardControl,
    {
        let mut host = ControlHost::new(control, context);
        host.init()?;
        Ok(host)
    }
}
