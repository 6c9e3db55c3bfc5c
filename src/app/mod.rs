mod service_registry;

pub use service_registry::ServiceRegistry;
