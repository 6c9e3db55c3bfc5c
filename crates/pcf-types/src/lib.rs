pub mod config;
pub mod config_manager;
pub mod events;
pub mod request;

pub use config::{
    Config, DEFAULT_CHANNEL_NAME, DEFAULT_DEBOUNCE_DELAY_MS, DEFAULT_MAX_BATCH_SIZE,
    DebounceConfig, DispatchPolicy, EventBusConfig, GridConfig, WebApiConfig,
};
pub use events::{NotificationPayload, PEER_EVENT_TYPE};
pub use request::{
    BatchItem, ExecuteRequest, OperationKind, OperationType, ParameterType, RequestError,
    RequestMetadata,
};
