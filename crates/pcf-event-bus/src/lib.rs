pub mod channel;
pub mod core;
pub mod debounce;

pub use channel::{ChannelState, DIAGNOSTIC_ATTRIBUTE, PageContext, SharedChannel};
pub use core::{
    BusOptions, DispatchReport, EventBus, EventBusContainer, EventBusStats, HandlerFailure,
    HandlerResult, Subscription, SubscriptionId,
};
pub use debounce::{DebouncedSender, Debouncer};

// Re-export types for convenience
pub use pcf_types::{DispatchPolicy, NotificationPayload, PEER_EVENT_TYPE};
