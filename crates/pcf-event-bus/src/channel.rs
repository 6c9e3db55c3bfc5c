//! Page-scoped peer channel
//!
//! A [`PageContext`] owns at most one [`SharedChannel`]. Controls receive the
//! page context from the host and call [`PageContext::ensure_channel`]; the
//! first call creates and tags the channel, every later call returns the same
//! instance.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use pcf_types::{EventBusConfig, NotificationPayload, PEER_EVENT_TYPE};

use crate::core::{
    BusOptions, DispatchReport, EventBusContainer, EventBusStats, HandlerResult, Subscription,
};

/// Attribute set on the channel when it is first created, for diagnostics
pub const DIAGNOSTIC_ATTRIBUTE: &str = "data-pcf-eventbus";

struct ChannelInner {
    name: String,
    bus: EventBusContainer<NotificationPayload>,
    attributes: Mutex<BTreeMap<String, String>>,
}

/// The page-wide publish/subscribe endpoint for peer notifications
///
/// Cloning is cheap; clones refer to the same channel.
#[derive(Clone)]
pub struct SharedChannel {
    inner: Arc<ChannelInner>,
}

impl SharedChannel {
    fn create(name: &str, options: BusOptions) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.to_string(),
                bus: EventBusContainer::with_options(options),
                attributes: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Event type every notification on this channel is dispatched as
    pub fn event_type(&self) -> &'static str {
        PEER_EVENT_TYPE
    }

    /// Deliver `payload` synchronously to every current subscriber
    ///
    /// The channel never filters by source; the publisher receives its own
    /// notification if it is subscribed without a filter.
    pub fn publish(&self, payload: NotificationPayload) -> DispatchReport {
        log::trace!(
            "[{}] {} from {}: {}",
            self.inner.name,
            PEER_EVENT_TYPE,
            payload.source_component,
            payload.message
        );
        self.inner.bus.publish(payload)
    }

    /// Register `handler` for every subsequent notification
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&NotificationPayload) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(handler)
    }

    /// Register `handler` for notifications not published by `own_id`
    pub fn subscribe_excluding_source<F>(&self, own_id: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&NotificationPayload) -> HandlerResult + Send + Sync + 'static,
    {
        let own_id = own_id.into();
        self.inner
            .bus
            .subscribe_with_filter(handler, move |payload| !payload.is_from(&own_id))
    }

    /// Register `handler` for notifications from a single source
    pub fn subscribe_from_source<F>(&self, source_id: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&NotificationPayload) -> HandlerResult + Send + Sync + 'static,
    {
        let source_id = source_id.into();
        self.inner
            .bus
            .subscribe_with_filter(handler, move |payload| payload.is_from(&source_id))
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes().insert(key.into(), value.into());
    }

    fn attributes(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.inner
            .attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> EventBusStats {
        self.inner.bus.stats()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.bus.subscriber_count()
    }

    /// Whether both handles refer to the same channel
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedChannel")
            .field("name", &self.inner.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    NotCreated,
    Created,
}

/// Everything controls on one page share
///
/// Owns the page's channel with init-once semantics. The host creates one
/// `PageContext` per page and hands it to every control it mounts.
pub struct PageContext {
    config: EventBusConfig,
    channel: OnceLock<SharedChannel>,
    channels_created: AtomicUsize,
}

impl PageContext {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            channel: OnceLock::new(),
            channels_created: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Return the page channel, creating it on first use
    pub fn ensure_channel(&self) -> SharedChannel {
        self.channel
            .get_or_init(|| {
                let channel =
                    SharedChannel::create(&self.config.channel_name, BusOptions::from(&self.config));
                channel.set_attribute(DIAGNOSTIC_ATTRIBUTE, "true");
                self.channels_created.fetch_add(1, Ordering::SeqCst);
                log::info!("PCF Event Bus initialized ({})", self.config.channel_name);
                channel
            })
            .clone()
    }

    /// The channel, if some control already created it
    pub fn channel(&self) -> Option<SharedChannel> {
        self.channel.get().cloned()
    }

    pub fn state(&self) -> ChannelState {
        if self.channel.get().is_some() {
            ChannelState::Created
        } else {
            ChannelState::NotCreated
        }
    }

    /// How many channels this page has ever created; never more than one
    pub fn channels_created(&self) -> usize {
        self.channels_created.load(Ordering::SeqCst)
    }
}

impl Default for PageContext {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl fmt::Debug for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageContext")
            .field("channel_name", &self.config.channel_name)
            .field("state", &self.state())
            .finish()
    }
}
