//! Core Event Bus Implementation
//!
//! Provides a type-safe, synchronous publish/subscribe bus:
//! - Subscription lifecycle management (subscribe/unsubscribe, RAII disposers)
//! - Filtering and one-shot subscriptions
//! - Handler isolation (errors and panics) per [`DispatchPolicy`]
//! - Bounded re-entrant publishing
//! - Performance metrics

use std::{
    any::Any,
    cell::RefCell,
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use pcf_types::{DispatchPolicy, EventBusConfig, config::DEFAULT_MAX_DISPATCH_DEPTH};

/// Result returned by every subscriber callback
pub type HandlerResult = anyhow::Result<()>;

/// Unique identifier for event subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(usize);

impl SubscriptionId {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Statistics for event bus performance monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBusStats {
    /// Total number of events published
    pub events_published: usize,
    /// Total number of events delivered to subscribers
    pub events_delivered: usize,
    /// Current number of active subscriptions
    pub active_subscriptions: usize,
    /// Total number of subscriptions created
    pub total_subscriptions: usize,
    /// Subscriber callbacks that returned an error or panicked
    pub handler_failures: usize,
    /// Nested publishes refused because the dispatch depth limit was reached
    pub rejected_dispatches: usize,
}

/// Dispatch behaviour of a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusOptions {
    pub policy: DispatchPolicy,
    pub max_dispatch_depth: usize,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            policy: DispatchPolicy::default(),
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}

impl From<&EventBusConfig> for BusOptions {
    fn from(config: &EventBusConfig) -> Self {
        Self {
            policy: config.dispatch_policy,
            max_dispatch_depth: config.max_dispatch_depth.max(1),
        }
    }
}

/// A subscriber callback that failed during a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub error: String,
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of subscriber callbacks invoked
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
    /// Subscribers not reached because a fail-fast dispatch stopped early
    pub skipped: usize,
    /// The publish was refused by the dispatch depth limit
    pub rejected: bool,
}

impl DispatchReport {
    fn rejected() -> Self {
        Self {
            rejected: true,
            ..Self::default()
        }
    }

    /// Every reached subscriber succeeded and nobody was skipped
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0 && !self.rejected
    }
}

type Callback<T> = Box<dyn Fn(&T) -> HandlerResult + Send + Sync>;
type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Subscriber callback with filtering support
struct Subscriber<T> {
    id: SubscriptionId,
    callback: Callback<T>,
    filter: Option<Filter<T>>,
    once: bool,
    active: AtomicBool,
}

impl<T> Subscriber<T> {
    fn new(callback: Callback<T>, filter: Option<Filter<T>>, once: bool) -> Self {
        Self {
            id: SubscriptionId::new(),
            callback,
            filter,
            once,
            active: AtomicBool::new(true),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn should_notify(&self, event: &T) -> bool {
        match &self.filter {
            Some(filter) => filter(event),
            None => true,
        }
    }

    /// Run the callback; panics are turned into errors
    fn notify(&self, event: &T) -> Result<(), String> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(format!("{:#}", error)),
            Err(payload) => Err(format!("handler panicked: {}", panic_message(&*payload))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Invoke `subscribers` in order, returning the report and the one-shot
/// subscribers that fired
fn dispatch<T>(
    subscribers: &[Arc<Subscriber<T>>],
    event: &T,
    policy: DispatchPolicy,
) -> (DispatchReport, Vec<SubscriptionId>) {
    let mut report = DispatchReport::default();
    let mut finished = Vec::new();

    for (position, subscriber) in subscribers.iter().enumerate() {
        if !subscriber.is_active() || !subscriber.should_notify(event) {
            continue;
        }

        if subscriber.once {
            // A nested dispatch may already have consumed it
            if !subscriber.active.swap(false, Ordering::SeqCst) {
                continue;
            }
            finished.push(subscriber.id);
        }

        report.delivered += 1;

        if let Err(error) = subscriber.notify(event) {
            log::warn!(
                "[EventBus] Subscriber {:?} failed: {}",
                subscriber.id,
                error
            );
            report.failures.push(HandlerFailure {
                subscription: subscriber.id,
                error,
            });

            if policy == DispatchPolicy::FailFast {
                report.skipped = subscribers[position + 1..]
                    .iter()
                    .filter(|s| s.is_active() && s.should_notify(event))
                    .count();
                break;
            }
        }
    }

    (report, finished)
}

/// Core event bus implementation for a single owner
///
/// Use [`EventBusContainer`] to share a bus between components.
pub struct EventBus<T> {
    subscribers: Vec<Arc<Subscriber<T>>>,
    stats: EventBusStats,
    options: BusOptions,
}

impl<T> EventBus<T>
where
    T: Clone,
{
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    pub fn with_options(options: BusOptions) -> Self {
        Self {
            subscribers: Vec::new(),
            stats: EventBusStats::default(),
            options,
        }
    }

    pub fn options(&self) -> BusOptions {
        self.options
    }

    fn add(&mut self, subscriber: Subscriber<T>) -> SubscriptionId {
        let id = subscriber.id;
        self.subscribers.push(Arc::new(subscriber));
        self.stats.active_subscriptions += 1;
        self.stats.total_subscriptions += 1;

        log::trace!("[EventBus] New subscription: {:?}", id);
        id
    }

    /// Subscribe to every event
    ///
    /// Returns a SubscriptionId that can be used to unsubscribe later.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.add(Subscriber::new(Box::new(callback), None, false))
    }

    /// Subscribe to events with a filter predicate
    ///
    /// Only events matching the filter will be delivered to the callback.
    pub fn subscribe_with_filter<F, P>(&mut self, callback: F, filter: Option<P>) -> SubscriptionId
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let filter = filter.map(|f| Box::new(f) as Filter<T>);
        self.add(Subscriber::new(Box::new(callback), filter, false))
    }

    /// Subscribe to a single event (one-shot subscription)
    ///
    /// The subscription is removed after the first event it receives.
    pub fn subscribe_once<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnOnce(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let callback_cell = Mutex::new(Some(callback));
        let callback = move |event: &T| {
            let cb = lock(&callback_cell).take();
            match cb {
                Some(cb) => cb(event),
                None => Ok(()),
            }
        };
        self.add(Subscriber::new(Box::new(callback), None, true))
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        match self.subscribers.iter().position(|s| s.id == id) {
            Some(pos) => {
                let subscriber = self.subscribers.remove(pos);
                subscriber.active.store(false, Ordering::SeqCst);
                self.stats.active_subscriptions = self.stats.active_subscriptions.saturating_sub(1);
                log::trace!("[EventBus] Unsubscribed: {:?}", id);
                true
            }
            None => false,
        }
    }

    /// Unsubscribe using a subscription ID
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let removed = self.remove(id);
        if !removed {
            log::warn!("[EventBus] Subscription not found: {:?}", id);
        }
        removed
    }

    /// Publish an event to all subscribers in registration order
    pub fn publish(&mut self, event: T) -> DispatchReport {
        self.stats.events_published += 1;
        let (report, finished) = dispatch(&self.subscribers, &event, self.options.policy);
        self.record(&report, finished);
        report
    }

    fn snapshot(&self) -> Vec<Arc<Subscriber<T>>> {
        self.subscribers.clone()
    }

    fn record(&mut self, report: &DispatchReport, finished: Vec<SubscriptionId>) {
        self.stats.events_delivered += report.delivered;
        self.stats.handler_failures += report.failures.len();

        // Remove one-shot subscribers
        for id in finished {
            self.remove(id);
        }

        log::trace!(
            "[EventBus] Published event to {} subscribers",
            report.delivered
        );
    }

    /// Get current statistics
    pub fn stats(&self) -> EventBusStats {
        self.stats.clone()
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Clear all subscriptions
    pub fn clear(&mut self) {
        let count = self.subscribers.len();
        for subscriber in self.subscribers.drain(..) {
            subscriber.active.store(false, Ordering::SeqCst);
        }
        self.stats.active_subscriptions = 0;
        log::info!("[EventBus] Cleared {} subscriptions", count);
    }
}

impl<T> Default for EventBus<T>
where
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Disposer for a listener registered on an [`EventBusContainer`]
///
/// Dropping the value removes the listener. Call [`Subscription::detach`] to
/// keep the listener for the lifetime of the bus instead.
#[must_use = "dropping a Subscription removes the listener; call `detach` to keep it"]
pub struct Subscription {
    id: SubscriptionId,
    release: Option<Box<dyn FnOnce(SubscriptionId) + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the listener now
    pub fn dispose(mut self) {
        self.release_now();
    }

    /// Keep the listener registered and give up the disposer
    pub fn detach(mut self) -> SubscriptionId {
        self.release = None;
        self.id
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("attached", &self.release.is_some())
            .finish()
    }
}

thread_local! {
    /// Dispatch depth of each bus on the current thread, keyed by bus address
    static DISPATCH_DEPTH: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

fn current_depth(bus: usize) -> usize {
    DISPATCH_DEPTH.with(|depths| depths.borrow().get(&bus).copied().unwrap_or(0))
}

/// Holds one level of dispatch depth for a bus on the current thread
struct DepthGuard(usize);

impl DepthGuard {
    fn enter(bus: usize) -> Self {
        DISPATCH_DEPTH.with(|depths| *depths.borrow_mut().entry(bus).or_insert(0) += 1);
        Self(bus)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let _ = DISPATCH_DEPTH.try_with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(&self.0) {
                *depth -= 1;
                if *depth == 0 {
                    depths.remove(&self.0);
                }
            }
        });
    }
}

/// Shareable container for EventBus
///
/// The subscriber list is snapshotted under the lock and callbacks run with
/// the lock released, so a callback may publish, subscribe or unsubscribe.
/// Nesting depth is counted per thread: only a publish made from inside a
/// callback on the same thread counts as nested.
pub struct EventBusContainer<T> {
    inner: Arc<Mutex<EventBus<T>>>,
}

impl<T> Clone for EventBusContainer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> EventBusContainer<T>
where
    T: Clone + Send + 'static,
{
    /// Create a new event bus container
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    pub fn with_options(options: BusOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventBus::with_options(options))),
        }
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn guard(&self, id: SubscriptionId) -> Subscription {
        let bus: Weak<Mutex<EventBus<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            release: Some(Box::new(move |id| {
                if let Some(bus) = bus.upgrade() {
                    lock(&bus).remove(id);
                }
            })),
        }
    }

    /// Subscribe to events
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let id = lock(&self.inner).subscribe(callback);
        self.guard(id)
    }

    /// Subscribe with a filter predicate
    pub fn subscribe_with_filter<F, P>(&self, callback: F, filter: P) -> Subscription
    where
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let id = lock(&self.inner).subscribe_with_filter(callback, Some(filter));
        self.guard(id)
    }

    /// Subscribe to a single event (one-shot)
    pub fn subscribe_once<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let id = lock(&self.inner).subscribe_once(callback);
        self.guard(id)
    }

    /// Unsubscribe using a subscription ID
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner).unsubscribe(id)
    }

    /// Publish an event
    pub fn publish(&self, event: T) -> DispatchReport {
        let (subscribers, options) = {
            let mut bus = lock(&self.inner);
            let options = bus.options();
            if current_depth(self.key()) >= options.max_dispatch_depth {
                bus.stats.rejected_dispatches += 1;
                log::warn!(
                    "[EventBus] Dispatch depth limit ({}) reached, dropping nested publish",
                    options.max_dispatch_depth
                );
                return DispatchReport::rejected();
            }
            bus.stats.events_published += 1;
            (bus.snapshot(), options)
        };

        let (report, finished) = {
            let _depth = DepthGuard::enter(self.key());
            dispatch(&subscribers, &event, options.policy)
        };

        lock(&self.inner).record(&report, finished);
        report
    }

    /// Get current statistics
    pub fn stats(&self) -> EventBusStats {
        lock(&self.inner).stats()
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscriber_count()
    }

    /// Clear all subscriptions
    pub fn clear(&self) {
        lock(&self.inner).clear();
    }

    /// Whether two containers share the same bus
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Default for EventBusContainer<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
