//! # Event Dispatcher
//!
//! One shared subscription to the node's event stream, fanned out to the
//! listeners registered per contract address.
//!
//! ```text
//! Unsubscribed ──first listener──► Subscribed ──last listener removed──► Unsubscribed
//! ```
//!
//! - Events are delivered in stream order. Delivery of one event finishes
//!   before the next is decoded.
//! - A frame that fails to decode is logged and skipped.
//! - A panicking listener is logged and skipped; the others still run.
//! - When the stream drops, the dispatcher reconnects with exponential
//!   backoff. Registrations are untouched, so listeners never re-register.
//!   Once `max_attempts` consecutive attempts fail the outage is reported
//!   through [`EventDispatcher::last_error`] and retries continue at
//!   `max_delay_ms` for as long as any listener is registered.

mod registry;

pub use registry::EventListener;

use crate::adapters::json_rpc::parse_event_notification;
use crate::domain::config::ReconnectConfig;
use crate::domain::errors::SubscriptionError;
use crate::ports::{EventSource, RawEvent, RawEventStream};
use dappchain_types::{Address, ChainEvent, DecodeError};
use parking_lot::Mutex;
use registry::ListenerRegistry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Whether the shared stream is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed,
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Listener invocations that returned normally.
    pub delivered: u64,
    /// Frames dropped because they did not decode.
    pub decode_failures: u64,
    /// Well-formed frames that carried no event (acknowledgements and the like).
    pub ignored_frames: u64,
    /// Listener invocations that panicked.
    pub listener_panics: u64,
    /// Successful resubscriptions after a dropped stream.
    pub reconnects: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    decode_failures: AtomicU64,
    ignored_frames: AtomicU64,
    listener_panics: AtomicU64,
    reconnects: AtomicU64,
}

#[derive(Default)]
struct Inner {
    registry: ListenerRegistry,
    task: Option<JoinHandle<()>>,
    last_error: Option<SubscriptionError>,
}

impl Inner {
    fn stream_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn stop_stream(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Unsubscribed from event stream");
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    counters: Counters,
}

impl Shared {
    fn dispatch(&self, raw: RawEvent) {
        let event = match decode_raw_event(&raw) {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.counters.ignored_frames.fetch_add(1, Ordering::Relaxed);
                debug!(
                    binary = matches!(raw, RawEvent::Binary(_)),
                    "Ignoring frame without a contract event"
                );
                return;
            }
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Dropping undecodable event");
                return;
            }
        };

        // Snapshot so listeners can (un)register from inside a callback.
        let listeners = self.inner.lock().registry.matching(&event.contract);

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(&event))) {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.counters.listener_panics.fetch_add(1, Ordering::Relaxed);
                    warn!(contract = %event.contract, "Event listener panicked");
                }
            }
        }
    }
}

/// Decode a raw frame. `Ok(None)` means the frame carried no event.
fn decode_raw_event(raw: &RawEvent) -> Result<Option<ChainEvent>, DecodeError> {
    match raw {
        RawEvent::Json(text) => parse_event_notification(text),
        RawEvent::Binary(bytes) => ChainEvent::decode(bytes).map(Some),
    }
}

/// Fans one event stream out to per-contract listeners.
pub struct EventDispatcher {
    source: Arc<dyn EventSource>,
    reconnect: ReconnectConfig,
    shared: Arc<Shared>,
    transition: tokio::sync::Mutex<()>,
}

impl EventDispatcher {
    pub fn new(source: Arc<dyn EventSource>, reconnect: ReconnectConfig) -> Self {
        Self {
            source,
            reconnect,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                counters: Counters::default(),
            }),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Register `listener` for events emitted by `contract`.
    ///
    /// Opens the shared stream if it is not running. Registering the same
    /// listener again adds a reference; it is still invoked once per event.
    ///
    /// The listener is registered only once the stream is open, so dropping
    /// this future part-way leaves the dispatcher untouched.
    pub async fn add_listener(
        &self,
        contract: Address,
        listener: Arc<dyn EventListener>,
    ) -> Result<(), SubscriptionError> {
        let _transition = self.transition.lock().await;

        {
            let mut inner = self.shared.inner.lock();
            if inner.stream_running() {
                register(&mut inner, contract, listener);
                return Ok(());
            }
        }

        let stream = self.source.connect().await.map_err(|e| {
            warn!(error = %e, "Event stream subscription failed");
            e
        })?;

        let mut inner = self.shared.inner.lock();
        register(&mut inner, contract, listener);
        inner.last_error = None;
        inner.task = Some(tokio::spawn(run_stream(
            Arc::clone(&self.shared),
            Arc::clone(&self.source),
            self.reconnect.clone(),
            stream,
        )));
        info!(contracts = inner.registry.contract_count(), "Subscribed to event stream");
        Ok(())
    }

    /// Remove one registration reference of `listener` on `contract`.
    ///
    /// Returns `false` if the listener was not registered. Removing the last
    /// listener closes the shared stream.
    pub fn remove_listener(&self, contract: &Address, listener: &Arc<dyn EventListener>) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(refs) = inner.registry.unregister(contract, listener) else {
            return false;
        };
        debug!(contract = %contract, refs, "Listener removed");

        if inner.registry.is_empty() {
            inner.stop_stream();
        }
        true
    }

    /// Register `listener` and return a guard that removes it on drop.
    ///
    /// Cancel-safe in the same way as [`add_listener`](Self::add_listener).
    pub async fn subscribe(
        self: &Arc<Self>,
        contract: Address,
        listener: Arc<dyn EventListener>,
    ) -> Result<ListenerGuard, SubscriptionError> {
        self.add_listener(contract.clone(), Arc::clone(&listener))
            .await?;
        Ok(ListenerGuard {
            dispatcher: Arc::clone(self),
            contract,
            listener,
        })
    }

    pub fn state(&self) -> SubscriptionState {
        if self.shared.inner.lock().stream_running() {
            SubscriptionState::Subscribed
        } else {
            SubscriptionState::Unsubscribed
        }
    }

    /// Distinct (contract, listener) registrations.
    pub fn listener_count(&self) -> usize {
        self.shared.inner.lock().registry.len()
    }

    /// Set while the stream has been down for `max_attempts` consecutive
    /// reconnect attempts; cleared when a connection succeeds.
    pub fn last_error(&self) -> Option<SubscriptionError> {
        self.shared.inner.lock().last_error.clone()
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.shared.counters;
        DispatchStats {
            delivered: c.delivered.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            ignored_frames: c.ignored_frames.load(Ordering::Relaxed),
            listener_panics: c.listener_panics.load(Ordering::Relaxed),
            reconnects: c.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.shared.inner.lock().stop_stream();
    }
}

/// Scoped registration returned by [`EventDispatcher::subscribe`].
#[must_use = "dropping the guard removes the listener"]
pub struct ListenerGuard {
    dispatcher: Arc<EventDispatcher>,
    contract: Address,
    listener: Arc<dyn EventListener>,
}

impl ListenerGuard {
    pub fn contract(&self) -> &Address {
        &self.contract
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.dispatcher
            .remove_listener(&self.contract, &self.listener);
    }
}

fn register(inner: &mut Inner, contract: Address, listener: Arc<dyn EventListener>) {
    let refs = inner.registry.register(contract.clone(), listener);
    debug!(contract = %contract, refs, "Listener registered");
}

async fn run_stream(
    shared: Arc<Shared>,
    source: Arc<dyn EventSource>,
    reconnect: ReconnectConfig,
    mut stream: RawEventStream,
) {
    loop {
        let reason = pump(&shared, &mut stream).await;
        drop(stream);
        warn!(error = %reason, "Event stream dropped");

        stream = match resubscribe(&shared, source.as_ref(), &reconnect).await {
            Some(stream) => stream,
            None => return,
        };
    }
}

/// Deliver frames until the stream ends; returns why it ended.
async fn pump(shared: &Shared, stream: &mut RawEventStream) -> SubscriptionError {
    while let Some(item) = stream.recv().await {
        match item {
            Ok(raw) => shared.dispatch(raw),
            Err(e) => return e,
        }
    }
    SubscriptionError::Disconnected("stream closed".into())
}

/// Reconnect until a stream opens or no listener is left to serve.
async fn resubscribe(
    shared: &Shared,
    source: &dyn EventSource,
    reconnect: &ReconnectConfig,
) -> Option<RawEventStream> {
    let mut attempt: u32 = 0;
    loop {
        if shared.inner.lock().registry.is_empty() {
            return None;
        }

        attempt = attempt.saturating_add(1);
        let delay = if attempt > reconnect.max_attempts {
            Duration::from_millis(reconnect.max_delay_ms)
        } else {
            reconnect.delay_for(attempt)
        };
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting event stream");
        tokio::time::sleep(delay).await;

        match source.connect().await {
            Ok(stream) => {
                shared.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                shared.inner.lock().last_error = None;
                info!(attempt, "Event stream resubscribed");
                return Some(stream);
            }
            Err(e) if attempt == reconnect.max_attempts => {
                let exhausted = SubscriptionError::ReconnectExhausted { attempts: attempt };
                error!(
                    attempts = attempt,
                    retry_ms = reconnect.max_delay_ms,
                    error = %e,
                    "Event stream still down, retrying at the capped delay"
                );
                shared.inner.lock().last_error = Some(exhausted);
            }
            Err(e) => {
                warn!(attempt, max_attempts = reconnect.max_attempts, error = %e, "Reconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dappchain_types::LocalAddress;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    type Feed = mpsc::Sender<Result<RawEvent, SubscriptionError>>;

    #[derive(Default)]
    struct ChannelSource {
        feeds: Mutex<Vec<Feed>>,
        connects: AtomicUsize,
        refuse: std::sync::atomic::AtomicBool,
    }

    impl ChannelSource {
        fn feed(&self) -> Feed {
            self.feeds.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl EventSource for ChannelSource {
        async fn connect(&self) -> Result<RawEventStream, SubscriptionError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                return Err(SubscriptionError::Connect("refused".into()));
            }
            let (tx, rx) = mpsc::channel(16);
            self.feeds.lock().push(tx);
            Ok(rx)
        }
    }

    fn addr(byte: u8) -> Address {
        Address::new("default", LocalAddress::new([byte; 20]))
    }

    fn event(contract: Address, height: u64) -> RawEvent {
        RawEvent::Binary(
            ChainEvent {
                topics: vec!["t".into()],
                contract,
                caller: None,
                plugin_name: String::new(),
                block_height: height,
                body: vec![],
                tx_hash: vec![],
            }
            .encode(),
        )
    }

    fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts: 3,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_state_follows_listeners() {
        let source = Arc::new(ChannelSource::default());
        let dispatcher = EventDispatcher::new(source.clone(), fast_reconnect());
        assert_eq!(dispatcher.state(), SubscriptionState::Unsubscribed);

        let l: Arc<dyn EventListener> = Arc::new(|_: &ChainEvent| {});
        dispatcher.add_listener(addr(1), l.clone()).await.unwrap();
        dispatcher.add_listener(addr(2), l.clone()).await.unwrap();
        assert_eq!(dispatcher.state(), SubscriptionState::Subscribed);
        assert_eq!(source.connects.load(Ordering::SeqCst), 1);

        assert!(dispatcher.remove_listener(&addr(1), &l));
        assert_eq!(dispatcher.state(), SubscriptionState::Subscribed);
        assert!(dispatcher.remove_listener(&addr(2), &l));
        assert_eq!(dispatcher.state(), SubscriptionState::Unsubscribed);
        assert!(!dispatcher.remove_listener(&addr(2), &l));
    }

    #[tokio::test]
    async fn test_connect_failure_rolls_back_registration() {
        let source = Arc::new(ChannelSource::default());
        source.refuse.store(true, Ordering::SeqCst);
        let dispatcher = EventDispatcher::new(source.clone(), fast_reconnect());

        let l: Arc<dyn EventListener> = Arc::new(|_: &ChainEvent| {});
        let err = dispatcher.add_listener(addr(1), l).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Connect(_)));
        assert_eq!(dispatcher.listener_count(), 0);
        assert_eq!(dispatcher.state(), SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_delivery_order_and_filtering() {
        let source = Arc::new(ChannelSource::default());
        let dispatcher = EventDispatcher::new(source.clone(), fast_reconnect());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let l: Arc<dyn EventListener> =
            Arc::new(move |e: &ChainEvent| sink.lock().push(e.block_height));
        dispatcher.add_listener(addr(1), l).await.unwrap();

        let feed = source.feed();
        for height in 1..=5 {
            feed.send(Ok(event(addr(1), height))).await.unwrap();
            feed.send(Ok(event(addr(2), 100 + height))).await.unwrap();
        }
        settle().await;

        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
        assert_eq!(dispatcher.stats().delivered, 5);
    }

    #[tokio::test]
    async fn test_guard_removes_on_drop() {
        let source = Arc::new(ChannelSource::default());
        let dispatcher = Arc::new(EventDispatcher::new(source.clone(), fast_reconnect()));

        let guard = dispatcher
            .subscribe(addr(1), Arc::new(|_: &ChainEvent| {}))
            .await
            .unwrap();
        assert_eq!(guard.contract(), &addr(1));
        assert_eq!(dispatcher.state(), SubscriptionState::Subscribed);

        drop(guard);
        assert_eq!(dispatcher.listener_count(), 0);
        assert_eq!(dispatcher.state(), SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_retrying_past_budget() {
        let source = Arc::new(ChannelSource::default());
        let dispatcher = EventDispatcher::new(source.clone(), fast_reconnect());

        let l: Arc<dyn EventListener> = Arc::new(|_: &ChainEvent| {});
        dispatcher.add_listener(addr(1), l.clone()).await.unwrap();

        source.refuse.store(true, Ordering::SeqCst);
        drop(source.feeds.lock().drain(..).collect::<Vec<_>>());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            dispatcher.last_error(),
            Some(SubscriptionError::ReconnectExhausted { attempts: 3 })
        );
        assert_eq!(dispatcher.state(), SubscriptionState::Subscribed);
        assert!(source.connects.load(Ordering::SeqCst) > 4);

        // Registering during the outage joins the retrying stream.
        dispatcher.add_listener(addr(2), l).await.unwrap();
        assert_eq!(dispatcher.listener_count(), 2);

        source.refuse.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.feeds.lock().len(), 1);
        assert_eq!(dispatcher.last_error(), None);
        assert_eq!(dispatcher.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_removing_last_listener_stops_retries() {
        let source = Arc::new(ChannelSource::default());
        let dispatcher = EventDispatcher::new(source.clone(), fast_reconnect());

        let l: Arc<dyn EventListener> = Arc::new(|_: &ChainEvent| {});
        dispatcher.add_listener(addr(1), l.clone()).await.unwrap();
        source.refuse.store(true, Ordering::SeqCst);
        drop(source.feeds.lock().drain(..).collect::<Vec<_>>());
        settle().await;

        assert!(dispatcher.remove_listener(&addr(1), &l));
        assert_eq!(dispatcher.state(), SubscriptionState::Unsubscribed);
        let connects = source.connects.load(Ordering::SeqCst);
        settle().await;
        assert_eq!(source.connects.load(Ordering::SeqCst), connects);
    }
}
