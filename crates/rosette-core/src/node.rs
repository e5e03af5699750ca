//! The node runtime.
//!
//! A [Node] owns its publishers, subscribers and timers and runs a
//! single-threaded cooperative event loop. Deliveries and timer firings are
//! serialized on that loop; several nodes may spin on separate threads and
//! only interact through the topic bus.

use crate::{
    bus::{NodeEvent, Publisher, PublisherHandle, PublisherId, SubscriberId, is_valid_name},
    context::Context,
    error::{Error, Result},
    queue::DeliveryQueue,
    timer::{Timer, TimerId, TimerInfo},
    types::{Message, MessageType},
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info, info_span, trace, warn};

type SubscriberCallback = Box<dyn FnMut(&Message) -> eyre::Result<()> + Send>;

/// A non-owning reference to a subscriber, used to destroy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberHandle {
    id: SubscriberId,
    topic: Arc<str>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// A non-owning reference to a timer, used to cancel or inspect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    id: TimerId,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }
}

/// Requests a node to stop spinning. Can be cloned into callbacks or sent
/// to other threads.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    inbox: flume::Sender<NodeEvent>,
}

impl ShutdownHandle {
    /// Asks the event loop to exit once the running callback returns.
    /// Idempotent.
    pub fn shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            let _ = self.inbox.send(NodeEvent::Wake);
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// True once the node behind this handle is gone.
    pub(crate) fn is_detached(&self) -> bool {
        self.inbox.is_disconnected()
    }
}

struct Subscription {
    topic: String,
    type_name: String,
    queue: Arc<Mutex<DeliveryQueue>>,
    callback: SubscriberCallback,
}

/// A unit of execution owning publishers, subscribers and timers.
///
/// Lifecycle: [new](Self::new), register endpoints, [spin](Self::spin)
/// until [shutdown](Self::shutdown). Dropping the node releases everything
/// it owns; topics no longer referenced by any node disappear from the bus.
///
/// ```
/// use rosette_core::{Context, Node, msgs::Text};
/// use std::time::Duration;
///
/// # fn main() -> eyre::Result<()> {
/// let context = Context::new();
/// let mut talker = Node::new(&context, "talker")?;
/// let publisher = talker.advertise::<Text>("topic", 10)?;
///
/// let mut listener = Node::new(&context, "listener")?;
/// let stop = listener.shutdown_handle();
/// listener.subscribe("topic", 10, move |msg: Text| {
///     println!("I heard: '{}'", msg.data);
///     stop.shutdown();
///     Ok(())
/// })?;
///
/// talker.create_timer(Duration::from_millis(10), move || {
///     publisher.publish(&Text::new("Hello World"))?;
///     Ok(())
/// })?;
///
/// let handle = std::thread::spawn(move || talker.spin());
/// listener.spin()?;
/// context.shutdown();
/// handle.join().unwrap()?;
/// # Ok(())
/// # }
/// ```
pub struct Node {
    name: String,
    context: Context,
    inbox_tx: flume::Sender<NodeEvent>,
    inbox_rx: flume::Receiver<NodeEvent>,
    publishers: IndexMap<PublisherId, PublisherHandle>,
    subscribers: IndexMap<SubscriberId, Subscription>,
    timers: IndexMap<TimerId, Timer>,
    next_timer_id: u64,
    shutdown: ShutdownHandle,
}

impl Node {
    pub fn new(context: &Context, name: &str) -> Result<Self> {
        if !is_valid_name(name) {
            return Err(Error::InvalidNodeName {
                name: name.to_string(),
            });
        }

        let (inbox_tx, inbox_rx) = flume::unbounded();
        let shutdown = ShutdownHandle {
            requested: Arc::new(AtomicBool::new(false)),
            inbox: inbox_tx.clone(),
        };
        context.register_node(shutdown.clone())?;

        debug!(node = name, "Created node");

        Ok(Self {
            name: name.to_string(),
            context: context.clone(),
            inbox_tx,
            inbox_rx,
            publishers: IndexMap::new(),
            subscribers: IndexMap::new(),
            timers: IndexMap::new(),
            next_timer_id: 0,
            shutdown,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    fn ensure_active(&self) -> Result<()> {
        if self.context.is_shutdown() {
            return Err(Error::ContextShutdown);
        }
        Ok(())
    }

    /// Creates a publisher for `M` on `topic`.
    ///
    /// The shape of `M` is registered on first use. Fails with
    /// [TypeConflict](Error::TypeConflict) if `topic` is bound to another
    /// type.
    pub fn advertise<M: MessageType>(&mut self, topic: &str, depth: usize) -> Result<Publisher<M>> {
        self.ensure_active()?;
        self.context.define_type::<M>()?;
        let handle = self.advertise_dynamic(topic, M::TYPE_NAME, depth)?;
        Ok(Publisher::new(handle))
    }

    /// Creates a publisher for the registered type `type_name`.
    pub fn advertise_dynamic(
        &mut self,
        topic: &str,
        type_name: &str,
        depth: usize,
    ) -> Result<PublisherHandle> {
        self.ensure_active()?;
        let handle = self
            .context
            .bus()
            .advertise(&self.name, topic, type_name, depth)?;
        self.publishers.insert(handle.id(), handle.clone());
        Ok(handle)
    }

    /// Registers `callback` for every `M` published on `topic`.
    ///
    /// At most `depth` undelivered messages are kept for this subscriber;
    /// older ones are dropped first.
    pub fn subscribe<M, F>(&mut self, topic: &str, depth: usize, mut callback: F) -> Result<SubscriberHandle>
    where
        M: MessageType,
        F: FnMut(M) -> eyre::Result<()> + Send + 'static,
    {
        self.ensure_active()?;
        self.context.define_type::<M>()?;
        self.subscribe_dynamic(topic, M::TYPE_NAME, depth, move |message: &Message| {
            callback(M::from_message(message)?)
        })
    }

    /// Registers `callback` for every message published on `topic`, which
    /// must carry the registered type `type_name`.
    pub fn subscribe_dynamic<F>(
        &mut self,
        topic: &str,
        type_name: &str,
        depth: usize,
        callback: F,
    ) -> Result<SubscriberHandle>
    where
        F: FnMut(&Message) -> eyre::Result<()> + Send + 'static,
    {
        self.ensure_active()?;
        let endpoint = self.context.bus().subscribe(
            &self.name,
            topic,
            type_name,
            depth,
            self.inbox_tx.clone(),
        )?;

        self.subscribers.insert(
            endpoint.id,
            Subscription {
                topic: topic.to_string(),
                type_name: type_name.to_string(),
                queue: endpoint.queue,
                callback: Box::new(callback),
            },
        );

        Ok(SubscriberHandle {
            id: endpoint.id,
            topic: Arc::from(topic),
        })
    }

    /// Runs `callback` every `period` while the node spins.
    ///
    /// The first firing is one period after creation. Fails with
    /// [InvalidPeriod](Error::InvalidPeriod) for a zero period.
    pub fn create_timer<F>(&mut self, period: Duration, callback: F) -> Result<TimerHandle>
    where
        F: FnMut() -> eyre::Result<()> + Send + 'static,
    {
        self.ensure_active()?;
        if period.is_zero() {
            return Err(Error::InvalidPeriod { seconds: 0.0 });
        }

        self.next_timer_id += 1;
        let id = TimerId(self.next_timer_id);
        self.timers
            .insert(id, Timer::new(period, Instant::now(), Box::new(callback)));

        debug!(node = %self.name, timer = %id, ?period, "Created timer");
        Ok(TimerHandle { id })
    }

    /// Same as [create_timer](Self::create_timer) with the period given in
    /// seconds, as in `create_timer(0.5, ...)`.
    ///
    /// Periods below one nanosecond are rounded up to one nanosecond.
    pub fn create_timer_secs<F>(&mut self, seconds: f64, callback: F) -> Result<TimerHandle>
    where
        F: FnMut() -> eyre::Result<()> + Send + 'static,
    {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(Error::InvalidPeriod { seconds });
        }
        let period = Duration::try_from_secs_f64(seconds)
            .map_err(|_| Error::InvalidPeriod { seconds })?
            .max(Duration::from_nanos(1));
        self.create_timer(period, callback)
    }

    /// Destroys a publisher owned by this node. Returns false if the handle
    /// does not refer to one.
    pub fn destroy_publisher(&mut self, handle: &PublisherHandle) -> bool {
        let Some(handle) = self.publishers.shift_remove(&handle.id()) else {
            return false;
        };
        self.context.bus().remove_publisher(handle.topic(), handle.id())
    }

    /// Destroys a subscriber owned by this node. Its callback never runs
    /// again, including for messages that are already queued.
    pub fn destroy_subscriber(&mut self, handle: &SubscriberHandle) -> bool {
        let Some(sub) = self.subscribers.shift_remove(&handle.id) else {
            return false;
        };
        self.context.bus().remove_subscriber(&sub.topic, handle.id);
        debug!(node = %self.name, topic = %sub.topic, type_name = %sub.type_name, "Destroyed subscription");
        true
    }

    pub fn cancel_timer(&mut self, handle: &TimerHandle) -> bool {
        self.timers.shift_remove(&handle.id).is_some()
    }

    pub fn timer_info(&self, handle: &TimerHandle) -> Option<TimerInfo> {
        self.timers.get(&handle.id).map(Timer::info)
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Asks the event loop to exit after the running callback. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_shutdown_requested()
    }

    /// Wake-ups waiting in the node's inbox. Each subscriber contributes at
    /// most one, however many messages were published to it.
    pub fn pending_events(&self) -> usize {
        self.inbox_rx.len()
    }

    /// Runs the event loop on the current thread until shutdown.
    ///
    /// This starts its own single-threaded runtime and must not be called
    /// from within an async context; use [spin_async](Self::spin_async)
    /// there.
    pub fn spin(&mut self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Runtime {
                message: "spin() called from within an async runtime, use spin_async()".into(),
            });
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| Error::Runtime {
                message: err.to_string(),
            })?;
        runtime.block_on(self.spin_async())
    }

    /// Runs the event loop until shutdown.
    ///
    /// Each iteration delivers every queued message, oldest first, then
    /// fires the timers that are due, then sleeps until the next timer
    /// deadline, delivery or shutdown request.
    pub async fn spin_async(&mut self) -> Result<()> {
        let span = info_span!("node", name = %self.name);
        self.run_loop().instrument(span).await
    }

    async fn run_loop(&mut self) -> Result<()> {
        info!(
            publishers = self.publishers.len(),
            subscribers = self.subscribers.len(),
            timers = self.timers.len(),
            "Spinning"
        );

        while !self.shutdown.is_shutdown_requested() {
            self.spin_some();

            if self.shutdown.is_shutdown_requested() {
                break;
            }

            let next_deadline = self.timers.values().map(Timer::next_deadline).min();
            let event = match next_deadline {
                Some(deadline) => tokio::select! {
                    event = self.inbox_rx.recv_async() => Some(event),
                    _ = sleep_until(deadline) => None,
                },
                None => Some(self.inbox_rx.recv_async().await),
            };

            match event {
                Some(Ok(event)) => {
                    if !self.shutdown.is_shutdown_requested() {
                        self.handle_event(event);
                    }
                }
                // The node holds a sender of its own inbox.
                Some(Err(flume::RecvError::Disconnected)) => break,
                None => {}
            }
        }

        info!("Stopped spinning");
        Ok(())
    }

    /// Runs one iteration of the event loop without waiting: delivers the
    /// messages queued so far and fires due timers. Returns the number of
    /// callbacks invoked.
    pub fn spin_some(&mut self) -> usize {
        let mut invoked = 0;

        // Only what is queued now; callbacks may publish to this node again.
        let pending = self.inbox_rx.len();
        for _ in 0..pending {
            if self.shutdown.is_shutdown_requested() {
                return invoked;
            }
            match self.inbox_rx.try_recv() {
                Ok(event) => invoked += self.handle_event(event),
                Err(_) => break,
            }
        }

        let now = Instant::now();
        for (id, timer) in self.timers.iter_mut() {
            if self.shutdown.is_shutdown_requested() {
                break;
            }
            if !timer.is_due(now) {
                continue;
            }

            trace!(timer = %id, "Timer fired");
            invoked += 1;
            if let Err(err) = timer.fire() {
                warn!(timer = %id, error = %err, "Timer callback failed");
            }
        }

        invoked
    }

    fn handle_event(&mut self, event: NodeEvent) -> usize {
        let NodeEvent::Delivery { subscriber } = event else {
            return 0;
        };

        let Some(sub) = self.subscribers.get_mut(&subscriber) else {
            trace!(%subscriber, "Dropped delivery for destroyed subscriber");
            return 0;
        };

        // Messages published from here on announce themselves again.
        let pending = sub.queue.lock().take_pending();

        let mut invoked = 0;
        for _ in 0..pending {
            if self.shutdown.is_shutdown_requested() {
                break;
            }
            // The lock is released before the callback runs.
            let Some(message) = sub.queue.lock().pop_front() else {
                break;
            };

            debug!(topic = %sub.topic, type_name = %sub.type_name, "Received message");
            invoked += 1;
            if let Err(err) = (sub.callback)(&message) {
                warn!(topic = %sub.topic, error = %err, "Subscription callback failed");
            }
        }
        invoked
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let bus = self.context.bus().clone();
        for (id, handle) in self.publishers.drain(..) {
            bus.remove_publisher(handle.topic(), id);
        }
        for (id, sub) in self.subscribers.drain(..) {
            bus.remove_subscriber(&sub.topic, id);
        }
        self.timers.clear();
        debug!(node = %self.name, "Destroyed node");
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("publishers", &self.publishers.len())
            .field("subscribers", &self.subscribers.len())
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}
