//! Topic routing.
//!
//! The [Bus] binds every topic name to exactly one message type and keeps
//! the publishers and subscribers registered on it. Publishing pushes the
//! message into each subscriber's [DeliveryQueue] and wakes the owning
//! node; callbacks run later, on that node's event loop.

use crate::{
    error::{Error, Result},
    queue::DeliveryQueue,
    registry::Registry,
    types::{FieldType, Message, MessageType},
};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::{fmt, marker::PhantomData, sync::Arc};
use tracing::{debug, trace};

/// Events that wake a node's event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeEvent {
    /// A message is waiting in the queue of the subscriber.
    Delivery { subscriber: SubscriberId },
    /// Re-check the shutdown flag.
    Wake,
}

macro_rules! endpoint_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

endpoint_id!(PublisherId);
endpoint_id!(SubscriberId);

/// Returns true if `name` can be used as a topic or node name.
pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// A non-owning reference to a publisher.
///
/// The publisher itself belongs to the node that advertised it. Handles can
/// be cloned freely, e.g. into timer callbacks. Publishing through a handle
/// whose publisher was destroyed fails with
/// [PublisherDestroyed](Error::PublisherDestroyed).
#[derive(Clone)]
pub struct PublisherHandle {
    id: PublisherId,
    topic: Arc<str>,
    type_name: Arc<str>,
    bus: Bus,
}

impl PublisherHandle {
    pub fn id(&self) -> PublisherId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Publishes `message` and returns the number of subscribers it was
    /// queued for.
    pub fn publish(&self, message: Message) -> Result<usize> {
        self.bus.publish(self, message)
    }
}

impl fmt::Debug for PublisherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherHandle")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A publisher handle that only accepts messages of type `M`.
pub struct Publisher<M> {
    handle: PublisherHandle,
    _marker: PhantomData<fn(M)>,
}

impl<M: MessageType> Publisher<M> {
    pub(crate) fn new(handle: PublisherHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn publish(&self, message: &M) -> Result<usize> {
        self.handle.publish(message.to_message())
    }

    pub fn handle(&self) -> &PublisherHandle {
        &self.handle
    }

    pub fn topic(&self) -> &str {
        self.handle.topic()
    }
}

impl<M> Clone for Publisher<M> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Publisher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Publisher").field(&self.handle).finish()
    }
}

/// What a node keeps after registering a subscriber on the bus.
pub(crate) struct SubscriberEndpoint {
    pub id: SubscriberId,
    pub queue: Arc<Mutex<DeliveryQueue>>,
}

/// A snapshot of a topic, as reported by [Bus::topic_info].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub type_name: String,
    pub publisher_count: usize,
    pub subscriber_count: usize,
    /// Messages published on the topic since it was created.
    pub published: u64,
}

struct PublisherEntry {
    node: String,
    depth: usize,
}

struct SubscriberEntry {
    node: String,
    queue: Arc<Mutex<DeliveryQueue>>,
    inbox: flume::Sender<NodeEvent>,
}

struct TopicEntry {
    type_name: String,
    publishers: IndexMap<PublisherId, PublisherEntry>,
    subscribers: IndexMap<SubscriberId, SubscriberEntry>,
    published: u64,
}

impl TopicEntry {
    fn is_unused(&self) -> bool {
        self.publishers.is_empty() && self.subscribers.is_empty()
    }
}

#[derive(Default)]
struct BusState {
    topics: IndexMap<String, TopicEntry>,
    next_id: u64,
}

impl BusState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Returns the topic bound to `type_name`, creating it if needed.
    fn bind(&mut self, topic: &str, type_name: &str) -> Result<&mut TopicEntry> {
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                debug!(topic, type_name, "Topic created");
                TopicEntry {
                    type_name: type_name.to_string(),
                    publishers: IndexMap::new(),
                    subscribers: IndexMap::new(),
                    published: 0,
                }
            });

        if entry.type_name != type_name {
            return Err(Error::TypeConflict {
                topic: topic.to_string(),
                bound: entry.type_name.clone(),
                requested: type_name.to_string(),
            });
        }

        Ok(entry)
    }

    fn drop_if_unused(&mut self, topic: &str) {
        if self.topics.get(topic).is_some_and(TopicEntry::is_unused) {
            self.topics.shift_remove(topic);
            debug!(topic, "Topic destroyed");
        }
    }
}

struct BusInner {
    registry: RwLock<Registry>,
    state: Mutex<BusState>,
}

/// The process-local topic table shared by all nodes of a
/// [Context](crate::Context).
///
/// Every mutation of the table happens under a single lock, which is never
/// held while a subscriber callback runs.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(registry),
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Read access to the message registry.
    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.registry.read()
    }

    /// Registers a message shape. See [Registry::define].
    pub fn define<I, S>(&self, name: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.inner.registry.write().define(name, fields).map(|_| ())
    }

    /// Registers the shape of a [MessageType].
    pub fn define_type<M: MessageType>(&self) -> Result<()> {
        self.inner.registry.write().define_type::<M>().map(|_| ())
    }

    fn check_endpoint(&self, topic: &str, type_name: &str, depth: usize) -> Result<()> {
        if !is_valid_name(topic) {
            return Err(Error::InvalidTopicName {
                name: topic.to_string(),
            });
        }
        if depth == 0 {
            return Err(Error::InvalidQueueDepth);
        }
        if !self.registry().contains(type_name) {
            return Err(Error::UnknownType {
                type_name: type_name.to_string(),
            });
        }
        Ok(())
    }

    /// Registers a publisher, binding `topic` to `type_name` if unbound.
    pub(crate) fn advertise(
        &self,
        node: &str,
        topic: &str,
        type_name: &str,
        depth: usize,
    ) -> Result<PublisherHandle> {
        self.check_endpoint(topic, type_name, depth)?;

        let mut state = self.inner.state.lock();
        let id = PublisherId(state.next_id());
        let entry = state.bind(topic, type_name)?;
        entry.publishers.insert(
            id,
            PublisherEntry {
                node: node.to_string(),
                depth,
            },
        );
        drop(state);

        debug!(node, topic, type_name, %id, "Advertised publisher");

        Ok(PublisherHandle {
            id,
            topic: Arc::from(topic),
            type_name: Arc::from(type_name),
            bus: self.clone(),
        })
    }

    /// Registers a subscriber whose deliveries are announced on `inbox`.
    pub(crate) fn subscribe(
        &self,
        node: &str,
        topic: &str,
        type_name: &str,
        depth: usize,
        inbox: flume::Sender<NodeEvent>,
    ) -> Result<SubscriberEndpoint> {
        self.check_endpoint(topic, type_name, depth)?;

        let queue = Arc::new(Mutex::new(DeliveryQueue::with_depth(depth)));

        let mut state = self.inner.state.lock();
        let id = SubscriberId(state.next_id());
        let entry = state.bind(topic, type_name)?;
        entry.subscribers.insert(
            id,
            SubscriberEntry {
                node: node.to_string(),
                queue: queue.clone(),
                inbox,
            },
        );
        drop(state);

        debug!(node, topic, type_name, %id, "Created subscription");

        Ok(SubscriberEndpoint { id, queue })
    }

    /// Queues `message` for every subscriber currently registered on the
    /// publisher's topic and returns how many there were.
    ///
    /// This never blocks on subscribers and never runs callbacks.
    pub fn publish(&self, publisher: &PublisherHandle, message: Message) -> Result<usize> {
        if message.type_name() != publisher.type_name() {
            return Err(Error::TypeMismatch {
                topic: publisher.topic().to_string(),
                expected: publisher.type_name().to_string(),
                actual: message.type_name().to_string(),
            });
        }
        self.registry().validate(&message)?;

        let targets: Vec<_> = {
            let mut state = self.inner.state.lock();
            let entry = state
                .topics
                .get_mut(publisher.topic())
                .filter(|entry| entry.publishers.contains_key(&publisher.id))
                .ok_or_else(|| Error::PublisherDestroyed {
                    id: publisher.id.0,
                    topic: publisher.topic().to_string(),
                })?;
            entry.published += 1;

            entry
                .subscribers
                .iter()
                .map(|(id, sub)| (*id, sub.queue.clone(), sub.inbox.clone()))
                .collect()
        };

        let message = Arc::new(message);
        for (id, queue, inbox) in &targets {
            let wake = {
                let mut queue = queue.lock();
                if queue.push(message.clone()).is_some() {
                    trace!(topic = publisher.topic(), subscriber = %id, "Queue full, dropped oldest message");
                }
                queue.notify()
            };
            // One outstanding wake-up per subscriber. A closed inbox means the
            // subscribing node is gone.
            if wake {
                let _ = inbox.send(NodeEvent::Delivery { subscriber: *id });
            }
        }

        debug!(
            topic = publisher.topic(),
            publisher = %publisher.id,
            subscribers = targets.len(),
            "Published message"
        );

        Ok(targets.len())
    }

    pub(crate) fn remove_publisher(&self, topic: &str, id: PublisherId) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state
            .topics
            .get_mut(topic)
            .and_then(|entry| entry.publishers.shift_remove(&id))
            .is_some();
        state.drop_if_unused(topic);
        removed
    }

    pub(crate) fn remove_subscriber(&self, topic: &str, id: SubscriberId) -> bool {
        let mut state = self.inner.state.lock();
        let removed = state
            .topics
            .get_mut(topic)
            .and_then(|entry| entry.subscribers.shift_remove(&id));
        state.drop_if_unused(topic);
        drop(state);

        match removed {
            Some(entry) => {
                entry.queue.lock().clear();
                true
            }
            None => false,
        }
    }

    /// Drops every topic and endpoint.
    pub(crate) fn clear(&self) {
        let topics = std::mem::take(&mut self.inner.state.lock().topics);
        for entry in topics.values() {
            for sub in entry.subscribers.values() {
                sub.queue.lock().clear();
            }
        }
        debug!(num_topics = topics.len(), "Cleared topic table");
    }

    /// Active topics and their bound types, in creation order.
    pub fn topic_names_and_types(&self) -> Vec<(String, String)> {
        self.inner
            .state
            .lock()
            .topics
            .iter()
            .map(|(name, entry)| (name.clone(), entry.type_name.clone()))
            .collect()
    }

    pub fn topic_info(&self, topic: &str) -> Option<TopicInfo> {
        let state = self.inner.state.lock();
        let entry = state.topics.get(topic)?;
        Some(TopicInfo {
            name: topic.to_string(),
            type_name: entry.type_name.clone(),
            publisher_count: entry.publishers.len(),
            subscriber_count: entry.subscribers.len(),
            published: entry.published,
        })
    }

    /// Names of the nodes publishing and subscribing on `topic`.
    pub fn topic_endpoints(&self, topic: &str) -> Option<(Vec<String>, Vec<String>)> {
        let state = self.inner.state.lock();
        let entry = state.topics.get(topic)?;
        let publishers = entry
            .publishers
            .values()
            .map(|publisher| format!("{} (depth {})", publisher.node, publisher.depth))
            .collect();
        let subscribers = entry
            .subscribers
            .values()
            .map(|sub| format!("{} (depth {})", sub.node, sub.queue.lock().depth()))
            .collect();
        Some((publishers, subscribers))
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("topics", &self.inner.state.lock().topics.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::{ColorNumber, Text, Vector3};

    fn create_bus() -> Bus {
        Bus::new(Registry::with_builtin())
    }

    fn inbox() -> (flume::Sender<NodeEvent>, flume::Receiver<NodeEvent>) {
        flume::unbounded()
    }

    #[test]
    fn test_advertise_binds_topic() {
        let bus = create_bus();
        bus.advertise("a", "chatter", Text::TYPE_NAME, 10).unwrap();

        assert_eq!(
            bus.topic_names_and_types(),
            [("chatter".to_string(), Text::TYPE_NAME.to_string())]
        );
    }

    #[test]
    fn test_advertise_type_conflict() {
        let bus = create_bus();
        bus.advertise("a", "c", ColorNumber::TYPE_NAME, 10).unwrap();

        let err = bus.advertise("b", "c", Vector3::TYPE_NAME, 10).unwrap_err();
        assert!(matches!(err, Error::TypeConflict { .. }));
    }

    #[test]
    fn test_subscribe_type_conflict() {
        let bus = create_bus();
        let (tx, _rx) = inbox();
        bus.advertise("a", "c", ColorNumber::TYPE_NAME, 10).unwrap();

        let result = bus.subscribe("b", "c", Vector3::TYPE_NAME, 10, tx);
        assert!(matches!(result, Err(Error::TypeConflict { .. })));
        assert_eq!(bus.topic_info("c").unwrap().subscriber_count, 0);
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        let bus = create_bus();
        assert!(matches!(
            bus.advertise("a", "", Text::TYPE_NAME, 10),
            Err(Error::InvalidTopicName { .. })
        ));
        assert!(matches!(
            bus.advertise("a", "my topic", Text::TYPE_NAME, 10),
            Err(Error::InvalidTopicName { .. })
        ));
        assert!(matches!(
            bus.advertise("a", "t", Text::TYPE_NAME, 0),
            Err(Error::InvalidQueueDepth)
        ));
        assert!(matches!(
            bus.advertise("a", "t", "pkg/Unknown", 10),
            Err(Error::UnknownType { .. })
        ));
        assert!(bus.topic_names_and_types().is_empty());
    }

    #[test]
    fn test_publish_queues_for_each_subscriber() {
        let bus = create_bus();
        let (tx, rx) = inbox();
        let publisher = bus.advertise("a", "v", Vector3::TYPE_NAME, 10).unwrap();
        let first = bus.subscribe("b", "v", Vector3::TYPE_NAME, 10, tx.clone()).unwrap();
        let second = bus.subscribe("b", "v", Vector3::TYPE_NAME, 10, tx).unwrap();

        let msg = Vector3::new(1.0, 2.0, 0.0).to_message();
        assert_eq!(publisher.publish(msg.clone()).unwrap(), 2);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            [
                NodeEvent::Delivery { subscriber: first.id },
                NodeEvent::Delivery { subscriber: second.id },
            ]
        );
        assert_eq!(*first.queue.lock().pop_front().unwrap(), msg);
        assert_eq!(*second.queue.lock().pop_front().unwrap(), msg);
        assert_eq!(bus.topic_info("v").unwrap().published, 1);
    }

    #[test]
    fn test_publish_type_mismatch() {
        let bus = create_bus();
        let publisher = bus.advertise("a", "v", Vector3::TYPE_NAME, 10).unwrap();

        let err = publisher.publish(Text::new("nope").to_message()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(bus.topic_info("v").unwrap().published, 0);
    }

    #[test]
    fn test_publish_invalid_fields() {
        let bus = create_bus();
        let publisher = bus.advertise("a", "v", Vector3::TYPE_NAME, 10).unwrap();

        let partial = Message::new(Vector3::TYPE_NAME, vec![crate::Value::Float64(1.0)]);
        assert!(matches!(
            publisher.publish(partial),
            Err(Error::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_publish_after_remove() {
        let bus = create_bus();
        let publisher = bus.advertise("a", "chatter", Text::TYPE_NAME, 10).unwrap();
        assert!(bus.remove_publisher("chatter", publisher.id()));

        let err = publisher.publish(Text::new("late").to_message()).unwrap_err();
        assert!(matches!(err, Error::PublisherDestroyed { .. }));
    }

    #[test]
    fn test_topic_destroyed_with_last_endpoint() {
        let bus = create_bus();
        let (tx, _rx) = inbox();
        let publisher = bus.advertise("a", "chatter", Text::TYPE_NAME, 10).unwrap();
        let sub = bus.subscribe("b", "chatter", Text::TYPE_NAME, 10, tx).unwrap();

        bus.remove_publisher("chatter", publisher.id());
        assert!(bus.topic_info("chatter").is_some());

        bus.remove_subscriber("chatter", sub.id);
        assert!(bus.topic_info("chatter").is_none());

        // The name is free to be bound to another type now.
        bus.advertise("a", "chatter", Vector3::TYPE_NAME, 10).unwrap();
    }

    #[test]
    fn test_remove_subscriber_clears_pending() {
        let bus = create_bus();
        let (tx, _rx) = inbox();
        let publisher = bus.advertise("a", "chatter", Text::TYPE_NAME, 10).unwrap();
        let sub = bus.subscribe("b", "chatter", Text::TYPE_NAME, 10, tx).unwrap();

        publisher.publish(Text::new("pending").to_message()).unwrap();
        assert_eq!(sub.queue.lock().len(), 1);

        assert!(bus.remove_subscriber("chatter", sub.id));
        assert!(sub.queue.lock().is_empty());
        assert!(!bus.remove_subscriber("chatter", sub.id));
    }

    #[test]
    fn test_define_custom_type() {
        let bus = create_bus();
        bus.define("pkg/Range", [("meters", FieldType::Float64)]).unwrap();
        bus.advertise("a", "range", "pkg/Range", 1).unwrap();

        assert!(matches!(
            bus.define("pkg/Range", [("feet", FieldType::Float64)]),
            Err(Error::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn test_clear() {
        let bus = create_bus();
        let publisher = bus.advertise("a", "chatter", Text::TYPE_NAME, 10).unwrap();
        bus.clear();

        assert!(bus.topic_names_and_types().is_empty());
        assert!(publisher.publish(Text::new("gone").to_message()).is_err());
    }
}
