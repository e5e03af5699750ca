use crate::{
    bus::Bus,
    error::{Error, Result},
    node::ShutdownHandle,
    registry::Registry,
    types::{FieldType, MessageType},
};
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::info;

struct ContextInner {
    bus: Bus,
    nodes: Mutex<Vec<ShutdownHandle>>,
    shut_down: AtomicBool,
}

/// Process-wide state shared by every node: the message registry and the
/// topic bus.
///
/// A context must exist before any node is created and is passed to
/// [Node::new](crate::Node::new) by reference. [shutdown](Self::shutdown)
/// stops every node created from it and releases all topics. Cloning is
/// cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Creates a context with the built-in message types registered.
    pub fn new() -> Self {
        Self::with_registry(Registry::with_builtin())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                bus: Bus::new(registry),
                nodes: Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Registers a message shape. See [Registry::define].
    pub fn define<I, S>(&self, name: &str, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.inner.bus.define(name, fields)
    }

    pub fn define_type<M: MessageType>(&self) -> Result<()> {
        self.inner.bus.define_type::<M>()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Requests every node to stop spinning and drops all topics.
    ///
    /// Calling it more than once has no further effect.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let nodes = std::mem::take(&mut *self.inner.nodes.lock());
        info!(num_nodes = nodes.len(), "Shutting down context");
        for node in &nodes {
            node.shutdown();
        }
        self.inner.bus.clear();
    }

    pub(crate) fn register_node(&self, handle: ShutdownHandle) -> Result<()> {
        let mut nodes = self.inner.nodes.lock();
        if self.is_shutdown() {
            return Err(Error::ContextShutdown);
        }

        nodes.retain(|node| !node.is_detached());
        nodes.push(handle);
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bus", &self.inner.bus)
            .field("shut_down", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
