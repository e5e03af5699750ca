//! Error types returned by the registry, the topic bus and the node runtime.

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure is reported synchronously at the call that caused it and is
/// never retried by the library.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A message type name is already registered with a different shape.
    #[error("message type '{type_name}' is already defined with a different shape")]
    DuplicateDefinition { type_name: String },

    /// The message type is not registered.
    #[error("unknown message type '{type_name}'")]
    UnknownType { type_name: String },

    /// The topic is already bound to another message type.
    #[error("topic '{topic}' is bound to '{bound}', cannot use it as '{requested}'")]
    TypeConflict {
        topic: String,
        bound: String,
        requested: String,
    },

    /// A message was published through a publisher bound to another type.
    #[error("publisher on '{topic}' expects '{expected}', got '{actual}'")]
    TypeMismatch {
        topic: String,
        expected: String,
        actual: String,
    },

    /// Fields or bytes do not match the shape of the message type.
    #[error("schema mismatch for '{type_name}': {reason}")]
    SchemaMismatch { type_name: String, reason: String },

    /// Timer periods must be strictly positive.
    #[error("invalid timer period {seconds}s")]
    InvalidPeriod { seconds: f64 },

    #[error("invalid topic name '{name}'")]
    InvalidTopicName { name: String },

    #[error("invalid node name '{name}'")]
    InvalidNodeName { name: String },

    #[error("queue depth must be at least 1")]
    InvalidQueueDepth,

    /// The publisher behind a handle was destroyed.
    #[error("publisher {id} on '{topic}' was destroyed")]
    PublisherDestroyed { id: u64, topic: String },

    /// The context the node belongs to has been shut down.
    #[error("context has been shut down")]
    ContextShutdown,

    /// The event loop runtime could not be started.
    #[error("runtime error: {message}")]
    Runtime { message: String },
}

impl Error {
    pub(crate) fn schema_mismatch(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}
