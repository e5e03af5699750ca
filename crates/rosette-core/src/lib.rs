//! A minimal publish/subscribe bus with named topics, typed messages,
//! periodic timers and per-node event loops.
//!
//! Every topic is bound to exactly one message type by the first publisher
//! or subscriber registered on it. Publishing queues the message for every
//! current subscriber and returns immediately; the callbacks run later, when
//! the subscribing [Node] spins.
//!
//! # Usage
//!
//! ```rust
//! use rosette_core::{Context, Node, msgs::Vector3};
//!
//! # fn main() -> eyre::Result<()> {
//! let context = Context::new();
//!
//! let mut node_a = Node::new(&context, "node_a")?;
//! let publisher = node_a.advertise::<Vector3>("v", 10)?;
//!
//! let mut node_b = Node::new(&context, "node_b")?;
//! node_b.subscribe("v", 10, |v: Vector3| {
//!     println!("x: {}, y: {}, z: {}", v.x, v.y, v.z);
//!     Ok(())
//! })?;
//!
//! publisher.publish(&Vector3::new(1.0, 2.0, 0.0))?;
//!
//! // Deliver whatever is queued without blocking.
//! assert_eq!(node_b.spin_some(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Message types
//!
//! The built-in types live in [msgs]. Custom shapes are registered either
//! dynamically through [Context::define] or statically with
//! [impl_message_type].

mod bus;
pub mod codec;
mod context;
mod error;
pub mod msgs;
mod node;
pub mod queue;
mod registry;
mod timer;
mod types;

pub use bus::{Bus, Publisher, PublisherHandle, PublisherId, SubscriberId, TopicInfo};
pub use context::Context;
pub use error::{Error, Result};
pub use node::{Node, ShutdownHandle, SubscriberHandle, TimerHandle};
pub use registry::{Registry, Schema};
pub use timer::{TimerId, TimerInfo};
pub use types::*;
