//! rosette-node - launches the tutorial's talker, listener and sensor
//! publisher nodes from a YAML launch file.
//!
//! # Launch files
//!
//! A launch file lists the nodes to start. Every entry carries a unique
//! `name`, a `kind` and the parameters of that kind:
//!
//! - `talker`: publishes `std_msgs/String` messages `"<prefix>: <count>"` on
//!   `topic` every `period`
//! - `listener`: logs every message received on `topic`
//! - `vector_publisher`: publishes a fixed `geometry_msgs/Vector3`
//! - `color_publisher`: cycles through `colors`, publishing
//!   `tutorial_interfaces/ColorNumber` messages
//!
//! `queue_depth` (default 10) bounds every publisher and subscriber queue of
//! the node. See `config/talker_listener.yaml` for a complete example.

pub mod config;
pub mod node;

pub use config::{Config, NodeConfig, NodeKind};
pub use node::TutorialNode;
