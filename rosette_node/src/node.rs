//! The tutorial nodes a launch file can start.

use crate::config::{NodeConfig, NodeKind};
use eyre::{Result, WrapErr};
use rosette_core::{
    Context, Message, Node, Schema, Value,
    msgs::{ColorNumber, Text, Vector3},
};
use tracing::info;

/// A node built from one launch file entry.
pub struct TutorialNode {
    node: Node,
}

impl TutorialNode {
    /// Creates the node and its publishers, subscribers and timers.
    pub fn new(context: &Context, config: &NodeConfig) -> Result<Self> {
        config
            .kind
            .validate()
            .wrap_err_with(|| format!("Node '{}'", config.name))?;

        let mut node = Node::new(context, &config.name)
            .wrap_err_with(|| format!("Failed to create node '{}'", config.name))?;
        let depth = config.queue_depth;

        match &config.kind {
            NodeKind::Talker {
                topic,
                period,
                prefix,
            } => {
                let publisher = node.advertise::<Text>(topic, depth)?;
                let prefix = prefix.clone();
                let mut count: u64 = 0;
                node.create_timer(*period, move || {
                    let msg = Text::new(format!("{prefix}: {count}"));
                    info!("Publishing: '{}'", msg.data);
                    publisher.publish(&msg)?;
                    count += 1;
                    Ok(())
                })?;
            }
            NodeKind::Listener { topic, msg_type } => {
                let schema = context
                    .bus()
                    .registry()
                    .schema(msg_type)
                    .wrap_err_with(|| format!("Cannot listen on '{topic}'"))?
                    .clone();
                node.subscribe_dynamic(topic, msg_type, depth, move |msg: &Message| {
                    info!("I heard: {}", describe(&schema, msg));
                    Ok(())
                })?;
            }
            NodeKind::VectorPublisher {
                topic,
                period,
                value,
            } => {
                let publisher = node.advertise::<Vector3>(topic, depth)?;
                let [x, y, z] = *value;
                let msg = Vector3::new(x, y, z);
                node.create_timer(*period, move || {
                    info!("Publishing: x: {}, y: {}, z: {}", msg.x, msg.y, msg.z);
                    publisher.publish(&msg)?;
                    Ok(())
                })?;
            }
            NodeKind::ColorPublisher {
                topic,
                period,
                colors,
                step,
            } => {
                let publisher = node.advertise::<ColorNumber>(topic, depth)?;
                let colors = colors.clone();
                let step = *step;
                let mut count: usize = 0;
                node.create_timer(*period, move || {
                    let msg = ColorNumber::new(
                        colors[count % colors.len()].clone(),
                        count as f64 * step,
                    );
                    info!("Publishing: color: {}, number: {}", msg.color, msg.number);
                    publisher.publish(&msg)?;
                    count += 1;
                    Ok(())
                })?;
            }
        }

        info!(
            node = %config.name,
            topic = config.kind.topic(),
            queue_depth = depth,
            "Created node"
        );

        Ok(Self { node })
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn node_mut(&mut self) -> &mut Node {
        &mut self.node
    }

    /// Spins the node on the current thread until it is shut down.
    pub fn run(mut self) -> Result<()> {
        self.node
            .spin()
            .wrap_err_with(|| format!("Node '{}' failed", self.node.name()))
    }
}

/// Formats a received message for the log: a lone string field is quoted,
/// anything else is listed field by field.
fn describe(schema: &Schema, msg: &Message) -> String {
    match msg.fields() {
        [Value::String(data)] => format!("'{data}'"),
        _ => schema.describe(msg),
    }
}
