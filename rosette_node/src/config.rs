//! Launch file parsing and validation.

use eyre::{Result, WrapErr, bail, ensure};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

/// Root of a launch file: the nodes to start.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub nodes: Vec<NodeConfig>,
}

impl Config {
    /// Load a launch file from YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read launch file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .wrap_err_with(|| format!("Invalid launch file: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).wrap_err("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.nodes.is_empty(), "At least one node is required");

        for (i, node) in self.nodes.iter().enumerate() {
            ensure!(!node.name.is_empty(), "Node name at index {} cannot be empty", i);
            ensure!(
                node.queue_depth > 0,
                "Node '{}': queue_depth must be greater than zero",
                node.name
            );
            node.kind
                .validate()
                .wrap_err_with(|| format!("Node '{}'", node.name))?;
        }

        let mut names: Vec<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        names.sort();
        for window in names.windows(2) {
            if window[0] == window[1] {
                bail!("Duplicate node name: {}", window[0]);
            }
        }

        Ok(())
    }
}

/// One node of the launch file.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub name: String,

    /// Depth of every publisher and subscriber queue the node creates.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(flatten)]
    pub kind: NodeKind,
}

fn default_queue_depth() -> usize {
    10
}

/// What a node does, selected by the `kind` key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Publishes `"<prefix>: <count>"` text messages.
    Talker {
        topic: String,
        #[serde(with = "humantime_serde")]
        period: Duration,
        #[serde(default = "default_prefix")]
        prefix: String,
    },
    /// Logs every message received on `topic`.
    Listener {
        topic: String,
        #[serde(rename = "type", default = "default_listener_type")]
        msg_type: String,
    },
    /// Publishes the same vector every period.
    VectorPublisher {
        topic: String,
        #[serde(with = "humantime_serde")]
        period: Duration,
        value: [f64; 3],
    },
    /// Cycles through `colors`, incrementing the number by `step`.
    ColorPublisher {
        topic: String,
        #[serde(with = "humantime_serde")]
        period: Duration,
        colors: Vec<String>,
        #[serde(default = "default_step")]
        step: f64,
    },
}

fn default_prefix() -> String {
    "Hello World".to_string()
}

fn default_listener_type() -> String {
    "std_msgs/String".to_string()
}

fn default_step() -> f64 {
    1.0
}

impl NodeKind {
    pub fn topic(&self) -> &str {
        match self {
            Self::Talker { topic, .. }
            | Self::Listener { topic, .. }
            | Self::VectorPublisher { topic, .. }
            | Self::ColorPublisher { topic, .. } => topic,
        }
    }

    /// Checks the parameters of this kind. [Config::load] runs it for every
    /// node; nodes built by hand are checked by
    /// [TutorialNode::new](crate::TutorialNode::new).
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.topic().is_empty(), "topic cannot be empty");

        match self {
            Self::Talker { period, .. } | Self::VectorPublisher { period, .. } => {
                ensure!(!period.is_zero(), "period must be greater than zero");
            }
            Self::ColorPublisher {
                period,
                colors,
                step,
                ..
            } => {
                ensure!(!period.is_zero(), "period must be greater than zero");
                ensure!(!colors.is_empty(), "at least one color is required");
                ensure!(step.is_finite(), "step must be finite");
            }
            Self::Listener { msg_type, .. } => {
                ensure!(!msg_type.is_empty(), "type cannot be empty");
            }
        }

        Ok(())
    }
}
