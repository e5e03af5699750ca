//! rosette_node entry point.

use clap::Parser;
use eyre::{Result, WrapErr, bail};
use rosette_core::Context;
use rosette_node::{Config, TutorialNode};
use std::{path::PathBuf, thread, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Launch publish/subscribe nodes described in a YAML file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the launch file.
    #[arg(short, long)]
    config: PathBuf,

    /// Stop after this long, e.g. `5s` or `1m 30s`. Runs until Ctrl-C if
    /// omitted.
    #[arg(short, long, value_parser = humantime_serde::re::humantime::parse_duration)]
    duration: Option<Duration>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!(config_file = %args.config.display(), "Loading launch file");
    let config = Config::load(&args.config)?;
    info!(num_nodes = config.nodes.len(), "Launch file loaded");

    let context = Context::new();
    let nodes = config
        .nodes
        .iter()
        .map(|node| TutorialNode::new(&context, node))
        .collect::<Result<Vec<_>>>()?;

    log_topic_graph(&context);

    let handles = nodes
        .into_iter()
        .map(|node| {
            let name = node.name().to_string();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || node.run())
                .wrap_err_with(|| format!("Failed to spawn thread for node '{name}'"))
                .map(|handle| (name, handle))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("All nodes started, spinning...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("Failed to create tokio runtime")?;
    runtime.block_on(wait_for_stop(args.duration))?;

    context.shutdown();

    let mut failed = 0;
    for (name, handle) in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(node = %name, error = %err, "Node stopped with an error");
                failed += 1;
            }
            Err(_) => {
                error!(node = %name, "Node thread panicked");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} node(s) failed");
    }

    info!("rosette_node shutting down");
    Ok(())
}

async fn wait_for_stop(duration: Option<Duration>) -> Result<()> {
    match duration {
        Some(duration) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.wrap_err("Failed to listen for Ctrl-C")?;
                    info!("Received Ctrl-C");
                }
                _ = tokio::time::sleep(duration) => {
                    info!(?duration, "Run duration elapsed");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .wrap_err("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C");
        }
    }
    Ok(())
}

fn log_topic_graph(context: &Context) {
    let bus = context.bus();
    for (topic, type_name) in bus.topic_names_and_types() {
        let Some((publishers, subscribers)) = bus.topic_endpoints(&topic) else {
            continue;
        };
        info!(
            %topic,
            %type_name,
            publishers = ?publishers,
            subscribers = ?subscribers,
            "Topic"
        );
    }
}
