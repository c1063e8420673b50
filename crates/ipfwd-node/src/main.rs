use std::path::PathBuf;

use clap::Parser;

use ipfwd_node::{Node, NodeConfig, Sinks};

#[derive(Parser)]
#[command(name = "ipfwd", about = "IPv4 forwarding node")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/ipfwd/config.toml")]
    config: PathBuf,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match NodeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    if cli.check {
        match config.engine_config().and_then(|_| config.build_tables()) {
            Ok((routes, interfaces)) => {
                println!(
                    "configuration ok: {} interfaces, {} routes, {} multicast routes",
                    interfaces.len(),
                    routes.len(),
                    routes.multicast_routes().len()
                );
                return;
            }
            Err(e) => {
                eprintln!("{}: {e}", cli.config.display());
                std::process::exit(1);
            }
        }
    }

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        ipfwd_node::logging::init_json(&config.logging.level);
    } else {
        ipfwd_node::logging::init(&config.logging.level);
    }

    let mut node = match Node::new(&config, Sinks::tracing()) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("failed to start node: {e}");
            std::process::exit(1);
        }
    };
    let handle = node.handle();

    // Spawn signal handler
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received SIGINT, shutting down");
        handle.shutdown();
    });

    node.run().await;
    node.shutdown();
}
