//! Portmapper command line
//!
//! Manage port mappings on the first UPnP gateway found on the network.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portmapper::{DiscoveryConfig, IgdRouterFactory, PortMapping, Protocol, Router, RouterFactory};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage NAT port mappings on UPnP routers", long_about = None)]
struct Args {
    /// Connect to this device description URL instead of discovering routers
    #[arg(long, env = "PORTMAPPER_LOCATION_URL")]
    location_url: Option<String>,

    /// Gateway search timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List port mappings
    List {
        /// Print mappings as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a port mapping
    Add {
        /// TCP or UDP
        protocol: Protocol,
        /// External port on the router
        external_port: u16,
        /// Internal port on the LAN host
        internal_port: u16,
        /// LAN host receiving the traffic (default: this machine)
        #[arg(long)]
        internal_client: Option<String>,
        /// Mapping description
        #[arg(long, default_value = "portmapper")]
        description: String,
    },
    /// Delete a port mapping
    Delete {
        /// TCP or UDP
        protocol: Protocol,
        /// External port on the router
        external_port: u16,
        /// Remote host restriction of the mapping
        #[arg(long)]
        remote_host: Option<String>,
    },
    /// Print the router's external IP address
    Ip,
    /// Log router information
    Info,
    /// Print this machine's address as seen by the router
    LocalIp,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_mappings(mappings: &[PortMapping]) {
    println!(
        "{:<8} {:<16} {:>8} {:<16} {:>8}  {}",
        "Protocol", "Remote host", "Ext port", "Internal client", "Int port", "Description"
    );
    for mapping in mappings {
        println!(
            "{:<8} {:<16} {:>8} {:<16} {:>8}  {}",
            mapping.protocol(),
            mapping.remote_host_display(),
            mapping.external_port(),
            mapping.internal_client(),
            mapping.internal_port(),
            mapping.description()
        );
    }
}

fn run(command: Command, router: &dyn Router) -> Result<()> {
    match command {
        Command::List { json } => {
            let mappings = router.port_mappings()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&mappings)?);
            } else {
                print_mappings(&mappings);
            }
        }
        Command::Add {
            protocol,
            external_port,
            internal_port,
            internal_client,
            description,
        } => {
            let internal_client = match internal_client {
                Some(client) => client,
                None => router
                    .local_host_address()
                    .context("Failed to determine internal client address")?,
            };
            let mapping = PortMapping::new(
                protocol,
                None,
                external_port,
                internal_client,
                internal_port,
                description,
            );
            router.add_port_mapping(&mapping)?;
            println!("Added {}", mapping);
        }
        Command::Delete {
            protocol,
            external_port,
            remote_host,
        } => {
            router.remove_port_mapping(protocol, remote_host.as_deref(), external_port)?;
            println!("Deleted {} port {}", protocol, external_port);
        }
        Command::Ip => println!("{}", router.external_ip_address()?),
        Command::Info => router.log_router_info(),
        Command::LocalIp => println!("{}", router.local_host_address()?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = DiscoveryConfig::default().with_search_timeout(Duration::from_secs(args.timeout));
    config.location_url = args.location_url.filter(|url| !url.trim().is_empty());
    let command = args.command;

    // Spawn blocking task for UPnP operations (uses blocking I/O)
    tokio::task::spawn_blocking(move || -> Result<()> {
        let factory = IgdRouterFactory::new();
        let mut routers = factory
            .find_routers(&config)
            .with_context(|| format!("Router discovery with {} failed", factory.name()))?;
        if routers.is_empty() {
            anyhow::bail!("No router found");
        }
        let mut router = routers.swap_remove(0);
        println!("Using router {}", &*router);

        let result = run(command, &*router);
        router.disconnect();
        result
    })
    .await
    .context("Task join error")?
}
