//! CLI entry point for rigscan.

use std::net::Ipv4Addr;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use rigscan_api::Parameter;
use rigscan_discover::classify::Classifier;
use rigscan_discover::config::DiscoverConfig;
use rigscan_discover::fleet;
use rigscan_discover::listener::Listener;
use rigscan_discover::scanner::Scanner;
use rigscan_discover::shell::ShellChannel;
use rigscan_discover::{MinerRegistry, NetworkTarget};

#[derive(Parser)]
#[command(name = "rigscan")]
#[command(about = "Discover, identify and command ASIC miners")]
struct Cli {
    /// Config file prefix (default: rigscan).
    #[arg(short, long, default_value = "rigscan", global = true)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep a network and identify every miner found.
    Scan {
        /// Targets: addresses, ranges and CIDR blocks, comma separated.
        #[arg(short, long)]
        target: Option<String>,

        /// Network address when no target list is given.
        #[arg(long)]
        ip: Option<Ipv4Addr>,

        /// Prefix length, netmask or hostmask for --ip.
        #[arg(long)]
        mask: Option<String>,
    },
    /// Identify a single device.
    Identify {
        ip: Ipv4Addr,

        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Send one command to every device in a target list.
    Command {
        target: String,
        command: String,

        #[arg(long)]
        parameter: Option<String>,

        /// Return the reply even when the device reports an error.
        #[arg(long)]
        ignore_errors: bool,
    },
    /// Send a batch of commands to one device.
    Multicommand {
        ip: Ipv4Addr,

        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Print IP-report announcements as they arrive.
    Listen {
        /// Stop after this many seconds.
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = DiscoverConfig::load(&cli.config)?;
    let registry = MinerRegistry::new(
        Classifier::from_config(&config).with_shell(build_shell(&config)),
        config.api_port,
    );

    match cli.command {
        Command::Scan { target, ip, mask } => {
            let target = match target {
                Some(t) => t.parse::<NetworkTarget>()?,
                None => NetworkTarget::from_network(ip, mask.as_deref())?,
            };
            let scanner = Scanner::from_config(&config);
            let mut miners =
                pin!(registry.scan_and_identify(&scanner, &target, config.scan_concurrency));
            while let Some(miner) = miners.next().await {
                emit(&*miner)?;
            }
        }
        Command::Identify { ip, port } => {
            let miner = registry.get_at(ip, port.unwrap_or(config.api_port)).await;
            emit(&*miner)?;
        }
        Command::Command {
            target,
            command,
            parameter,
            ignore_errors,
        } => {
            let target: NetworkTarget = target.parse()?;
            let ips: Vec<Ipv4Addr> = target.hosts().collect();
            let miners = registry.identify_all(&ips, config.scan_concurrency).await;
            let results = fleet::bulk_command(
                &miners,
                &command,
                parameter.map(Parameter::from),
                ignore_errors,
                config.config_concurrency,
            )
            .await;
            for (ip, result) in results {
                match result {
                    Ok(reply) => emit(&serde_json::json!({"ip": ip, "reply": reply}))?,
                    Err(e) => emit(&serde_json::json!({"ip": ip, "error": e.to_string()}))?,
                }
            }
        }
        Command::Multicommand { ip, commands } => {
            let miner = registry.get(ip).await;
            let adapter = miner
                .adapter()
                .ok_or_else(|| anyhow::anyhow!("{ip} could not be identified"))?;
            let commands: Vec<&str> = commands.iter().map(String::as_str).collect();
            emit(&adapter.multicommand(&commands).await?)?;
        }
        Command::Listen { seconds } => {
            let listener = Listener::bind(&config.listen_addr).await?;
            for announcement in listener.listen_for(Duration::from_secs(seconds)).await? {
                emit(&announcement)?;
            }
        }
    }

    Ok(())
}

/// Write one JSON line to stdout.
fn emit<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

#[cfg(feature = "ssh")]
fn build_shell(config: &DiscoverConfig) -> Arc<dyn ShellChannel> {
    Arc::new(rigscan_discover::shell::SshShell::new(
        &config.shell,
        config.identify_timeout(),
    ))
}

#[cfg(not(feature = "ssh"))]
fn build_shell(_config: &DiscoverConfig) -> Arc<dyn ShellChannel> {
    Arc::new(rigscan_discover::shell::NoShell)
}
