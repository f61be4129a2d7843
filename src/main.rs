use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rdwatch::data::format::{format_bytes, format_rate};
use rdwatch::stream::StreamOptions;
use rdwatch::{
    ApiClient, CloseReason, ConnectionManager, ConnectionState, ConnectionStream, Endpoint,
    EndpointRegistry, FileStore, HealthPoller, HttpProbe, LogStream, Settings, WsConnector,
};

#[derive(Parser, Debug)]
#[command(name = "rdwatch")]
#[command(about = "Live connection, log and endpoint health watcher for rabbit-digger")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Control url to use instead of the active stored endpoint
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow active connections and their rates
    Connections {
        /// Only receive totals, not per-connection records
        #[arg(long)]
        totals_only: bool,
    },

    /// Follow the log stream
    Logs {
        /// Only print entries matching this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Probe every stored endpoint
    Health {
        /// Keep polling and report status changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Manage stored endpoints
    #[command(subcommand)]
    Endpoints(EndpointsCommand),

    /// Switch a `select` net to one of its options
    Select { net: String, selected: String },

    /// Close one connection by id
    CloseConn { uuid: String },
}

#[derive(Subcommand, Debug)]
enum EndpointsCommand {
    /// List stored endpoints
    List,
    /// Add an endpoint
    Add { name: String, url: String },
    /// Remove an endpoint by id
    Remove { id: String },
    /// Make an endpoint the active one
    Use { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    let store = FileStore::new(&settings.store_dir);

    match args.command {
        Command::Endpoints(command) => run_endpoints(command, &store),
        Command::Health { watch } => run_health(&settings, &store, watch).await,
        Command::Connections { totals_only } => {
            let endpoint = resolve_endpoint(args.endpoint, &settings, &store);
            run_connections(&endpoint, &settings, totals_only).await
        }
        Command::Logs { filter } => {
            let endpoint = resolve_endpoint(args.endpoint, &settings, &store);
            run_logs(&endpoint, &settings, filter).await
        }
        Command::Select { net, selected } => {
            let endpoint = resolve_endpoint(args.endpoint, &settings, &store);
            client(&endpoint, &settings)?.select(&net, &selected).await?;
            println!("{} -> {}", net, selected);
            Ok(())
        }
        Command::CloseConn { uuid } => {
            let endpoint = resolve_endpoint(args.endpoint, &settings, &store);
            if client(&endpoint, &settings)?.delete_conn(&uuid).await? {
                println!("Closed {}", uuid);
            } else {
                println!("No connection {}", uuid);
            }
            Ok(())
        }
    }
}

/// `--endpoint`, then the configured endpoint, then the active stored one.
fn resolve_endpoint(flag: Option<String>, settings: &Settings, store: &FileStore) -> Endpoint {
    if let Some(url) = flag.or_else(|| settings.endpoint.clone()) {
        return Endpoint::new("cli", url.clone(), url);
    }
    let registry = EndpointRegistry::load(store);
    registry.active().cloned().unwrap_or_else(Endpoint::local)
}

fn client(endpoint: &Endpoint, settings: &Settings) -> Result<ApiClient> {
    ApiClient::builder()
        .endpoint(&endpoint.url)
        .timeout(settings.request_timeout())
        .build()
        .with_context(|| format!("Invalid endpoint {}", endpoint.url))
}

async fn run_connections(
    endpoint: &Endpoint,
    settings: &Settings,
    totals_only: bool,
) -> Result<()> {
    let manager = ConnectionManager::new(settings.reconnect_policy());
    let stream = ConnectionStream::open(
        &manager,
        Arc::new(WsConnector),
        &endpoint.url,
        StreamOptions {
            without_connections: totals_only,
        },
    )?;
    println!("Watching connections of {} ({})", endpoint.name, endpoint.url);

    let mut view = stream.subscribe();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view.borrow_and_update().clone();
                let sum = view.rates.sum();
                let total = view.rates.total.unwrap_or(sum);
                println!(
                    "[{}] {} connections  up {}  down {}",
                    view.status,
                    view.connection_count(),
                    format_rate(total.upload),
                    format_rate(total.download),
                );
                if let Some(connections) = view.connections() {
                    for (id, record) in connections {
                        let rate = view.rates.get(id).copied().unwrap_or_default();
                        let target = record
                            .pointer("/ctx/dest_domain")
                            .or_else(|| record.pointer("/ctx/dest_socket_addr"))
                            .and_then(|v| v.as_str())
                            .unwrap_or("-");
                        println!(
                            "  {}  {}  up {} ({})  down {} ({})",
                            id,
                            target,
                            format_rate(rate.upload),
                            format_bytes(record["upload"].as_u64().unwrap_or(0)),
                            format_rate(rate.download),
                            format_bytes(record["download"].as_u64().unwrap_or(0)),
                        );
                    }
                }
                if stream.state().is_closed() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let exhausted = matches!(
        stream.state(),
        ConnectionState::Closed(CloseReason::Exhausted { .. })
    );
    stream.close();
    if exhausted {
        bail!("Gave up reconnecting to {}", endpoint.url);
    }
    Ok(())
}

async fn run_logs(endpoint: &Endpoint, settings: &Settings, filter: Option<String>) -> Result<()> {
    let manager = ConnectionManager::new(settings.reconnect_policy());
    let stream = LogStream::open(
        &manager,
        Arc::new(WsConnector),
        &endpoint.url,
        settings.log_capacity,
    )?;
    let filter = filter.unwrap_or_default();

    let mut feed = stream.subscribe();
    let mut printed = 0u64;
    loop {
        tokio::select! {
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
                let received = feed.borrow_and_update().received;
                let fresh = (received - printed) as usize;
                printed = received;

                let entries = stream.entries();
                let start = entries.len().saturating_sub(fresh);
                for entry in entries[start..].iter().filter(|e| e.matches(&filter)) {
                    let context = entry
                        .context()
                        .and_then(|ctx| ctx.dest_domain.or(ctx.dest_socket_addr))
                        .map(|dest| format!(" -> {}", dest))
                        .unwrap_or_default();
                    println!(
                        "{} {:>5} {}{}",
                        entry.timestamp,
                        entry.level().label(),
                        entry.display_message().unwrap_or(""),
                        context,
                    );
                }
                if stream.state().is_closed() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    stream.close();
    Ok(())
}

async fn run_health(settings: &Settings, store: &FileStore, watch: bool) -> Result<()> {
    let registry = EndpointRegistry::load(store);
    let urls = registry.urls();
    let poller = HealthPoller::new(Arc::new(HttpProbe::new()), settings.poller_config());

    let result = poller.refresh(&urls).await;
    for endpoint in registry.endpoints() {
        let status = match result.get(&endpoint.url) {
            Some(true) => "online",
            Some(false) => "offline",
            None => "invalid url",
        };
        let marker = if endpoint.is_active { "*" } else { " " };
        println!("{} {:<20} {:<32} {}", marker, endpoint.name, endpoint.url, status);
    }
    if !watch {
        return Ok(());
    }

    let mut changes = poller.subscribe();
    let handle = poller.start(urls);
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => println!(
                    "{} is now {}",
                    change.url,
                    if change.is_online { "online" } else { "offline" }
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    handle.stop();
    Ok(())
}

fn run_endpoints(command: EndpointsCommand, store: &FileStore) -> Result<()> {
    let mut registry = EndpointRegistry::load(store);
    match command {
        EndpointsCommand::List => {
            for endpoint in registry.endpoints() {
                let marker = if endpoint.is_active { "*" } else { " " };
                println!("{} {:<16} {:<20} {}", marker, endpoint.id, endpoint.name, endpoint.url);
            }
            return Ok(());
        }
        EndpointsCommand::Add { name, url } => {
            url::Url::parse(&url).with_context(|| format!("Invalid url {}", url))?;
            let id = registry.add(name, url);
            println!("Added {}", id);
        }
        EndpointsCommand::Remove { id } => {
            let removed = registry.remove(&id)?;
            println!("Removed {}", removed.name);
        }
        EndpointsCommand::Use { id } => {
            registry.set_active(&id)?;
            println!("Active endpoint is now {}", id);
        }
    }
    registry.save(store)?;
    Ok(())
}
