mod config;
mod network;
mod pipeline;
mod registries;

use anyhow::{anyhow, Result};
use config::ProxyConfig;
use crossplay_diagnostics::{Containment, ContainmentMode, ReportContext, ReportQueue};
use crossplay_protocol_core::ConnectionState;
use crossplay_schema::{Outcome, Translator};
use crossplay_types::{Direction, ProtocolVersion};
use network::Shared;
use pipeline::Pipeline;
use registries::Registries;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::load(Path::new("config/proxy.toml"))?;
    info!(
        "Config loaded: bind={}:{}, backend={} (protocol {}), tolerant={}",
        config.bind, config.port, config.backend, config.server_protocol, config.tolerant
    );

    let catalog = Arc::new(crossplay_protocol_defs::catalog()?);
    if !catalog.supports(config.server_protocol) {
        return Err(anyhow!("Unsupported server protocol {}", config.server_protocol));
    }
    let registries = Registries::load(&config.registry_dir, catalog.versions())?;

    if let Some(dump_dir) = &config.dump_dir {
        registries.dump(dump_dir)?;
        catalog.dump(dump_dir)?;
        info!("Registry and packet dump written to {}", dump_dir.display());
        return Ok(());
    }

    let (reports, reporter) = ReportQueue::spawn(config.report_queue);
    let shared = Arc::new(Shared {
        config,
        catalog,
        registries,
        reports,
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("replay") {
        let result = replay(&shared, &args[1..]);
        // Let the reporter flush before exiting.
        drop(shared);
        let _ = reporter.await;
        return result;
    }

    let addr = format!("{}:{}", shared.config.bind, shared.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = accept_loop(listener, shared) => {
            error!("Accept loop exited unexpectedly");
        }
    }
    Ok(())
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!("New connection from {}", peer);
                let _ = socket.set_nodelay(true);
                let shared = shared.clone();
                tokio::spawn(async move {
                    network::handle_connection(socket, shared).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// `replay <client protocol> <state> <capture>`: run a reported clientbound packet
/// through translation again, against the configured server protocol.
fn replay(shared: &Shared, args: &[String]) -> Result<()> {
    let [client, state, capture] = args else {
        return Err(anyhow!("usage: crossplay replay <client protocol> <state> <capture>"));
    };
    let client = ProtocolVersion(client.parse()?);
    let state = parse_state(state)?;
    let server = shared.config.server_protocol;

    let pairing = shared.registries.pairing(server, client)?;
    let containment = Containment::new(
        ContainmentMode::Tolerant,
        ReportContext {
            server,
            client,
            peer: Arc::new("replay".to_string()),
        },
        Arc::new(shared.reports.clone()),
    );
    let mut pipeline = Pipeline::new(
        Direction::Clientbound,
        Translator::new(shared.catalog.clone(), pairing),
        containment,
    );
    match pipeline.inject_inbound(state, capture)? {
        Some(Outcome::Translated { kind, record, body }) => {
            info!("Translated {} ({} bytes): {:?}", kind, body.len(), record);
        }
        Some(Outcome::Passthrough(frame)) => info!("Passed through {} bytes", frame.len()),
        Some(Outcome::Dropped) => info!("Packet dropped"),
        None => info!("Packet faulted, see report above"),
    }
    Ok(())
}

fn parse_state(name: &str) -> Result<ConnectionState> {
    match name {
        "login" => Ok(ConnectionState::Login),
        "configuration" => Ok(ConnectionState::Configuration),
        "play" => Ok(ConnectionState::Play),
        other => Err(anyhow!("Unknown connection state: {}", other)),
    }
}
