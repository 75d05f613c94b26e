//! degdb: a distributed, peer-to-peer graph database.
//!
//! Single OS process running a Tokio runtime: the peer protocol and the
//! HTTP surface share one listening socket (spec §4.2), demultiplexed by
//! `degdb-network::Server` and handed off to an embedded Axum app.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use degdb_crypto::signing::PrivateKey;
use degdb_daemon::config::{Cli, DaemonConfig};
use degdb_daemon::http;
use degdb_network::server::{Server, ServerConfig};
use degdb_store::SqliteStore;
use degdb_types::Peer;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.advanced.log_level)),
        )
        .init();

    info!("degdb starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // Reserve a port up front so persisted state can be named after it
    // even when `-port=0` asks for an OS-assigned one (spec §6).
    let port = if config.network.listen_port == 0 {
        reserve_ephemeral_port().await?
    } else {
        config.network.listen_port
    };
    let listen_addr = format!("0.0.0.0:{port}");

    let key_path = data_dir.join(format!("degdb-{port}.key"));
    let signing_key = Arc::new(PrivateKey::read_or_generate(&key_path)?);

    let db_path = data_dir.join(format!("degdb-{port}.db"));
    let conn = degdb_store::open(&db_path)?;
    let store: Arc<dyn degdb_store::TripleStore> = Arc::new(SqliteStore::new(conn));

    let local_peer = Peer::new(format!("127.0.0.1:{port}"));
    let server_config = ServerConfig {
        heartbeat_interval: Duration::from_secs(config.network.heartbeat_interval_secs),
        heartbeat_timeout: Duration::from_secs(config.network.heartbeat_timeout_secs),
        max_heartbeat_timeouts: config.network.max_heartbeat_timeouts,
        peer_request_limit: config.network.peer_request_limit,
    };
    let server = Server::new(local_peer, store, signing_key, server_config);
    server.set_query_handler(Arc::new(degdb_query::Dispatcher)).await;

    let (http_tx, http_rx) = mpsc::channel(64);
    server.set_http_sender(http_tx).await;

    let bound = server.listen(&listen_addr).await?;
    info!(%bound, "peer server listening");

    for peer_addr in &config.network.peers {
        let server = server.clone();
        let peer_addr = peer_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = server.connect(&peer_addr).await {
                warn!(peer = %peer_addr, error = %e, "failed to dial seed peer");
            }
        });
    }

    if config.network.anti_entropy_interval_secs > 0 {
        let server = server.clone();
        let interval = Duration::from_secs(config.network.anti_entropy_interval_secs);
        tokio::spawn(run_anti_entropy(server, interval));
    }

    let app = http::router(server.clone());
    let listener = http::HandoffListener::new(http_rx);
    let http_task = tokio::spawn(async move {
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, make_service).await {
            warn!(error = %e, "HTTP server exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, shutting down");

    http_task.abort();
    info!("degdb stopped");
    Ok(())
}

/// Bind an ephemeral port, read back what the OS assigned, then drop the
/// listener so the real peer-server bind can reuse it. Small TOCTOU
/// window between the two binds is accepted here, same as any tool that
/// needs to know its port before handing the socket to a library.
async fn reserve_ephemeral_port() -> anyhow::Result<u16> {
    let listener = tokio::net::TcpListener::bind("0.0.0.0:0").await?;
    Ok(listener.local_addr()?.port())
}

/// Background anti-entropy loop (spec §4.9): on every tick, repair
/// against every currently known peer in turn. Repairing is one peer at a
/// time rather than concurrently, since each run already streams the
/// full local store and there is no benefit to racing multiple repairs
/// against the same disk.
async fn run_anti_entropy(server: Arc<Server>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        ticker.tick().await;
        let peer_ids: Vec<String> = server.peers().await.into_iter().map(|(p, _)| p.id).collect();

        for peer_id in peer_ids {
            let (results_tx, mut results_rx) = mpsc::channel(16);
            let (errors_tx, mut errors_rx) = mpsc::channel(16);

            // Drain both channels concurrently with the repair call itself —
            // they're bounded, so a caller that only reads them afterward
            // would deadlock once a long repair fills either one.
            let repair = degdb_network::antientropy::repair_against_peer(
                &server,
                &peer_id,
                None,
                degdb_network::antientropy::DEFAULT_BATCH_SIZE,
                results_tx,
                errors_tx,
            );
            let drain_errors = async {
                while let Some(e) = errors_rx.recv().await {
                    warn!(peer = %peer_id, error = %e, "anti-entropy batch failed");
                }
            };
            let drain_results = async { while results_rx.recv().await.is_some() {} };

            let (outcome, _, _) = tokio::join!(repair, drain_errors, drain_results);

            match outcome {
                Ok(outcome) => {
                    if outcome.triples_sent > 0 {
                        info!(peer = %peer_id, sent = outcome.triples_sent, batches = outcome.batches, "anti-entropy repair sent triples");
                    }
                }
                Err(e) => warn!(peer = %peer_id, error = %e, "anti-entropy repair failed"),
            }
        }
    }
}
