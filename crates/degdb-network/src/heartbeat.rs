//! Per-connection heartbeat loop (spec §4.4, §5).
//!
//! Runs from the moment a handshake completes until the connection
//! closes: on every tick it sends a `PeerRequest` and waits up to
//! `heartbeat_timeout` for the reply. Three consecutive timeouts evict
//! the peer; any successful reply resets the counter.

use std::sync::Arc;

use degdb_wire::envelope::MessageBody;

use crate::connection::Connection;
use crate::server::Server;
use crate::NetworkError;

pub async fn run(server: Arc<Server>, conn: Arc<Connection>) {
    let config = server.config().clone();
    let mut ticker = tokio::time::interval(config.heartbeat_interval);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        ticker.tick().await;
        if conn.is_closed() {
            return;
        }

        let result = tokio::time::timeout(
            config.heartbeat_timeout,
            conn.request(MessageBody::PeerRequest { limit: 0 }),
        )
        .await;

        match result {
            Ok(Ok(_)) => conn.reset_heartbeat_timeouts(),
            Ok(Err(NetworkError::Closed)) => return,
            Ok(Err(_)) | Err(_) => {
                let timeouts = conn.record_heartbeat_timeout();
                if timeouts >= config.max_heartbeat_timeouts {
                    let peer_id = conn.peer().await.map(|p| p.id);
                    tracing::warn!(peer = ?peer_id, timeouts, "evicting unresponsive peer");
                    if let Some(id) = &peer_id {
                        server.evict(id).await;
                    }
                    conn.close().await;
                    return;
                }
            }
        }
    }
}
