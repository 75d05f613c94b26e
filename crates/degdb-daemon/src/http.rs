//! The embedded HTTP surface (spec §6), served over the same port as the
//! peer protocol via the `HttpHandoff` channel `degdb-network::Server`
//! hands connections off on.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use degdb_network::server::{HttpHandoff, Server};
use degdb_store::TripleStore;
use degdb_types::{ArrayOp, OpMode, QueryRequest, QueryType, Triple, TripleTemplate};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/v1/info", get(info))
        .route("/api/v1/peers", get(peers))
        .route("/api/v1/triples", get(triples))
        .route("/api/v1/myip", get(myip))
        .route("/api/v1/insert", post(insert))
        .route("/api/v1/query", get(query))
        .layer(CorsLayer::permissive())
        .with_state(server)
}

async fn index() -> &'static str {
    "degdb\n\n\
     GET  /api/v1/info\n\
     GET  /api/v1/peers\n\
     GET  /api/v1/triples\n\
     GET  /api/v1/myip\n\
     POST /api/v1/insert\n\
     GET  /api/v1/query?q=...\n"
}

#[derive(Serialize)]
struct InfoResponse {
    id: String,
    peer_count: usize,
}

async fn info(State(server): State<Arc<Server>>) -> impl IntoResponse {
    Json(InfoResponse {
        id: server.local_peer.id.clone(),
        peer_count: server.peer_count().await,
    })
}

async fn peers(State(server): State<Arc<Server>>) -> impl IntoResponse {
    let peers: Vec<_> = server.peers().await.into_iter().map(|(p, _)| p).collect();
    Json(peers)
}

async fn triples(State(server): State<Arc<Server>>) -> impl IntoResponse {
    match server.store.query(&TripleTemplate::default(), i64::MAX) {
        Ok(mut triples) => {
            degdb_types::sort_triples(&mut triples);
            Json(triples).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn myip(ConnectInfo(addr): ConnectInfo<SocketAddr>) -> impl IntoResponse {
    addr.ip().to_string()
}

async fn insert(State(server): State<Arc<Server>>, Json(triples): Json<Vec<Triple>>) -> impl IntoResponse {
    let key = server.signing_key();
    match degdb_network::insert::insert(&server, triples, key).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Deserialize)]
struct QueryParams {
    q: String,
}

async fn query(State(server): State<Arc<Server>>, Query(params): Query<QueryParams>) -> impl IntoResponse {
    let templates: Vec<TripleTemplate> = match serde_json::from_str(&params.q) {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid query: {e}")),
    };
    let req = QueryRequest {
        query_type: QueryType::Basic,
        steps: vec![ArrayOp::new(OpMode::Or, templates)],
        limit: 1000,
        sharded: false,
    };
    match degdb_query::dispatcher::execute(&server, req).await {
        Ok(mut triples) => {
            degdb_types::sort_triples(&mut triples);
            Json(triples).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// An `axum::serve::Listener` that yields HTTP-sniffed connections handed
/// off by `degdb-network::Server` instead of accepting on its own socket.
pub struct HandoffListener {
    rx: mpsc::Receiver<HttpHandoff>,
}

impl HandoffListener {
    pub fn new(rx: mpsc::Receiver<HttpHandoff>) -> Self {
        Self { rx }
    }
}

impl axum::serve::Listener for HandoffListener {
    type Io = degdb_network::server::PrefixedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.rx.recv().await {
                Some(handoff) => return (handoff.stream, handoff.remote_addr),
                None => std::future::pending::<()>().await,
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        Ok(SocketAddr::from(([0, 0, 0, 0], 0)))
    }
}
