//! Axum server exposing the relay WebSocket, snapshots, health and stats.
//!
//! Routes:
//! - `GET /ws/video`: duplex frame relay (see [`session`]).
//! - `GET /ws/get_snaps`: evenly spaced annotated frames as base64 JSON.
//! - `GET /api/health`: liveness probe.
//! - `GET /api/stats`: buffer, worker and session counters.

pub mod gate;
pub mod session;
pub mod snapshot;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::pipeline::ringbuf::RingStats;
use crate::pipeline::worker::WorkerStatsSnapshot;
use crate::pipeline::{FrameBuffer, OutputBuffer, WorkerStats};
use crate::{MonotonicClock, RelayError, Result};

pub use gate::ResumeGate;
pub use session::{
    egress_decision, run_session, EgressDecision, Inbound, SessionContext, SessionPath,
    SessionReport, SessionSettings, SessionState,
};
pub use snapshot::{take_snapshot, Snapshot, SNAPSHOT_COUNT};

/// Shared state backing HTTP handlers. Built once at startup and handed to
/// every request; nothing here is global.
pub struct AppState {
    pub frames: Arc<FrameBuffer>,
    pub output: Arc<OutputBuffer>,
    pub clock: MonotonicClock,
    pub settings: SessionSettings,
    worker_stats: Arc<WorkerStats>,
    active_sessions: AtomicUsize,
    next_session_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub frame_buffer: RingStats,
    pub output_buffer: RingStats,
    pub worker: WorkerStatsSnapshot,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

impl AppState {
    pub fn new(
        frames: Arc<FrameBuffer>,
        output: Arc<OutputBuffer>,
        clock: MonotonicClock,
        settings: SessionSettings,
        worker_stats: Arc<WorkerStats>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            frames,
            output,
            clock,
            settings,
            worker_stats,
            active_sessions: AtomicUsize::new(0),
            next_session_id: AtomicU64::new(1),
            shutdown,
        })
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            frames: self.frames.clone(),
            output: self.output.clone(),
            clock: self.clock,
            settings: self.settings,
            shutdown: self.shutdown.subscribe(),
        }
    }

    pub fn stats(&self) -> StatsResponse {
        StatsResponse {
            frame_buffer: self.frames.stats(),
            output_buffer: self.output.stats(),
            worker: self.worker_stats.snapshot(),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }

    /// Ask every open session to close
    pub fn close_sessions(&self) {
        self.shutdown.send_replace(true);
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route("/ws/video", get(video_handler))
        .route("/ws/get_snaps", get(snaps_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves, then close open sessions
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Relay listening on http://{}", addr);
    info!("Video socket: ws://{}/ws/video", addr);
    info!("Snapshots: http://{}/ws/get_snaps", addr);

    let app = router(state.clone());
    let signal_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, closing sessions");
            signal_state.close_sessions();
        })
        .await?;
    Ok(())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(state.stats())
}

async fn snaps_handler(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(take_snapshot(&state.output, SNAPSHOT_COUNT))
}

async fn video_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| relay_socket(socket, state))
}

/// Adapt a WebSocket into the session's inbound stream and outbound sink
async fn relay_socket(socket: WebSocket, state: Arc<AppState>) {
    let id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    let active = state.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
    info!(session = id, active, "Session connected");

    let (sink, stream) = socket.split();
    let inbound = stream.map(|message| match message {
        Ok(Message::Binary(data)) => Ok(Inbound::Frame(Bytes::from(data))),
        Ok(Message::Close(_)) => Ok(Inbound::Close),
        Ok(_) => Ok(Inbound::Ignored),
        Err(e) => Err(RelayError::Socket(e.to_string())),
    });
    let outbound = sink
        .sink_map_err(|e| RelayError::Socket(e.to_string()))
        .with(|payload: Bytes| future::ready(Ok::<_, RelayError>(Message::Binary(payload.to_vec()))));

    let report = run_session(id, inbound, outbound, state.session_context()).await;

    let active = state.active_sessions.fetch_sub(1, Ordering::Relaxed) - 1;
    debug!(session = id, active, "Session finished: {:?}", report.ended_by);
}
