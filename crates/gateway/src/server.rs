use std::net::SocketAddr;

use {
    axum::{
        Json, Router,
        extract::{ConnectInfo, Path, State, WebSocketUpgrade, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    tokio::{net::TcpListener, sync::watch},
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use {
    chatrelay_bus::EventBus,
    chatrelay_protocol::{Command, ControlCommand, OutboundMessage, Platform},
};

use crate::{orchestrator::Orchestrator, snapshot::ServiceSnapshot, ws};

/// Shared state for the dashboard and control routes.
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub services: watch::Receiver<ServiceSnapshot>,
    pub version: String,
}

impl AppState {
    pub fn new(bus: EventBus, services: watch::Receiver<ServiceSnapshot>) -> Self {
        Self {
            bus,
            services,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn from_orchestrator(orchestrator: &Orchestrator) -> Self {
        Self::new(orchestrator.bus().clone(), orchestrator.services())
    }
}

pub fn build_gateway_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/services", get(services_handler))
        .route("/api/control", post(control_handler))
        .route("/api/services/{service}/send", post(send_handler))
        .route("/ws/dashboard", get(dashboard_upgrade_handler))
        .route("/ws/debug", get(debug_upgrade_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway on `bind:port` until `shutdown` fires.
pub async fn start_gateway(
    bind: &str,
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("{bind}:{port}")).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "gateway listening");

    let app = build_gateway_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await?;
    info!("gateway stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.services.borrow().clone();
    let services: serde_json::Map<String, serde_json::Value> = snapshot
        .services
        .iter()
        .map(|(platform, info)| (platform.to_string(), serde_json::json!(info.state)))
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "services": services,
        "pending_events": state.bus.pending(),
    }))
}

async fn services_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.services.borrow().clone();
    Json(snapshot)
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    service: String,
    command: String,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
}

fn rejected(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": error.to_string() })),
    )
        .into_response()
}

fn enqueue(bus: &EventBus, event: impl Into<chatrelay_protocol::Event>) -> Response {
    match bus.publish(event) {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true }))).into_response(),
        Err(e) => {
            warn!(error = %e, "control surface: bus unavailable");
            rejected(StatusCode::SERVICE_UNAVAILABLE, e)
        },
    }
}

async fn control_handler(
    State(state): State<AppState>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e.body_text()),
    };
    let service: Platform = match req.service.parse() {
        Ok(service) => service,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    let command: Command = match req.command.parse() {
        Ok(command) => command,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    if !state.services.borrow().services.contains_key(&service) {
        return rejected(
            StatusCode::BAD_REQUEST,
            format!("service not registered: {service}"),
        );
    }
    info!(service = %service, command = %command, "control request");
    enqueue(&state.bus, ControlCommand::new(service, command))
}

async fn send_handler(
    State(state): State<AppState>,
    Path(service): Path<String>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Response {
    let service: Platform = match service.parse() {
        Ok(service) => service,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    let Json(req) = match body {
        Ok(body) => body,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e.body_text()),
    };
    enqueue(&state.bus, OutboundMessage {
        service,
        text: req.text,
    })
}

async fn dashboard_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match ws::DashboardFeed::subscribe(&state.bus) {
        Ok(feed) => ws
            .on_upgrade(move |socket| ws::handle_dashboard(socket, feed, addr))
            .into_response(),
        Err(e) => {
            warn!(error = %e, "dashboard: bus unavailable");
            rejected(StatusCode::SERVICE_UNAVAILABLE, e)
        },
    }
}

async fn debug_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_debug(socket, addr))
}
