//! REST API for the live routing session.
//!
//! Provides endpoints for:
//! - Adding and removing locations (the first location is the depot)
//! - Adding and removing vehicles, changing capacity
//! - Reading the latest route, or following it as Server-Sent Events

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use parking_lot::RwLock;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::distance::DistanceMatrix;
use crate::domain::{Location, LocationId, VehicleId};
use crate::dto::{
    AddLocationRequest, AddVehicleRequest, CapacityRequest, ErrorResponse, HealthResponse, InfoResponse,
    RouteResponse, StreamEvent,
};
use crate::error::{ConsistencyError, OptimizerError, SolverError, ValidationError};
use crate::optimizer::{RouteOptimizer, RoutePublisher};
use crate::snapshot::RouteSnapshot;
use crate::solver::SolverConfig;

/// Events buffered per stream subscriber before it starts lagging.
const STREAM_CAPACITY: usize = 64;

// ============================================================================
// Publisher
// ============================================================================

/// Keeps the latest snapshot and fans every publish out to stream subscribers.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<StreamEvent>,
    latest: RwLock<RouteSnapshot>,
    last_failure: RwLock<Option<String>>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            sender,
            latest: RwLock::new(RouteSnapshot::empty()),
            last_failure: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    pub fn latest(&self) -> RouteSnapshot {
        self.latest.read().clone()
    }

    /// Cause of the last solver failure, cleared by the next publish.
    pub fn last_failure(&self) -> Option<String> {
        self.last_failure.read().clone()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutePublisher for BroadcastPublisher {
    fn publish(&self, snapshot: RouteSnapshot) {
        *self.latest.write() = snapshot.clone();
        *self.last_failure.write() = None;
        // No subscribers is not an error.
        let _ = self.sender.send(StreamEvent::Route { route: snapshot });
    }

    fn publish_failure(&self, cause: &str) {
        *self.last_failure.write() = Some(cause.to_owned());
        let _ = self.sender.send(StreamEvent::Failure {
            message: cause.to_owned(),
        });
    }
}

// ============================================================================
// State & Router
// ============================================================================

/// Application state shared across handlers.
pub struct AppState {
    pub optimizer: RouteOptimizer,
    pub matrix: Arc<DistanceMatrix>,
    pub publisher: Arc<BroadcastPublisher>,
}

impl AppState {
    pub fn new(config: SolverConfig) -> Self {
        let matrix = Arc::new(DistanceMatrix::default());
        let publisher = Arc::new(BroadcastPublisher::new());
        Self {
            optimizer: RouteOptimizer::new(config, matrix.clone(), publisher.clone()),
            matrix,
            publisher,
        }
    }

    /// Makes sure the matrix knows `location` before the optimizer sees it.
    fn register(&self, location: &Arc<Location>) -> Result<(), ApiError> {
        if let Some(known) = self.matrix.location(location.id) {
            if known.latitude != location.latitude || known.longitude != location.longitude {
                return Err(ApiError::MovedLocation(location.id));
            }
            return Ok(());
        }
        self.matrix.add_location(location.clone());
        Ok(())
    }
}

/// Creates the API router with CORS enabled.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Route
        .route("/route", get(get_route))
        .route("/route/stream", get(get_route_stream))
        // Locations
        .route("/locations", post(add_location))
        .route("/locations", delete(remove_all_locations))
        .route("/locations/{id}", delete(remove_location))
        // Vehicles
        .route("/vehicles", post(add_vehicle))
        .route("/vehicles", delete(remove_all_vehicles))
        .route("/vehicles/{id}", delete(remove_vehicle))
        .route("/vehicles/{id}/capacity", put(change_capacity))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error("location {0} is already registered at different coordinates")]
    MovedLocation(LocationId),
    #[error("request handler failed: {0}")]
    Join(#[from] JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Optimizer(OptimizerError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Optimizer(OptimizerError::Consistency(ConsistencyError::NotFound { .. })) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Optimizer(OptimizerError::Consistency(_))
            | ApiError::Optimizer(OptimizerError::DepotRemoval { .. })
            | ApiError::MovedLocation(_) => StatusCode::CONFLICT,
            ApiError::Optimizer(OptimizerError::Solver(SolverError::Died(_))) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Optimizer(OptimizerError::Solver(_)) => StatusCode::CONFLICT,
            ApiError::Optimizer(OptimizerError::Lookup(_)) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Runs an optimizer call off the async runtime; it may wait for the solver.
async fn blocking<F>(state: &Arc<AppState>, f: F) -> Result<StatusCode, ApiError>
where
    F: FnOnce(&AppState) -> Result<(), ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state)).await??;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Health & Info
// ============================================================================

/// GET /health - Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// GET /info - Application info endpoint.
async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Route Optimizer",
        version: env!("CARGO_PKG_VERSION"),
        solver_engine: "Incremental local search",
    })
}

// ============================================================================
// Route
// ============================================================================

/// GET /route - Latest published route.
async fn get_route(State(state): State<Arc<AppState>>) -> Json<RouteResponse> {
    Json(RouteResponse {
        route: state.publisher.latest(),
        solver_status: state.optimizer.solver_status(),
        last_failure: state.publisher.last_failure(),
    })
}

fn sse_frame(event: &StreamEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {}\n\n", json),
        Err(e) => {
            error!(error = %e, "Could not serialize stream event");
            String::new()
        }
    }
}

/// GET /route/stream - Latest route, then every publish, as Server-Sent Events.
///
/// Compatible with the browser's EventSource API.
async fn get_route_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Subscribe first so nothing published after the initial snapshot is lost.
    let mut receiver = state.publisher.subscribe();
    let initial = StreamEvent::Route {
        route: state.publisher.latest(),
    };

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(sse_frame(&initial));
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    yield Ok(sse_frame(&event));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Route stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
}

// ============================================================================
// Locations
// ============================================================================

/// POST /locations - Add the depot, or a visit once the depot exists.
async fn add_location(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddLocationRequest>,
) -> Result<StatusCode, ApiError> {
    let location = Arc::new(request.to_location()?);
    let demand = request.demand;
    blocking(&state, move |state| {
        state.register(&location)?;
        Ok(state.optimizer.add_location(location, demand)?)
    })
    .await
}

/// DELETE /locations/{id} - Remove a visit, or the depot once no visits remain.
async fn remove_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<LocationId>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |state| Ok(state.optimizer.remove_location(id)?)).await
}

/// DELETE /locations - Remove the depot and every visit.
async fn remove_all_locations(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    blocking(&state, |state| Ok(state.optimizer.remove_all_locations()?)).await
}

// ============================================================================
// Vehicles
// ============================================================================

/// POST /vehicles - Add a vehicle.
async fn add_vehicle(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddVehicleRequest>,
) -> Result<StatusCode, ApiError> {
    let info = Arc::new(request.to_info());
    let capacity = request.capacity;
    blocking(&state, move |state| Ok(state.optimizer.add_vehicle(info, capacity)?)).await
}

/// DELETE /vehicles/{id} - Remove a vehicle; its visits become unassigned.
async fn remove_vehicle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<VehicleId>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |state| Ok(state.optimizer.remove_vehicle(id)?)).await
}

/// DELETE /vehicles - Remove every vehicle.
async fn remove_all_vehicles(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    blocking(&state, |state| Ok(state.optimizer.remove_all_vehicles()?)).await
}

/// PUT /vehicles/{id}/capacity - Change a vehicle's capacity.
async fn change_capacity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<VehicleId>,
    Json(request): Json<CapacityRequest>,
) -> Result<StatusCode, ApiError> {
    blocking(&state, move |state| Ok(state.optimizer.change_capacity(id, request.capacity)?)).await
}
