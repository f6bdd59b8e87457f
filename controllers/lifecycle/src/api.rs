//! HTTP API
//!
//! # Routes
//!
//! - `GET /api/v1/health` - Liveness
//! - `GET /api/v1/pools` - Pools with utilisation
//! - `GET /api/v1/pools/{id}/available?limit=N` - Free addresses (default 100)
//! - `POST /api/v1/pools/{id}/reservations` - Reserve an address
//! - `DELETE /api/v1/reservations/{address}` - Lift a reservation
//! - `POST /api/v1/allocations` - Provision an address
//! - `POST /api/v1/allocations/release` - Release an address
//! - `GET /api/v1/allocations/expired` - Allocations past their expiry
//! - `GET /api/v1/allocations/{address}` - Allocation record
//! - `GET /api/v1/associations` - Committed route + DNS associations
//! - `DELETE /api/v1/associations/{key}` - Withdraw one association

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use ipam_core::{
    AddressAllocation, Association, AvailableAddresses, IpamError, LifecycleOrchestrator, PoolSpec, PoolUsage,
    ProvisionOutcome, ProvisionRequest, ReleaseOutcome, Stage, parse_address,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Page size of `available` when the caller gives none
const DEFAULT_AVAILABLE_LIMIT: usize = 100;
const MAX_AVAILABLE_LIMIT: usize = 4096;

type AppState = Arc<LifecycleOrchestrator>;

pub fn router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/health", get(health))
        .route("/pools", get(list_pools))
        .route("/pools/{id}/available", get(available))
        .route("/pools/{id}/reservations", post(reserve))
        .route("/reservations/{address}", delete(unreserve))
        .route("/allocations", post(provision))
        .route("/allocations/release", post(release))
        .route("/allocations/expired", get(expired))
        .route("/allocations/{address}", get(lookup))
        .route("/associations", get(list_associations))
        .route("/associations/{key}", delete(withdraw_association))
        .with_state(state);

    Router::new().nest("/api/v1", api_v1).layer(TraceLayer::new_for_http())
}

/// Error body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Ipam(IpamError),
    NotFound(String),
}

impl From<IpamError> for ApiError {
    fn from(err: IpamError) -> Self {
        ApiError::Ipam(err)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        let err = match self {
            ApiError::NotFound(_) => return (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Ipam(err) => err,
        };
        match err {
            IpamError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "invalid_address"),
            IpamError::OutOfRange { .. } => (StatusCode::BAD_REQUEST, "out_of_range"),
            IpamError::InvalidPool(_) => (StatusCode::BAD_REQUEST, "invalid_pool"),
            IpamError::PoolNotFound(_) => (StatusCode::NOT_FOUND, "pool_not_found"),
            IpamError::NotAllocated(_) => (StatusCode::NOT_FOUND, "not_allocated"),
            IpamError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            IpamError::PoolExhausted(_) => (StatusCode::INSUFFICIENT_STORAGE, "pool_exhausted"),
            IpamError::DownstreamUnavailable { .. } => (StatusCode::BAD_GATEWAY, "downstream_unavailable"),
            IpamError::CommitFailed { .. } => (StatusCode::BAD_GATEWAY, "commit_failed"),
            IpamError::CommitTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "commit_timeout"),
            IpamError::CompensationFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "compensation_failed"),
            IpamError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let (stage, details) = match &self {
            ApiError::Ipam(IpamError::DownstreamUnavailable { stage, .. }) => (Some(*stage), Vec::new()),
            ApiError::Ipam(IpamError::CompensationFailed { stage, failures, .. }) => (Some(*stage), failures.clone()),
            _ => (None, Vec::new()),
        };
        let message = match &self {
            ApiError::Ipam(err) => err.to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
        };
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, message);
        }

        (
            status,
            Json(ErrorBody {
                error: kind.to_string(),
                message,
                stage,
                details,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pools: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pools: state.engine().pools().len(),
    })
}

#[derive(Debug, Serialize)]
struct PoolView {
    #[serde(flatten)]
    pool: PoolSpec,
    usage: PoolUsage,
}

async fn list_pools(State(state): State<AppState>) -> Result<Json<Vec<PoolView>>, ApiError> {
    let mut views = Vec::new();
    for pool in state.engine().pools() {
        views.push(PoolView {
            usage: state.engine().usage(pool.id()).await?,
            pool: pool.spec().clone(),
        });
    }
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
struct AvailableQuery {
    limit: Option<usize>,
}

async fn available(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<AvailableAddresses>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_AVAILABLE_LIMIT).min(MAX_AVAILABLE_LIMIT);
    Ok(Json(state.engine().available(&id, limit).await?))
}

#[derive(Debug, Deserialize)]
struct ReserveRequest {
    address: String,
    #[serde(default)]
    notes: Option<String>,
}

async fn reserve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<AddressAllocation>), ApiError> {
    let record = state.engine().reserve(&id, &request.address, request.notes).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn unreserve(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AddressAllocation>, ApiError> {
    let address = parse_address(&address)?;
    Ok(Json(state.engine().unreserve(address).await?))
}

async fn provision(
    State(state): State<AppState>,
    Json(request): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<ProvisionOutcome>), ApiError> {
    let outcome = state.provision(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    address: String,
    #[serde(default)]
    hostname: Option<String>,
}

async fn release(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<ReleaseOutcome>, ApiError> {
    Ok(Json(state.release(&request.address, request.hostname.as_deref()).await?))
}

async fn expired(State(state): State<AppState>) -> Result<Json<Vec<AddressAllocation>>, ApiError> {
    Ok(Json(state.engine().expired(Utc::now()).await?))
}

async fn lookup(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AddressAllocation>, ApiError> {
    let address = parse_address(&address)?;
    state
        .engine()
        .lookup(address)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("allocation {}", address)))
}

async fn list_associations(State(state): State<AppState>) -> Result<Json<Vec<Association>>, ApiError> {
    Ok(Json(state.associations().await?))
}

async fn withdraw_association(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Association>, ApiError> {
    state
        .withdraw_association(&key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("association {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use dns_client::MockDnsPublisher;
    use ipam_core::{
        AllocationEngine, CommitPolicy, ManagedRanges, MemoryAllocationStore, MemoryAssociationCache,
        OrchestratorConfig, RouteDefaults, RouteInjector, RouteNaming,
    };
    use panos_client::{CommitOutcome, MockGateway};
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn pool(id: &str, cidr: &str, gateway: Option<&str>) -> PoolSpec {
        PoolSpec {
            id: id.to_string(),
            name: None,
            cidr: cidr.to_string(),
            gateway: gateway.map(str::to_string),
            zone: "range.local".to_string(),
            vlan_id: None,
            description: None,
            dns_servers: Vec::new(),
        }
    }

    fn create_test_state() -> (AppState, MockGateway, MockDnsPublisher) {
        let engine = AllocationEngine::new(Arc::new(MemoryAllocationStore::new()));
        engine.register_pool(pool("gateway-1", "10.100.1.0/24", Some("10.100.1.1"))).unwrap();
        engine.register_pool(pool("tiny", "10.200.0.0/30", None)).unwrap();

        let gateway = MockGateway::new("fw-test");
        let dns = MockDnsPublisher::new();
        let routes = RouteInjector::new(
            Arc::new(gateway.clone()),
            "default",
            CommitPolicy {
                poll_interval: Duration::from_millis(1),
                timeout: Duration::from_millis(50),
            },
        );
        let config = OrchestratorConfig {
            managed: ManagedRanges::parse(["10.0.0.0/8"]).unwrap(),
            naming: RouteNaming::default(),
            route: RouteDefaults {
                virtual_router: "default".to_string(),
                next_hop: "172.21.55.20".to_string(),
                interface: None,
                metric: 10,
            },
            dns_ttl: 300,
            association_ttl: None,
        };
        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(engine),
            Arc::new(dns.clone()),
            Arc::new(routes),
            Arc::new(MemoryAssociationCache::new()),
            config,
        );
        (Arc::new(orchestrator), gateway, dns)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _, _) = create_test_state();
        let app = router(state);
        let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["pools"], 2);
    }

    #[tokio::test]
    async fn test_provision_and_release() {
        let (state, _, dns) = create_test_state();
        let app = router(state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/allocations",
            Some(json!({"pool_id": "gateway-1", "hostname": "web01"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["allocation"]["address"], "10.100.1.2");
        assert_eq!(body["fqdn"], "web01.range.local");
        assert_eq!(body["association"]["state"], "recorded");
        assert_eq!(dns.len(), 1);

        let (status, body) = send(&app, "GET", "/api/v1/associations", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/allocations/release",
            Some(json!({"address": "10.100.1.2", "hostname": "web01"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["association_removed"], true);
        assert_eq!(body["address_released"], true);
        assert!(dns.is_empty());

        let (status, body) = send(&app, "GET", "/api/v1/allocations/10.100.1.2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let (state, _, _) = create_test_state();
        let app = router(state);
        let allocate = |body: Value| send(&app, "POST", "/api/v1/allocations", Some(body));

        let (status, _) = allocate(json!({"pool_id": "gateway-1", "preferred_address": "10.100.1.9"})).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = allocate(json!({"pool_id": "gateway-1", "preferred_address": "10.100.1.9"})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");

        let (status, body) = allocate(json!({"pool_id": "gateway-1", "preferred_address": "10.100.2.9"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "out_of_range");

        let (status, body) = allocate(json!({"pool_id": "gateway-1", "preferred_address": "bogus"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_address");

        let (status, body) = allocate(json!({"pool_id": "missing"})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "pool_not_found");

        for _ in 0..2 {
            let (status, _) = allocate(json!({"pool_id": "tiny"})).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = allocate(json!({"pool_id": "tiny"})).await;
        assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);
        assert_eq!(body["error"], "pool_exhausted");
    }

    #[tokio::test]
    async fn test_commit_errors_map_to_gateway_statuses() {
        let (state, gateway, dns) = create_test_state();
        let app = router(state);

        gateway.push_commit_outcome(CommitOutcome::Fail("invalid next hop".to_string()));
        let (status, body) = send(&app, "POST", "/api/v1/allocations", Some(json!({"pool_id": "gateway-1"}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "commit_failed");
        assert!(dns.is_empty());

        gateway.push_commit_outcome(CommitOutcome::NeverFinish);
        let (status, body) = send(&app, "POST", "/api/v1/allocations", Some(json!({"pool_id": "gateway-1"}))).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "commit_timeout");

        gateway.push_commit_outcome(CommitOutcome::NeverFinish);
        gateway.push_commit_outcome(CommitOutcome::Fail("commit lock held".to_string()));
        let (status, body) = send(&app, "POST", "/api/v1/allocations", Some(json!({"pool_id": "gateway-1"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "compensation_failed");
        assert_eq!(body["stage"], "committed");
        assert!(!body["details"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pools_and_availability() {
        let (state, _, _) = create_test_state();
        let app = router(state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/pools/gateway-1/reservations",
            Some(json!({"address": "10.100.1.2", "notes": "printer"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "reserved");

        let (status, body) = send(&app, "GET", "/api/v1/pools/gateway-1/available?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["addresses"], json!(["10.100.1.3", "10.100.1.4"]));
        assert_eq!(body["total_available"], 252);

        let (status, body) = send(&app, "GET", "/api/v1/pools", None).await;
        assert_eq!(status, StatusCode::OK);
        let gateway_pool = body
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["id"] == "gateway-1")
            .unwrap()
            .clone();
        assert_eq!(gateway_pool["cidr"], "10.100.1.0/24");
        assert_eq!(gateway_pool["usage"]["reserved"], 1);

        let (status, body) = send(&app, "DELETE", "/api/v1/reservations/10.100.1.2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
    }

    #[tokio::test]
    async fn test_unknown_resources_are_not_found() {
        let (state, _, _) = create_test_state();
        let app = router(state);

        let (status, body) = send(&app, "DELETE", "/api/v1/associations/dns_missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        let (status, _) = send(&app, "GET", "/api/v1/allocations/10.100.1.50", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "GET", "/api/v1/allocations/expired", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
