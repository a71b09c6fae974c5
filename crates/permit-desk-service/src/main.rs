use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use permit_desk_api::{
    ApiError, CollectionQuery, DeskConfig, DeskSession, ErrorKind, OverallStats, PermitApiClient,
    API_CONTRACT_VERSION,
};
use permit_desk_core::audit_log::decode;
use permit_desk_core::{
    reduce, ApplicationDetail, ApplicationRecord, AttachmentResolver, AuditEntry, FilterSpec,
    PageSpec, PermitDomain, SortSpec, StatusCatalog, StatusDescriptor, TransitionPolicy,
    ValidationError, ViewAction, ViewResult, ViewState,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";

time::serde::format_description!(date_format, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone)]
struct ServiceState {
    client: PermitApiClient,
    catalog: StatusCatalog,
    default_actor: String,
    read_only: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    service_contract_version: &'static str,
    error: String,
    retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct StatusesResponse {
    domain: PermitDomain,
    policy: TransitionPolicy,
    statuses: Vec<StatusDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ViewRequest {
    filter: FilterSpec,
    sort: SortSpec,
    page: PageSpec,
    #[serde(with = "date_format::option")]
    as_of: Option<Date>,
}

#[derive(Debug, Clone, Serialize)]
struct ViewResponse {
    domain: PermitDomain,
    #[serde(flatten)]
    view: ViewResult,
    server_stats: Option<OverallStats>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReduceRequest {
    #[serde(default)]
    state: ViewState,
    action: ViewAction,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusChangeRequest {
    status: String,
    #[serde(default)]
    note: String,
    #[serde(default)]
    updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct StatusChangeResponse {
    application_id: String,
    status: String,
    history: Vec<AuditEntry>,
    record: ApplicationRecord,
}

#[derive(Debug, Parser)]
#[command(name = "permit-desk-service")]
#[command(about = "Local HTTP service for Permit Desk")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    #[arg(long, env = "PERMIT_DESK_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "PERMIT_DESK_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, env = "PERMIT_DESK_ACTOR")]
    actor: Option<String>,
    #[arg(long, default_value_t = false)]
    sequential: bool,
    /// Refuse every status change.
    #[arg(long, default_value_t = false)]
    read_only: bool,
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
            retryable: false,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Network | ErrorKind::Backend | ErrorKind::InvalidResponse => {
                StatusCode::BAD_GATEWAY
            }
        };
        tracing::warn!(error = %err, "request failed");
        ServiceError {
            status,
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: err.user_message(),
            retryable: err.is_retryable(),
        }
    }
}

impl ServiceState {
    fn session(&self, domain: PermitDomain, actor: Option<String>) -> DeskSession {
        let actor = actor.filter(|actor| !actor.trim().is_empty()).unwrap_or_else(|| self.default_actor.clone());
        DeskSession::new(self.client.clone(), domain, actor, !self.read_only).with_catalog(self.catalog)
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn parse_domain(value: &str) -> Result<PermitDomain, ServiceError> {
    PermitDomain::parse(value).ok_or_else(|| {
        ServiceError::new(StatusCode::BAD_REQUEST, format!("unknown permit domain: {value}"))
    })
}

fn domain_of(application_id: &str) -> Result<PermitDomain, ServiceError> {
    PermitDomain::from_application_id(application_id)
        .ok_or_else(|| ValidationError::UnknownDomain(application_id.to_string()).into())
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/domains/:domain/statuses", get(domain_statuses))
        .route("/v1/domains/:domain/view", post(domain_view))
        .route("/v1/view-state/reduce", post(view_state_reduce))
        .route("/v1/applications/:application_id", get(application_detail))
        .route("/v1/applications/:application_id/status", post(application_status))
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DeskConfig::load(path)?,
        None => DeskConfig::default(),
    };
    if let Some(base_url) = &args.base_url {
        config.base_url.clone_from(base_url);
    }
    if let Some(actor) = &args.actor {
        config.updated_by.clone_from(actor);
    }
    config.validate()?;

    let policy = if args.sequential { TransitionPolicy::Sequential } else { TransitionPolicy::Permissive };
    let state = ServiceState {
        client: PermitApiClient::from_config(&config)?,
        catalog: StatusCatalog::new(policy),
        default_actor: config.updated_by.clone(),
        read_only: args.read_only,
    };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, backend = %config.base_url, "permit desk service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn domain_statuses(
    State(state): State<ServiceState>,
    Path(domain): Path<String>,
) -> Result<Json<ServiceEnvelope<StatusesResponse>>, ServiceError> {
    let domain = parse_domain(&domain)?;
    Ok(Json(envelope(StatusesResponse {
        domain,
        policy: state.catalog.policy(),
        statuses: state.catalog.transitions(domain),
    })))
}

async fn domain_view(
    State(state): State<ServiceState>,
    Path(domain): Path<String>,
    Json(request): Json<ViewRequest>,
) -> Result<Json<ServiceEnvelope<ViewResponse>>, ServiceError> {
    let domain = parse_domain(&domain)?;
    let mut session = state.session(domain, None);
    session.refresh(&CollectionQuery::default()).await?;

    let as_of = request.as_of.unwrap_or_else(|| OffsetDateTime::now_utc().date());
    let view = session.view(&request.filter, &request.sort, &request.page, as_of);
    Ok(Json(envelope(ViewResponse { domain, view, server_stats: session.server_stats().cloned() })))
}

async fn view_state_reduce(Json(request): Json<ReduceRequest>) -> Json<ServiceEnvelope<ViewState>> {
    Json(envelope(reduce(&request.state, request.action)))
}

async fn application_detail(
    State(state): State<ServiceState>,
    Path(application_id): Path<String>,
) -> Result<Json<ServiceEnvelope<ApplicationDetail>>, ServiceError> {
    let record = state.client.fetch_single(&application_id).await?;
    let resolver = AttachmentResolver::new(state.client.base_url().clone());
    Ok(Json(envelope(ApplicationDetail::build(&record, &resolver))))
}

async fn application_status(
    State(state): State<ServiceState>,
    Path(application_id): Path<String>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<ServiceEnvelope<StatusChangeResponse>>, ServiceError> {
    if state.read_only {
        return Err(ApiError::Unauthorized.into());
    }
    let domain = domain_of(&application_id)?;
    state.catalog.validate(domain, &request.status, &request.note)?;

    let mut session = state.session(domain, request.updated_by);
    let updated = session.change_status(&application_id, &request.status, &request.note).await?;
    Ok(Json(envelope(StatusChangeResponse {
        application_id: updated.application_id.clone(),
        status: updated.status.clone(),
        history: decode(updated.remarks_blob()),
        record: updated,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UNREACHABLE_BASE_URL: &str = "http://127.0.0.1:9/api/";

    fn state_for(base_url: &str, read_only: bool) -> ServiceState {
        let config = DeskConfig { base_url: base_url.to_string(), ..DeskConfig::default() };
        let client = match PermitApiClient::from_config(&config) {
            Ok(client) => client,
            Err(err) => panic!("client should build: {err}"),
        };
        ServiceState {
            client,
            catalog: StatusCatalog::default(),
            default_actor: "Service Admin".to_string(),
            read_only,
        }
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    async fn send(router: Router, verb: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().uri(uri).method(verb);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string())),
            None => builder.body(axum::body::Body::empty()),
        }
        .unwrap_or_else(|err| panic!("failed to build request: {err}"));

        match router.oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let response = send(app(state_for(UNREACHABLE_BASE_URL, false)), "GET", "/v1/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(value.get("api_contract_version").and_then(Value::as_str), Some(API_CONTRACT_VERSION));
    }

    #[tokio::test]
    async fn statuses_endpoint_lists_domain_vocabulary() {
        let router = app(state_for(UNREACHABLE_BASE_URL, false));
        let response = send(router.clone(), "GET", "/v1/domains/business/statuses", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        let statuses = value
            .pointer("/data/statuses")
            .and_then(Value::as_array)
            .unwrap_or_else(|| panic!("missing data.statuses: {value}"));
        assert_eq!(statuses.len(), 4);

        let unknown = send(router, "GET", "/v1/domains/fishing/statuses", None).await;
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        let value = response_json(unknown).await;
        assert_eq!(value.get("error").and_then(Value::as_str), Some("unknown permit domain: fishing"));
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(value.get("retryable"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn reduce_endpoint_applies_actions() {
        let body = json!({
            "state": {
                "filter": { "search_term": "", "category_key": "all" },
                "sort": { "key": "created_at", "direction": "desc" },
                "page": 3,
                "page_size": 10
            },
            "action": { "action": "search", "term": "uno" }
        });
        let response =
            send(app(state_for(UNREACHABLE_BASE_URL, false)), "POST", "/v1/view-state/reduce", Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        assert_eq!(value.pointer("/data/page").and_then(Value::as_u64), Some(1));
        assert_eq!(value.pointer("/data/filter/search_term").and_then(Value::as_str), Some("uno"));
    }

    #[tokio::test]
    async fn rejection_without_note_is_a_bad_request() {
        let body = json!({ "status": "rejected", "note": "" });
        let response = send(
            app(state_for(UNREACHABLE_BASE_URL, false)),
            "POST",
            "/v1/applications/FR-0001/status",
            Some(body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = response_json(response).await;
        assert_eq!(value.get("retryable"), Some(&Value::Bool(false)));
    }

    #[tokio::test]
    async fn read_only_service_refuses_status_changes() {
        let body = json!({ "status": "approved" });
        let response = send(
            app(state_for(UNREACHABLE_BASE_URL, true)),
            "POST",
            "/v1/applications/BP-0001/status",
            Some(body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn view_endpoint_aggregates_backend_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/barangay.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    { "application_id": "BRGY-0001", "status": "approved", "barangay": "Uno",
                      "purpose": "Employment", "clearance_type": "Residency", "created_at": "2024-05-02" },
                    { "application_id": "BRGY-0002", "status": "pending", "barangay": "Dos",
                      "purpose": "Scholarship", "clearance_type": "Indigency", "created_at": "2024-05-20" },
                    { "application_id": "BRGY-0003", "status": "rejected", "barangay": "Uno",
                      "purpose": "Travel", "clearance_type": "Residency", "created_at": "2024-04-11" }
                ],
                "stats": { "overall": { "total": 3, "approved": 1, "pending": 1, "rejected": 1 } }
            })))
            .mount(&server)
            .await;

        let body = json!({
            "filter": { "category_key": "residency" },
            "sort": { "key": "created_at", "direction": "desc" },
            "page": { "page": 1, "page_size": 10 },
            "as_of": "2024-05-31"
        });
        let router = app(state_for(&format!("{}/api/", server.uri()), false));
        let response = send(router, "POST", "/v1/domains/barangay/view", Some(body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(value.pointer("/data/total_count").and_then(Value::as_u64), Some(2));
        assert_eq!(value.pointer("/data/items/0/application_id").and_then(Value::as_str), Some("BRGY-0001"));
        assert_eq!(value.pointer("/data/per_category_counts/all").and_then(Value::as_u64), Some(3));
        assert_eq!(value.pointer("/data/summary/approved").and_then(Value::as_u64), Some(1));
        assert_eq!(value.pointer("/data/server_stats/total").and_then(Value::as_u64), Some(3));
    }

    #[tokio::test]
    async fn backend_outage_maps_to_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/fetch_single.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let router = app(state_for(&format!("{}/api/", server.uri()), false));
        let response = send(router, "GET", "/v1/applications/BLD-0009", None).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let value = response_json(response).await;
        assert_eq!(value.get("retryable"), Some(&Value::Bool(true)));
    }
}
