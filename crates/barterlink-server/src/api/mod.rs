mod applications;
mod collaborations;
mod me;
mod offers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use barterlink_core::{AppConfig, CheckinSigner, RuleError, UserType};
use barterlink_db::DbError;
use barterlink_storage::{StorageClient, StorageError};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_session, AuthState, CurrentUser, RateLimitState,
    RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub signer: CheckinSigner,
    /// `None` when no storage bucket is configured; video uploads then fail
    /// with `storage_unavailable`.
    pub storage: Option<StorageClient>,
}

impl AppState {
    /// # Errors
    ///
    /// Returns [`StorageError`] when the configured storage base URL is
    /// invalid or the HTTP client cannot be built.
    pub fn from_config(pool: PgPool, config: Arc<AppConfig>) -> Result<Self, StorageError> {
        let storage = config
            .storage
            .as_ref()
            .map(StorageClient::from_config)
            .transpose()?;
        let signer = CheckinSigner::new(
            config.checkin_signing_key.as_bytes(),
            config.checkin_token_ttl_secs,
        );
        Ok(Self {
            pool,
            config,
            signer,
            storage,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(crate) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn new(request_id: &RequestId, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id.0.clone()),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                field: None,
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    pub fn validation(
        request_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut err = Self::new(request_id, "validation_error", message);
        err.error.field = Some(field.into());
        err
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" | "business_mismatch" => StatusCode::FORBIDDEN,
            "validation_error" | "invalid_payload" | "bad_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" | "slot_taken" | "already_checked_in" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "storage_unavailable" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

/// `Json<T>` whose rejections come back in the error envelope instead of
/// axum's plain-text 4xx. Undecodable bodies are `validation_error`, naming
/// the offending field when the decoder reports one and `body` otherwise.
pub(crate) struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(map_json_rejection(request_id, &rejection)),
        }
    }
}

const JSON_DATA_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

fn map_json_rejection(request_id: String, rejection: &JsonRejection) -> ApiError {
    let detail = rejection.body_text();
    match rejection {
        JsonRejection::JsonDataError(_) => {
            let detail = detail.strip_prefix(JSON_DATA_PREFIX).unwrap_or(&detail);
            let field = rejected_field(detail).unwrap_or_else(|| "body".to_string());
            ApiError::validation(request_id, field, detail)
        }
        JsonRejection::JsonSyntaxError(_) | JsonRejection::MissingJsonContentType(_) => {
            ApiError::validation(request_id, "body", detail)
        }
        _ => ApiError::new(request_id, "bad_request", detail),
    }
}

/// Top-level field named by a serde error: `missing field `x``,
/// `unknown field `x``, or a `x.y[0]: ...` path prefix.
fn rejected_field(detail: &str) -> Option<String> {
    for marker in ["missing field `", "unknown field `"] {
        if let Some(rest) = detail.strip_prefix(marker) {
            return rest.split('`').next().map(ToOwned::to_owned);
        }
    }
    let (path, _) = detail.split_once(": ")?;
    let top = path.split(['.', '[']).next()?;
    let is_ident = !top.is_empty() && top.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_ident.then(|| top.to_owned())
}

pub(crate) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(crate) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        DbError::Forbidden => ApiError::new(request_id, "forbidden", error.to_string()),
        DbError::SlotTaken => ApiError::new(request_id, "slot_taken", error.to_string()),
        DbError::Conflict(message) => ApiError::new(request_id, "conflict", message.clone()),
        DbError::Rule(rule) => map_rule_error(request_id, rule),
        DbError::Sqlx(_) | DbError::Migration(_) => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(crate) fn map_rule_error(request_id: String, error: &RuleError) -> ApiError {
    let message = error.to_string();
    match error {
        RuleError::Validation { field, message } => {
            ApiError::validation(request_id, *field, message.clone())
        }
        RuleError::InvalidPayload(_) => ApiError::new(request_id, "invalid_payload", message),
        RuleError::BusinessMismatch => ApiError::new(request_id, "business_mismatch", message),
        RuleError::AlreadyCheckedIn => ApiError::new(request_id, "already_checked_in", message),
        RuleError::InvalidTransition { .. }
        | RuleError::CollaborationNotActive(_)
        | RuleError::ProofMissing => ApiError::new(request_id, "conflict", message),
        RuleError::UnknownValue { .. } => {
            tracing::error!(error = %error, "stored value failed to parse");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(crate) fn map_storage_error(request_id: String, error: &StorageError) -> ApiError {
    tracing::error!(error = %error, transient = error.is_transient(), "storage upload failed");
    ApiError::new(
        request_id,
        "storage_unavailable",
        "video storage is unavailable, try again",
    )
}

/// Fails with `forbidden` unless the signed-in profile has `expected` type.
pub(crate) fn require_user_type(
    request_id: &RequestId,
    user: &CurrentUser,
    expected: UserType,
) -> Result<(), ApiError> {
    if user.user_type == expected {
        Ok(())
    } else {
        Err(ApiError::new(
            request_id.0.clone(),
            "forbidden",
            format!("only {expected} profiles may do this"),
        ))
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-filename"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/me", get(me::get_me).patch(me::update_me))
        .route("/api/v1/session/refresh", post(me::refresh_session))
        .route("/api/v1/session", axum::routing::delete(me::revoke_session))
        .route(
            "/api/v1/offers",
            get(offers::list_offers).post(offers::create_offer),
        )
        .route(
            "/api/v1/offers/{id}",
            get(offers::get_offer).patch(offers::update_offer),
        )
        .route(
            "/api/v1/offers/{id}/applications",
            get(applications::list_offer_applications).post(applications::submit_application),
        )
        .route(
            "/api/v1/applications",
            get(applications::list_my_applications),
        )
        .route(
            "/api/v1/applications/{id}",
            get(applications::get_application),
        )
        .route(
            "/api/v1/applications/{id}/accept",
            post(applications::accept_application),
        )
        .route(
            "/api/v1/applications/{id}/decline",
            post(applications::decline_application),
        )
        .route(
            "/api/v1/applications/{id}/withdraw",
            post(applications::withdraw_application),
        )
        .route(
            "/api/v1/collaborations",
            get(collaborations::list_collaborations),
        )
        .route(
            "/api/v1/collaborations/{id}",
            get(collaborations::get_collaboration),
        )
        .route(
            "/api/v1/collaborations/{id}/checkin-token",
            post(collaborations::issue_checkin_token),
        )
        .route("/api/v1/checkins", post(collaborations::check_in))
        .route(
            "/api/v1/collaborations/{id}/proof",
            put(collaborations::submit_proof),
        )
        .route(
            "/api/v1/collaborations/{id}/proof/video",
            post(collaborations::upload_proof_video),
        )
        .route(
            "/api/v1/collaborations/{id}/complete",
            post(collaborations::complete_collaboration),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(auth, require_session))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match barterlink_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[must_use]
pub fn rate_limit_state(config: &AppConfig) -> RateLimitState {
    RateLimitState::new(config.rate_limit_per_minute, Duration::from_secs(60))
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
