use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use barterlink_core::UserType;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The signed-in profile behind the request's session token, stored as a
/// request extension by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile_id: Uuid,
    pub session_id: Uuid,
    pub user_type: UserType,
    pub email: String,
}

/// Session-token auth settings used by middleware.
#[derive(Clone)]
pub struct AuthState {
    pool: sqlx::PgPool,
    hash_salt: Arc<str>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("hash_salt", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl AuthState {
    #[must_use]
    pub fn new(pool: sqlx::PgPool, hash_salt: &str) -> Self {
        Self {
            pool,
            hash_salt: Arc::from(hash_salt),
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Expired windows are swept once this many profiles are tracked.
const RATE_LIMIT_SWEEP_AT: usize = 10_000;

/// Fixed-window limiter keyed by the signed-in profile.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<Uuid, RateLimitWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request for `profile_id`; `false` once its window is full.
    async fn try_acquire(&self, profile_id: Uuid, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;
        if windows.len() >= RATE_LIMIT_SWEEP_AT {
            windows.retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let entry = windows.entry(profile_id).or_insert(RateLimitWindow {
            started_at: now,
            count: 0,
        });
        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware resolving the bearer session token to a [`CurrentUser`].
///
/// Missing, unknown, expired and revoked tokens all answer 401 with the same
/// message.
pub async fn require_session(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let rid = request_id_of(&req);
    let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) else {
        return unauthorized(rid);
    };

    let principal = match barterlink_db::resolve_session(
        &auth.pool,
        &auth.hash_salt,
        token,
        chrono::Utc::now(),
    )
    .await
    {
        Ok(Some(principal)) => principal,
        Ok(None) => return unauthorized(rid),
        Err(e) => {
            tracing::error!(error = %e, "session lookup failed");
            return ApiError::new(rid, "internal_error", "database query failed").into_response();
        }
    };

    let user_type = match principal.user_type.parse::<UserType>() {
        Ok(user_type) => user_type,
        Err(e) => {
            tracing::error!(error = %e, profile_id = %principal.profile_id, "corrupt profile row");
            return ApiError::new(rid, "internal_error", "database query failed").into_response();
        }
    };

    req.extensions_mut().insert(CurrentUser {
        profile_id: principal.profile_id,
        session_id: principal.session_id,
        user_type,
        email: principal.email,
    });
    next.run(req).await
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    // Runs inside `require_session`, so the user is always present.
    let Some(profile_id) = req.extensions().get::<CurrentUser>().map(|u| u.profile_id) else {
        return unauthorized(request_id_of(&req));
    };

    if !rate_limit.try_acquire(profile_id, Instant::now()).await {
        tracing::warn!(profile_id = %profile_id, "rate limit exceeded");
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    next.run(req).await
}

fn unauthorized(request_id: String) -> Response {
    ApiError::new(
        request_id,
        "unauthorized",
        "missing or invalid session token",
    )
    .into_response()
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer test-token");
        assert_eq!(extract_bearer_token(Some(&header)), Some("test-token"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn extract_bearer_token_rejects_blank_token() {
        let header = HeaderValue::from_static("Bearer   ");
        assert_eq!(extract_bearer_token(Some(&header)), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[tokio::test]
    async fn rate_limit_windows_are_per_profile() {
        let limiter = RateLimitState::new(2, Duration::from_secs(60));
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let start = Instant::now();

        assert!(limiter.try_acquire(alice, start).await);
        assert!(limiter.try_acquire(alice, start).await);
        assert!(!limiter.try_acquire(alice, start).await);
        assert!(limiter.try_acquire(bob, start).await);

        let later = start + Duration::from_secs(60);
        assert!(limiter.try_acquire(alice, later).await);
    }
}
