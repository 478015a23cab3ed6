//! The signed-in profile and its session.

use axum::{extract::State, Extension, Json};
use barterlink_core::ProfilePatch;
use barterlink_db::{IssuedSession, ProfileRow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId};

use super::{map_db_error, ApiError, ApiJson, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct ProfileItem {
    id: Uuid,
    user_type: String,
    email: String,
    display_name: String,
    avatar_url: Option<String>,
    instagram_handle: Option<String>,
    tiktok_handle: Option<String>,
    follower_count: Option<i32>,
    engagement_rate: Option<Decimal>,
    niche: Option<String>,
    business_name: Option<String>,
    business_category: Option<String>,
    address: Option<String>,
    website_url: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for ProfileItem {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            user_type: row.user_type,
            email: row.email,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            instagram_handle: row.instagram_handle,
            tiktok_handle: row.tiktok_handle,
            follower_count: row.follower_count,
            engagement_rate: row.engagement_rate,
            niche: row.niche,
            business_name: row.business_name,
            business_category: row.business_category,
            address: row.address,
            website_url: row.website_url,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct SessionItem {
    session_id: Uuid,
    token: String,
    expires_at: DateTime<Utc>,
}

impl From<IssuedSession> for SessionItem {
    fn from(issued: IssuedSession) -> Self {
        Self {
            session_id: issued.session_id,
            token: issued.token,
            expires_at: issued.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct RevokedItem {
    revoked: bool,
}

/// GET /api/v1/me
pub(super) async fn get_me(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<ProfileItem>>, ApiError> {
    let row = barterlink_db::get_profile(&state.pool, user.profile_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "profile not found"))?;

    Ok(ApiResponse::new(&req_id, ProfileItem::from(row)))
}

/// PATCH /api/v1/me: sparse update; fields of the other user type are
/// rejected.
pub(super) async fn update_me(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(patch): ApiJson<ProfilePatch>,
) -> Result<Json<ApiResponse<ProfileItem>>, ApiError> {
    let row = barterlink_db::update_profile(&state.pool, user.profile_id, patch)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, ProfileItem::from(row)))
}

/// POST /api/v1/session/refresh: revoke the current token and issue a new
/// one.
pub(super) async fn refresh_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<SessionItem>>, ApiError> {
    let issued = barterlink_db::rotate_session(
        &state.pool,
        user.session_id,
        &state.config.session_hash_salt,
        state.config.session_ttl_hours,
        Utc::now(),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, SessionItem::from(issued)))
}

/// DELETE /api/v1/session: sign out.
pub(super) async fn revoke_session(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<RevokedItem>>, ApiError> {
    let revoked = barterlink_db::revoke_session(&state.pool, user.session_id, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(profile_id = %user.profile_id, email = %user.email, "signed out");
    Ok(ApiResponse::new(&req_id, RevokedItem { revoked }))
}
