//! Collaboration handlers: reads, QR check-in, content proof and completion.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header::CONTENT_LENGTH, header::CONTENT_TYPE, HeaderMap, StatusCode},
    Extension, Json,
};
use barterlink_core::{
    sanitize_filename, video_object_path, CheckinPayload, CollaborationStatus, ContentProof,
    UserType,
};
use barterlink_db::CollaborationRow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId};

use super::{
    map_db_error, map_rule_error, map_storage_error, normalize_limit, require_user_type, ApiError,
    ApiJson, ApiResponse, AppState,
};

const FILENAME_HEADER: &str = "x-filename";

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct CollaborationsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CheckInRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CollaborationItem {
    id: Uuid,
    application_id: Uuid,
    offer_id: Uuid,
    business_id: Uuid,
    influencer_id: Uuid,
    scheduled_date: NaiveDate,
    scheduled_time: String,
    party_size: i32,
    status: String,
    checked_in_at: Option<DateTime<Utc>>,
    is_on_time: Option<bool>,
    content_video_url: Option<String>,
    content_video_filename: Option<String>,
    social_media_post_url: Option<String>,
    proof_image_url: Option<String>,
    has_tagged_business: bool,
    has_sent_collab_request: bool,
    content_submitted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CollaborationRow> for CollaborationItem {
    fn from(row: CollaborationRow) -> Self {
        Self {
            id: row.id,
            application_id: row.application_id,
            offer_id: row.offer_id,
            business_id: row.business_id,
            influencer_id: row.influencer_id,
            scheduled_date: row.scheduled_date,
            scheduled_time: row.scheduled_time.format("%H:%M").to_string(),
            party_size: row.party_size,
            status: row.status,
            checked_in_at: row.checked_in_at,
            is_on_time: row.is_on_time,
            content_video_url: row.content_video_url,
            content_video_filename: row.content_video_filename,
            social_media_post_url: row.social_media_post_url,
            proof_image_url: row.proof_image_url,
            has_tagged_business: row.has_tagged_business,
            has_sent_collab_request: row.has_sent_collab_request,
            content_submitted_at: row.content_submitted_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CheckinTokenItem {
    /// The text to render into the QR symbol.
    token: String,
    payload: CheckinPayload,
}

#[derive(Debug, Serialize)]
pub(super) struct CheckInItem {
    checked_in_at: DateTime<Utc>,
    is_on_time: bool,
    collaboration: CollaborationItem,
}

#[derive(Debug, Serialize)]
pub(super) struct VideoUploadItem {
    video_url: String,
    video_filename: String,
    path: String,
    size_bytes: usize,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// GET /api/v1/collaborations: as influencer or business.
pub(super) async fn list_collaborations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<CollaborationsQuery>,
) -> Result<Json<ApiResponse<Vec<CollaborationItem>>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<CollaborationStatus>().map_err(|_| {
                ApiError::validation(
                    req_id.0.clone(),
                    "status",
                    format!("unknown collaboration status '{s}'"),
                )
            })
        })
        .transpose()?;

    let rows = barterlink_db::list_collaborations_for_profile(
        &state.pool,
        user.profile_id,
        status,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(CollaborationItem::from).collect();
    Ok(ApiResponse::new(&req_id, data))
}

/// GET /api/v1/collaborations/{id}: either party.
pub(super) async fn get_collaboration(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollaborationItem>>, ApiError> {
    let row = barterlink_db::get_collaboration(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "collaboration not found"))?;
    if !row.is_party(user.profile_id) {
        return Err(ApiError::new(
            req_id.0.clone(),
            "forbidden",
            "not a party to this collaboration",
        ));
    }

    Ok(ApiResponse::new(&req_id, CollaborationItem::from(row)))
}

// ---------------------------------------------------------------------------
// Check-in
// ---------------------------------------------------------------------------

/// POST /api/v1/collaborations/{id}/checkin-token: the influencer's QR code.
pub(super) async fn issue_checkin_token(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CheckinTokenItem>>, ApiError> {
    let row = barterlink_db::get_collaboration_for_checkin(&state.pool, id, user.profile_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let payload = CheckinPayload::new(row.business_id, row.id, Utc::now());
    let token = state
        .signer
        .issue(&payload)
        .map_err(|e| map_rule_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, CheckinTokenItem { token, payload }))
}

/// POST /api/v1/checkins: the business scans an influencer's QR code. Any
/// body that does not carry a string `token` is an `invalid_payload`.
pub(super) async fn check_in(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    body: Result<ApiJson<CheckInRequest>, ApiError>,
) -> Result<Json<ApiResponse<CheckInItem>>, ApiError> {
    require_user_type(&req_id, &user, UserType::Business)?;
    let ApiJson(body) = body.map_err(|rejected| {
        ApiError::new(
            req_id.0.clone(),
            "invalid_payload",
            format!("unreadable check-in payload: {}", rejected.error.message),
        )
    })?;

    let now = Utc::now();
    let payload = state
        .signer
        .verify_scan(&body.token, user.profile_id, now)
        .map_err(|e| {
            tracing::warn!(error = %e, business_id = %user.profile_id, "check-in scan rejected");
            map_rule_error(req_id.0.clone(), &e)
        })?;

    let record =
        barterlink_db::record_check_in(&state.pool, payload.collaboration_id, user.profile_id, now)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        &req_id,
        CheckInItem {
            checked_in_at: record.outcome.checked_in_at,
            is_on_time: record.outcome.is_on_time,
            collaboration: record.collaboration.into(),
        },
    ))
}

// ---------------------------------------------------------------------------
// Content proof and completion
// ---------------------------------------------------------------------------

/// PUT /api/v1/collaborations/{id}/proof: resubmission overwrites.
pub(super) async fn submit_proof(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(proof): ApiJson<ContentProof>,
) -> Result<Json<ApiResponse<CollaborationItem>>, ApiError> {
    let validated = proof
        .validate()
        .map_err(|e| map_rule_error(req_id.0.clone(), &e))?;

    let row =
        barterlink_db::submit_content_proof(&state.pool, id, user.profile_id, &validated, Utc::now())
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, CollaborationItem::from(row)))
}

/// POST /api/v1/collaborations/{id}/proof/video: raw video body, filename
/// in the `x-filename` header.
pub(super) async fn upload_proof_video(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<ApiResponse<VideoUploadItem>>), ApiError> {
    let rid = &req_id.0;
    let max_bytes = state.config.max_video_bytes;

    let row = barterlink_db::get_collaboration(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid.as_str(), "not_found", "collaboration not found"))?;
    if row.influencer_id != user.profile_id {
        return Err(ApiError::new(
            rid.as_str(),
            "forbidden",
            "only the collaboration's influencer may upload proof",
        ));
    }
    row.status()
        .and_then(CollaborationStatus::ensure_active)
        .map_err(|e| map_rule_error(rid.clone(), &e))?;

    let Some(storage) = state.storage.as_ref() else {
        tracing::warn!("video upload requested but no storage bucket is configured");
        return Err(ApiError::new(
            rid.as_str(),
            "storage_unavailable",
            "video storage is not configured",
        ));
    };

    let filename = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::validation(rid.as_str(), "video_filename", "x-filename header is required")
        })?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();
    if !content_type.starts_with("video/") {
        return Err(ApiError::validation(
            rid.as_str(),
            "video",
            format!("content type must be video/*, got '{content_type}'"),
        ));
    }

    let too_large = || {
        ApiError::validation(
            rid.as_str(),
            "video",
            format!("video exceeds the maximum size of {max_bytes} bytes"),
        )
    };
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max_bytes) {
        return Err(too_large());
    }
    let bytes = axum::body::to_bytes(body, max_bytes)
        .await
        .map_err(|_| too_large())?;
    if bytes.is_empty() {
        return Err(ApiError::validation(rid.as_str(), "video", "video is empty"));
    }

    let path = video_object_path(id, Uuid::new_v4(), filename);
    let stored = storage
        .upload(&path, &content_type, bytes)
        .await
        .map_err(|e| map_storage_error(rid.clone(), &e))?;

    tracing::info!(
        collaboration_id = %id,
        influencer_id = %user.profile_id,
        size_bytes = stored.size_bytes,
        "proof video uploaded"
    );
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(
            &req_id,
            VideoUploadItem {
                video_url: stored.public_url,
                video_filename: sanitize_filename(filename),
                path: stored.path,
                size_bytes: stored.size_bytes,
            },
        ),
    ))
}

/// POST /api/v1/collaborations/{id}/complete: the owning business, after
/// proof has been submitted.
pub(super) async fn complete_collaboration(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollaborationItem>>, ApiError> {
    let row = barterlink_db::complete_collaboration(&state.pool, id, user.profile_id, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, CollaborationItem::from(row)))
}
