//! Application handlers: submit, read, and the accept / decline / withdraw
//! transitions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use barterlink_core::{ApplicationStatus, Schedule, UserType};
use barterlink_db::{AcceptOutcome, ApplicationRow};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId};

use super::collaborations::CollaborationItem;
use super::{
    map_db_error, normalize_limit, require_user_type, ApiError, ApiJson, ApiResponse, AppState,
};

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

// Fields spelled out rather than a flattened `Schedule` so decode errors keep
// the field path.
#[derive(Debug, Deserialize)]
pub(super) struct SubmitApplicationRequest {
    pub date: NaiveDate,
    #[serde(with = "barterlink_core::lifecycle::hhmm")]
    pub time: NaiveTime,
    pub party_size: i32,
    pub message: Option<String>,
}

impl SubmitApplicationRequest {
    fn schedule(&self) -> Schedule {
        Schedule {
            date: self.date,
            time: self.time,
            party_size: self.party_size,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ApplicationsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ApplicationItem {
    id: Uuid,
    offer_id: Uuid,
    influencer_id: Uuid,
    status: String,
    requested_date: NaiveDate,
    requested_time: String,
    party_size: i32,
    message: Option<String>,
    applied_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl From<ApplicationRow> for ApplicationItem {
    fn from(row: ApplicationRow) -> Self {
        Self {
            id: row.id,
            offer_id: row.offer_id,
            influencer_id: row.influencer_id,
            status: row.status,
            requested_date: row.requested_date,
            requested_time: row.requested_time.format("%H:%M").to_string(),
            party_size: row.party_size,
            message: row.message,
            applied_at: row.applied_at,
            decided_at: row.decided_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AcceptItem {
    application: ApplicationItem,
    collaboration: CollaborationItem,
    cancelled_application_ids: Vec<Uuid>,
}

impl From<AcceptOutcome> for AcceptItem {
    fn from(outcome: AcceptOutcome) -> Self {
        Self {
            application: outcome.application.into(),
            collaboration: outcome.collaboration.into(),
            cancelled_application_ids: outcome.cancelled_ids,
        }
    }
}

fn parse_status_filter(
    req_id: &RequestId,
    raw: Option<&str>,
) -> Result<Option<ApplicationStatus>, ApiError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ApplicationStatus>().map_err(|_| {
                ApiError::validation(
                    req_id.0.clone(),
                    "status",
                    format!("unknown application status '{s}'"),
                )
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/offers/{id}/applications: influencer applies for a slot.
pub(super) async fn submit_application(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(offer_id): Path<Uuid>,
    ApiJson(body): ApiJson<SubmitApplicationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ApplicationItem>>), ApiError> {
    require_user_type(&req_id, &user, UserType::Influencer)?;

    let row = barterlink_db::submit_application(
        &state.pool,
        offer_id,
        user.profile_id,
        &body.schedule(),
        body.message.as_deref(),
        Utc::now(),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(&req_id, ApplicationItem::from(row)),
    ))
}

/// GET /api/v1/offers/{id}/applications: the offer's owner only.
pub(super) async fn list_offer_applications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(offer_id): Path<Uuid>,
    Query(query): Query<ApplicationsQuery>,
) -> Result<Json<ApiResponse<Vec<ApplicationItem>>>, ApiError> {
    let status = parse_status_filter(&req_id, query.status.as_deref())?;
    let rows = barterlink_db::list_applications_for_offer(
        &state.pool,
        offer_id,
        user.profile_id,
        status,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(ApplicationItem::from).collect();
    Ok(ApiResponse::new(&req_id, data))
}

/// GET /api/v1/applications: the signed-in influencer's applications.
pub(super) async fn list_my_applications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ApplicationsQuery>,
) -> Result<Json<ApiResponse<Vec<ApplicationItem>>>, ApiError> {
    require_user_type(&req_id, &user, UserType::Influencer)?;
    let status = parse_status_filter(&req_id, query.status.as_deref())?;

    let rows = barterlink_db::list_applications_for_influencer(
        &state.pool,
        user.profile_id,
        status,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(ApplicationItem::from).collect();
    Ok(ApiResponse::new(&req_id, data))
}

/// GET /api/v1/applications/{id}: applicant or offer owner.
pub(super) async fn get_application(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApplicationItem>>, ApiError> {
    let row = barterlink_db::get_application(&state.pool, id, user.profile_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, ApplicationItem::from(row)))
}

/// POST /api/v1/applications/{id}/accept: creates the collaboration and
/// cancels pending siblings in the same slot.
pub(super) async fn accept_application(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AcceptItem>>, ApiError> {
    let outcome = barterlink_db::accept_application(&state.pool, id, user.profile_id, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, AcceptItem::from(outcome)))
}

/// POST /api/v1/applications/{id}/decline
pub(super) async fn decline_application(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApplicationItem>>, ApiError> {
    let row = barterlink_db::decline_application(&state.pool, id, user.profile_id, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, ApplicationItem::from(row)))
}

/// POST /api/v1/applications/{id}/withdraw
pub(super) async fn withdraw_application(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApplicationItem>>, ApiError> {
    let row = barterlink_db::withdraw_application(&state.pool, id, user.profile_id, Utc::now())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, ApplicationItem::from(row)))
}
