use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use barterlink_core::{OfferDraft, OfferPatch, UserType};
use barterlink_db::{OfferFilter, OfferRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{CurrentUser, RequestId};

use super::{
    map_db_error, normalize_limit, require_user_type, ApiError, ApiJson, ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct OffersQuery {
    pub category: Option<String>,
    pub location: Option<String>,
    /// `true` lists the signed-in business's own offers, drafts included.
    #[serde(default)]
    pub mine: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct OfferItem {
    id: Uuid,
    business_id: Uuid,
    title: String,
    description: String,
    category: String,
    location: String,
    requirements: Vec<String>,
    image_urls: Vec<String>,
    main_image_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OfferRow> for OfferItem {
    fn from(row: OfferRow) -> Self {
        Self {
            id: row.id,
            business_id: row.business_id,
            title: row.title,
            description: row.description,
            category: row.category,
            location: row.location,
            requirements: row.requirements,
            image_urls: row.image_urls,
            main_image_url: row.main_image_url,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// GET /api/v1/offers
pub(super) async fn list_offers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<OffersQuery>,
) -> Result<Json<ApiResponse<Vec<OfferItem>>>, ApiError> {
    let limit = normalize_limit(query.limit);
    let rows = if query.mine {
        require_user_type(&req_id, &user, UserType::Business)?;
        barterlink_db::list_offers_for_business(&state.pool, user.profile_id, limit).await
    } else {
        let filter = OfferFilter {
            category: blank_to_none(query.category),
            location: blank_to_none(query.location),
        };
        barterlink_db::list_active_offers(&state.pool, &filter, limit).await
    }
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(OfferItem::from).collect();
    Ok(ApiResponse::new(&req_id, data))
}

/// POST /api/v1/offers: business profiles only.
pub(super) async fn create_offer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(draft): ApiJson<OfferDraft>,
) -> Result<(StatusCode, Json<ApiResponse<OfferItem>>), ApiError> {
    require_user_type(&req_id, &user, UserType::Business)?;

    let row = barterlink_db::create_offer(&state.pool, user.profile_id, draft)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(offer_id = %row.id, business_id = %user.profile_id, "offer created");
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(&req_id, OfferItem::from(row)),
    ))
}

/// GET /api/v1/offers/{id}: drafts are visible to their owner only.
pub(super) async fn get_offer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OfferItem>>, ApiError> {
    let row = barterlink_db::get_offer(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .filter(|row| row.status == "active" || row.business_id == user.profile_id)
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "offer not found"))?;

    Ok(ApiResponse::new(&req_id, OfferItem::from(row)))
}

/// PATCH /api/v1/offers/{id}: owner only.
pub(super) async fn update_offer(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(patch): ApiJson<OfferPatch>,
) -> Result<Json<ApiResponse<OfferItem>>, ApiError> {
    let row = barterlink_db::update_offer(&state.pool, id, user.profile_id, patch)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(&req_id, OfferItem::from(row)))
}
