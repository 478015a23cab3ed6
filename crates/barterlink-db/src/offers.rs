//! Database operations for `offers`.

use barterlink_core::{OfferDraft, OfferPatch, OfferStatus, RuleError, UserType};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::profiles::require_user_type;
use crate::DbError;

pub(crate) const OFFER_COLUMNS: &str = "id, business_id, title, description, category, location, \
     requirements, image_urls, main_image_url, status, created_at, updated_at";

/// A row from the `offers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfferRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub requirements: Vec<String>,
    pub image_urls: Vec<String>,
    pub main_image_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OfferRow {
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownValue`] for an unknown stored status.
    pub fn status(&self) -> Result<OfferStatus, RuleError> {
        self.status.parse()
    }

    /// # Errors
    ///
    /// Returns [`RuleError::UnknownValue`] for an unknown stored status.
    pub fn to_draft(&self) -> Result<OfferDraft, RuleError> {
        Ok(OfferDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            location: self.location.clone(),
            requirements: self.requirements.clone(),
            image_urls: self.image_urls.clone(),
            main_image_url: self.main_image_url.clone(),
            status: self.status()?,
        })
    }
}

/// Optional filters for the public offer listing. Matching is exact and
/// case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct OfferFilter {
    pub category: Option<String>,
    pub location: Option<String>,
}

/// Validate and insert an offer owned by `business_id`.
///
/// # Errors
///
/// Returns [`DbError::Forbidden`] when the owner is not a business profile,
/// [`DbError::Rule`] when the draft fails validation, or [`DbError::Sqlx`] on
/// database failures.
pub async fn create_offer(
    pool: &PgPool,
    business_id: Uuid,
    draft: OfferDraft,
) -> Result<OfferRow, DbError> {
    require_user_type(pool, business_id, UserType::Business).await?;
    let draft = draft.validate()?;

    let sql = format!(
        "INSERT INTO offers (id, business_id, title, description, category, location, \
             requirements, image_urls, main_image_url, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {OFFER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(&draft.location)
        .bind(&draft.requirements)
        .bind(&draft.image_urls)
        .bind(&draft.main_image_url)
        .bind(draft.status.as_str())
        .fetch_one(pool)
        .await?;

    tracing::info!(offer_id = %row.id, business_id = %business_id, "offer created");
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_offer(pool: &PgPool, id: Uuid) -> Result<Option<OfferRow>, DbError> {
    let sql = format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1");
    let row = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// List `active` offers, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_offers(
    pool: &PgPool,
    filter: &OfferFilter,
    limit: i64,
) -> Result<Vec<OfferRow>, DbError> {
    let sql = format!(
        "SELECT {OFFER_COLUMNS} FROM offers \
         WHERE status = 'active' \
           AND ($1::TEXT IS NULL OR LOWER(category) = LOWER($1)) \
           AND ($2::TEXT IS NULL OR LOWER(location) = LOWER($2)) \
         ORDER BY created_at DESC, id \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(filter.category.as_deref())
        .bind(filter.location.as_deref())
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Every offer owned by `business_id`, drafts included.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_offers_for_business(
    pool: &PgPool,
    business_id: Uuid,
    limit: i64,
) -> Result<Vec<OfferRow>, DbError> {
    let sql = format!(
        "SELECT {OFFER_COLUMNS} FROM offers \
         WHERE business_id = $1 \
         ORDER BY created_at DESC, id \
         LIMIT $2"
    );
    let rows = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(business_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Apply a sparse patch to an offer owned by `business_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the offer does not exist,
/// [`DbError::Forbidden`] if another business owns it, [`DbError::Rule`] if
/// the patched offer fails validation, or [`DbError::Sqlx`] on database
/// failures.
pub async fn update_offer(
    pool: &PgPool,
    id: Uuid,
    business_id: Uuid,
    patch: OfferPatch,
) -> Result<OfferRow, DbError> {
    let mut tx = pool.begin().await?;

    let select = format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1 FOR UPDATE");
    let current = sqlx::query_as::<_, OfferRow>(&select)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
    if current.business_id != business_id {
        return Err(DbError::Forbidden);
    }

    let draft = current.to_draft()?.apply(patch).validate()?;

    let update = format!(
        "UPDATE offers SET \
             title = $2, description = $3, category = $4, location = $5, requirements = $6, \
             image_urls = $7, main_image_url = $8, status = $9, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {OFFER_COLUMNS}"
    );
    let row = sqlx::query_as::<_, OfferRow>(&update)
        .bind(id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(&draft.location)
        .bind(&draft.requirements)
        .bind(&draft.image_urls)
        .bind(&draft.main_image_url)
        .bind(draft.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::debug!(offer_id = %id, status = %row.status, "offer updated");
    Ok(row)
}
