//! Database operations for `collaborations`: check-in, content proof and
//! completion.

use barterlink_core::{
    evaluate_arrival, CheckinOutcome, CollaborationStatus, RuleError, ValidatedProof,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

pub(crate) const COLLABORATION_COLUMNS: &str = "id, application_id, offer_id, business_id, \
     influencer_id, scheduled_date, scheduled_time, party_size, status, checked_in_at, \
     is_on_time, content_video_url, content_video_filename, social_media_post_url, \
     proof_image_url, has_tagged_business, has_sent_collab_request, content_submitted_at, \
     completed_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `collaborations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollaborationRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub offer_id: Uuid,
    pub business_id: Uuid,
    pub influencer_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub party_size: i32,
    pub status: String,
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Set together with `checked_in_at`.
    pub is_on_time: Option<bool>,
    pub content_video_url: Option<String>,
    pub content_video_filename: Option<String>,
    pub social_media_post_url: Option<String>,
    pub proof_image_url: Option<String>,
    pub has_tagged_business: bool,
    pub has_sent_collab_request: bool,
    pub content_submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollaborationRow {
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownValue`] for an unknown stored status.
    pub fn status(&self) -> Result<CollaborationStatus, RuleError> {
        self.status.parse()
    }

    /// The scheduled slot as a UTC instant.
    #[must_use]
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_date.and_time(self.scheduled_time).and_utc()
    }

    #[must_use]
    pub fn is_party(&self, profile_id: Uuid) -> bool {
        self.business_id == profile_id || self.influencer_id == profile_id
    }
}

/// A persisted check-in.
#[derive(Debug, Clone)]
pub struct CheckInRecord {
    pub collaboration: CollaborationRow,
    pub outcome: CheckinOutcome,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_collaboration(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<CollaborationRow>, DbError> {
    let sql = format!("SELECT {COLLABORATION_COLUMNS} FROM collaborations WHERE id = $1");
    let row = sqlx::query_as::<_, CollaborationRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

async fn require(pool: &PgPool, id: Uuid) -> Result<CollaborationRow, DbError> {
    get_collaboration(pool, id).await?.ok_or(DbError::NotFound)
}

/// Collaborations where `profile_id` is either party, soonest slot last.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collaborations_for_profile(
    pool: &PgPool,
    profile_id: Uuid,
    status: Option<CollaborationStatus>,
    limit: i64,
) -> Result<Vec<CollaborationRow>, DbError> {
    let sql = format!(
        "SELECT {COLLABORATION_COLUMNS} FROM collaborations \
         WHERE (influencer_id = $1 OR business_id = $1) \
           AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY scheduled_date DESC, scheduled_time DESC, id \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, CollaborationRow>(&sql)
        .bind(profile_id)
        .bind(status.map(CollaborationStatus::as_str))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Load a collaboration the influencer may mint a check-in token for.
///
/// # Errors
///
/// Returns [`DbError::NotFound`], [`DbError::Forbidden`] when `influencer_id`
/// is not the collaboration's influencer, [`DbError::Rule`] with
/// [`RuleError::CollaborationNotActive`] or [`RuleError::AlreadyCheckedIn`],
/// or [`DbError::Sqlx`].
pub async fn get_collaboration_for_checkin(
    pool: &PgPool,
    id: Uuid,
    influencer_id: Uuid,
) -> Result<CollaborationRow, DbError> {
    let row = require(pool, id).await?;
    if row.influencer_id != influencer_id {
        return Err(DbError::Forbidden);
    }
    row.status()?.ensure_active()?;
    if row.checked_in_at.is_some() {
        return Err(RuleError::AlreadyCheckedIn.into());
    }
    Ok(row)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Record the influencer's arrival, scanned by `scanning_business_id` at
/// `now`. On-time is judged against the stored schedule.
///
/// The write is conditional on `checked_in_at IS NULL`, so of two concurrent
/// scans exactly one succeeds.
///
/// # Errors
///
/// Returns [`DbError::NotFound`], [`DbError::Rule`] with
/// [`RuleError::BusinessMismatch`] when the collaboration belongs to another
/// business, [`RuleError::CollaborationNotActive`] or
/// [`RuleError::AlreadyCheckedIn`], or [`DbError::Sqlx`].
pub async fn record_check_in(
    pool: &PgPool,
    id: Uuid,
    scanning_business_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CheckInRecord, DbError> {
    let current = require(pool, id).await?;
    if current.business_id != scanning_business_id {
        return Err(RuleError::BusinessMismatch.into());
    }
    current.status()?.ensure_active()?;
    if current.checked_in_at.is_some() {
        return Err(RuleError::AlreadyCheckedIn.into());
    }

    let outcome = evaluate_arrival(current.scheduled_at(), now);

    let sql = format!(
        "UPDATE collaborations \
         SET checked_in_at = $3, is_on_time = $4, updated_at = $3 \
         WHERE id = $1 AND business_id = $2 AND status = 'active' AND checked_in_at IS NULL \
         RETURNING {COLLABORATION_COLUMNS}"
    );
    let collaboration = sqlx::query_as::<_, CollaborationRow>(&sql)
        .bind(id)
        .bind(scanning_business_id)
        .bind(outcome.checked_in_at)
        .bind(outcome.is_on_time)
        .fetch_optional(pool)
        .await?
        .ok_or(RuleError::AlreadyCheckedIn)?;

    tracing::info!(
        collaboration_id = %id,
        business_id = %scanning_business_id,
        is_on_time = outcome.is_on_time,
        "check-in recorded"
    );
    Ok(CheckInRecord {
        collaboration,
        outcome,
    })
}

/// Store (or overwrite) the influencer's content proof and stamp
/// `content_submitted_at = now`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`], [`DbError::Forbidden`] when `influencer_id`
/// is not the collaboration's influencer, [`DbError::Rule`] with
/// [`RuleError::CollaborationNotActive`], or [`DbError::Sqlx`].
pub async fn submit_content_proof(
    pool: &PgPool,
    id: Uuid,
    influencer_id: Uuid,
    proof: &ValidatedProof,
    now: DateTime<Utc>,
) -> Result<CollaborationRow, DbError> {
    let current = require(pool, id).await?;
    if current.influencer_id != influencer_id {
        return Err(DbError::Forbidden);
    }
    current.status()?.ensure_active()?;

    let sql = format!(
        "UPDATE collaborations SET \
             content_video_url = $2, content_video_filename = $3, social_media_post_url = $4, \
             proof_image_url = $5, has_tagged_business = TRUE, has_sent_collab_request = TRUE, \
             content_submitted_at = $6, updated_at = $6 \
         WHERE id = $1 AND status = 'active' \
         RETURNING {COLLABORATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CollaborationRow>(&sql)
        .bind(id)
        .bind(&proof.video_url)
        .bind(&proof.video_filename)
        .bind(&proof.social_media_post_url)
        .bind(&proof.proof_image_url)
        .bind(now)
        .fetch_optional(pool)
        .await?
        .ok_or(RuleError::CollaborationNotActive(CollaborationStatus::Completed))?;

    tracing::info!(collaboration_id = %id, "content proof submitted");
    Ok(row)
}

/// Close out a collaboration on behalf of its business.
///
/// # Errors
///
/// Returns [`DbError::NotFound`], [`DbError::Forbidden`] when `business_id`
/// is not the collaboration's business, [`DbError::Rule`] with
/// [`RuleError::CollaborationNotActive`] or [`RuleError::ProofMissing`], or
/// [`DbError::Sqlx`].
pub async fn complete_collaboration(
    pool: &PgPool,
    id: Uuid,
    business_id: Uuid,
    now: DateTime<Utc>,
) -> Result<CollaborationRow, DbError> {
    let current = require(pool, id).await?;
    if current.business_id != business_id {
        return Err(DbError::Forbidden);
    }
    current
        .status()?
        .ensure_completable(current.content_submitted_at)?;

    let sql = format!(
        "UPDATE collaborations SET status = 'completed', completed_at = $2, updated_at = $2 \
         WHERE id = $1 AND status = 'active' AND content_submitted_at IS NOT NULL \
         RETURNING {COLLABORATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CollaborationRow>(&sql)
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await?
        .ok_or(RuleError::CollaborationNotActive(CollaborationStatus::Completed))?;

    tracing::info!(collaboration_id = %id, "collaboration completed");
    Ok(row)
}
