//! Database operations for `applications`, including the transactional
//! accept that materializes a collaboration.

use barterlink_core::lifecycle::normalize_message;
use barterlink_core::{ApplicationStatus, OfferStatus, RuleError, Schedule, UserType};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::collaborations::{CollaborationRow, COLLABORATION_COLUMNS};
use crate::profiles::require_user_type;
use crate::{is_unique_violation, DbError};

pub(crate) const APPLICATION_COLUMNS: &str = "id, offer_id, influencer_id, status, \
     requested_date, requested_time, party_size, message, applied_at, decided_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `applications` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub influencer_id: Uuid,
    pub status: String,
    pub requested_date: NaiveDate,
    pub requested_time: NaiveTime,
    pub party_size: i32,
    pub message: Option<String>,
    pub applied_at: DateTime<Utc>,
    /// Set when the application leaves `pending`.
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApplicationRow {
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownValue`] for an unknown stored status.
    pub fn status(&self) -> Result<ApplicationStatus, RuleError> {
        self.status.parse()
    }
}

/// Everything an accept wrote, returned so callers can report it.
#[derive(Debug, Clone)]
pub struct AcceptOutcome {
    pub application: ApplicationRow,
    pub collaboration: CollaborationRow,
    /// Pending siblings in the same slot that were cancelled.
    pub cancelled_ids: Vec<Uuid>,
}

/// A locked application together with the owner of its offer.
#[derive(Debug, sqlx::FromRow)]
struct LockedApplication {
    status: String,
    influencer_id: Uuid,
    business_id: Uuid,
    offer_id: Uuid,
    requested_date: NaiveDate,
    requested_time: NaiveTime,
    party_size: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct ApplicationWithOwner {
    #[sqlx(flatten)]
    application: ApplicationRow,
    business_id: Uuid,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Submit a new `pending` application for `offer_id`.
///
/// # Errors
///
/// Returns [`DbError::Forbidden`] when the applicant is not an influencer,
/// [`DbError::Rule`] for an invalid schedule or message, [`DbError::NotFound`]
/// when the offer does not exist, [`DbError::Conflict`] when the offer is not
/// active or the influencer already has an open application for it,
/// [`DbError::SlotTaken`] when the requested slot already has an accepted
/// application, or [`DbError::Sqlx`] on database failures.
pub async fn submit_application(
    pool: &PgPool,
    offer_id: Uuid,
    influencer_id: Uuid,
    schedule: &Schedule,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ApplicationRow, DbError> {
    require_user_type(pool, influencer_id, UserType::Influencer).await?;
    schedule.validate(now)?;
    let message = normalize_message(message)?;

    let mut tx = pool.begin().await?;

    // Shared lock on the offer; accepts take a conflicting lock, so a slot
    // cannot fill between the check below and the insert.
    let offer_status: String =
        sqlx::query_scalar("SELECT status FROM offers WHERE id = $1 FOR SHARE")
            .bind(offer_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;
    if offer_status.parse::<OfferStatus>()? != OfferStatus::Active {
        return Err(DbError::Conflict(
            "this offer is not accepting applications".to_string(),
        ));
    }

    let slot_filled: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM applications \
         WHERE offer_id = $1 AND requested_date = $2 AND requested_time = $3 \
           AND status = 'accepted')",
    )
    .bind(offer_id)
    .bind(schedule.date)
    .bind(schedule.time)
    .fetch_one(&mut *tx)
    .await?;
    if slot_filled {
        return Err(DbError::SlotTaken);
    }

    let sql = format!(
        "INSERT INTO applications (id, offer_id, influencer_id, status, requested_date, \
             requested_time, party_size, message, applied_at) \
         VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8) \
         RETURNING {APPLICATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ApplicationRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(offer_id)
        .bind(influencer_id)
        .bind(schedule.date)
        .bind(schedule.time)
        .bind(schedule.party_size)
        .bind(&message)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "applications_one_open_per_influencer") {
                DbError::Conflict("you already have an open application for this offer".to_string())
            } else {
                DbError::Sqlx(e)
            }
        })?;
    tx.commit().await?;

    tracing::info!(
        application_id = %row.id,
        offer_id = %offer_id,
        influencer_id = %influencer_id,
        date = %row.requested_date,
        time = %row.requested_time,
        "application submitted"
    );
    Ok(row)
}

/// Accept a pending application on behalf of the business that owns the
/// offer.
///
/// Runs in one transaction: every pending or accepted application in the
/// same slot is locked in id order, the target moves to `accepted`, exactly
/// one collaboration is inserted, and the remaining pending siblings in the
/// slot move to `cancelled`. Nothing is written on failure.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the application does not exist,
/// [`DbError::Forbidden`] if `business_id` does not own the offer,
/// [`DbError::SlotTaken`] if another application in the slot is already
/// accepted, [`DbError::Rule`] with [`RuleError::InvalidTransition`] if the
/// application is no longer pending, or [`DbError::Sqlx`] on database
/// failures.
pub async fn accept_application(
    pool: &PgPool,
    application_id: Uuid,
    business_id: Uuid,
    now: DateTime<Utc>,
) -> Result<AcceptOutcome, DbError> {
    let mut tx = pool.begin().await?;

    let target = load_with_owner(&mut *tx, application_id, false).await?;
    if target.business_id != business_id {
        return Err(DbError::Forbidden);
    }

    // Blocks submits into this offer until the accept commits.
    sqlx::query("SELECT 1 FROM offers WHERE id = $1 FOR NO KEY UPDATE")
        .bind(target.offer_id)
        .execute(&mut *tx)
        .await?;

    // Same lock order for every accepter in this slot, so concurrent accepts
    // serialize instead of deadlocking.
    let slot: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT id, status FROM applications \
         WHERE offer_id = $1 AND requested_date = $2 AND requested_time = $3 \
           AND status IN ('pending', 'accepted') \
         ORDER BY id \
         FOR UPDATE",
    )
    .bind(target.offer_id)
    .bind(target.requested_date)
    .bind(target.requested_time)
    .fetch_all(&mut *tx)
    .await?;

    if slot
        .iter()
        .any(|(id, status)| *id != application_id && status == "accepted")
    {
        return Err(DbError::SlotTaken);
    }

    // Re-read under lock; the unlocked read above may be stale.
    let current = load_with_owner(&mut *tx, application_id, true).await?;
    current
        .status
        .parse::<ApplicationStatus>()?
        .transition(ApplicationStatus::Accepted)?;

    let update = format!(
        "UPDATE applications SET status = 'accepted', decided_at = $2 \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {APPLICATION_COLUMNS}"
    );
    let application = sqlx::query_as::<_, ApplicationRow>(&update)
        .bind(application_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "applications_one_accepted_per_slot") {
                DbError::SlotTaken
            } else {
                DbError::Sqlx(e)
            }
        })?
        .ok_or_else(|| DbError::Conflict("application is no longer pending".to_string()))?;

    let insert = format!(
        "INSERT INTO collaborations (id, application_id, offer_id, business_id, influencer_id, \
             scheduled_date, scheduled_time, party_size, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9, $9) \
         RETURNING {COLLABORATION_COLUMNS}"
    );
    let collaboration = sqlx::query_as::<_, CollaborationRow>(&insert)
        .bind(Uuid::new_v4())
        .bind(application_id)
        .bind(current.offer_id)
        .bind(current.business_id)
        .bind(current.influencer_id)
        .bind(current.requested_date)
        .bind(current.requested_time)
        .bind(current.party_size)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

    let cancelled_ids: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE applications SET status = 'cancelled', decided_at = $5 \
         WHERE offer_id = $1 AND requested_date = $2 AND requested_time = $3 \
           AND status = 'pending' AND id <> $4 \
         RETURNING id",
    )
    .bind(current.offer_id)
    .bind(current.requested_date)
    .bind(current.requested_time)
    .bind(application_id)
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        application_id = %application_id,
        collaboration_id = %collaboration.id,
        offer_id = %current.offer_id,
        cancelled = cancelled_ids.len(),
        "application accepted"
    );

    Ok(AcceptOutcome {
        application,
        collaboration,
        cancelled_ids,
    })
}

/// Decline a pending application on behalf of the offer's business.
///
/// # Errors
///
/// Returns [`DbError::NotFound`], [`DbError::Forbidden`], [`DbError::Rule`]
/// with [`RuleError::InvalidTransition`] when not pending, or
/// [`DbError::Sqlx`].
pub async fn decline_application(
    pool: &PgPool,
    application_id: Uuid,
    business_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ApplicationRow, DbError> {
    let row = transition(
        pool,
        application_id,
        ApplicationStatus::Declined,
        now,
        |locked| locked.business_id == business_id,
    )
    .await?;
    tracing::info!(application_id = %application_id, "application declined");
    Ok(row)
}

/// Withdraw a pending application on behalf of the influencer who made it.
///
/// # Errors
///
/// Returns [`DbError::NotFound`], [`DbError::Forbidden`], [`DbError::Rule`]
/// with [`RuleError::InvalidTransition`] when not pending, or
/// [`DbError::Sqlx`].
pub async fn withdraw_application(
    pool: &PgPool,
    application_id: Uuid,
    influencer_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ApplicationRow, DbError> {
    let row = transition(
        pool,
        application_id,
        ApplicationStatus::Cancelled,
        now,
        |locked| locked.influencer_id == influencer_id,
    )
    .await?;
    tracing::info!(application_id = %application_id, "application withdrawn");
    Ok(row)
}

async fn transition<F>(
    pool: &PgPool,
    application_id: Uuid,
    next: ApplicationStatus,
    now: DateTime<Utc>,
    is_permitted: F,
) -> Result<ApplicationRow, DbError>
where
    F: FnOnce(&LockedApplication) -> bool,
{
    let mut tx = pool.begin().await?;

    let locked = load_with_owner(&mut *tx, application_id, true).await?;
    if !is_permitted(&locked) {
        return Err(DbError::Forbidden);
    }
    let next = locked.status.parse::<ApplicationStatus>()?.transition(next)?;

    let update = format!(
        "UPDATE applications SET status = $2, decided_at = $3 \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {APPLICATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ApplicationRow>(&update)
        .bind(application_id)
        .bind(next.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::Conflict("application is no longer pending".to_string()))?;

    tx.commit().await?;
    Ok(row)
}

async fn load_with_owner(
    conn: &mut PgConnection,
    application_id: Uuid,
    lock: bool,
) -> Result<LockedApplication, DbError> {
    let sql = if lock {
        "SELECT a.status, a.influencer_id, o.business_id, a.offer_id, a.requested_date, \
                a.requested_time, a.party_size \
         FROM applications a JOIN offers o ON o.id = a.offer_id \
         WHERE a.id = $1 \
         FOR UPDATE OF a"
    } else {
        "SELECT a.status, a.influencer_id, o.business_id, a.offer_id, a.requested_date, \
                a.requested_time, a.party_size \
         FROM applications a JOIN offers o ON o.id = a.offer_id \
         WHERE a.id = $1"
    };
    sqlx::query_as::<_, LockedApplication>(sql)
        .bind(application_id)
        .fetch_optional(conn)
        .await?
        .ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch one application if `viewer_id` is its influencer or the offer's
/// business.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the application does not exist,
/// [`DbError::Forbidden`] for any other viewer, or [`DbError::Sqlx`].
pub async fn get_application(
    pool: &PgPool,
    application_id: Uuid,
    viewer_id: Uuid,
) -> Result<ApplicationRow, DbError> {
    let row = sqlx::query_as::<_, ApplicationWithOwner>(
        "SELECT a.*, o.business_id \
         FROM applications a JOIN offers o ON o.id = a.offer_id \
         WHERE a.id = $1",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    let application = row.application;
    if viewer_id != application.influencer_id && viewer_id != row.business_id {
        return Err(DbError::Forbidden);
    }
    Ok(application)
}

/// Applications for an offer, visible only to the business that owns it.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the offer does not exist,
/// [`DbError::Forbidden`] if `business_id` does not own it, or
/// [`DbError::Sqlx`].
pub async fn list_applications_for_offer(
    pool: &PgPool,
    offer_id: Uuid,
    business_id: Uuid,
    status: Option<ApplicationStatus>,
    limit: i64,
) -> Result<Vec<ApplicationRow>, DbError> {
    let owner: Uuid = sqlx::query_scalar("SELECT business_id FROM offers WHERE id = $1")
        .bind(offer_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;
    if owner != business_id {
        return Err(DbError::Forbidden);
    }

    let sql = format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications \
         WHERE offer_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY requested_date, requested_time, applied_at \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
        .bind(offer_id)
        .bind(status.map(ApplicationStatus::as_str))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// An influencer's own applications, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_applications_for_influencer(
    pool: &PgPool,
    influencer_id: Uuid,
    status: Option<ApplicationStatus>,
    limit: i64,
) -> Result<Vec<ApplicationRow>, DbError> {
    let sql = format!(
        "SELECT {APPLICATION_COLUMNS} FROM applications \
         WHERE influencer_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY applied_at DESC, id \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ApplicationRow>(&sql)
        .bind(influencer_id)
        .bind(status.map(ApplicationStatus::as_str))
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
