//! Database operations for `profiles`.

use barterlink_core::{ProfileDraft, ProfilePatch, RuleError, UserType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{is_unique_violation, DbError};

pub(crate) const PROFILE_COLUMNS: &str = "id, user_type, email, display_name, avatar_url, \
     instagram_handle, tiktok_handle, follower_count, engagement_rate, niche, \
     business_name, business_category, address, website_url, metadata, created_at, updated_at";

/// A row from the `profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub user_type: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub instagram_handle: Option<String>,
    pub tiktok_handle: Option<String>,
    pub follower_count: Option<i32>,
    pub engagement_rate: Option<Decimal>,
    pub niche: Option<String>,
    pub business_name: Option<String>,
    pub business_category: Option<String>,
    pub address: Option<String>,
    pub website_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownValue`] if the stored value is not a known
    /// user type.
    pub fn user_type(&self) -> Result<UserType, RuleError> {
        self.user_type.parse()
    }

    /// Rebuild the editable draft from the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::UnknownValue`] for an unknown stored user type.
    pub fn to_draft(&self) -> Result<ProfileDraft, RuleError> {
        Ok(ProfileDraft {
            user_type: self.user_type()?,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            instagram_handle: self.instagram_handle.clone(),
            tiktok_handle: self.tiktok_handle.clone(),
            follower_count: self.follower_count,
            engagement_rate: self.engagement_rate,
            niche: self.niche.clone(),
            business_name: self.business_name.clone(),
            business_category: self.business_category.clone(),
            address: self.address.clone(),
            website_url: self.website_url.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

/// Fail with [`DbError::Forbidden`] unless profile `id` exists and has
/// `expected` user type; [`DbError::NotFound`] if it does not exist.
pub(crate) async fn require_user_type(
    pool: &PgPool,
    id: Uuid,
    expected: UserType,
) -> Result<(), DbError> {
    let stored: Option<String> = sqlx::query_scalar("SELECT user_type FROM profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let user_type: UserType = stored.ok_or(DbError::NotFound)?.parse()?;
    if user_type == expected {
        Ok(())
    } else {
        Err(DbError::Forbidden)
    }
}

/// Validate and insert a new profile.
///
/// # Errors
///
/// Returns [`DbError::Rule`] when the draft fails validation,
/// [`DbError::Conflict`] when the email is already registered, or
/// [`DbError::Sqlx`] on other database failures.
pub async fn create_profile(pool: &PgPool, draft: ProfileDraft) -> Result<ProfileRow, DbError> {
    let draft = draft.validate()?;
    let sql = format!(
        "INSERT INTO profiles (id, user_type, email, display_name, avatar_url, \
             instagram_handle, tiktok_handle, follower_count, engagement_rate, niche, \
             business_name, business_category, address, website_url, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING {PROFILE_COLUMNS}"
    );

    let row = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(draft.user_type.as_str())
        .bind(&draft.email)
        .bind(&draft.display_name)
        .bind(&draft.avatar_url)
        .bind(&draft.instagram_handle)
        .bind(&draft.tiktok_handle)
        .bind(draft.follower_count)
        .bind(draft.engagement_rate)
        .bind(&draft.niche)
        .bind(&draft.business_name)
        .bind(&draft.business_category)
        .bind(&draft.address)
        .bind(&draft.website_url)
        .bind(&draft.metadata)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "profiles_email_key") {
                DbError::Conflict(format!("a profile for '{}' already exists", draft.email))
            } else {
                DbError::Sqlx(e)
            }
        })?;

    tracing::info!(profile_id = %row.id, user_type = %row.user_type, "profile created");
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_profile(pool: &PgPool, id: Uuid) -> Result<Option<ProfileRow>, DbError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
    let row = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Look a profile up by email. The email is matched after lowercasing.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_profile_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<ProfileRow>, DbError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = $1");
    let row = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Apply a sparse patch to a profile and persist the validated result.
///
/// The row is locked for the read-modify-write so concurrent patches do not
/// drop each other's fields. `user_type` and `email` never change here.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the profile does not exist,
/// [`DbError::Rule`] if the patched profile fails validation, or
/// [`DbError::Sqlx`] on database failures.
pub async fn update_profile(
    pool: &PgPool,
    id: Uuid,
    patch: ProfilePatch,
) -> Result<ProfileRow, DbError> {
    let mut tx = pool.begin().await?;

    let select = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1 FOR UPDATE");
    let current = sqlx::query_as::<_, ProfileRow>(&select)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    let draft = current.to_draft()?.apply(patch).validate()?;

    let update = format!(
        "UPDATE profiles SET \
             display_name = $2, avatar_url = $3, instagram_handle = $4, tiktok_handle = $5, \
             follower_count = $6, engagement_rate = $7, niche = $8, business_name = $9, \
             business_category = $10, address = $11, website_url = $12, metadata = $13, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {PROFILE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ProfileRow>(&update)
        .bind(id)
        .bind(&draft.display_name)
        .bind(&draft.avatar_url)
        .bind(&draft.instagram_handle)
        .bind(&draft.tiktok_handle)
        .bind(draft.follower_count)
        .bind(draft.engagement_rate)
        .bind(&draft.niche)
        .bind(&draft.business_name)
        .bind(&draft.business_category)
        .bind(&draft.address)
        .bind(&draft.website_url)
        .bind(&draft.metadata)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::debug!(profile_id = %id, "profile updated");
    Ok(row)
}
