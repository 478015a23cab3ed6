//! Opaque bearer sessions.
//!
//! A token is 32 random bytes, base64url-encoded, handed to the client once.
//! Only `base64url(sha256(salt ":" token))` is stored, so a leaked table dump
//! cannot be replayed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use barterlink_core::{RuleError, MAX_SESSION_TTL_HOURS};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const TOKEN_BYTES: usize = 32;

/// A freshly minted session. `token` is never stored and cannot be
/// recovered later.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: Uuid,
    pub profile_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The profile a live session token resolves to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionPrincipal {
    pub session_id: Uuid,
    pub profile_id: Uuid,
    pub user_type: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[must_use]
pub fn hash_token(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// `now + ttl_hours`, rejecting zero, lifetimes past [`MAX_SESSION_TTL_HOURS`]
/// and timestamps chrono cannot represent.
fn session_expiry(now: DateTime<Utc>, ttl_hours: u32) -> Result<DateTime<Utc>, RuleError> {
    let out_of_range = || {
        RuleError::validation(
            "ttl_hours",
            format!("must be between 1 and {MAX_SESSION_TTL_HOURS}"),
        )
    };
    if ttl_hours == 0 || ttl_hours > MAX_SESSION_TTL_HOURS {
        return Err(out_of_range());
    }
    Duration::try_hours(i64::from(ttl_hours))
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(out_of_range)
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn insert_session<'e, E>(
    executor: E,
    profile_id: Uuid,
    salt: &str,
    ttl_hours: u32,
    now: DateTime<Utc>,
) -> Result<IssuedSession, DbError>
where
    E: sqlx::PgExecutor<'e>,
{
    let expires_at = session_expiry(now, ttl_hours)?;
    let session_id = Uuid::new_v4();
    let token = generate_token();

    sqlx::query(
        "INSERT INTO sessions (id, profile_id, token_hash, expires_at, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(session_id)
    .bind(profile_id)
    .bind(hash_token(salt, &token))
    .bind(expires_at)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(IssuedSession {
        session_id,
        profile_id,
        token,
        expires_at,
    })
}

/// Mint a new session for `profile_id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the profile does not exist, or
/// [`DbError::Sqlx`] on other database failures.
pub async fn issue_session(
    pool: &PgPool,
    profile_id: Uuid,
    salt: &str,
    ttl_hours: u32,
    now: DateTime<Utc>,
) -> Result<IssuedSession, DbError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM profiles WHERE id = $1)")
        .bind(profile_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(DbError::NotFound);
    }

    let issued = insert_session(pool, profile_id, salt, ttl_hours, now).await?;
    tracing::info!(
        session_id = %issued.session_id,
        profile_id = %profile_id,
        expires_at = %issued.expires_at,
        "session issued"
    );
    Ok(issued)
}

/// Resolve a bearer token to its profile, touching `last_seen_at`.
///
/// Returns `None` for unknown, revoked or expired tokens.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn resolve_session(
    pool: &PgPool,
    salt: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionPrincipal>, DbError> {
    let principal = sqlx::query_as::<_, SessionPrincipal>(
        "UPDATE sessions AS s SET last_seen_at = $2 \
         FROM profiles AS p \
         WHERE s.token_hash = $1 \
           AND s.revoked_at IS NULL \
           AND s.expires_at > $2 \
           AND p.id = s.profile_id \
         RETURNING s.id AS session_id, s.profile_id, p.user_type, p.email, s.expires_at",
    )
    .bind(hash_token(salt, token))
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(principal)
}

/// Revoke `session_id` and mint a replacement for the same profile in one
/// transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the session does not exist or is already
/// revoked, or [`DbError::Sqlx`] on database failures.
pub async fn rotate_session(
    pool: &PgPool,
    session_id: Uuid,
    salt: &str,
    ttl_hours: u32,
    now: DateTime<Utc>,
) -> Result<IssuedSession, DbError> {
    let mut tx = pool.begin().await?;

    let profile_id: Uuid = sqlx::query_scalar(
        "UPDATE sessions SET revoked_at = $2 \
         WHERE id = $1 AND revoked_at IS NULL \
         RETURNING profile_id",
    )
    .bind(session_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    let issued = insert_session(&mut *tx, profile_id, salt, ttl_hours, now).await?;
    tx.commit().await?;

    tracing::info!(
        old_session_id = %session_id,
        session_id = %issued.session_id,
        profile_id = %profile_id,
        "session rotated"
    );
    Ok(issued)
}

/// Revoke a single session. Returns `false` if it was already revoked or
/// never existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn revoke_session(
    pool: &PgPool,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result =
        sqlx::query("UPDATE sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
            .bind(session_id)
            .bind(now)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Revoke every live session of a profile. Returns how many were revoked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn revoke_sessions_for_profile(
    pool: &PgPool,
    profile_id: Uuid,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE sessions SET revoked_at = $2 WHERE profile_id = $1 AND revoked_at IS NULL",
    )
    .bind(profile_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_salt_and_token() {
        let a = hash_token("salt-a", "token");
        assert_eq!(a, hash_token("salt-a", "token"));
        assert_ne!(a, hash_token("salt-b", "token"));
        assert_ne!(a, hash_token("salt-a", "token2"));
        assert!(!a.contains("token"));
    }

    #[test]
    fn generated_tokens_are_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), TOKEN_BYTES);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn session_expiry_adds_hours_within_bounds() {
        let now = Utc::now();
        assert_eq!(session_expiry(now, 24).unwrap(), now + Duration::hours(24));
        assert_eq!(
            session_expiry(now, MAX_SESSION_TTL_HOURS).unwrap(),
            now + Duration::hours(i64::from(MAX_SESSION_TTL_HOURS))
        );
    }

    #[test]
    fn session_expiry_rejects_zero_and_huge_ttls() {
        let now = Utc::now();
        for ttl in [0, MAX_SESSION_TTL_HOURS + 1, u32::MAX] {
            let err = session_expiry(now, ttl).unwrap_err();
            assert_eq!(err.field(), Some("ttl_hours"), "ttl {ttl}");
        }
    }

    #[test]
    fn session_expiry_near_the_end_of_time_is_an_error() {
        assert!(session_expiry(DateTime::<Utc>::MAX_UTC, 1).is_err());
    }
}
