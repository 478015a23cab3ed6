//! Signed check-in payloads carried in the influencer's QR code, and the
//! on-time classification applied when a business scans one.
//!
//! Token layout: `v1.<base64url(payload json)>.<base64url(hmac-sha256)>`.
//! The signature covers the encoded payload part, and is verified before the
//! JSON is parsed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::RuleError;

type HmacSha256 = Hmac<Sha256>;

pub const CHECKIN_PAYLOAD_TYPE: &str = "collaboration-checkin";
const TOKEN_VERSION_V1: &str = "v1";
const MAX_TOKEN_LEN: usize = 1024;
const MAX_FUTURE_SKEW_SECS: i64 = 300;
const MAX_TTL_SECS: i64 = 365 * 24 * 3600;

/// Earliest accepted arrival, relative to the scheduled slot.
pub const EARLY_GRACE_MINUTES: i64 = 15;
/// Latest accepted arrival, relative to the scheduled slot.
pub const LATE_GRACE_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CheckinPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub business_id: Uuid,
    pub collaboration_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

impl CheckinPayload {
    #[must_use]
    pub fn new(business_id: Uuid, collaboration_id: Uuid, issued_at: DateTime<Utc>) -> Self {
        Self {
            kind: CHECKIN_PAYLOAD_TYPE.to_owned(),
            business_id,
            collaboration_id,
            issued_at,
        }
    }
}

/// Issues and verifies check-in tokens with a server-held key.
#[derive(Clone)]
pub struct CheckinSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for CheckinSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckinSigner")
            .field("key", &"[redacted]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CheckinSigner {
    #[must_use]
    pub fn new(key: &[u8], ttl_secs: u64) -> Self {
        let ttl_secs = i64::try_from(ttl_secs).map_or(MAX_TTL_SECS, |s| s.min(MAX_TTL_SECS));
        Self {
            key: key.to_vec(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Sign `payload` into the text that goes inside the QR symbol.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPayload`] if the payload cannot be encoded.
    pub fn issue(&self, payload: &CheckinPayload) -> Result<String, RuleError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| RuleError::InvalidPayload(e.to_string()))?;
        let payload_part = URL_SAFE_NO_PAD.encode(bytes);
        let sig_part = URL_SAFE_NO_PAD.encode(self.mac(&payload_part)?.finalize().into_bytes());
        Ok(format!("{TOKEN_VERSION_V1}.{payload_part}.{sig_part}"))
    }

    /// Decode and authenticate a scanned token.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidPayload`] for a malformed token, a bad
    /// signature, a payload with missing or unknown fields, the wrong payload
    /// type, or a token outside its validity window.
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<CheckinPayload, RuleError> {
        let token = token.trim();
        if token.len() > MAX_TOKEN_LEN {
            return Err(RuleError::InvalidPayload("token exceeds max length".into()));
        }
        let (payload_part, sig_part) = match token.split('.').collect::<Vec<_>>().as_slice() {
            [TOKEN_VERSION_V1, payload, sig] => (*payload, *sig),
            [version, _, _] => {
                return Err(RuleError::InvalidPayload(format!(
                    "unsupported token version '{version}'"
                )))
            }
            _ => return Err(RuleError::InvalidPayload("malformed token".into())),
        };

        let sig = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|e| RuleError::InvalidPayload(format!("signature encoding: {e}")))?;
        self.mac(payload_part)?
            .verify_slice(&sig)
            .map_err(|_| RuleError::InvalidPayload("signature mismatch".into()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|e| RuleError::InvalidPayload(format!("payload encoding: {e}")))?;
        let payload: CheckinPayload = serde_json::from_slice(&bytes)
            .map_err(|e| RuleError::InvalidPayload(e.to_string()))?;

        if payload.kind != CHECKIN_PAYLOAD_TYPE {
            return Err(RuleError::InvalidPayload(format!(
                "unexpected payload type '{}'",
                payload.kind
            )));
        }
        if payload.issued_at > now + Duration::seconds(MAX_FUTURE_SKEW_SECS) {
            return Err(RuleError::InvalidPayload("token issued in the future".into()));
        }
        if now - payload.issued_at > self.ttl {
            return Err(RuleError::InvalidPayload("token has expired".into()));
        }
        Ok(payload)
    }

    /// Decode a token scanned by `scanning_business_id`.
    ///
    /// # Errors
    ///
    /// Everything [`CheckinSigner::decode`] returns, plus
    /// [`RuleError::BusinessMismatch`] when the token names another business.
    pub fn verify_scan(
        &self,
        token: &str,
        scanning_business_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CheckinPayload, RuleError> {
        let payload = self.decode(token, now)?;
        if payload.business_id != scanning_business_id {
            return Err(RuleError::BusinessMismatch);
        }
        Ok(payload)
    }

    fn mac(&self, payload_part: &str) -> Result<HmacSha256, RuleError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| RuleError::InvalidPayload(e.to_string()))?;
        mac.update(payload_part.as_bytes());
        Ok(mac)
    }
}

/// `true` when `arrival - scheduled` lies within
/// `[-EARLY_GRACE_MINUTES, +LATE_GRACE_MINUTES]`, both ends inclusive.
#[must_use]
pub fn is_on_time(scheduled: DateTime<Utc>, arrival: DateTime<Utc>) -> bool {
    let delta = arrival - scheduled;
    delta >= -Duration::minutes(EARLY_GRACE_MINUTES)
        && delta <= Duration::minutes(LATE_GRACE_MINUTES)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckinOutcome {
    pub checked_in_at: DateTime<Utc>,
    pub is_on_time: bool,
}

#[must_use]
pub fn evaluate_arrival(scheduled: DateTime<Utc>, arrival: DateTime<Utc>) -> CheckinOutcome {
    CheckinOutcome {
        checked_in_at: arrival,
        is_on_time: is_on_time(scheduled, arrival),
    }
}
