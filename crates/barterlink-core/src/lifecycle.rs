//! Application and collaboration lifecycle rules.
//!
//! An application moves `pending → accepted | declined | cancelled` and never
//! leaves a terminal state. Accepting one materializes a collaboration in
//! `active`, which later becomes `completed`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RuleError;

pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl ApplicationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Accepted | Self::Declined | Self::Cancelled
            )
        )
    }

    /// Validate a transition and return the new status.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidTransition`] when `self` is terminal or
    /// `next` is not reachable from it.
    pub fn transition(self, next: Self) -> Result<Self, RuleError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(RuleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RuleError::UnknownValue {
                kind: "application status",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaborationStatus {
    Active,
    Completed,
}

impl CollaborationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// # Errors
    ///
    /// Returns [`RuleError::CollaborationNotActive`] for anything but `active`.
    pub fn ensure_active(self) -> Result<(), RuleError> {
        match self {
            Self::Active => Ok(()),
            other => Err(RuleError::CollaborationNotActive(other)),
        }
    }

    /// A business may close out a collaboration once it is active and the
    /// influencer has delivered content proof.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::CollaborationNotActive`] or
    /// [`RuleError::ProofMissing`].
    pub fn ensure_completable(
        self,
        content_submitted_at: Option<DateTime<Utc>>,
    ) -> Result<(), RuleError> {
        self.ensure_active()?;
        if content_submitted_at.is_none() {
            return Err(RuleError::ProofMissing);
        }
        Ok(())
    }
}

impl std::fmt::Display for CollaborationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollaborationStatus {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(RuleError::UnknownValue {
                kind: "collaboration status",
                value: other.to_owned(),
            }),
        }
    }
}

/// The slot an influencer asks for when applying. Date and time are a UTC
/// wall-clock slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub party_size: i32,
}

impl Schedule {
    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }

    /// # Errors
    ///
    /// Returns [`RuleError::Validation`] naming `party_size`, or `date` when the
    /// slot starts before `now`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), RuleError> {
        if self.party_size < 1 {
            return Err(RuleError::validation(
                "party_size",
                format!("must be a positive integer, got {}", self.party_size),
            ));
        }
        if self.date < now.date_naive() {
            return Err(RuleError::validation("date", "must not be in the past"));
        }
        if self.starts_at() < now {
            return Err(RuleError::validation(
                "date",
                "the requested time has already passed",
            ));
        }
        Ok(())
    }
}

/// Trim an optional application message, dropping it when blank.
///
/// # Errors
///
/// Returns [`RuleError::Validation`] when the message exceeds
/// [`MAX_MESSAGE_LEN`] characters.
pub fn normalize_message(message: Option<&str>) -> Result<Option<String>, RuleError> {
    let Some(trimmed) = message.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(RuleError::validation(
            "message",
            format!("must be at most {MAX_MESSAGE_LEN} characters"),
        ));
    }
    Ok(Some(trimmed.to_owned()))
}

/// Accepts both `HH:MM` and `HH:MM:SS` on input; always writes `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| D::Error::custom(format!("invalid time '{raw}': {e}")))
    }
}
