use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::validate::{bounded, email, handle, http_url, optional, required};
use crate::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Influencer,
    Business,
}

impl UserType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Influencer => "influencer",
            Self::Business => "business",
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "influencer" => Ok(Self::Influencer),
            "business" => Ok(Self::Business),
            other => Err(RuleError::UnknownValue {
                kind: "user type",
                value: other.to_owned(),
            }),
        }
    }
}

/// Full profile contents as written to the store.
///
/// Influencer-only fields (`tiktok_handle`, `follower_count`,
/// `engagement_rate`, `niche`) and business-only fields (`business_name`,
/// `business_category`, `address`, `website_url`, `metadata`) are mutually
/// exclusive; `instagram_handle` is shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub user_type: UserType,
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
}

/// Sparse update for the signed-in user's own profile. `None` keeps the
/// current value; an empty string clears an optional text field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
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
}

fn patch_text(target: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value {
        *target = optional(Some(&v));
    }
}

impl ProfileDraft {
    #[must_use]
    pub fn apply(mut self, patch: ProfilePatch) -> Self {
        if let Some(name) = patch.display_name {
            self.display_name = name;
        }
        patch_text(&mut self.avatar_url, patch.avatar_url);
        patch_text(&mut self.instagram_handle, patch.instagram_handle);
        patch_text(&mut self.tiktok_handle, patch.tiktok_handle);
        patch_text(&mut self.niche, patch.niche);
        patch_text(&mut self.business_name, patch.business_name);
        patch_text(&mut self.business_category, patch.business_category);
        patch_text(&mut self.address, patch.address);
        patch_text(&mut self.website_url, patch.website_url);
        if patch.follower_count.is_some() {
            self.follower_count = patch.follower_count;
        }
        if patch.engagement_rate.is_some() {
            self.engagement_rate = patch.engagement_rate;
        }
        if patch.metadata.is_some() {
            self.metadata = patch.metadata;
        }
        self
    }

    /// Normalize and validate the draft.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Validation`] naming the first failing field,
    /// including a field that belongs to the other user type.
    pub fn validate(self) -> Result<Self, RuleError> {
        let email = email(&self.email)?;
        let display_name = required("display_name", &self.display_name)?;
        bounded("display_name", &display_name, 100)?;

        let avatar_url = optional(self.avatar_url.as_deref());
        if let Some(ref url) = avatar_url {
            http_url("avatar_url", url)?;
        }
        let instagram_handle = optional(self.instagram_handle.as_deref())
            .map(|h| handle("instagram_handle", &h))
            .transpose()?;

        let mut draft = Self {
            email,
            display_name,
            avatar_url,
            instagram_handle,
            tiktok_handle: optional(self.tiktok_handle.as_deref()),
            niche: optional(self.niche.as_deref()),
            business_name: optional(self.business_name.as_deref()),
            business_category: optional(self.business_category.as_deref()),
            address: optional(self.address.as_deref()),
            website_url: optional(self.website_url.as_deref()),
            ..self
        };

        match draft.user_type {
            UserType::Influencer => draft.validate_influencer()?,
            UserType::Business => draft.validate_business()?,
        }
        if let Some(ref h) = draft.tiktok_handle {
            draft.tiktok_handle = Some(handle("tiktok_handle", h)?);
        }
        Ok(draft)
    }

    fn validate_influencer(&self) -> Result<(), RuleError> {
        let foreign = [
            ("business_name", self.business_name.is_some()),
            ("business_category", self.business_category.is_some()),
            ("address", self.address.is_some()),
            ("website_url", self.website_url.is_some()),
            ("metadata", self.metadata.is_some()),
        ];
        reject_foreign(&foreign, UserType::Influencer)?;

        if let Some(count) = self.follower_count {
            if count < 0 {
                return Err(RuleError::validation(
                    "follower_count",
                    "must not be negative",
                ));
            }
        }
        if let Some(rate) = self.engagement_rate {
            if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                return Err(RuleError::validation(
                    "engagement_rate",
                    format!("must be between 0 and 100, got {rate}"),
                ));
            }
        }
        Ok(())
    }

    fn validate_business(&self) -> Result<(), RuleError> {
        let foreign = [
            ("tiktok_handle", self.tiktok_handle.is_some()),
            ("follower_count", self.follower_count.is_some()),
            ("engagement_rate", self.engagement_rate.is_some()),
            ("niche", self.niche.is_some()),
        ];
        reject_foreign(&foreign, UserType::Business)?;

        let name = self.business_name.as_deref().unwrap_or_default();
        bounded("business_name", required("business_name", name)?.as_str(), 200)?;
        if let Some(ref url) = self.website_url {
            http_url("website_url", url)?;
        }
        if let Some(ref meta) = self.metadata {
            if !meta.is_object() {
                return Err(RuleError::validation("metadata", "must be a JSON object"));
            }
        }
        Ok(())
    }
}

fn reject_foreign(fields: &[(&'static str, bool)], user_type: UserType) -> Result<(), RuleError> {
    if let Some((field, _)) = fields.iter().find(|(_, present)| *present) {
        return Err(RuleError::validation(
            *field,
            format!("is not allowed on a {user_type} profile"),
        ));
    }
    Ok(())
}
