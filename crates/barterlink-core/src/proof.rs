//! Content proof: the deliverable an influencer submits once a collaboration
//! is active.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::{bounded, http_url, optional};
use crate::RuleError;

const MAX_FILENAME_LEN: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentProof {
    #[serde(default)]
    pub video_url: String,
    pub video_filename: Option<String>,
    #[serde(default)]
    pub social_media_post_url: String,
    #[serde(default)]
    pub has_tagged_business: bool,
    #[serde(default)]
    pub has_sent_collab_request: bool,
    pub proof_image_url: Option<String>,
}

/// A proof that passed [`ContentProof::validate`]; the only form the
/// persistence layer accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedProof {
    pub video_url: String,
    pub video_filename: Option<String>,
    pub social_media_post_url: String,
    pub proof_image_url: Option<String>,
}

impl ContentProof {
    /// Re-check every field server-side; clients are not trusted to have
    /// blocked an incomplete submission.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Validation`] naming the first failing field.
    pub fn validate(&self) -> Result<ValidatedProof, RuleError> {
        let video_url = self.video_url.trim();
        if video_url.is_empty() {
            return Err(RuleError::validation("video_url", "is required"));
        }
        http_url("video_url", video_url)?;

        let post_url = self.social_media_post_url.trim();
        if post_url.is_empty() {
            return Err(RuleError::validation("social_media_post_url", "is required"));
        }
        http_url("social_media_post_url", post_url)?;

        if !self.has_tagged_business {
            return Err(RuleError::validation(
                "has_tagged_business",
                "you must confirm the business was tagged",
            ));
        }
        if !self.has_sent_collab_request {
            return Err(RuleError::validation(
                "has_sent_collab_request",
                "you must confirm the collab request was sent",
            ));
        }

        let proof_image_url = optional(self.proof_image_url.as_deref());
        if let Some(ref url) = proof_image_url {
            http_url("proof_image_url", url)?;
        }
        let video_filename = optional(self.video_filename.as_deref());
        if let Some(ref name) = video_filename {
            bounded("video_filename", name, 255)?;
        }

        Ok(ValidatedProof {
            video_url: video_url.to_owned(),
            video_filename,
            social_media_post_url: post_url.to_owned(),
            proof_image_url,
        })
    }
}

/// Reduce an uploaded filename to `[A-Za-z0-9._-]`, collapsing runs of other
/// characters into a single `-`. Never returns an empty string.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed: String = out
        .trim_matches(|c| c == '-' || c == '.')
        .chars()
        .take(MAX_FILENAME_LEN)
        .collect();
    if trimmed.is_empty() {
        "video".to_owned()
    } else {
        trimmed
    }
}

/// Bucket path for a proof video. `upload_id` keeps repeated uploads of the
/// same filename apart.
#[must_use]
pub fn video_object_path(collaboration_id: Uuid, upload_id: Uuid, filename: &str) -> String {
    format!(
        "collaborations/{collaboration_id}/{upload_id}-{}",
        sanitize_filename(filename)
    )
}
