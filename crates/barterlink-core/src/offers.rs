use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validate::{bounded, http_url, optional, required};
use crate::RuleError;

pub const MAX_REQUIREMENTS: usize = 20;
pub const MAX_IMAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    #[default]
    Active,
    Draft,
}

impl OfferStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draft => "draft",
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "draft" => Ok(Self::Draft),
            other => Err(RuleError::UnknownValue {
                kind: "offer status",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub location: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub main_image_url: Option<String>,
    #[serde(default)]
    pub status: OfferStatus,
}

/// Sparse offer update. `main_image_url` clears on an empty string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub image_urls: Option<Vec<String>>,
    pub main_image_url: Option<String>,
    pub status: Option<OfferStatus>,
}

impl OfferDraft {
    #[must_use]
    pub fn apply(mut self, patch: OfferPatch) -> Self {
        if let Some(v) = patch.title {
            self.title = v;
        }
        if let Some(v) = patch.description {
            self.description = v;
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.location {
            self.location = v;
        }
        if let Some(v) = patch.requirements {
            self.requirements = v;
        }
        if let Some(v) = patch.image_urls {
            self.image_urls = v;
        }
        if let Some(v) = patch.main_image_url {
            self.main_image_url = optional(Some(&v));
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        self
    }

    /// Normalize and validate an offer before it is written.
    ///
    /// Blank requirement lines are dropped. When no main image is given the
    /// first gallery image is used.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Validation`] naming the first failing field.
    pub fn validate(self) -> Result<Self, RuleError> {
        let title = required("title", &self.title)?;
        bounded("title", &title, 200)?;
        let description = self.description.trim().to_owned();
        bounded("description", &description, 5000)?;
        let category = required("category", &self.category)?;
        let location = required("location", &self.location)?;

        let requirements: Vec<String> = self
            .requirements
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        if requirements.len() > MAX_REQUIREMENTS {
            return Err(RuleError::validation(
                "requirements",
                format!("at most {MAX_REQUIREMENTS} requirements are allowed"),
            ));
        }
        for r in &requirements {
            bounded("requirements", r, 300)?;
        }

        if self.image_urls.len() > MAX_IMAGES {
            return Err(RuleError::validation(
                "image_urls",
                format!("at most {MAX_IMAGES} images are allowed"),
            ));
        }
        let image_urls = self
            .image_urls
            .iter()
            .map(|u| http_url("image_urls", u).map(|_| u.trim().to_owned()))
            .collect::<Result<Vec<_>, _>>()?;

        let main_image_url = match optional(self.main_image_url.as_deref()) {
            Some(url) => {
                http_url("main_image_url", &url)?;
                Some(url)
            }
            None => image_urls.first().cloned(),
        };

        Ok(Self {
            title,
            description,
            category,
            location,
            requirements,
            image_urls,
            main_image_url,
            status: self.status,
        })
    }
}
