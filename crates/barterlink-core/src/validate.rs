//! Field-level checks shared by the profile, offer and proof validators.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use crate::RuleError;

static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._]{1,30}$").unwrap_or_else(|e| panic!("invalid handle regex: {e}"))
});

/// Trim `value` and reject it when blank.
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, RuleError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RuleError::validation(field, "is required"));
    }
    Ok(trimmed.to_owned())
}

/// Trim an optional value; blank becomes `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

pub(crate) fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), RuleError> {
    if value.chars().count() > max {
        return Err(RuleError::validation(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

/// Parse an absolute `http`/`https` URL with a host.
pub(crate) fn http_url(field: &'static str, value: &str) -> Result<Url, RuleError> {
    let url = Url::parse(value.trim())
        .map_err(|_| RuleError::validation(field, format!("must be a valid URL, got '{value}'")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(RuleError::validation(
            field,
            format!("must be an http(s) URL, got '{value}'"),
        ));
    }
    Ok(url)
}

/// Normalize a social handle: strip a leading `@`, then require 1–30 of
/// `[A-Za-z0-9._]`.
pub(crate) fn handle(field: &'static str, value: &str) -> Result<String, RuleError> {
    let stripped = value.trim().trim_start_matches('@');
    if !HANDLE_RE.is_match(stripped) {
        return Err(RuleError::validation(
            field,
            format!("'{value}' is not a valid handle"),
        ));
    }
    Ok(stripped.to_owned())
}

pub(crate) fn email(value: &str) -> Result<String, RuleError> {
    let trimmed = value.trim().to_lowercase();
    let valid = trimmed
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(RuleError::validation(
            "email",
            format!("'{value}' is not a valid email address"),
        ));
    }
    Ok(trimmed)
}
