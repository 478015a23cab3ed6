//! Demo data file used by `barterlink-cli db seed`.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::offers::OfferDraft;
use crate::profiles::{ProfileDraft, UserType};
use crate::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct SeedOffer {
    pub business_email: String,
    #[serde(flatten)]
    pub offer: OfferDraft,
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub profiles: Vec<ProfileDraft>,
    #[serde(default)]
    pub offers: Vec<SeedOffer>,
}

/// Load and validate a seed file from YAML. Profiles and offers come back
/// normalized.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_seed(path: &Path) -> Result<SeedFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SeedFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let seed: SeedFile = serde_yaml::from_str(&content).map_err(ConfigError::SeedFileParse)?;

    validate_seed(seed)
}

fn validate_seed(seed: SeedFile) -> Result<SeedFile, ConfigError> {
    let mut profiles = Vec::with_capacity(seed.profiles.len());
    let mut seen_emails = HashSet::new();
    let mut business_emails = HashSet::new();

    for profile in seed.profiles {
        let raw_email = profile.email.clone();
        let profile = profile
            .validate()
            .map_err(|e| ConfigError::Validation(format!("profile '{raw_email}': {e}")))?;
        if !seen_emails.insert(profile.email.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate profile email: '{}'",
                profile.email
            )));
        }
        if profile.user_type == UserType::Business {
            business_emails.insert(profile.email.clone());
        }
        profiles.push(profile);
    }

    let mut offers = Vec::with_capacity(seed.offers.len());
    for SeedOffer {
        business_email,
        offer,
    } in seed.offers
    {
        let business_email = business_email.trim().to_lowercase();
        if !business_emails.contains(&business_email) {
            return Err(ConfigError::Validation(format!(
                "offer '{}' references unknown business '{business_email}'",
                offer.title
            )));
        }
        let title = offer.title.clone();
        let offer = offer
            .validate()
            .map_err(|e| ConfigError::Validation(format!("offer '{title}': {e}")))?;
        offers.push(SeedOffer {
            business_email,
            offer,
        });
    }

    Ok(SeedFile { profiles, offers })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r"
profiles:
  - user_type: business
    email: hello@cafeluna.com
    display_name: Cafe Luna
    avatar_url: null
    instagram_handle: cafeluna
    tiktok_handle: null
    follower_count: null
    engagement_rate: null
    niche: null
    business_name: Cafe Luna
    business_category: restaurant
    address: 1 Main St
    website_url: https://cafeluna.com
    metadata: null
  - user_type: influencer
    email: ana@example.com
    display_name: Ana
    avatar_url: null
    instagram_handle: '@ana.eats'
    tiktok_handle: null
    follower_count: 12000
    engagement_rate: '4.35'
    niche: food
    business_name: null
    business_category: null
    address: null
    website_url: null
    metadata: null
offers:
  - business_email: Hello@CafeLuna.com
    title: Brunch for two
    category: food
    location: Lisbon
    main_image_url: null
    requirements: [1 reel]
";

    #[test]
    fn seed_parses_and_normalizes() {
        let seed: SeedFile = serde_yaml::from_str(SEED).unwrap();
        let seed = validate_seed(seed).unwrap();
        assert_eq!(seed.profiles.len(), 2);
        assert_eq!(seed.profiles[1].instagram_handle.as_deref(), Some("ana.eats"));
        assert_eq!(seed.offers[0].business_email, "hello@cafeluna.com");
    }

    #[test]
    fn offer_for_unknown_business_is_rejected() {
        let yaml = SEED.replace("Hello@CafeLuna.com", "nobody@example.com");
        let seed: SeedFile = serde_yaml::from_str(&yaml).unwrap();
        let err = validate_seed(seed).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("unknown business")));
    }

    #[test]
    fn duplicate_emails_are_rejected() {
        let yaml = SEED.replace("ana@example.com", "HELLO@cafeluna.com");
        let seed: SeedFile = serde_yaml::from_str(&yaml).unwrap();
        let err = validate_seed(seed).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_seed(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::SeedFileIo { ref path, .. } if path.contains("not/here")));
    }

    #[test]
    fn bundled_seed_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/seed.yaml");
        let seed = load_seed(&path).unwrap();
        assert!(seed
            .profiles
            .iter()
            .any(|p| p.user_type == UserType::Business));
        assert!(!seed.offers.is_empty());
    }
}
