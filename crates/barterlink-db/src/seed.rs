use barterlink_core::SeedFile;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Counts reported by [`seed_demo_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub profiles: usize,
    pub offers_inserted: usize,
    pub offers_skipped: usize,
}

/// Upsert seed profiles (keyed by email) and insert seed offers that do not
/// already exist for their business under the same title.
///
/// All writes run inside a single transaction; if any operation fails the
/// entire batch is rolled back. The seed must already be validated by
/// [`barterlink_core::load_seed`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_demo_data(pool: &PgPool, seed: &SeedFile) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();

    for profile in &seed.profiles {
        sqlx::query(
            "INSERT INTO profiles (id, user_type, email, display_name, avatar_url, \
                 instagram_handle, tiktok_handle, follower_count, engagement_rate, niche, \
                 business_name, business_category, address, website_url, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             ON CONFLICT (email) DO UPDATE SET \
                 display_name = EXCLUDED.display_name, \
                 avatar_url = EXCLUDED.avatar_url, \
                 instagram_handle = EXCLUDED.instagram_handle, \
                 tiktok_handle = EXCLUDED.tiktok_handle, \
                 follower_count = EXCLUDED.follower_count, \
                 engagement_rate = EXCLUDED.engagement_rate, \
                 niche = EXCLUDED.niche, \
                 business_name = EXCLUDED.business_name, \
                 business_category = EXCLUDED.business_category, \
                 address = EXCLUDED.address, \
                 website_url = EXCLUDED.website_url, \
                 metadata = EXCLUDED.metadata, \
                 updated_at = NOW()",
        )
        .bind(Uuid::new_v4())
        .bind(profile.user_type.as_str())
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .bind(&profile.instagram_handle)
        .bind(&profile.tiktok_handle)
        .bind(profile.follower_count)
        .bind(profile.engagement_rate)
        .bind(&profile.niche)
        .bind(&profile.business_name)
        .bind(&profile.business_category)
        .bind(&profile.address)
        .bind(&profile.website_url)
        .bind(&profile.metadata)
        .execute(&mut *tx)
        .await?;

        summary.profiles += 1;
    }

    for seed_offer in &seed.offers {
        let offer = &seed_offer.offer;
        let inserted = sqlx::query(
            "INSERT INTO offers (id, business_id, title, description, category, location, \
                 requirements, image_urls, main_image_url, status) \
             SELECT $1, p.id, $3, $4, $5, $6, $7, $8, $9, $10 \
             FROM profiles p \
             WHERE p.email = $2 AND p.user_type = 'business' \
               AND NOT EXISTS ( \
                   SELECT 1 FROM offers o WHERE o.business_id = p.id AND o.title = $3 \
               )",
        )
        .bind(Uuid::new_v4())
        .bind(&seed_offer.business_email)
        .bind(&offer.title)
        .bind(&offer.description)
        .bind(&offer.category)
        .bind(&offer.location)
        .bind(&offer.requirements)
        .bind(&offer.image_urls)
        .bind(&offer.main_image_url)
        .bind(offer.status.as_str())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            summary.offers_inserted += 1;
        } else {
            summary.offers_skipped += 1;
        }
    }

    tx.commit().await?;

    tracing::info!(
        profiles = summary.profiles,
        offers_inserted = summary.offers_inserted,
        offers_skipped = summary.offers_skipped,
        "seed applied"
    );
    Ok(summary)
}
