use crate::model::org::{OrgSettings, Organization};
use anyhow::{Context, Result, bail};
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// Parsed org attendance configuration, resolved once per organization and
/// reused across requests instead of re-reading the settings blob each call.
static ORG_SETTINGS_CACHE: Lazy<Cache<u64, Arc<OrgSettings>>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(300)) // 5 min TTL
        .build()
});

pub async fn get_org_settings(pool: &MySqlPool, organization_id: u64) -> Result<Arc<OrgSettings>> {
    if let Some(settings) = ORG_SETTINGS_CACHE.get(&organization_id).await {
        return Ok(settings);
    }

    let row = sqlx::query_as::<_, Organization>(
        r#"
        SELECT id, name, default_shift_id, enable_geo_fencing,
               max_location_settings_count, shift_priority, status
        FROM organizations
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(organization_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch organization")?;

    let Some(row) = row else {
        bail!("organization {} not found or inactive", organization_id);
    };

    let settings = Arc::new(OrgSettings::try_from_row(&row)?);
    ORG_SETTINGS_CACHE
        .insert(organization_id, settings.clone())
        .await;
    Ok(settings)
}
