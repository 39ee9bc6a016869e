use crate::engine::face::FaceEncoding;
use crate::model::member::MemberImage;
use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// Per-member face gallery: (owner member id, encoding) pairs, shared so the
/// matcher never clones encodings per scan.
pub type Gallery = Arc<Vec<(u64, FaceEncoding)>>;

pub static GALLERY_CACHE: Lazy<Cache<u64, Gallery>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000) // tune based on enrolled headcount
        .time_to_live(Duration::from_secs(3600)) // 1h TTL
        .build()
});

/// Fetch a member's gallery, loading and caching on miss.
pub async fn get_gallery(pool: &MySqlPool, member_id: u64) -> Result<Gallery> {
    if let Some(gallery) = GALLERY_CACHE.get(&member_id).await {
        return Ok(gallery);
    }
    let gallery = load_gallery(pool, member_id).await?;
    GALLERY_CACHE.insert(member_id, gallery.clone()).await;
    Ok(gallery)
}

/// Drop a member's cached gallery (call after enrollment changes).
pub async fn invalidate(member_id: u64) {
    GALLERY_CACHE.invalidate(&member_id).await;
}

async fn load_gallery(pool: &MySqlPool, member_id: u64) -> Result<Gallery> {
    let rows = sqlx::query_as::<_, MemberImage>(
        r#"
        SELECT id, member_id, organization_id, image_path, encoding
        FROM member_images
        WHERE member_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(member_id)
    .fetch_all(pool)
    .await?;

    let mut gallery = Vec::with_capacity(rows.len());
    for image in rows {
        match FaceEncoding::from_json(&image.encoding) {
            Ok(encoding) => gallery.push((image.member_id, encoding)),
            // a corrupt row must not block the member's remaining samples
            Err(e) => log::warn!("skipping corrupt encoding {} for member {}: {}", image.id, image.member_id, e),
        }
    }
    Ok(Arc::new(gallery))
}

/// Pre-load galleries for members who scanned recently, in batches.
pub async fn warmup_gallery_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (u64,)>(
        r#"
        SELECT DISTINCT member_id
        FROM member_scans
        WHERE date_time >= NOW() - INTERVAL ? DAY
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (member_id,) = row?;
        batch.push(member_id);
        total += 1;

        if batch.len() >= batch_size {
            warm_batch(pool, &batch).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        warm_batch(pool, &batch).await;
    }

    log::info!(
        "Gallery cache warmup complete: {} recent scanners (last {} days)",
        total,
        days
    );

    Ok(())
}

async fn warm_batch(pool: &MySqlPool, member_ids: &[u64]) {
    for member_id in member_ids {
        if let Err(e) = get_gallery(pool, *member_id).await {
            log::warn!("gallery warmup failed for member {}: {}", member_id, e);
        }
    }
}
