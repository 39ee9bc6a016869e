use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

/// Expected capacity and false-positive rate.
/// Tune these based on real enrollment counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Members with at least one enrolled face image. A negative answer is
/// authoritative, so the scan pipeline can reject "no enrollment" without
/// touching the gallery at all.
static ENROLLMENT_FILTER: Lazy<RwLock<CuckooFilter<u64>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Check if a member might have enrolled images (false positives possible).
pub fn might_have_images(member_id: u64) -> bool {
    ENROLLMENT_FILTER
        .read()
        .expect("enrollment filter poisoned")
        .contains(&member_id)
}

/// Record a member's first (or any) enrollment.
pub fn insert(member_id: u64) {
    ENROLLMENT_FILTER
        .write()
        .expect("enrollment filter poisoned")
        .add(&member_id);
}

/// Remove a member once their last image is deleted.
pub fn remove(member_id: u64) {
    ENROLLMENT_FILTER
        .write()
        .expect("enrollment filter poisoned")
        .remove(&member_id);
}

/// Warm up the enrollment filter using streaming + batching
pub async fn warmup_enrollment_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream =
        sqlx::query_as::<_, (u64,)>("SELECT DISTINCT member_id FROM member_images").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (member_id,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(member_id);
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Enrollment filter warmup complete: {} members", total);
    Ok(())
}

fn insert_batch(member_ids: &[u64]) {
    let mut filter = ENROLLMENT_FILTER
        .write()
        .expect("enrollment filter poisoned");

    for member_id in member_ids {
        filter.add(member_id);
    }
}
