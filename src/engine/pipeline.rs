use crate::auth::device::{DeviceAuthError, verify_device_token};
use crate::config::Config;
use crate::engine::encoder::FaceEncoder;
use crate::engine::face::{self, FaceEncoding, FaceMatchError};
use crate::engine::geo::{self, Candidate};
use crate::engine::shift_resolver::{self, ResolvedShift};
use crate::engine::timeband::TimeBand;
use crate::model::kiosk::Kiosk;
use crate::model::location::SystemLocation;
use crate::model::member::{Member, MemberImage};
use crate::model::scan::{MemberScan, ScanStatus, ScanType};
use crate::utils::{enrollment_filter, gallery_cache, org_cache};
use chrono::{Duration, NaiveDateTime};
use derive_more::Display;
use sqlx::MySqlPool;
use tracing::warn;

#[derive(Debug, Display)]
pub enum ScanRejection {
    #[display(fmt = "Device Identifier Token Missing")]
    TokenMissing,
    #[display(fmt = "Device Identifier Token Expired")]
    TokenExpired,
    #[display(fmt = "Device Identifier Token Mismatched")]
    TokenMismatch,
    #[display(fmt = "Kiosk is not registered or inactive")]
    UnknownKiosk,
    #[display(fmt = "Member is not registered or inactive")]
    UnknownMember,
    #[display(fmt = "Last scan was less than {} minutes ago", _0)]
    DuplicateScan(i64),
    #[display(fmt = "No shift assigned for this date")]
    NoShiftAssigned,
    #[display(fmt = "Check-in window is closed for this shift")]
    CheckInWindowClosed,
    #[display(fmt = "Coordinates are required for this scan")]
    CoordinatesRequired,
    #[display(fmt = "Location Does Not Match")]
    LocationMismatch,
    #[display(fmt = "{}", _0)]
    Face(FaceMatchError),
}

#[derive(Debug)]
pub enum SubmitError {
    Rejected(ScanRejection),
    Internal(anyhow::Error),
}

impl From<ScanRejection> for SubmitError {
    fn from(r: ScanRejection) -> Self {
        SubmitError::Rejected(r)
    }
}

impl From<anyhow::Error> for SubmitError {
    fn from(e: anyhow::Error) -> Self {
        SubmitError::Internal(e)
    }
}

impl From<sqlx::Error> for SubmitError {
    fn from(e: sqlx::Error) -> Self {
        SubmitError::Internal(e.into())
    }
}

impl From<DeviceAuthError> for SubmitError {
    fn from(e: DeviceAuthError) -> Self {
        SubmitError::Rejected(match e {
            DeviceAuthError::Missing => ScanRejection::TokenMissing,
            DeviceAuthError::Expired => ScanRejection::TokenExpired,
            DeviceAuthError::Mismatch => ScanRejection::TokenMismatch,
        })
    }
}

// Encoder outages and corrupt stored encodings are infrastructure faults,
// not scan rejections.
fn map_face_error(e: FaceMatchError) -> SubmitError {
    match e {
        FaceMatchError::Encoder(msg) => {
            SubmitError::Internal(anyhow::anyhow!("face encoder failure: {}", msg))
        }
        FaceMatchError::CorruptEncoding => {
            SubmitError::Internal(anyhow::anyhow!("corrupt enrolled encoding"))
        }
        other => SubmitError::Rejected(ScanRejection::Face(other)),
    }
}

#[derive(Debug)]
pub struct ScanRequest {
    pub kiosk_id: u64,
    pub device_token: String,
    /// Claimed identity. When absent, the member is identified by matching
    /// the probe against every enrolled face in the organization.
    pub member_id: Option<u64>,
    pub image: Vec<u8>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub scan_type: ScanType,
    pub at: NaiveDateTime,
}

/// The shift window a scan at `at` belongs to. For a wrapping band, times
/// before the band's end belong to the window that opened the previous day.
pub fn scan_window(band: &TimeBand, at: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let date = if band.wraps() && at.time() < band.end {
        at.date() - Duration::days(1)
    } else {
        at.date()
    };
    band.window_on(date)
}

/// Check-in gate: never past the shift's end; when the shift restricts
/// check-in, never past its start either.
pub fn check_in_window(
    band: &TimeBand,
    at: NaiveDateTime,
    restrict_after_start: bool,
) -> Result<(), ScanRejection> {
    let (start, end) = scan_window(band, at);
    if at > end {
        return Err(ScanRejection::CheckInWindowClosed);
    }
    if restrict_after_start && at > start {
        return Err(ScanRejection::CheckInWindowClosed);
    }
    Ok(())
}

/// Validates and persists one check-in/check-out scan. Every gate is hard:
/// nothing is written unless all of them pass. The face probe is encoded
/// before the insert transaction opens so no DB locks are held during the
/// CPU-bound step.
pub async fn submit_scan(
    pool: &MySqlPool,
    config: &Config,
    encoder: &dyn FaceEncoder,
    req: &ScanRequest,
) -> Result<MemberScan, SubmitError> {
    // 1. device identity
    let kiosk = fetch_kiosk(pool, req.kiosk_id)
        .await?
        .ok_or(ScanRejection::UnknownKiosk)?;
    verify_device_token(
        kiosk.dit.as_deref(),
        kiosk.dit_expiry,
        &req.device_token,
        kiosk.id,
        req.at,
        &config.jwt_secret,
    )?;

    // who is scanning: the claimed member, or whoever the probe matches
    // across the organization's whole gallery
    let (member_id, identified_by_face) = match req.member_id {
        Some(member_id) => (member_id, false),
        None => {
            let gallery = organization_gallery(pool, kiosk.organization_id).await?;
            let probe = encoder.encode(&req.image).await.map_err(map_face_error)?;
            let hit = match face::identify(&probe, &gallery, config.face_tolerance) {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(kiosk_id = kiosk.id, error = %e, details = ?e, "face identification failed");
                    return Err(map_face_error(e));
                }
            };
            tracing::debug!(
                member_id = hit.member_id,
                distance = hit.distance,
                "face identified"
            );
            (hit.member_id, true)
        }
    };

    let member = fetch_member(pool, member_id, kiosk.organization_id)
        .await?
        .ok_or(ScanRejection::UnknownMember)?;

    // 2. duplicate-scan guard (fast path; re-checked under lock at insert)
    let cooldown = Duration::seconds(config.scan_cooldown_secs);
    if let Some(last) = latest_scan_time(pool, member.id).await? {
        if req.at - last < cooldown {
            return Err(ScanRejection::DuplicateScan(cooldown.num_minutes()).into());
        }
    }

    // 3. shift resolution
    let org = org_cache::get_org_settings(pool, member.organization_id).await?;
    let resolved = shift_resolver::resolve(pool, &org, &member, req.at.date())
        .await?
        .ok_or(ScanRejection::NoShiftAssigned)?;
    let shift_settings = resolved.shift.parsed_settings()?;

    // 4. time window (check-in only)
    if req.scan_type == ScanType::CheckIn {
        check_in_window(
            &resolved.shift.band(),
            req.at,
            shift_settings.restrict_check_in_after_start,
        )?;
    }

    // 5. geofencing
    let geofencing = org.enable_geo_fencing && resolved.shift.enable_geo_fencing;
    let system_location_id = match req.scan_type {
        ScanType::CheckIn => {
            let candidates = check_in_candidates(pool, &resolved, req.at).await?;
            if geofencing {
                match (req.latitude, req.longitude) {
                    (Some(lat), Some(lon)) => {
                        if candidates.is_empty() {
                            return Err(ScanRejection::LocationMismatch.into());
                        }
                        let hit = geo::first_match(lat, lon, &candidates)
                            .ok_or(ScanRejection::LocationMismatch)?;
                        Some(hit.location_id.clone())
                    }
                    _ => return Err(ScanRejection::CoordinatesRequired.into()),
                }
            } else {
                candidates.first().map(|c| c.location_id.clone())
            }
        }
        ScanType::CheckOut => {
            let candidate = check_out_candidate(pool, member.id, &resolved).await?;
            match (geofencing, candidate) {
                (true, Some(candidate)) => {
                    let (lat, lon) = match (req.latitude, req.longitude) {
                        (Some(lat), Some(lon)) => (lat, lon),
                        _ => return Err(ScanRejection::CoordinatesRequired.into()),
                    };
                    if !geo::within(lat, lon, &candidate) {
                        return Err(ScanRejection::LocationMismatch.into());
                    }
                    Some(candidate.location_id)
                }
                (_, candidate) => candidate.map(|c| c.location_id),
            }
        }
    };

    // 6. face verification, scoped to the claimed member's own gallery.
    // Skipped when the member was already identified by the org-wide match.
    if !identified_by_face {
        if !enrollment_filter::might_have_images(member.id) {
            return Err(map_face_error(FaceMatchError::NoEnrollment));
        }
        let gallery = gallery_cache::get_gallery(pool, member.id).await?;
        let probe = encoder.encode(&req.image).await.map_err(map_face_error)?;
        match face::verify(&probe, member.id, &gallery, config.face_tolerance) {
            Ok(hit) => {
                tracing::debug!(
                    member_id = member.id,
                    distance = hit.distance,
                    "face verified"
                );
            }
            Err(e) => {
                warn!(member_id = member.id, error = %e, details = ?e, "face verification failed");
                return Err(map_face_error(e));
            }
        }
    }

    // 7. persist, with the duplicate guard re-evaluated under a row lock so
    // two near-simultaneous scans cannot both pass
    let mut tx = pool.begin().await?;
    let last: Option<NaiveDateTime> = sqlx::query_scalar(
        r#"
        SELECT date_time FROM member_scans
        WHERE member_id = ?
        ORDER BY date_time DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(member.id)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(last) = last {
        if req.at - last < cooldown {
            return Err(ScanRejection::DuplicateScan(cooldown.num_minutes()).into());
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO member_scans
            (member_id, organization_id, system_location_id, kiosk_id,
             date_time, scan_type, latitude, longitude, is_computed, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(member.id)
    .bind(member.organization_id)
    .bind(&system_location_id)
    .bind(kiosk.id)
    .bind(req.at)
    .bind(req.scan_type.to_string())
    .bind(req.latitude)
    .bind(req.longitude)
    .bind(ScanStatus::Pending.to_string())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(MemberScan {
        id: result.last_insert_id(),
        member_id: member.id,
        organization_id: member.organization_id,
        system_location_id,
        kiosk_id: Some(kiosk.id),
        date_time: req.at,
        scan_type: req.scan_type.to_string(),
        latitude: req.latitude,
        longitude: req.longitude,
        is_computed: false,
        status: ScanStatus::Pending.to_string(),
        metadata: None,
    })
}

async fn fetch_kiosk(pool: &MySqlPool, kiosk_id: u64) -> Result<Option<Kiosk>, SubmitError> {
    let kiosk = sqlx::query_as::<_, Kiosk>(
        r#"
        SELECT id, organization_id, name, dit, dit_expiry, status
        FROM kiosks
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(kiosk_id)
    .fetch_optional(pool)
    .await?;
    Ok(kiosk)
}

async fn fetch_member(
    pool: &MySqlPool,
    member_id: u64,
    organization_id: u64,
) -> Result<Option<Member>, SubmitError> {
    let member = sqlx::query_as::<_, Member>(
        r#"
        SELECT id, organization_id, user_id, role_id, department_id, designation_id,
               org_location_id, manager_id, shift_id, employee_code, status
        FROM members
        WHERE id = ? AND organization_id = ? AND status = 'active'
        "#,
    )
    .bind(member_id)
    .bind(organization_id)
    .fetch_optional(pool)
    .await?;
    Ok(member)
}

/// Every enrolled encoding across the organization's active members, for
/// the claim-less identification path.
async fn organization_gallery(
    pool: &MySqlPool,
    organization_id: u64,
) -> Result<Vec<(u64, FaceEncoding)>, SubmitError> {
    let rows = sqlx::query_as::<_, MemberImage>(
        r#"
        SELECT mi.id, mi.member_id, mi.organization_id, mi.image_path, mi.encoding
        FROM member_images mi
        JOIN members m ON m.id = mi.member_id
        WHERE mi.organization_id = ? AND m.status = 'active'
        ORDER BY mi.member_id ASC, mi.id ASC
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    let mut gallery = Vec::with_capacity(rows.len());
    for image in rows {
        match FaceEncoding::from_json(&image.encoding) {
            Ok(encoding) => gallery.push((image.member_id, encoding)),
            Err(e) => log::warn!(
                "skipping corrupt encoding {} for member {}: {}",
                image.id,
                image.member_id,
                e
            ),
        }
    }
    Ok(gallery)
}

async fn latest_scan_time(
    pool: &MySqlPool,
    member_id: u64,
) -> Result<Option<NaiveDateTime>, SubmitError> {
    let last = sqlx::query_scalar(
        r#"
        SELECT date_time FROM member_scans
        WHERE member_id = ?
        ORDER BY date_time DESC
        LIMIT 1
        "#,
    )
    .bind(member_id)
    .fetch_optional(pool)
    .await?;
    Ok(last)
}

/// Location candidates for a check-in, in a stable order: active
/// location-settings windows first (by id), then the shift's default
/// location when none apply.
async fn check_in_candidates(
    pool: &MySqlPool,
    resolved: &ResolvedShift,
    at: NaiveDateTime,
) -> Result<Vec<Candidate>, SubmitError> {
    let mut location_ids: Vec<String> = resolved
        .location_settings
        .iter()
        .filter(|ls| ls.band().contains(at.time()))
        .map(|ls| ls.system_location_id.clone())
        .collect();

    if location_ids.is_empty() {
        if let Some(default_id) = &resolved.shift.system_location_id {
            location_ids.push(default_id.clone());
        }
    }

    let mut candidates = Vec::with_capacity(location_ids.len());
    for id in location_ids {
        if let Some(location) = fetch_location(pool, &id).await? {
            candidates.push(location.as_candidate());
        }
    }
    Ok(candidates)
}

/// A check-out is tested against the originating check-in's location, or the
/// shift default when the check-in carried none.
async fn check_out_candidate(
    pool: &MySqlPool,
    member_id: u64,
    resolved: &ResolvedShift,
) -> Result<Option<Candidate>, SubmitError> {
    let origin: Option<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT system_location_id FROM member_scans
        WHERE member_id = ? AND scan_type = 'check_in' AND is_computed = 0
        ORDER BY date_time DESC
        LIMIT 1
        "#,
    )
    .bind(member_id)
    .fetch_optional(pool)
    .await?;

    let location_id = origin
        .flatten()
        .or_else(|| resolved.shift.system_location_id.clone());

    match location_id {
        Some(id) => Ok(fetch_location(pool, &id).await?.map(|l| l.as_candidate())),
        None => Ok(None),
    }
}

async fn fetch_location(
    pool: &MySqlPool,
    location_id: &str,
) -> Result<Option<SystemLocation>, SubmitError> {
    let location = sqlx::query_as::<_, SystemLocation>(
        r#"
        SELECT id, organization_id, name, latitude, longitude, radius, status
        FROM system_locations
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(location_id)
    .fetch_optional(pool)
    .await?;
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dt(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn day_shift_check_in_closes_after_end() {
        let band = TimeBand::new(t(9, 0), t(17, 0));
        assert!(check_in_window(&band, dt(3, 8, 30), false).is_ok());
        assert!(check_in_window(&band, dt(3, 16, 59), false).is_ok());
        assert!(check_in_window(&band, dt(3, 17, 10), false).is_err());
    }

    #[test]
    fn restricted_check_in_closes_after_start() {
        let band = TimeBand::new(t(9, 0), t(17, 0));
        assert!(check_in_window(&band, dt(3, 8, 30), true).is_ok());
        assert!(check_in_window(&band, dt(3, 9, 1), true).is_err());
    }

    #[test]
    fn night_shift_check_in_spans_midnight() {
        let band = TimeBand::new(t(22, 0), t(6, 0));
        // before and after midnight, inside the window
        assert!(check_in_window(&band, dt(3, 23, 30), false).is_ok());
        assert!(check_in_window(&band, dt(4, 3, 0), false).is_ok());
        // past the 06:00 end of the window that opened on the 3rd
        assert!(check_in_window(&band, dt(4, 6, 30), false).is_ok()); // next window's early arrival
        assert!(check_in_window(&band, dt(4, 5, 59), false).is_ok());
    }

    #[test]
    fn night_shift_window_attribution() {
        let band = TimeBand::new(t(22, 0), t(6, 0));
        // 03:00 on the 4th belongs to the window opened on the 3rd
        let (start, end) = scan_window(&band, dt(4, 3, 0));
        assert_eq!(start, dt(3, 22, 0));
        assert_eq!(end, dt(4, 6, 0));
        // 23:00 on the 3rd belongs to the same window
        let (start2, end2) = scan_window(&band, dt(3, 23, 0));
        assert_eq!((start2, end2), (start, end));
    }

    #[test]
    fn restricted_night_check_in_after_start_is_closed() {
        let band = TimeBand::new(t(22, 0), t(6, 0));
        assert!(check_in_window(&band, dt(3, 21, 30), true).is_ok());
        assert!(check_in_window(&band, dt(3, 23, 0), true).is_err());
    }
}
