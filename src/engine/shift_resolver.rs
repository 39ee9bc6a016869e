use crate::model::member::Member;
use crate::model::org::OrgSettings;
use crate::model::shift::{LocationSettings, Shift, ShiftScheduleLog, ShiftSource};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::MySqlPool;

/// Shift pointers gathered from the organizational directory for one member.
#[derive(Debug, Default, Clone)]
pub struct ShiftCandidates {
    pub member: Option<u64>,
    pub designation: Option<u64>,
    pub department: Option<u64>,
    pub org_location: Option<u64>,
}

/// The highest-priority non-null source wins. A member with a personal shift
/// keeps it even when their department carries one, as long as the org's
/// priority list says so.
pub fn pick_by_precedence(priority: &[ShiftSource], candidates: &ShiftCandidates) -> Option<u64> {
    priority.iter().find_map(|source| match source {
        ShiftSource::Member => candidates.member,
        ShiftSource::Designation => candidates.designation,
        ShiftSource::Department => candidates.department,
        ShiftSource::OrgLocation => candidates.org_location,
    })
}

#[derive(Debug)]
pub struct ResolvedShift {
    pub shift: Shift,
    /// Location windows attached to the covering schedule log and valid on
    /// the resolved date. Empty for precedence/default resolutions.
    pub location_settings: Vec<LocationSettings>,
}

/// Effective shift for a member on a date: active schedule log first, then
/// the org precedence chain, then the org default shift. None means no
/// shift is resolvable at all.
pub async fn resolve(
    pool: &MySqlPool,
    org: &OrgSettings,
    member: &Member,
    date: NaiveDate,
) -> Result<Option<ResolvedShift>> {
    let log = sqlx::query_as::<_, ShiftScheduleLog>(
        r#"
        SELECT id, member_id, shift_id, start_date, end_date, status
        FROM shift_schedule_logs
        WHERE member_id = ?
          AND status = 'active'
          AND start_date <= ?
          AND (end_date IS NULL OR end_date >= ?)
        ORDER BY start_date DESC
        LIMIT 1
        "#,
    )
    .bind(member.id)
    .bind(date)
    .bind(date)
    .fetch_optional(pool)
    .await
    .context("failed to fetch shift schedule log")?;

    if let Some(log) = log {
        let Some(shift) = fetch_shift(pool, log.shift_id).await? else {
            return Ok(None);
        };
        let location_settings = sqlx::query_as::<_, LocationSettings>(
            r#"
            SELECT id, shift_schedule_log_id, system_location_id,
                   start_time, end_time, applicable_start_date, applicable_end_date
            FROM location_settings
            WHERE shift_schedule_log_id = ?
              AND applicable_start_date <= ?
              AND applicable_end_date >= ?
            ORDER BY id ASC
            "#,
        )
        .bind(log.id)
        .bind(date)
        .bind(date)
        .fetch_all(pool)
        .await
        .context("failed to fetch location settings")?;

        return Ok(Some(ResolvedShift {
            shift,
            location_settings,
        }));
    }

    let candidates = ShiftCandidates {
        member: member.shift_id,
        designation: directory_shift(pool, "designations", member.designation_id).await?,
        department: directory_shift(pool, "departments", member.department_id).await?,
        org_location: directory_shift(pool, "org_locations", member.org_location_id).await?,
    };

    let shift_id = pick_by_precedence(&org.shift_priority, &candidates).or(org.default_shift_id);

    match shift_id {
        Some(id) => Ok(fetch_shift(pool, id).await?.map(|shift| ResolvedShift {
            shift,
            location_settings: Vec::new(),
        })),
        None => Ok(None),
    }
}

async fn fetch_shift(pool: &MySqlPool, shift_id: u64) -> Result<Option<Shift>> {
    sqlx::query_as::<_, Shift>(
        r#"
        SELECT id, organization_id, name, start_time, end_time, computation_time,
               overtime_threshold, enable_geo_fencing, system_location_id, settings, status
        FROM shifts
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(shift_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch shift")
}

async fn directory_shift(
    pool: &MySqlPool,
    table: &str,
    row_id: Option<u64>,
) -> Result<Option<u64>> {
    let Some(row_id) = row_id else {
        return Ok(None);
    };
    let sql = format!(
        "SELECT shift_id FROM {} WHERE id = ? AND status = 'active'",
        table
    );
    let shift_id = sqlx::query_scalar::<_, Option<u64>>(&sql)
        .bind(row_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch shift pointer from {}", table))?;
    Ok(shift_id.flatten())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_PRIORITY: [ShiftSource; 4] = [
        ShiftSource::Member,
        ShiftSource::Designation,
        ShiftSource::Department,
        ShiftSource::OrgLocation,
    ];

    #[test]
    fn personal_shift_beats_department_shift() {
        let candidates = ShiftCandidates {
            member: Some(10),
            department: Some(20),
            ..Default::default()
        };
        assert_eq!(pick_by_precedence(&DEFAULT_PRIORITY, &candidates), Some(10));
    }

    #[test]
    fn falls_through_null_sources_in_order() {
        let candidates = ShiftCandidates {
            department: Some(20),
            org_location: Some(30),
            ..Default::default()
        };
        assert_eq!(pick_by_precedence(&DEFAULT_PRIORITY, &candidates), Some(20));
    }

    #[test]
    fn priority_order_is_org_configurable() {
        let candidates = ShiftCandidates {
            member: Some(10),
            org_location: Some(30),
            ..Default::default()
        };
        let org_first = [ShiftSource::OrgLocation, ShiftSource::Member];
        assert_eq!(pick_by_precedence(&org_first, &candidates), Some(30));
    }

    #[test]
    fn sources_missing_from_priority_list_are_ignored() {
        let candidates = ShiftCandidates {
            department: Some(20),
            ..Default::default()
        };
        let only_member = [ShiftSource::Member];
        assert_eq!(pick_by_precedence(&only_member, &candidates), None);
    }

    #[test]
    fn all_null_resolves_nothing() {
        assert_eq!(
            pick_by_precedence(&DEFAULT_PRIORITY, &ShiftCandidates::default()),
            None
        );
    }
}
