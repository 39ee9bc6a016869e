use crate::config::Config;
use crate::engine::pipeline::scan_window;
use crate::engine::timeband::TimeBand;
use crate::model::attendance::{AttendanceStatus, ComputationStatus};
use crate::model::leave::{Holiday, LeaveRequest, PresentByDefault};
use crate::model::member::Member;
use crate::model::scan::{SYSTEM_CREATED, ScanStatus};
use crate::model::shift::{Shift, ShiftSettings};
use crate::utils::org_cache;
use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use sqlx::{MySqlConnection, MySqlPool};
use std::time::Duration as StdDuration;
use tracing::{error, info, warn};

/// Phase one of scan consumption: an odd scan count means the member never
/// checked out, so one closing event is materialized at the window end.
pub fn missing_close_out(
    times: &[NaiveDateTime],
    window_end: NaiveDateTime,
) -> Option<NaiveDateTime> {
    if times.len() % 2 == 1 {
        Some(window_end)
    } else {
        None
    }
}

/// Phase two: chronological pairing (1st with 2nd, 3rd with 4th, ...),
/// summing each pair's span in minutes.
pub fn pair_durations_minutes(times: &[NaiveDateTime]) -> f64 {
    times
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| (pair[1] - pair[0]).num_seconds() as f64 / 60.0)
        .sum()
}

#[derive(Debug)]
pub struct DayMetrics {
    pub duration: f64,
    pub late_check_in: f64,
    pub early_check_out: f64,
    pub late_check_out: f64,
    pub overtime: f64,
    pub status: AttendanceStatus,
}

/// Metrics for a day with at least one (paired) scan. `times` must be
/// chronologically sorted with an even length.
pub fn day_metrics(
    times: &[NaiveDateTime],
    window: (NaiveDateTime, NaiveDateTime),
    required_minutes: f64,
    overtime_threshold: Option<f64>,
) -> DayMetrics {
    let duration = pair_durations_minutes(times);
    let first = times[0];
    let last = times[times.len() - 1];

    let minutes = |span: chrono::Duration| span.num_seconds() as f64 / 60.0;
    let late_check_in = minutes(first - window.0).max(0.0);
    let early_check_out = minutes(window.1 - last).max(0.0);
    let late_check_out = minutes(last - window.1).max(0.0);
    let overtime = overtime_threshold
        .map(|threshold| (duration - threshold).max(0.0))
        .unwrap_or(0.0);

    let status = if duration >= required_minutes {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Partial
    };

    DayMetrics {
        duration,
        late_check_in,
        early_check_out,
        late_check_out,
        overtime,
        status,
    }
}

/// Classification for a day without any scan.
pub fn zero_scan_status(
    is_holiday: bool,
    is_weekend: bool,
    present_by_default: bool,
) -> AttendanceStatus {
    if is_holiday {
        AttendanceStatus::Holiday
    } else if is_weekend {
        AttendanceStatus::Weekend
    } else if present_by_default {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Absent
    }
}

/// The span of raw scans consumed for one shift date. Wider than the shift
/// band itself: early arrivals and late check-outs still belong to the day.
/// Day shifts own their calendar date; night shifts own band-end to
/// band-end, so consecutive dates never fight over a scan.
pub fn consumption_window(band: &TimeBand, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    if band.wraps() {
        (
            date.and_time(band.end),
            (date + Duration::days(1)).and_time(band.end),
        )
    } else {
        (
            date.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
            (date + Duration::days(1))
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid"),
        )
    }
}

/// The shift date a computation run at `as_of` should roll up: the most
/// recently opened window that is not in the future. A night shift computed
/// at 07:00 belongs to the window that opened the previous evening.
pub fn computation_date(band: &TimeBand, as_of: NaiveDateTime) -> NaiveDate {
    let (start, _) = scan_window(band, as_of);
    if start > as_of {
        start.date() - chrono::Duration::days(1)
    } else {
        start.date()
    }
}

/// Scheduler loop: every minute, run aggregation for shifts whose
/// computation_time matches the current minute.
pub async fn run_scheduler(pool: MySqlPool, config: Config) {
    let mut ticker = actix_web::rt::time::interval(StdDuration::from_secs(60));
    loop {
        ticker.tick().await;
        let as_of = chrono::Local::now().naive_local();
        if let Err(e) = run_attendance_computation(&pool, &config, as_of).await {
            error!(error = %e, "attendance computation tick failed");
        }
    }
}

/// The single cron surface: finds shifts due at `as_of` and rolls each up.
pub async fn run_attendance_computation(
    pool: &MySqlPool,
    config: &Config,
    as_of: NaiveDateTime,
) -> Result<()> {
    let shifts = sqlx::query_as::<_, Shift>(
        r#"
        SELECT id, organization_id, name, start_time, end_time, computation_time,
               overtime_threshold, enable_geo_fencing, system_location_id, settings, status
        FROM shifts
        WHERE status = 'active'
          AND HOUR(computation_time) = ? AND MINUTE(computation_time) = ?
        "#,
    )
    .bind(as_of.time().hour())
    .bind(as_of.time().minute())
    .fetch_all(pool)
    .await
    .context("failed to fetch due shifts")?;

    for shift in shifts {
        let date = computation_date(&shift.band(), as_of);
        if let Err(e) = run_for_shift(pool, config, &shift, date, as_of).await {
            error!(shift_id = shift.id, error = %e, "shift computation failed");
        }
    }
    Ok(())
}

/// Rolls up one (organization, shift, date). Every member gets an isolated,
/// time-bounded transaction; one bad member never aborts the run.
pub async fn run_for_shift(
    pool: &MySqlPool,
    config: &Config,
    shift: &Shift,
    date: NaiveDate,
    as_of: NaiveDateTime,
) -> Result<()> {
    let org = org_cache::get_org_settings(pool, shift.organization_id).await?;
    let settings = shift.parsed_settings()?;

    let history_id = sqlx::query(
        r#"
        INSERT INTO attendance_computation_history
            (organization_id, shift_id, date, status, employee_count, started_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(shift.organization_id)
    .bind(shift.id)
    .bind(date)
    .bind(ComputationStatus::Started.to_string())
    .bind(as_of)
    .execute(pool)
    .await
    .context("failed to open computation history")?
    .last_insert_id();

    let members = sqlx::query_as::<_, Member>(
        r#"
        SELECT id, organization_id, user_id, role_id, department_id, designation_id,
               org_location_id, manager_id, shift_id, employee_code, status
        FROM members
        WHERE organization_id = ? AND status = 'active'
        "#,
    )
    .bind(shift.organization_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch members")?;

    let timeout = StdDuration::from_secs(config.member_compute_timeout_secs);
    let mut employee_count: u32 = 0;
    let mut failures: Vec<String> = Vec::new();

    for member in &members {
        // only members whose effective shift today is this shift
        let resolved =
            match crate::engine::shift_resolver::resolve(pool, &org, member, date).await {
                Ok(Some(resolved)) if resolved.shift.id == shift.id => resolved,
                Ok(_) => continue,
                Err(e) => {
                    warn!(member_id = member.id, error = %e, "shift resolution failed");
                    failures.push(format!("member {}: {}", member.id, e));
                    continue;
                }
            };

        let outcome = actix_web::rt::time::timeout(
            timeout,
            compute_member(pool, &resolved.shift, &settings, member, date),
        )
        .await;

        match outcome {
            Ok(Ok(())) => employee_count += 1,
            Ok(Err(e)) => {
                warn!(member_id = member.id, error = %e, "member computation failed");
                failures.push(format!("member {}: {}", member.id, e));
            }
            Err(_) => {
                warn!(member_id = member.id, "member computation timed out");
                failures.push(format!("member {}: timed out", member.id));
            }
        }
    }

    let (status, reason) = if failures.is_empty() {
        (ComputationStatus::Completed, None)
    } else {
        let mut reason = failures.join("; ");
        reason.truncate(512);
        (ComputationStatus::Failed, Some(reason))
    };

    sqlx::query(
        r#"
        UPDATE attendance_computation_history
        SET status = ?, employee_count = ?, reason = ?, ended_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.to_string())
    .bind(employee_count)
    .bind(reason)
    .bind(chrono::Local::now().naive_local())
    .bind(history_id)
    .execute(pool)
    .await
    .context("failed to close computation history")?;

    info!(
        shift_id = shift.id,
        %date,
        employee_count,
        failed = failures.len(),
        "attendance computation finished"
    );
    Ok(())
}

struct AttendanceWrite<'a> {
    member_id: u64,
    organization_id: u64,
    date: NaiveDate,
    status: &'a str,
    status_details: Option<String>,
    duration: f64,
    late_check_in: f64,
    early_check_out: f64,
    late_check_out: f64,
    overtime: f64,
    shift_id: u64,
    /// true when this run consumed new scans; resets the OT cycle
    reset_ot: bool,
}

/// One member's pairing-and-write cycle, fully inside one transaction so a
/// crash can never leave scans half-consumed.
async fn compute_member(
    pool: &MySqlPool,
    shift: &Shift,
    settings: &ShiftSettings,
    member: &Member,
    date: NaiveDate,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    // approved leave overrides everything else for the day
    let leave = sqlx::query_as::<_, LeaveRequest>(
        r#"
        SELECT id, member_id, organization_id, leave_type, start_date, end_date, status
        FROM leave_requests
        WHERE member_id = ? AND status = 'approved'
          AND start_date <= ? AND end_date >= ?
        LIMIT 1
        "#,
    )
    .bind(member.id)
    .bind(date)
    .bind(date)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(leave) = leave {
        let status = AttendanceStatus::Leave(leave.leave_type.clone());
        upsert_attendance(
            &mut tx,
            &AttendanceWrite {
                member_id: member.id,
                organization_id: member.organization_id,
                date,
                status: status.as_str(),
                status_details: Some(
                    serde_json::json!({ "leave_type": leave.leave_type }).to_string(),
                ),
                duration: 0.0,
                late_check_in: 0.0,
                early_check_out: 0.0,
                late_check_out: 0.0,
                overtime: 0.0,
                shift_id: shift.id,
                reset_ot: true,
            },
        )
        .await?;
        tx.commit().await?;
        return Ok(());
    }

    let band = shift.band();
    let (window_start, window_end) = band.window_on(date);
    let (consume_from, consume_until) = consumption_window(&band, date);

    let pending: Vec<(u64, NaiveDateTime)> = sqlx::query_as(
        r#"
        SELECT id, date_time FROM member_scans
        WHERE member_id = ? AND is_computed = 0 AND status = 'pending'
          AND date_time >= ? AND date_time < ?
        ORDER BY date_time ASC
        FOR UPDATE
        "#,
    )
    .bind(member.id)
    .bind(consume_from)
    .bind(consume_until)
    .fetch_all(&mut *tx)
    .await?;

    // scans already rolled into an earlier run for this date, so recompute
    // works over the full set
    let linked: Vec<(u64, NaiveDateTime)> = sqlx::query_as(
        r#"
        SELECT ms.id, ms.date_time
        FROM member_scans ms
        JOIN attendance_scans ats ON ats.scan_id = ms.id
        JOIN attendance a ON a.id = ats.attendance_id
        WHERE a.member_id = ? AND a.date = ?
        ORDER BY ms.date_time ASC
        "#,
    )
    .bind(member.id)
    .bind(date)
    .fetch_all(&mut *tx)
    .await?;

    let mut times: Vec<NaiveDateTime> = linked
        .iter()
        .chain(pending.iter())
        .map(|(_, at)| *at)
        .collect();
    times.sort();

    if times.is_empty() {
        let (status, details) = zero_scan_classification(&mut tx, member, settings, date).await?;
        upsert_attendance(
            &mut tx,
            &AttendanceWrite {
                member_id: member.id,
                organization_id: member.organization_id,
                date,
                status: status.as_str(),
                status_details: Some(details.to_string()),
                duration: 0.0,
                late_check_in: 0.0,
                early_check_out: 0.0,
                late_check_out: 0.0,
                overtime: 0.0,
                shift_id: shift.id,
                reset_ot: false,
            },
        )
        .await?;
        tx.commit().await?;
        return Ok(());
    }

    // phase one: materialize the missing close-out event
    let mut consumed: Vec<u64> = pending.iter().map(|(id, _)| *id).collect();
    let synthesized = missing_close_out(&times, window_end);
    if let Some(close_at) = synthesized {
        let synthetic_id = sqlx::query(
            r#"
            INSERT INTO member_scans
                (member_id, organization_id, date_time, scan_type,
                 is_computed, status, metadata)
            VALUES (?, ?, ?, 'check_out', 0, ?, ?)
            "#,
        )
        .bind(member.id)
        .bind(member.organization_id)
        .bind(close_at)
        .bind(ScanStatus::Pending.to_string())
        .bind(SYSTEM_CREATED)
        .execute(&mut *tx)
        .await?
        .last_insert_id();
        consumed.push(synthetic_id);
        times.push(close_at);
        times.sort();
    }

    // phase two: pair and classify
    let metrics = day_metrics(
        &times,
        (window_start, window_end),
        shift.required_minutes(settings),
        shift.overtime_threshold,
    );

    let consumed_new = !consumed.is_empty();
    upsert_attendance(
        &mut tx,
        &AttendanceWrite {
            member_id: member.id,
            organization_id: member.organization_id,
            date,
            status: metrics.status.as_str(),
            status_details: Some(
                serde_json::json!({
                    "scan_count": times.len(),
                    "synthetic_close_out": synthesized.is_some(),
                })
                .to_string(),
            ),
            duration: metrics.duration,
            late_check_in: metrics.late_check_in,
            early_check_out: metrics.early_check_out,
            late_check_out: metrics.late_check_out,
            overtime: metrics.overtime,
            shift_id: shift.id,
            reset_ot: consumed_new,
        },
    )
    .await?;

    let attendance_id: u64 =
        sqlx::query_scalar("SELECT id FROM attendance WHERE member_id = ? AND date = ?")
            .bind(member.id)
            .bind(date)
            .fetch_one(&mut *tx)
            .await?;

    for scan_id in &consumed {
        sqlx::query("INSERT IGNORE INTO attendance_scans (attendance_id, scan_id) VALUES (?, ?)")
            .bind(attendance_id)
            .bind(scan_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE member_scans SET is_computed = 1, status = ? WHERE id = ?")
            .bind(ScanStatus::Computed.to_string())
            .bind(scan_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn zero_scan_classification(
    tx: &mut MySqlConnection,
    member: &Member,
    settings: &ShiftSettings,
    date: NaiveDate,
) -> Result<(AttendanceStatus, serde_json::Value)> {
    let holiday = sqlx::query_as::<_, Holiday>(
        r#"
        SELECT id, organization_id, name, start_date, end_date, status
        FROM holidays
        WHERE organization_id = ? AND status = 'active'
          AND start_date <= ? AND end_date >= ?
        LIMIT 1
        "#,
    )
    .bind(member.organization_id)
    .bind(date)
    .bind(date)
    .fetch_optional(&mut *tx)
    .await?;

    let weekday = date.weekday().number_from_monday() as u8;
    let is_weekend = !settings.active_weekdays.contains(&weekday);

    let present_by_default = sqlx::query_as::<_, PresentByDefault>(
        r#"
        SELECT id, member_id, organization_id, start_date, end_date, status
        FROM present_by_default
        WHERE member_id = ? AND status = 'active'
          AND start_date <= ? AND end_date >= ?
        LIMIT 1
        "#,
    )
    .bind(member.id)
    .bind(date)
    .bind(date)
    .fetch_optional(&mut *tx)
    .await?;

    let status = zero_scan_status(
        holiday.is_some(),
        is_weekend,
        present_by_default.is_some(),
    );
    let details = match (&status, holiday) {
        (AttendanceStatus::Holiday, Some(holiday)) => {
            serde_json::json!({ "reason": "holiday", "holiday": holiday.name })
        }
        (AttendanceStatus::Present, _) => {
            serde_json::json!({ "reason": "present by default, no scans" })
        }
        _ => serde_json::json!({ "reason": "no scans in consumption window" }),
    };
    Ok((status, details))
}

async fn upsert_attendance(
    tx: &mut MySqlConnection,
    write: &AttendanceWrite<'_>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO attendance
            (member_id, organization_id, date, status, status_details,
             duration, late_check_in, early_check_out, late_check_out,
             overtime, ot_status, shift_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'ot_available', ?)
        ON DUPLICATE KEY UPDATE
            status = VALUES(status),
            status_details = VALUES(status_details),
            -- an idle re-run must not undo an approved OT fold-in; ot_status
            -- still holds its pre-update value here
            duration = IF(? OR ot_status != 'ot_approved', VALUES(duration), duration),
            late_check_in = VALUES(late_check_in),
            early_check_out = VALUES(early_check_out),
            late_check_out = VALUES(late_check_out),
            overtime = VALUES(overtime),
            shift_id = VALUES(shift_id),
            ot_status = IF(?, 'ot_available', ot_status),
            ot_approved_by = IF(?, NULL, ot_approved_by)
        "#,
    )
    .bind(write.member_id)
    .bind(write.organization_id)
    .bind(write.date)
    .bind(write.status)
    .bind(&write.status_details)
    .bind(write.duration)
    .bind(write.late_check_in)
    .bind(write.early_check_out)
    .bind(write.late_check_out)
    .bind(write.overtime)
    .bind(write.shift_id)
    .bind(write.reset_ot)
    .bind(write.reset_ot)
    .bind(write.reset_ot)
    .execute(&mut *tx)
    .await
    .context("failed to upsert attendance")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

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
    fn nine_to_five_scenario() {
        // shift 09:00-17:00, required 480 min, scans at 09:05 and 17:10
        let window = (dt(3, 9, 0), dt(3, 17, 0));
        let times = vec![dt(3, 9, 5), dt(3, 17, 10)];
        let metrics = day_metrics(&times, window, 480.0, Some(500.0));

        assert_eq!(metrics.status, AttendanceStatus::Present);
        assert_eq!(metrics.duration, 485.0);
        assert_eq!(metrics.late_check_in, 5.0);
        assert_eq!(metrics.early_check_out, 0.0);
        assert_eq!(metrics.late_check_out, 10.0);
        assert_eq!(metrics.overtime, 0.0);
    }

    #[test]
    fn short_day_is_partial() {
        let window = (dt(3, 9, 0), dt(3, 17, 0));
        let times = vec![dt(3, 9, 0), dt(3, 12, 0)];
        let metrics = day_metrics(&times, window, 480.0, None);
        assert_eq!(metrics.status, AttendanceStatus::Partial);
        assert_eq!(metrics.duration, 180.0);
        assert_eq!(metrics.early_check_out, 300.0);
    }

    #[test]
    fn overtime_beyond_threshold() {
        let window = (dt(3, 9, 0), dt(3, 17, 0));
        let times = vec![dt(3, 9, 0), dt(3, 19, 0)];
        let metrics = day_metrics(&times, window, 480.0, Some(540.0));
        assert_eq!(metrics.duration, 600.0);
        assert_eq!(metrics.overtime, 60.0);
        assert_eq!(metrics.late_check_out, 120.0);
    }

    #[test]
    fn multiple_pairs_sum_up() {
        let times = vec![dt(3, 9, 0), dt(3, 12, 0), dt(3, 13, 0), dt(3, 17, 0)];
        assert_eq!(pair_durations_minutes(&times), 420.0);
    }

    #[test]
    fn odd_scans_materialize_one_close_out() {
        let window_end = dt(3, 17, 0);
        let times = vec![dt(3, 9, 0), dt(3, 12, 0), dt(3, 13, 0)];
        assert_eq!(missing_close_out(&times, window_end), Some(window_end));

        let mut all = times.clone();
        all.push(window_end);
        all.sort();
        assert_eq!(all.len(), 4);
        assert_eq!(missing_close_out(&all, window_end), None);
        // 09:00-12:00 + 13:00-17:00
        assert_eq!(pair_durations_minutes(&all), 420.0);
    }

    #[test]
    fn night_shift_pairs_across_midnight() {
        let band = TimeBand::new(t(22, 0), t(6, 0));
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let window = band.window_on(date);
        let times = vec![dt(3, 22, 0), dt(4, 6, 0)];
        let metrics = day_metrics(&times, window, 480.0, None);
        assert_eq!(metrics.duration, 480.0);
        assert_eq!(metrics.status, AttendanceStatus::Present);
    }

    #[test]
    fn zero_scan_precedence() {
        assert_eq!(zero_scan_status(true, true, true), AttendanceStatus::Holiday);
        assert_eq!(zero_scan_status(false, true, true), AttendanceStatus::Weekend);
        assert_eq!(zero_scan_status(false, false, true), AttendanceStatus::Present);
        assert_eq!(zero_scan_status(false, false, false), AttendanceStatus::Absent);
    }

    #[test]
    fn consumption_window_covers_the_calendar_day_for_day_shifts() {
        let band = TimeBand::new(t(9, 0), t(17, 0));
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let (from, until) = consumption_window(&band, date);
        assert_eq!(from, dt(3, 0, 0));
        assert_eq!(until, dt(4, 0, 0));
        // early arrival and late check-out both fall inside
        assert!(dt(3, 8, 30) >= from && dt(3, 8, 30) < until);
        assert!(dt(3, 17, 10) >= from && dt(3, 17, 10) < until);
    }

    #[test]
    fn consumption_windows_do_not_overlap_for_night_shifts() {
        let band = TimeBand::new(t(22, 0), t(6, 0));
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let (from, until) = consumption_window(&band, date);
        assert_eq!(from, dt(3, 6, 0));
        assert_eq!(until, dt(4, 6, 0));

        let (next_from, _) = consumption_window(&band, date + Duration::days(1));
        assert_eq!(until, next_from);
    }

    #[test]
    fn computation_date_for_day_shift() {
        let band = TimeBand::new(t(9, 0), t(17, 0));
        assert_eq!(
            computation_date(&band, dt(3, 18, 0)),
            NaiveDate::from_ymd_opt(2026, 8, 3).unwrap()
        );
    }

    #[test]
    fn computation_date_for_night_shift_after_it_ends() {
        let band = TimeBand::new(t(22, 0), t(6, 0));
        // computed at 07:00 on the 4th, the window opened on the 3rd
        assert_eq!(
            computation_date(&band, dt(4, 7, 0)),
            NaiveDate::from_ymd_opt(2026, 8, 3).unwrap()
        );
    }
}
