//! Admission, leasing and failure reporting.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use hoard_db::models::{DispatchRow, JobRow, JobStatus, WorkFormat};
use rand::Rng;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::instrument;

/// Leases expire this long after `dispatched_time`; a worker that goes
/// silent simply lets its lease lapse, no coordination required.
const LEASE_WINDOW_SQL: &str = "4 minutes";
/// Total dispatches a job gets before it is buried. Counted over *all*
/// dispatches, not just reported failures, so silent workers also burn
/// through the budget.
const MAX_DISPATCHES: i64 = 3;

/// A leased job, handed to a worker. `report_code` is the capability the
/// worker must present to submit or fail this dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct JobOrder {
    pub dispatch_id: i64,
    pub job_id: i64,
    pub work_id: i64,
    pub work_format: String,
    pub report_code: i16,
    pub updated: i64,
    pub get_img: bool,
}

/// Admit a request to archive a work.
///
/// Returns the job id, or `None` when an archived version at least as new as
/// `updated_time` already exists. Re-reporting a work that already has an
/// incomplete job returns that job's id; admission is idempotent.
#[instrument(skip(conn, title, author))]
pub async fn queue_work(
    conn: &mut PgConnection,
    work_id: i64,
    updated_time: i64,
    format: &str,
    submitted_by: &str,
    title: Option<&str>,
    author: Option<&str>,
) -> Result<Option<i64>> {
    let format: WorkFormat = format.parse::<WorkFormat>().or_raise(|| ErrorKind::InvalidFormat)?;

    let already_archived: bool = sqlx::query_scalar(include_str!("../queries/already_archived.sql"))
        .bind(work_id)
        .bind(format.as_str())
        .bind(updated_time)
        .fetch_one(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if already_archived {
        return Ok(None);
    }

    let existing: Option<(i64,)> = sqlx::query_as(include_str!("../queries/find_incomplete_job.sql"))
        .bind(work_id)
        .bind(format.as_str())
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if let Some((job_id,)) = existing {
        return Ok(Some(job_id));
    }

    let job_id: i64 = sqlx::query_scalar(include_str!("../queries/insert_job.sql"))
        .bind(work_id)
        .bind(format.as_str())
        .bind(updated_time)
        .bind(submitted_by)
        .bind(title)
        .bind(author)
        .fetch_one(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    tracing::debug!(job_id, work_id, "job admitted");
    Ok(Some(job_id))
}

/// Lease a job to a worker, newest submission first.
///
/// Only jobs with no dispatch inside the lease window are candidates. A
/// candidate that has already burnt its dispatch budget is buried
/// (complete, unsuccessful) on the spot and the next candidate considered.
/// This is where jobs abandoned by three silent workers go to die.
///
/// Returns `None` when nothing leasable remains.
#[instrument(skip(conn))]
pub async fn get_job(conn: &mut PgConnection, worker: &str) -> Result<Option<JobOrder>> {
    loop {
        let candidate: Option<(i64, i64, String, i64)> =
            sqlx::query_as(include_str!("../queries/lease_candidate.sql"))
                .bind(LEASE_WINDOW_SQL)
                .fetch_optional(&mut *conn)
                .await
                .or_raise(|| ErrorKind::Database)?;
        let Some((job_id, work_id, work_format, updated)) = candidate else {
            return Ok(None);
        };

        let dispatches: i64 = sqlx::query_scalar(include_str!("../queries/count_dispatches.sql"))
            .bind(job_id)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if dispatches >= MAX_DISPATCHES {
            tracing::warn!(job_id, dispatches, "dispatch budget exhausted, burying job");
            bury_job(conn, job_id).await?;
            continue;
        }

        let report_code: i16 = rand::thread_rng().gen_range(i16::MIN..=i16::MAX);
        let dispatch_id: i64 = sqlx::query_scalar(include_str!("../queries/insert_dispatch.sql"))
            .bind(job_id)
            .bind(worker)
            .bind(report_code)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(job_id, dispatch_id, worker, "job leased");
        return Ok(Some(JobOrder {
            dispatch_id,
            job_id,
            work_id,
            work_format,
            report_code,
            updated,
            get_img: true,
        }));
    }
}

/// Record a worker's failure report against a dispatch.
///
/// Checked in order: unknown dispatch id → [`ErrorKind::JobNotFound`],
/// report code mismatch → [`ErrorKind::NotAuthorized`], dispatch already
/// terminal → [`ErrorKind::AlreadyReported`]. Three reported failures bury
/// the job.
#[instrument(skip(conn, report_code))]
pub async fn mark_dispatch_fail(
    conn: &mut PgConnection,
    dispatch_id: i64,
    fail_status: i32,
    report_code: i16,
) -> Result<()> {
    let dispatch: Option<DispatchRow> = sqlx::query_as(include_str!("../queries/get_dispatch_for_report.sql"))
        .bind(dispatch_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    let Some(dispatch) = dispatch else {
        exn::bail!(ErrorKind::JobNotFound);
    };
    if report_code != dispatch.report_code {
        exn::bail!(ErrorKind::NotAuthorized);
    }
    if dispatch.is_terminal() {
        exn::bail!(ErrorKind::AlreadyReported);
    }
    let job_id = dispatch.job_id;

    sqlx::query(include_str!("../queries/fail_dispatch.sql"))
        .bind(fail_status)
        .bind(dispatch_id)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;

    let failures: i64 = sqlx::query_scalar(include_str!("../queries/count_failed_dispatches.sql"))
        .bind(job_id)
        .fetch_one(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if failures >= MAX_DISPATCHES {
        tracing::warn!(job_id, failures, "all dispatches failed, burying job");
        bury_job(conn, job_id).await?;
    }
    Ok(())
}

/// Client-visible state of a job.
pub async fn job_status(conn: &mut PgConnection, job_id: i64) -> Result<JobStatus> {
    let job: Option<JobRow> = sqlx::query_as(include_str!("../queries/get_job_row.sql"))
        .bind(job_id)
        .fetch_optional(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(job.ok_or_raise(|| ErrorKind::JobNotFound)?.status())
}

/// Mark a job complete and unsuccessful.
async fn bury_job(conn: &mut PgConnection, job_id: i64) -> Result<()> {
    sqlx::query(include_str!("../queries/fail_job.sql"))
        .bind(job_id)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}
