//! The submission pipeline: worker upload → version engine → bookkeeping.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use hoard_archive::error::ErrorKind as ArchiveErrorKind;
use hoard_archive::{NewWork, store_work};
use hoard_db::models::{DispatchRow, JobRow, WorkFormat};
use hoard_objects::UnfetchedObject;
use hoard_storage::BlobHandle;
use sqlx::PgConnection;
use time::OffsetDateTime;
use tracing::instrument;

/// Accept a worker's upload for a leased dispatch.
///
/// The dispatch is located among the not-failed rows
/// ([`ErrorKind::JobNotFound`] otherwise) and its report code checked
/// ([`ErrorKind::NotAuthorized`]). The job row is then loaded incomplete-only:
/// a dispatch whose job has already been completed, say by the rival holder
/// of an expired lease, surfaces as [`ErrorKind::JobNotFound`] too.
///
/// `DuplicateDetected` from the version engine is a success here: the
/// publisher simply served unchanged bytes. The dispatch records
/// `found_as_duplicate` and the job completes successfully either way; the
/// asymmetry is deliberate, downstream observers key on it.
#[instrument(skip(conn, blobs, report_code, data), fields(size = data.len()))]
pub async fn submit_dispatch(
    conn: &mut PgConnection,
    blobs: &BlobHandle,
    dispatch_id: i64,
    report_code: i16,
    data: &[u8],
) -> Result<Vec<UnfetchedObject>> {
    let dispatch: Option<DispatchRow> = sqlx::query_as(include_str!("../queries/get_dispatch_for_submit.sql"))
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

    let job: Option<JobRow> = sqlx::query_as(include_str!("../queries/get_incomplete_job.sql"))
        .bind(dispatch.job_id)
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    let job = job.ok_or_raise(|| ErrorKind::JobNotFound)?;
    let format: WorkFormat = job.format.parse::<WorkFormat>().or_raise(|| ErrorKind::Database)?;

    let work = NewWork {
        work_id: job.work_id,
        data,
        uploaded_time: OffsetDateTime::now_utc().unix_timestamp(),
        updated_time: job.updated,
        retrieved_from: &job.submitted_by,
        format,
        title: job.title.as_deref(),
        author: job.author.as_deref(),
    };
    let unfetched = match store_work(conn, blobs, work).await {
        Ok(unfetched) => {
            complete_dispatch(conn, dispatch_id, false).await?;
            unfetched
        },
        Err(err) if matches!(&*err, ArchiveErrorKind::DuplicateDetected) => {
            tracing::debug!(dispatch_id, job_id = job.job_id, "upload duplicates current head");
            complete_dispatch(conn, dispatch_id, true).await?;
            Vec::new()
        },
        Err(err) => return Err(ErrorKind::archive(err)),
    };

    sqlx::query(include_str!("../queries/complete_job.sql"))
        .bind(job.job_id)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(unfetched)
}

/// Store a work that was never part of an assigned job, straight past the
/// queue. Uploading bytes identical to the current HEAD is a quiet no-op.
#[instrument(skip(conn, blobs, data), fields(size = data.len()))]
#[allow(clippy::too_many_arguments)]
pub async fn sideload_work(
    conn: &mut PgConnection,
    blobs: &BlobHandle,
    work_id: i64,
    data: &[u8],
    updated_time: i64,
    submitted_by: &str,
    format: &str,
    title: Option<&str>,
    author: Option<&str>,
) -> Result<Vec<UnfetchedObject>> {
    let format: WorkFormat = format.parse::<WorkFormat>().or_raise(|| ErrorKind::InvalidFormat)?;
    let work = NewWork {
        work_id,
        data,
        uploaded_time: OffsetDateTime::now_utc().unix_timestamp(),
        updated_time,
        retrieved_from: submitted_by,
        format,
        title,
        author,
    };
    match store_work(conn, blobs, work).await {
        Ok(unfetched) => Ok(unfetched),
        Err(err) if matches!(&*err, ArchiveErrorKind::DuplicateDetected) => Ok(Vec::new()),
        Err(err) => Err(ErrorKind::archive(err)),
    }
}

async fn complete_dispatch(conn: &mut PgConnection, dispatch_id: i64, found_as_duplicate: bool) -> Result<()> {
    sqlx::query(include_str!("../queries/complete_dispatch.sql"))
        .bind(found_as_duplicate)
        .bind(dispatch_id)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}
