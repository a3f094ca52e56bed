//! End-to-end engine tests against a real PostgreSQL instance.
//!
//! These are `#[ignore]`d so that `cargo test` passes on machines without a
//! database. Point `POSTGRESQL_*` at a **disposable** database and run:
//!
//! ```sh
//! POSTGRESQL_DATABASE=hoard_test POSTGRESQL_HOST=127.0.0.1 \
//! POSTGRESQL_USER=hoard POSTGRESQL_PASSWORD=secret POSTGRESQL_PORT=5432 \
//! cargo test -- --ignored --test-threads=1
//! ```
//!
//! Single-threaded because the tests share one queue: a parallel run would
//! lease (and burn the dispatch budgets of) its neighbours' jobs.
//!
//! Blob traffic goes to the in-memory mock backend; only the relational
//! state is real.

use hoard_db::models::{JobStatus, WorkFormat};
use hoard_db::{Database, DbSettings};
use hoard_storage::BlobHandle;
use hoard_storage::backend::MockBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

fn settings() -> DbSettings {
    let var = |name: &str| std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set for ignored tests"));
    DbSettings {
        database: var("POSTGRESQL_DATABASE"),
        host: var("POSTGRESQL_HOST"),
        user: var("POSTGRESQL_USER"),
        password: var("POSTGRESQL_PASSWORD"),
        port: var("POSTGRESQL_PORT").parse().expect("POSTGRESQL_PORT must be numeric"),
    }
}

async fn database() -> Database {
    Database::connect(&settings()).await.expect("database connects and migrates")
}

fn blobs() -> BlobHandle {
    Arc::new(MockBackend::default())
}

/// Work ids unique across one test run, so tests don't trip over each other's
/// queue rows.
fn fresh_work_id() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    let base = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    base * 1_000 + COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn migrations_are_idempotent() {
    let db = database().await;
    // connect() already migrated; doing it again must be a no-op.
    db.migrate().await.expect("re-running migrations succeeds");
    db.migrate().await.expect("and again");
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn admission_is_idempotent_until_complete() {
    let db = database().await;
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();

    let first = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None).await.unwrap();
    let first = first.expect("fresh work admits a job");
    let second = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None).await.unwrap();
    assert_eq!(second, Some(first), "re-reporting returns the existing incomplete job");

    // Different format is a different job.
    let epub = hoard_queue::queue_work(&mut tx, work_id, 1_000, "epub", "u", None, None).await.unwrap();
    assert_ne!(epub, Some(first));

    let err = hoard_queue::queue_work(&mut tx, work_id, 1_000, "doc", "u", None, None).await.unwrap_err();
    assert!(matches!(&*err, hoard_queue::error::ErrorKind::InvalidFormat));

    assert_eq!(hoard_queue::job_status(&mut tx, first).await.unwrap(), JobStatus::InQueue);
    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn lease_is_exclusive_within_window() {
    let db = database().await;
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();
    let job_id = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None)
        .await
        .unwrap()
        .unwrap();

    let order = hoard_queue::get_job(&mut tx, "w1").await.unwrap().expect("job leased");
    assert_eq!(order.job_id, job_id);
    assert_eq!(order.work_id, work_id);
    assert_eq!(order.work_format, "pdf");
    assert_eq!(order.updated, 1_000);
    assert!(order.get_img);

    // The lease is live, so the same job must not be offered again. (On a
    // disposable database ours is the only job; anything else returned here
    // is somebody else's leftover state.)
    if let Some(second) = hoard_queue::get_job(&mut tx, "w2").await.unwrap() {
        assert_ne!(second.job_id, job_id, "job double-leased inside the lease window");
    }
    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn three_failures_bury_the_job() {
    let db = database().await;
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();
    let job_id = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None)
        .await
        .unwrap()
        .unwrap();

    for round in 0..3 {
        let order = hoard_queue::get_job(&mut tx, "w").await.unwrap().expect("job leased");
        assert_eq!(order.job_id, job_id);

        // Wrong code is rejected before any state changes.
        let bad_code = order.report_code.wrapping_add(1);
        let err =
            hoard_queue::mark_dispatch_fail(&mut tx, order.dispatch_id, 404, bad_code).await.unwrap_err();
        assert!(matches!(&*err, hoard_queue::error::ErrorKind::NotAuthorized));

        hoard_queue::mark_dispatch_fail(&mut tx, order.dispatch_id, 404, order.report_code).await.unwrap();

        // Double-reporting the same dispatch is a conflict.
        let err =
            hoard_queue::mark_dispatch_fail(&mut tx, order.dispatch_id, 404, order.report_code).await.unwrap_err();
        assert!(matches!(&*err, hoard_queue::error::ErrorKind::AlreadyReported));

        // A failure report doesn't end the lease window; expire it manually
        // so the next attempt can be leased.
        if round < 2 {
            expire_leases(&mut tx, job_id).await;
        }
    }

    assert_eq!(hoard_queue::job_status(&mut tx, job_id).await.unwrap(), JobStatus::Failed);
    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn silent_workers_burn_the_dispatch_budget() {
    let db = database().await;
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();
    let job_id = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None)
        .await
        .unwrap()
        .unwrap();

    // Three dispatches, no reports at all; every lease times out.
    for _ in 0..3 {
        let order = hoard_queue::get_job(&mut tx, "silent").await.unwrap().expect("job leased");
        assert_eq!(order.job_id, job_id);
        expire_leases(&mut tx, job_id).await;
    }

    // The fourth attempt finds the budget spent and buries the job without
    // any failure report ever arriving.
    if let Some(order) = hoard_queue::get_job(&mut tx, "w4").await.unwrap() {
        assert_ne!(order.job_id, job_id);
    }
    assert_eq!(hoard_queue::job_status(&mut tx, job_id).await.unwrap(), JobStatus::Failed);
    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn submit_stores_versions_and_completes_the_job() {
    let db = database().await;
    let blobs = blobs();
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();

    let job_id = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None)
        .await
        .unwrap()
        .unwrap();
    let order = hoard_queue::get_job(&mut tx, "w").await.unwrap().unwrap();
    assert_eq!(order.job_id, job_id);

    let unfetched = hoard_queue::submit_dispatch(&mut tx, &blobs, order.dispatch_id, order.report_code, b"v1 bytes")
        .await
        .unwrap();
    assert!(unfetched.is_empty(), "pdf uploads produce no unfetched objects");
    assert_eq!(hoard_queue::job_status(&mut tx, job_id).await.unwrap(), JobStatus::Completed);

    // Submitting again against the spent dispatch: the job is complete, so
    // the pipeline reports the job as gone.
    let err = hoard_queue::submit_dispatch(&mut tx, &blobs, order.dispatch_id, order.report_code, b"v1 bytes")
        .await
        .unwrap_err();
    assert!(matches!(&*err, hoard_queue::error::ErrorKind::JobNotFound));

    let head = hoard_archive::head(&mut tx, work_id, WorkFormat::Pdf).await.unwrap().expect("head exists");
    let (content, entry) = hoard_archive::reconstruct(&mut tx, &blobs, head.storage_id).await.unwrap();
    assert_eq!(content, b"v1 bytes");
    assert!(entry.is_head());
    assert!(hoard_archive::work_exists(&mut tx, work_id).await.unwrap());

    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn version_chain_reconstructs_every_revision() {
    let db = database().await;
    let blobs = blobs();
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();

    let revisions: [&[u8]; 3] = [b"chapter one", b"chapter one and two", b"chapter one, two and three"];
    let mut storage_ids = Vec::new();
    for (index, content) in revisions.iter().enumerate() {
        hoard_queue::sideload_work(&mut tx, &blobs, work_id, content, 1_000 + index as i64, "u", "pdf", None, None)
            .await
            .unwrap();
        let head = hoard_archive::head(&mut tx, work_id, WorkFormat::Pdf).await.unwrap().unwrap();
        storage_ids.push(head.storage_id);
    }

    // Every historical version reconstructs to the exact submitted bytes.
    for (storage_id, content) in storage_ids.iter().zip(revisions.iter()) {
        let (restored, _) = hoard_archive::reconstruct(&mut tx, &blobs, *storage_id).await.unwrap();
        assert_eq!(&restored, content);
    }

    // Exactly one HEAD; the chain from the oldest entry reaches it in two
    // hops; uploading HEAD's bytes again is a duplicate.
    let history = hoard_archive::history(&mut tx, work_id).await.unwrap();
    assert_eq!(history.iter().filter(|entry| entry.is_head()).count(), 1);
    let oldest = history.iter().find(|entry| entry.storage_id == storage_ids[0]).unwrap();
    assert_eq!(oldest.patch_of, Some(storage_ids[1]));

    let current = hoard_archive::current(&mut tx, &blobs, work_id, WorkFormat::Pdf).await.unwrap().unwrap();
    assert_eq!(current, revisions[2]);

    let duplicate = hoard_queue::sideload_work(&mut tx, &blobs, work_id, revisions[2], 2_000, "u", "pdf", None, None)
        .await
        .unwrap();
    assert!(duplicate.is_empty());
    assert_eq!(hoard_archive::history(&mut tx, work_id).await.unwrap().len(), 3, "duplicate stored nothing");

    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn html_rewriting_and_object_dedup() {
    let db = database().await;
    let blobs = blobs();
    let mut tx = db.begin().await.unwrap();

    // Two works embedding the same image URL.
    let first_work = fresh_work_id();
    let second_work = fresh_work_id();
    let html = br#"<html><body><img src="https://pub.example/a.png"></body></html>"#;
    let first = hoard_queue::sideload_work(&mut tx, &blobs, first_work, html, 1_000, "u", "html", None, None)
        .await
        .unwrap();
    let second = hoard_queue::sideload_work(&mut tx, &blobs, second_work, html, 1_000, "u", "html", None, None)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_ne!(first[0].object_id, second[0].object_id, "each reference gets its own id");

    // The stored HTML serves the internal URL, with the publisher fallback.
    let head = hoard_archive::head(&mut tx, first_work, WorkFormat::Html).await.unwrap().unwrap();
    let (stored, _) = hoard_archive::reconstruct(&mut tx, &blobs, head.storage_id).await.unwrap();
    let stored = String::from_utf8(stored).unwrap();
    assert!(stored.contains(&format!("/objects/{}", first[0].object_id)));
    assert!(stored.contains("this.src='https://pub.example/a.png';this.onerror=''"));

    // First payload submission creates store + index rows.
    let payload = b"png bytes, allegedly";
    hoard_objects::submit_object(&mut tx, &blobs, first[0].object_id, payload, Some("etag-1"), "image/png")
        .await
        .unwrap();
    let located = hoard_objects::locate(&mut tx, first[0].object_id).await.unwrap().expect("object resolvable");
    assert_eq!(located.0.mimetype, "image/png");
    assert_eq!(blobs.read(&located.1).await.unwrap(), payload);

    // Second submission of the same (url, etag, payload) collapses into a
    // duplicate mapping; both ids keep resolving to the same index entry.
    hoard_objects::submit_object(&mut tx, &blobs, second[0].object_id, payload, Some("etag-1"), "image/png")
        .await
        .unwrap();
    let via_duplicate = hoard_objects::locate(&mut tx, second[0].object_id).await.unwrap().expect("resolves");
    assert_eq!(via_duplicate.0.object_id, first[0].object_id);

    // Submitting an unknown id is an error.
    let err = hoard_objects::submit_object(&mut tx, &blobs, i64::MAX, payload, None, "image/png")
        .await
        .unwrap_err();
    assert!(matches!(&*err, hoard_objects::error::ErrorKind::ObjectNotFound));

    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn duplicate_submission_marks_dispatch_found_as_duplicate() {
    let db = database().await;
    let blobs = blobs();
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();

    hoard_queue::sideload_work(&mut tx, &blobs, work_id, b"unchanged bytes", 500, "u", "pdf", None, None)
        .await
        .unwrap();

    let job_id = hoard_queue::queue_work(&mut tx, work_id, 1_000, "pdf", "u", None, None)
        .await
        .unwrap()
        .unwrap();
    let order = hoard_queue::get_job(&mut tx, "w").await.unwrap().unwrap();
    assert_eq!(order.job_id, job_id);
    hoard_queue::submit_dispatch(&mut tx, &blobs, order.dispatch_id, order.report_code, b"unchanged bytes")
        .await
        .unwrap();

    // The job still counts as a success, and the dispatch remembers why.
    assert_eq!(hoard_queue::job_status(&mut tx, job_id).await.unwrap(), JobStatus::Completed);
    let (complete, found_as_duplicate): (bool, bool) =
        sqlx::query_as("SELECT complete, found_as_duplicate FROM dispatches WHERE dispatch_id = $1")
            .bind(order.dispatch_id)
            .fetch_one(&mut *tx)
            .await
            .unwrap();
    assert!(complete);
    assert!(found_as_duplicate);

    tx.commit().await.unwrap();
    db.close().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL (set POSTGRESQL_* env vars, disposable database)"]
async fn object_leasing_stalls_after_three_dispatches() {
    let db = database().await;
    let blobs = blobs();
    let work_id = fresh_work_id();
    let mut tx = db.begin().await.unwrap();

    let html = br#"<img src="https://pub.example/stubborn.png">"#;
    let unfetched = hoard_queue::sideload_work(&mut tx, &blobs, work_id, html, 1_000, "u", "html", None, None)
        .await
        .unwrap();
    let object_id = unfetched[0].object_id;

    for _ in 0..3 {
        let order = loop {
            // Skip over other tests' leftovers until our object comes up.
            match hoard_objects::lease_object(&mut tx, "w").await.unwrap() {
                Some(order) if order.object_id == object_id => break Some(order),
                Some(_) => continue,
                None => break None,
            }
        };
        let order = order.expect("object still leasable");
        hoard_objects::mark_object_fail(&mut tx, order.dispatch_id).await.unwrap();
        expire_object_leases(&mut tx, object_id).await;
    }

    // Budget spent: the object stalls rather than being offered forever.
    while let Some(order) = hoard_objects::lease_object(&mut tx, "w").await.unwrap() {
        assert_ne!(order.object_id, object_id, "stalled object re-leased");
    }
    let (stalled,): (bool,) = sqlx::query_as("SELECT stalled FROM unfetched_objects WHERE object_id = $1")
        .bind(object_id)
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert!(stalled);

    tx.commit().await.unwrap();
    db.close().await;
}

/// Backdate a job's dispatches so their leases are expired.
async fn expire_leases(tx: &mut sqlx::PgConnection, job_id: i64) {
    sqlx::query("UPDATE dispatches SET dispatched_time = NOW() - INTERVAL '10 minutes' WHERE job_id = $1")
        .bind(job_id)
        .execute(tx)
        .await
        .unwrap();
}

/// Backdate an object's dispatches so their leases are expired.
async fn expire_object_leases(tx: &mut sqlx::PgConnection, object_id: i64) {
    sqlx::query("UPDATE object_dispatches SET dispatched_time = NOW() - INTERVAL '10 minutes' WHERE object_id = $1")
        .bind(object_id)
        .execute(tx)
        .await
        .unwrap();
}
