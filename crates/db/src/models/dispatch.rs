/// One time-limited lease of a job to a worker.
///
/// `report_code` is the per-dispatch capability: generated once, returned to
/// the leasing worker in the job order, and required to submit or fail the
/// dispatch. It is never revealed anywhere else.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DispatchRow {
    pub dispatch_id: i64,
    pub job_id: i64,
    pub dispatched_to_name: String,
    pub report_code: i16,
    pub fail_reported: bool,
    pub fail_status: Option<i32>,
    pub complete: bool,
    pub found_as_duplicate: bool,
}

impl DispatchRow {
    /// A dispatch is terminal once either flag is set; at most one ever is.
    pub fn is_terminal(&self) -> bool {
        self.fail_reported || self.complete
    }
}
