use derive_more::Display;

/// A queued request to archive one (work_id, format, updated_time).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub job_id: i64,
    pub work_id: i64,
    pub format: String,
    /// The publisher's claimed modification time, unix seconds.
    pub updated: i64,
    pub submitted_by: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub complete: bool,
    /// Only meaningful once `complete` is true.
    pub success: bool,
}

impl JobRow {
    pub fn status(&self) -> JobStatus {
        JobStatus::from_flags(self.complete, self.success)
    }
}

/// Client-visible lifecycle state of a job.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    #[display("queued")]
    InQueue,
    #[display("failed")]
    Failed,
    #[display("completed")]
    Completed,
}

impl JobStatus {
    pub fn from_flags(complete: bool, success: bool) -> Self {
        match (complete, success) {
            (false, _) => Self::InQueue,
            (true, false) => Self::Failed,
            (true, true) => Self::Completed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InQueue => "queued",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, JobStatus::InQueue)]
    // An incomplete job can't be successful; the flag is just noise until
    // complete flips.
    #[case(false, true, JobStatus::InQueue)]
    #[case(true, false, JobStatus::Failed)]
    #[case(true, true, JobStatus::Completed)]
    fn test_status_from_flags(#[case] complete: bool, #[case] success: bool, #[case] expected: JobStatus) {
        assert_eq!(JobStatus::from_flags(complete, success), expected);
    }

    #[test]
    fn test_wire_strings() {
        assert_eq!(JobStatus::InQueue.as_str(), "queued");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
    }
}
