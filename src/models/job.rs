use serde::{Deserialize, Serialize};

/// Host limit on the failure message field.
pub const MAX_FAILURE_MESSAGE_LEN: usize = 4000;
/// Length kept when a message has to be cut.
const TRUNCATED_LEN: usize = 3500;
pub const TRUNCATION_NOTICE: &str =
    "\n results truncated.  Please see the Orchestrator logs for more details.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Success,
    Warning,
    Failure,
}

impl JobStatus {
    /// The worse of two statuses.
    pub fn combine(self, other: JobStatus) -> JobStatus {
        use JobStatus::*;
        match (self, other) {
            (Failure, _) | (_, Failure) => Failure,
            (Warning, _) | (_, Warning) => Warning,
            _ => Success,
        }
    }
}

/// Result record handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub result: JobStatus,
    pub failure_message: String,
    pub job_history_id: i64,
}

impl JobResult {
    pub fn new(result: JobStatus, job_history_id: i64, message: impl AsRef<str>) -> Self {
        Self {
            result,
            failure_message: truncate_message(message.as_ref()),
            job_history_id,
        }
    }

    pub fn success(job_history_id: i64) -> Self {
        Self::new(JobStatus::Success, job_history_id, "")
    }

    pub fn warning(job_history_id: i64, message: impl AsRef<str>) -> Self {
        Self::new(JobStatus::Warning, job_history_id, message)
    }

    pub fn failure(job_history_id: i64, message: impl AsRef<str>) -> Self {
        Self::new(JobStatus::Failure, job_history_id, message)
    }
}

/// Entry of the inventory callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub alias: String,
    pub private_key_entry: bool,
    /// Base64 DER, leaf first.
    pub certificates: Vec<String>,
    pub item_status: String,
    pub use_chain_level: bool,
}

/// Enforces the host's message-size limit: anything longer than 4000
/// characters is cut to 3500 and the truncation notice appended.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_FAILURE_MESSAGE_LEN {
        return message.to_string();
    }
    tracing::trace!(
        length = message.len(),
        max = MAX_FAILURE_MESSAGE_LEN,
        "failure message exceeds host limit; truncating"
    );
    let mut cut: String = message.chars().take(TRUNCATED_LEN).collect();
    cut.push_str(TRUNCATION_NOTICE);
    cut
}
