use tracing::{error, warn};

use super::config::DiscoveryJob;
use super::DiscoverySink;
use crate::discovery::DiscoveryTraverser;
use crate::models::job::JobResult;

/// Discovers vaults across the job's tenants and reports them to the host.
pub async fn run(job: &DiscoveryJob, traverser: &DiscoveryTraverser, sink: &mut dyn DiscoverySink) -> JobResult {
    let id = job.context.job_history_id;

    let found = match traverser.discover(&job.tenants).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e.one_line(), "discovery failed");
            return JobResult::failure(id, e.one_line());
        }
    };

    // The host receives the list even when it is empty.
    if !sink.submit(&found.vault_paths) {
        warn!("host rejected the discovered store paths");
        return JobResult::failure(id, "The discovered key vaults could not be submitted to the host.");
    }

    JobResult::new(found.status(), id, found.summary())
}
