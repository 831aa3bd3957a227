use serde::{Deserialize, Serialize};

use super::job::JobStatus;

/// Outcome of one discovery run. Built fresh per run, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// Ordered `subscriptionId:resourceGroup:vaultName` keys.
    pub vault_paths: Vec<String>,
    /// Ordered, human-readable per-scope failures.
    pub warnings: Vec<String>,
}

impl DiscoveryResult {
    pub fn status(&self) -> JobStatus {
        match (self.vault_paths.is_empty(), self.warnings.is_empty()) {
            (_, true) => JobStatus::Success,
            (false, false) => JobStatus::Warning,
            (true, false) => JobStatus::Failure,
        }
    }

    /// Host-facing summary line(s) for this result.
    pub fn summary(&self) -> String {
        match self.status() {
            JobStatus::Success => format!(
                "Discovery job completed successfully.  Found {} KeyVaults.",
                self.vault_paths.len()
            ),
            JobStatus::Warning => format!(
                "Discovery job completed with errors.  Found {} KeyVaults.\nThe following errors occurred: \n{}",
                self.vault_paths.len(),
                self.warnings.join("\n")
            ),
            JobStatus::Failure => format!(
                "Discovery job failed with the following errors: \n{}",
                self.warnings.join("\n")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(found: usize, failed: usize) -> DiscoveryResult {
        DiscoveryResult {
            vault_paths: (0..found).map(|i| format!("s:rg:v{i}")).collect(),
            warnings: (0..failed).map(|i| format!("tenant t{i} failed")).collect(),
        }
    }

    #[test]
    fn test_status_aggregation() {
        assert_eq!(result(0, 0).status(), JobStatus::Success);
        assert_eq!(result(3, 0).status(), JobStatus::Success);
        assert_eq!(result(2, 1).status(), JobStatus::Warning);
        assert_eq!(result(0, 2).status(), JobStatus::Failure);
    }

    #[test]
    fn test_summary_lists_warnings() {
        let s = result(2, 2).summary();
        assert!(s.contains("Found 2 KeyVaults"));
        assert!(s.contains("tenant t0 failed\ntenant t1 failed"));
        assert!(result(0, 1).summary().starts_with("Discovery job failed"));
    }
}
