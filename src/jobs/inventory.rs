use tracing::{error, info, warn};

use super::config::StoreJob;
use super::InventorySink;
use crate::models::certificate::CertificateRecord;
use crate::models::job::{InventoryItem, JobResult};
use crate::vault::CertificateStore;

const ITEM_STATUS_UNKNOWN: &str = "Unknown";

fn to_item(record: &CertificateRecord) -> InventoryItem {
    InventoryItem {
        alias: record.alias.clone(),
        private_key_entry: record.has_private_key,
        certificates: vec![record.der_base64()],
        item_status: ITEM_STATUS_UNKNOWN.to_string(),
        use_chain_level: true,
    }
}

/// Lists the store and reports it to the host.
pub async fn run(job: &StoreJob, store: &dyn CertificateStore, sink: &mut dyn InventorySink) -> JobResult {
    let id = job.context.job_history_id;

    let listing = match store.list_certificates().await {
        Ok(l) => l,
        Err(e) => {
            error!(store = %job.location.store_path(), error = %e.one_line(), "inventory failed");
            return JobResult::failure(id, e.one_line());
        }
    };

    let items: Vec<InventoryItem> = listing.certificates.iter().map(to_item).collect();
    info!(store = %job.location.store_path(), count = items.len(), "submitting inventory");
    if !sink.submit(&items) {
        warn!(store = %job.location.store_path(), "host rejected the inventory");
        return JobResult::failure(id, "The inventory could not be submitted to the host.");
    }

    if listing.failures.is_empty() {
        JobResult::success(id)
    } else {
        JobResult::warning(
            id,
            format!(
                "Inventory completed, but {} of {} certificates could not be read:\n{}",
                listing.failures.len(),
                listing.failures.len() + items.len(),
                listing.failures.join("\n")
            ),
        )
    }
}
