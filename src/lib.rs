//! akv-orchestrator — certificate store jobs against Azure Key Vault.
//!
//! Re-exports modules needed by the binary and the integration tests in
//! `tests/`.

pub mod azure;
pub mod binding;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod store_path;
pub mod vault;
