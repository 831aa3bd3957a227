use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// akv-orchestrator — Azure Key Vault certificate store jobs
#[derive(Parser)]
#[command(name = "akv-orchestrator", version, about)]
pub struct Cli {
    /// Resolve `env:NAME` secret references from the environment
    #[arg(long, global = true)]
    pub resolve_env_secrets: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a job record exactly as the host delivers it
    Run {
        /// Job record file (.json, .yaml or .yml)
        #[arg(long)]
        job: PathBuf,
    },

    /// List the certificates of a vault
    Inventory {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Search tenants for vaults
    Discover {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Comma-separated tenant ids; `*` expands to every visible tenant
        #[arg(long, default_value = "")]
        dirs: String,
    },

    /// Create the vault named by the store path
    Create {
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Import a PFX into the vault
    Add {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        alias: String,
        /// PKCS#12 file
        #[arg(long)]
        pfx: PathBuf,
        #[arg(long, env = "AKV_PFX_PASSWORD", hide_env_values = true)]
        pfx_password: String,
        #[arg(long)]
        overwrite: bool,
        /// JSON object of string tags
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        preserve_tags: bool,
    },

    /// Delete a certificate from the vault
    Remove {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long)]
        alias: String,
    },

    /// Resolve a store path and print the vault location
    ResolvePath {
        store_path: String,
        #[arg(long)]
        resource_group: Option<String>,
        #[arg(long)]
        vault_name: Option<String>,
    },
}

#[derive(Args, Clone)]
pub struct IdentityArgs {
    #[arg(long, env = "AKV_TENANT_ID", default_value = "")]
    pub tenant_id: String,
    /// Application (client) id; for a user-assigned identity, its client id
    #[arg(long, env = "AKV_CLIENT_ID", default_value = "")]
    pub client_id: String,
    /// Client secret; empty or `managed` selects the managed identity
    #[arg(long, env = "AKV_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,
    /// public, government, china or germany
    #[arg(long, default_value = "public")]
    pub cloud: String,
    #[arg(long)]
    pub private_endpoint: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub job_history_id: i64,
}

#[derive(Args, Clone)]
pub struct StoreArgs {
    #[command(flatten)]
    pub identity: IdentityArgs,
    /// `subscription:resourceGroup:vault`
    #[arg(long)]
    pub store_path: String,
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub premium: bool,
    /// Keep App Service bindings in step with adds and removals
    #[arg(long)]
    pub auto_update_bindings: bool,
}
