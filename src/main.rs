use anyhow::Context;
use base64::Engine;
use clap::Parser;
use serde_json::{json, Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use akv_orchestrator::jobs::{
    self, EnvSecretResolver, JobConfig, JobRecord, PamSecretResolver, PassthroughResolver,
};
use akv_orchestrator::models::job::{InventoryItem, JobResult, JobStatus};
use akv_orchestrator::store_path::{self, LocationOverrides};
use akv_orchestrator::{config, errors::AkvError};

mod cli;

use cli::{Commands, IdentityArgs, StoreArgs};

fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // Export spans over OTLP only when a collector is configured.
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "akv-orchestrator"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    // Logs go to stderr; stdout carries the job result.
    let fmt_layer = if std::env::var("AKV_LOG_JSON").map(|v| v == "1").unwrap_or(false) {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "akv_orchestrator=debug".into()),
        ))
        .with(fmt_layer)
        .with(telemetry_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = config::load()?;
    let args = cli::Cli::parse();
    let resolver: &dyn PamSecretResolver = if args.resolve_env_secrets {
        &EnvSecretResolver
    } else {
        &PassthroughResolver
    };

    let record = match args.command {
        Commands::ResolvePath {
            store_path,
            resource_group,
            vault_name,
        } => {
            let overrides = LocationOverrides {
                resource_group,
                vault_name,
                ..Default::default()
            };
            let location = store_path::resolve(&store_path, &overrides)?;
            println!("{}", serde_json::to_string_pretty(&location)?);
            return Ok(());
        }
        Commands::Run { job } => read_record(&job)?,
        other => record_from_args(other)?,
    };

    let job = JobConfig::from_record(&record, resolver);
    let result = match job {
        Ok(job) => execute(&job, &cfg).await,
        Err(e) => {
            tracing::error!(error = %e.one_line(), "invalid job record");
            JobResult::failure(record.job_history_id, e.one_line())
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.result == JobStatus::Failure {
        std::process::exit(1);
    }
    Ok(())
}

async fn execute(job: &JobConfig, cfg: &config::Config) -> JobResult {
    let mut inventory: Vec<InventoryItem> = Vec::new();
    let mut discovered: Vec<String> = Vec::new();

    let run = jobs::run_job(job, cfg, &mut inventory, &mut discovered);
    let result = match cfg.job_timeout() {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(r) => r,
            Err(_) => JobResult::failure(
                job.job_history_id(),
                format!("job did not finish within {} seconds", limit.as_secs()),
            ),
        },
        None => run.await,
    };

    if !inventory.is_empty() {
        print_json(&inventory);
    }
    if !discovered.is_empty() {
        print_json(&discovered);
    }
    result
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::warn!(error = %e, "could not render job output"),
    }
}

fn read_record(path: &std::path::Path) -> anyhow::Result<JobRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job record {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let record = if is_yaml {
        JobRecord::from_yaml(&raw)
    } else {
        JobRecord::from_json(&raw)
    };
    record.with_context(|| format!("invalid job record {}", path.display()))
}

fn identity_record(operation: &str, identity: &IdentityArgs, mut props: Map<String, Value>) -> JobRecord {
    props.insert("TenantId".into(), json!(identity.tenant_id));
    props.insert("AzureCloud".into(), json!(identity.cloud));
    if let Some(pe) = &identity.private_endpoint {
        props.insert("PrivateEndpoint".into(), json!(pe));
    }
    JobRecord {
        operation_type: operation.to_string(),
        server_username: identity.client_id.clone(),
        server_password: identity.client_secret.clone(),
        properties: Some(Value::Object(props)),
        job_history_id: identity.job_history_id,
        ..Default::default()
    }
}

fn store_record(operation: &str, store: &StoreArgs) -> JobRecord {
    let mut props = Map::new();
    if let Some(region) = &store.region {
        props.insert("VaultRegion".into(), json!(region));
    }
    props.insert("PremiumSKU".into(), json!(store.premium));
    props.insert("AutoUpdateAppServiceBindings".into(), json!(store.auto_update_bindings));

    JobRecord {
        store_path: store.store_path.clone(),
        ..identity_record(operation, &store.identity, props)
    }
}

fn record_from_args(command: Commands) -> anyhow::Result<JobRecord> {
    Ok(match command {
        Commands::Inventory { store } => store_record("Inventory", &store),
        Commands::Create { store } => store_record("Create", &store),
        Commands::Discover { identity, dirs } => {
            let mut props = Map::new();
            props.insert("dirs".into(), json!(dirs));
            identity_record("Discovery", &identity, props)
        }
        Commands::Add {
            store,
            alias,
            pfx,
            pfx_password,
            overwrite,
            tags,
            preserve_tags,
        } => {
            let bytes = std::fs::read(&pfx).with_context(|| format!("failed to read {}", pfx.display()))?;
            let mut job_props = Map::new();
            if let Some(t) = tags {
                job_props.insert("CertificateTags".into(), json!(t));
            }
            job_props.insert("PreserveExistingTags".into(), json!(preserve_tags));
            JobRecord {
                job_certificate: Some(jobs::config::JobCertificate {
                    alias: Some(alias),
                    contents: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
                    private_key_password: Some(pfx_password),
                }),
                overwrite,
                job_properties: Some(Value::Object(job_props)),
                ..store_record("Add", &store)
            }
        }
        Commands::Remove { store, alias } => JobRecord {
            job_certificate: Some(jobs::config::JobCertificate {
                alias: Some(alias),
                ..Default::default()
            }),
            ..store_record("Remove", &store)
        },
        Commands::Run { .. } | Commands::ResolvePath { .. } => {
            return Err(AkvError::config("command does not describe a job").into())
        }
    })
}
