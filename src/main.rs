use anyhow::Context;
use hrv_dataset::config::{Config, OnExisting, OutputFormat};
use hrv_dataset::{
    ConflictResolver, ConnectionManager, FixedResolver, PromptResolver, Resolution,
    SchemaProvisioner, SqliteConnector,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Provisioning failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let manager = ConnectionManager::new(
        SqliteConnector::new(&config.data_dir),
        config.retry_policy(),
    );
    let resolver: Arc<dyn ConflictResolver> = match config.on_existing {
        OnExisting::Prompt => Arc::new(PromptResolver::stdio()),
        OnExisting::Retain => Arc::new(FixedResolver(Resolution::Retain)),
        OnExisting::Replace => Arc::new(FixedResolver(Resolution::Replace)),
    };
    let provisioner = SchemaProvisioner::new(manager, resolver);

    let outcome = tokio::select! {
        result = provisioner.provision(&config.schema_name) => {
            result.with_context(|| format!("schema {}", config.schema_name))?
        }
        _ = tokio::signal::ctrl_c() => {
            anyhow::bail!("interrupted while provisioning schema {}", config.schema_name);
        }
    };

    match config.output {
        OutputFormat::Text => println!("Schema {} {}", config.schema_name, outcome),
        OutputFormat::Json => println!(
            "{}",
            json!({ "schema": config.schema_name, "outcome": outcome })
        ),
    }
    Ok(())
}
