//! Wazuh bridge daemon
//!
//! This binary runs the HTTP API and boot-time provisioning.
//! It handles:
//! - Wazuh API credential management and connectivity checks
//! - Proxying requests to the Wazuh API
//! - Provisioning the alerts template, index pattern and saved objects

pub mod api;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wazuh_bridge_lib::{Config, DocumentStore, ElasticsearchStore, Provisioner};

#[derive(Parser, Debug)]
#[command(name = "wazuh-bridge-server")]
#[command(author, version, about = "Wazuh API bridge server", long_about = None)]
struct Args {
    /// API port
    #[arg(long, env = "WAZUH_BRIDGE_PORT", default_value = "9090")]
    port: u16,

    /// API bind address
    #[arg(long, env = "WAZUH_BRIDGE_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Elasticsearch base URL
    #[arg(long, env = "ELASTICSEARCH_URL", default_value = "http://localhost:9200")]
    elasticsearch_url: String,

    /// Elasticsearch user
    #[arg(long, env = "ELASTICSEARCH_USERNAME")]
    elasticsearch_username: Option<String>,

    /// Elasticsearch password
    #[arg(long, env = "ELASTICSEARCH_PASSWORD", hide_env_values = true)]
    elasticsearch_password: Option<String>,

    /// Kibana index holding saved objects and app documents
    #[arg(long, env = "WAZUH_BRIDGE_KIBANA_INDEX", default_value = ".kibana")]
    kibana_index: String,

    /// Kibana version, used as the id of the UI settings document
    #[arg(long, env = "WAZUH_BRIDGE_KIBANA_VERSION", default_value = "5.3.0")]
    kibana_version: String,

    /// Directory containing the packaged template, fields and objects files
    #[arg(long, env = "WAZUH_BRIDGE_FILES_DIR", default_value = "integration_files")]
    integration_files_dir: PathBuf,

    /// Build revision recorded in the setup marker
    #[arg(long, env = "WAZUH_BRIDGE_REVISION", default_value = "0")]
    app_revision: String,

    /// Delay after creating the index pattern before writing UI settings (ms)
    #[arg(long, env = "WAZUH_BRIDGE_SETTLE_DELAY_MS", default_value = "2000")]
    settle_delay_ms: u64,

    /// Log level
    #[arg(long, env = "WAZUH_BRIDGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Config {
        let config = Config::new()
            .with_bind_address(self.bind)
            .with_port(self.port)
            .with_elasticsearch_url(self.elasticsearch_url)
            .with_kibana_index(self.kibana_index)
            .with_kibana_version(self.kibana_version)
            .with_integration_files_dir(self.integration_files_dir)
            .with_app_revision(self.app_revision)
            .with_settle_delay(Duration::from_millis(self.settle_delay_ms));
        let config = match (self.elasticsearch_username, self.elasticsearch_password) {
            (Some(user), Some(password)) => config.with_elasticsearch_auth(user, password),
            _ => config,
        };
        Config {
            log_level: self.log_level,
            ..config
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.into_config();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .init();

    tracing::info!("Starting Wazuh bridge server");
    tracing::info!("Elasticsearch: {}", config.elasticsearch_url);
    tracing::info!("Kibana index: {}", config.kibana_index);

    let store: Arc<dyn DocumentStore> = Arc::new(ElasticsearchStore::new(&config)?);

    // Provisioning runs once per boot and never blocks the API
    let provisioner = Provisioner::new(Arc::clone(&store), config.clone());
    let _provision_handle = tokio::spawn(async move {
        let report = provisioner.run().await;
        tracing::debug!(target: "initialize", "Provisioning report: {:?}", report.steps);
    });

    let api_state = api::ApiState::new(store, &config)?;
    let app = api::create_router(api_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
