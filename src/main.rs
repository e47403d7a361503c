//! Minimal service entry point: load configuration, build a portal pool and
//! an empty stream group, and run until asked to shut down.
//!
//! Wiring streams onto the group (picking manifests, feeding producers,
//! draining consumers) is left to an embedding application — this binary
//! only demonstrates the ambient plumbing (config, logging, shutdown).

use std::path::PathBuf;
use std::sync::Arc;

use bufferedskystream::{GroupConfig, HttpPortalClient, PoolConfig, PortalConfig, PortalPool, StreamGroup, run_until_shutdown};

#[derive(serde::Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    pool: Option<PoolConfig>,
    #[serde(default)]
    group: Option<GroupConfig>,
    #[serde(default)]
    portal: Option<PortalConfig>,
}

fn load_config(path: Option<PathBuf>) -> Result<FileConfig, String> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(&path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("parsing {}: {e}", path.display()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let pool = Arc::new(PortalPool::new(
        config.pool.unwrap_or_default(),
        config.portal.unwrap_or_default(),
        Arc::new(HttpPortalClient::new()),
    ));
    let group = StreamGroup::new(pool, config.group.unwrap_or_default());

    tracing::info!("bufferedskystream started");
    run_until_shutdown(&group).await;
}
