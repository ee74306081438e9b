mod config;

use anyhow::{bail, Result};
use config::DeployConfig;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wg_admin_core::{CompiledTopology, InMemoryBackend, ReferenceResolver, TopologyCompiler};

/// What a dry run prints on stdout
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DryRun<'a> {
    fingerprint: String,
    topology: &'a CompiledTopology,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("WG_ADMIN_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // stdout carries the compiled topology
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    if std::env::args().skip(1).any(|arg| arg == "--schema") {
        let schema = schemars::schema_for!(DeployConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = DeployConfig::load()?;
    info!(
        desired_count = config.desired_count,
        network_mode = ?config.network_mode,
        "Compiling WireGuard admin topology"
    );

    // Dry run: every imported handle the configuration names is assumed to exist
    let backend = match ReferenceResolver::resolve(&config.references) {
        Ok(refs) => InMemoryBackend::for_references(&refs),
        Err(e) => {
            warn!("References do not resolve, starting from an empty backend: {}", e);
            InMemoryBackend::new()
        }
    };

    let compiler = TopologyCompiler::new(&backend, config.settings());
    let topology = match compiler.compile(&config.references, &config.parameters()).await {
        Ok(topology) => topology,
        Err(e) => bail!("{} stage failed: {}", e.stage(), e),
    };

    let fingerprint = topology.fingerprint()?;
    info!(
        fingerprint = %fingerprint,
        resources = backend.resource_count().await,
        "Topology compiled"
    );

    let output = DryRun {
        fingerprint,
        topology: &topology,
    };
    match std::env::var("WG_ADMIN_OUTPUT").as_deref() {
        Ok("yaml") => print!("{}", serde_yaml::to_string(&output)?),
        _ => println!("{}", serde_json::to_string_pretty(&output)?),
    }

    Ok(())
}
