//! Startup helpers for the memory bridge dashboard binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::memory::core::env::{DotenvProvider, EnvProvider};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::engine::MemoryBridge;
use crate::memory::retrieval::ApiClient;
use crate::memory::telemetry::{Telemetry, TelemetryFlusher};
use crate::server::{self, AppState};

const STATS_FILE: &str = "memos-bridge-stats.json";

/// Run the dashboard server (used by the `memos-bridge` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting memos-bridge v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve()) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build the bridge, start the flusher and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the plugin config, HTTP client or listener fails.
pub async fn serve() -> anyhow::Result<()> {
    let env = DotenvProvider::discover();
    for source in env.sources() {
        tracing::info!("Loaded env file {}", source.display());
    }

    let plugin = load_plugin_config(&env)
        .await
        .context("failed to load plugin config")?;
    let telemetry = Arc::new(Telemetry::restore(stats_path(&env)).await);
    let client = ApiClient::http().context("failed to build HTTP client")?;
    let bridge = Arc::new(MemoryBridge::new(
        plugin,
        Arc::new(env),
        client,
        Arc::clone(&telemetry),
    )?);

    let config = bridge.config();
    let flusher = TelemetryFlusher::from_config(Arc::clone(&telemetry), &config.dashboard);
    let flusher_stop = flusher.shutdown_notifier();
    let flusher_task = flusher.spawn();

    let result = server::run_server_with_shutdown(
        AppState::new(bridge),
        config.dashboard.port,
        shutdown_signal(),
    )
    .await
    .map_err(|e| anyhow::anyhow!(e));

    flusher_stop.notify_one();
    if let Err(e) = flusher_task.await {
        tracing::warn!("Telemetry flusher stopped abnormally: {e}");
    }

    result
}

/// Read the plugin config named by `MEMOS_PLUGIN_CONFIG`.
///
/// Returns an empty object when the variable is unset.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a JSON object.
pub async fn load_plugin_config(env: &dyn EnvProvider) -> MemoryResult<Value> {
    let Some(path) = env.get("MEMOS_PLUGIN_CONFIG").filter(|p| !p.trim().is_empty()) else {
        return Ok(Value::Object(serde_json::Map::new()));
    };

    let bytes = tokio::fs::read(path.trim()).await?;
    let value: Value = serde_json::from_slice(&bytes)?;
    if !value.is_object() {
        return Err(MemoryError::InvalidConfig(format!(
            "plugin config {path} is not a JSON object"
        )));
    }
    Ok(value)
}

/// Snapshot location: `MEMOS_STATS_PATH`, else under `~/.openclaw`.
#[must_use]
pub fn stats_path(env: &dyn EnvProvider) -> PathBuf {
    if let Some(path) = env.get("MEMOS_STATS_PATH").filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path.trim());
    }
    dirs::home_dir().map_or_else(
        || PathBuf::from(STATS_FILE),
        |home| home.join(".openclaw").join(STATS_FILE),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::core::env::MapEnvProvider;

    #[tokio::test]
    async fn test_plugin_config_from_env_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.json");
        std::fs::write(&path, r#"{ "userId": "alice" }"#).unwrap();

        let env = MapEnvProvider::new().with("MEMOS_PLUGIN_CONFIG", path.display().to_string());
        let plugin = load_plugin_config(&env).await.unwrap();
        assert_eq!(plugin["userId"], "alice");
    }

    #[tokio::test]
    async fn test_plugin_config_defaults_and_rejects_non_objects() {
        let empty = load_plugin_config(&MapEnvProvider::new()).await.unwrap();
        assert_eq!(empty, serde_json::json!({}));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        let env = MapEnvProvider::new().with("MEMOS_PLUGIN_CONFIG", path.display().to_string());
        assert!(matches!(
            load_plugin_config(&env).await,
            Err(MemoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stats_path_override() {
        let env = MapEnvProvider::new().with("MEMOS_STATS_PATH", "/tmp/x/stats.json");
        assert_eq!(stats_path(&env), PathBuf::from("/tmp/x/stats.json"));
        assert!(stats_path(&MapEnvProvider::new()).ends_with(STATS_FILE));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        use std::time::Duration;
        use tokio::signal::unix::{SignalKind, signal};

        // Keeps SIGTERM routed to tokio for the whole test.
        let _listener = signal(SignalKind::terminate()).unwrap();
        let waiter = tokio::spawn(shutdown_signal());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
