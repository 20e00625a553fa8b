//! Hot reload of breaker defaults and overrides.
//!
//! The notify callback runs on its own thread, so it only parses and
//! validates; a Tokio task owns the registry side and applies each update.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::AppConfig;
use crate::resilience::registry::BreakerRegistry;

/// Watches a config file and pushes valid revisions into a registry.
pub struct ConfigWatcher {
    path: PathBuf,
    registry: Arc<BreakerRegistry>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, registry: Arc<BreakerRegistry>) -> Self {
        Self {
            path: path.to_path_buf(),
            registry,
        }
    }

    /// Start watching. Must be called inside a Tokio runtime. Updates flow
    /// for as long as the returned watcher is alive.
    pub fn spawn(self) -> Result<RecommendedWatcher, notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        apply_updates(self.registry, rx);

        let path = self.path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Some(config) = reload(&path) {
                        let _ = tx.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Load a changed file. Invalid revisions are logged and dropped so the
/// registry keeps its current settings.
fn reload(path: &Path) -> Option<AppConfig> {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(
                path = ?path,
                breaker_overrides = config.breakers.len(),
                "Config file changed"
            );
            Some(config)
        }
        Err(e) => {
            tracing::error!(
                path = ?path,
                error = %e,
                "Failed to reload config, keeping current breaker defaults"
            );
            None
        }
    }
}

fn apply_updates(
    registry: Arc<BreakerRegistry>,
    mut updates: mpsc::UnboundedReceiver<AppConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            registry.apply_config(&config);
            tracing::info!(
                default_threshold = config.defaults.error_threshold_percentage,
                "Breaker defaults reloaded"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BreakerOptions;

    fn temp_config(tag: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "circuit-guard-watch-{}-{}.toml",
            tag,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reload_keeps_nothing_from_invalid_file() {
        let path = temp_config("invalid", "[defaults]\nerror_threshold_percentage = 150.0\n");
        assert!(reload(&path).is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_reload_reads_valid_file() {
        let path = temp_config("valid", "[defaults]\nerror_threshold_percentage = 75.0\n");
        let config = reload(&path).unwrap();
        assert_eq!(config.defaults.error_threshold_percentage, 75.0);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_updates_reach_registry_for_new_breakers() {
        let registry = Arc::new(BreakerRegistry::new(BreakerOptions::default()));
        let existing = registry.get_or_create("vector-index", None).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let task = apply_updates(registry.clone(), rx);

        let mut config = AppConfig::default();
        config.defaults = BreakerOptions::default().with_error_threshold(80.0);
        tx.send(config).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            registry.effective_options("primary-store").error_threshold_percentage,
            80.0
        );
        assert_eq!(existing.options().error_threshold_percentage, 50.0);
    }
}
