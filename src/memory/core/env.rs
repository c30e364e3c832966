//! Environment value discovery.
//!
//! The resolver only needs a key/value lookup; where those values come from
//! (dotenv files, the process environment, a host-provided map) is decided by
//! the [`EnvProvider`] handed to it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Dotenv files searched under the home directory, in priority order.
pub const ENV_FILE_CANDIDATES: [&str; 3] = [".openclaw/.env", ".moltbot/.env", ".clawdbot/.env"];

/// Key/value lookup used by the config resolver.
pub trait EnvProvider: Send + Sync {
    /// Look up a value by key.
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory provider, mostly for tests and embedding hosts.
#[derive(Clone, Debug, Default)]
pub struct MapEnvProvider {
    values: HashMap<String, String>,
}

impl MapEnvProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl EnvProvider for MapEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Dotenv-backed provider falling back to the process environment.
#[derive(Clone, Debug, Default)]
pub struct DotenvProvider {
    values: HashMap<String, String>,
    sources: Vec<PathBuf>,
}

impl DotenvProvider {
    /// Load the well-known dotenv files under the user's home directory.
    #[must_use]
    pub fn discover() -> Self {
        let Some(home) = dirs::home_dir() else {
            warn!("Home directory not found, using process environment only");
            return Self::default();
        };
        let paths: Vec<PathBuf> = ENV_FILE_CANDIDATES
            .iter()
            .map(|relative| home.join(relative))
            .collect();
        Self::from_paths(&paths)
    }

    /// Load the given dotenv files; earlier files win per key.
    #[must_use]
    pub fn from_paths(paths: &[PathBuf]) -> Self {
        let mut provider = Self::default();
        for path in paths {
            provider.load_file(path);
        }
        provider
    }

    /// Files that contributed at least one value.
    #[must_use]
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    fn load_file(&mut self, path: &Path) {
        if !path.is_file() {
            return;
        }
        let iter = match dotenvy::from_path_iter(path) {
            Ok(iter) => iter,
            Err(err) => {
                warn!(path = %path.display(), %err, "Failed to open env file");
                return;
            }
        };

        let mut loaded = 0usize;
        for item in iter {
            match item {
                Ok((key, value)) => {
                    if !self.values.contains_key(&key) {
                        self.values.insert(key, value);
                        loaded += 1;
                    }
                }
                Err(err) => debug!(path = %path.display(), %err, "Skipping env line"),
            }
        }

        if loaded > 0 {
            debug!(path = %path.display(), loaded, "Loaded env file");
            self.sources.push(path.to_path_buf());
        }
    }
}

impl EnvProvider for DotenvProvider {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }
}
