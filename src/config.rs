use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::catalog::{is_identifier, DEFAULT_PATTERN};
use crate::error::{HashSyncError, Result};
use crate::state::StoredFingerprints;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }

    pub fn is_persistent(&self) -> bool {
        !matches!(self, Environment::Dev)
    }
}

impl FromStr for Environment {
    type Err = HashSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(HashSyncError::Config(format!("Unknown environment '{}'", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Table data. Fingerprints are computed from it unless `fingerprints` is set.
    pub directory: PathBuf,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Fixed fingerprint snapshot used instead of hashing the directory.
    #[serde(default)]
    pub fingerprints: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub static_hashes: StoredFingerprints,
    /// Where created item ids are remembered. Defaults to `<state path>.items.json`.
    #[serde(default)]
    pub items_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default)]
    pub extract_secs: Option<u64>,
    #[serde(default)]
    pub package_secs: Option<u64>,
    #[serde(default)]
    pub publish_secs: Option<u64>,
    #[serde(default)]
    pub commit_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_tries: default_max_tries(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub destinations: Option<PathBuf>,
    /// Publishing unit for tables without a destinations entry when no
    /// destinations document is configured.
    #[serde(default = "default_unit")]
    pub default_unit: String,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_publish_dir")]
    pub publish_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_true")]
    pub batch_updates: bool,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_unit() -> String {
    "default".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_publish_dir() -> PathBuf {
    PathBuf::from("published")
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_max_tries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| HashSyncError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml(&content)?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(base_dir);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(HashSyncError::Config("concurrency must be at least 1".into()));
        }
        if self.retry.max_tries == 0 {
            return Err(HashSyncError::Config("retry.max_tries must be at least 1".into()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(HashSyncError::Config("retry.multiplier must be >= 1.0".into()));
        }
        if !is_identifier(&self.default_unit) {
            return Err(HashSyncError::Config(format!("invalid default_unit '{}'", self.default_unit)));
        }
        if self.environment.is_persistent() && self.state.path.is_none() {
            return Err(HashSyncError::Config(format!(
                "state.path is required in the {} environment",
                self.environment
            )));
        }
        Ok(())
    }

    /// Relative paths in the file are relative to the file itself.
    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base_dir.join(&*p);
            }
        };

        resolve(&mut self.catalog.directory);
        if let Some(p) = self.catalog.fingerprints.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.destinations.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.state.path.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.state.items_path.as_mut() {
            resolve(p);
        }
        resolve(&mut self.output_dir);
        resolve(&mut self.publish_dir);
    }

    /// Switches environment after load, e.g. from a command-line flag.
    pub fn with_environment(mut self, environment: Environment) -> Result<Self> {
        self.environment = environment;
        self.validate()?;
        Ok(self)
    }
}
