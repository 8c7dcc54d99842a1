//! TOML configuration.
//!
//! Every section is optional. When no config file exists at the default
//! location the built-in defaults apply, so `locatex` works out of the box
//! with its index under `~/.locatex/`.

use anyhow::{bail, Context, Result};
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl IndexConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_index_path() -> PathBuf {
    data_dir().join("index.db")
}
fn default_busy_timeout_ms() -> u64 {
    5000
}
fn default_lock_timeout_ms() -> u64 {
    250
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_scan_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: default_scan_root(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_scan_root() -> PathBuf {
    PathBuf::from("/")
}
fn default_channel_capacity() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub match_path: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            case_sensitive: false,
            match_path: false,
        }
    }
}

fn default_page_size() -> i64 {
    50
}

/// `~/.locatex`, or `./.locatex` when no home directory can be resolved.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".locatex")
}

pub fn default_config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Loads the config at `path`, or the defaults when `path` is the implicit
/// default location and nothing is there.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default = default_config_path();
            if default.exists() {
                load_config(&default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.index.path = expand_home(&config.index.path);
    config.scan.root = expand_home(&config.scan.root);

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.search.page_size < 1 {
        bail!("search.page_size must be >= 1");
    }

    if config.scan.channel_capacity == 0 {
        bail!("scan.channel_capacity must be > 0");
    }

    // The reconciler keeps a connection busy while queries run alongside it.
    if config.index.max_connections < 2 {
        bail!("index.max_connections must be >= 2");
    }

    for pattern in &config.scan.exclude_globs {
        Glob::new(pattern).with_context(|| format!("Invalid exclude glob: '{}'", pattern))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn empty_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.search.page_size, 50);
        assert!(!cfg.search.case_sensitive);
        assert_eq!(cfg.index.lock_timeout_ms, 250);
        assert!(cfg.index.path.ends_with(".locatex/index.db"));
    }

    #[test]
    fn sections_override_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[index]
path = "/tmp/locatex-test/index.db"
lock_timeout_ms = 10

[scan]
root = "/srv"
exclude_globs = ["**/node_modules/**"]

[search]
page_size = 20
case_sensitive = true
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.index.path, PathBuf::from("/tmp/locatex-test/index.db"));
        assert_eq!(cfg.index.lock_timeout(), Duration::from_millis(10));
        assert_eq!(cfg.scan.root, PathBuf::from("/srv"));
        assert_eq!(cfg.scan.exclude_globs.len(), 1);
        assert_eq!(cfg.search.page_size, 20);
        assert!(cfg.search.case_sensitive);
    }

    #[test]
    fn zero_page_size_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[search]\npage_size = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn single_connection_pool_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[index]\nmax_connections = 1\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn bad_glob_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[scan]\nexclude_globs = [\"a[\"]\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/x/index.db")), home.join("x/index.db"));
        }
        assert_eq!(expand_home(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
