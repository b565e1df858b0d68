use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub spotlight: SpotlightConfig,
    #[serde(default)]
    pub zotero: Option<ZoteroConfig>,
    #[serde(default)]
    pub deploy: Option<DeployConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

/// Upper bound for `server.session_ttl_secs` (ten years).
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Two weeks, the usual lifetime of a browser session cookie.
fn default_session_ttl() -> u64 {
    1_209_600
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeywordsConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_extractor")]
    pub extractor: String,
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            extractor: default_extractor(),
            extra_stopwords: Vec::new(),
        }
    }
}

fn default_max_items() -> usize {
    15
}
fn default_extractor() -> String {
    "frequency".to_string()
}

impl KeywordsConfig {
    pub fn uses_dbpedia(&self) -> bool {
        self.extractor == "dbpedia"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotlightConfig {
    #[serde(default = "default_spotlight_url")]
    pub base_url: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_support")]
    pub support: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpotlightConfig {
    fn default() -> Self {
        Self {
            base_url: default_spotlight_url(),
            confidence: default_confidence(),
            support: default_support(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_spotlight_url() -> String {
    "http://spotlight.dbpedia.org/rest".to_string()
}
fn default_confidence() -> f64 {
    0.3
}
fn default_support() -> u32 {
    60
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZoteroConfig {
    pub client_key: String,
    pub client_secret: String,
    pub callback_url: String,
    #[serde(default = "default_oauth_base")]
    pub oauth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_num_items")]
    pub num_items: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_oauth_base() -> String {
    "https://www.zotero.org/oauth".to_string()
}
fn default_api_base() -> String {
    "https://api.zotero.org".to_string()
}
fn default_num_items() -> u32 {
    99
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeployConfig {
    #[serde(default = "default_project")]
    pub project: String,
    /// Release version; the crate version when unset.
    #[serde(default)]
    pub version: Option<String>,
    /// `user@host` for ssh, or `local` to run against this machine.
    pub host: String,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    #[serde(default = "default_remote_path")]
    pub remote_path: String,
    /// Account owning the deployed code; empty disables `sudo -u`.
    #[serde(default = "default_remote_acct")]
    pub remote_acct: String,
    #[serde(default = "default_webgroup")]
    pub webgroup: String,
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
    #[serde(default = "default_keep_builds")]
    pub keep_builds: usize,
    #[serde(default = "default_build_command")]
    pub build_command: String,
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_backup_db")]
    pub backup_db_command: String,
    #[serde(default = "default_restore_db")]
    pub restore_db_command: String,
    #[serde(default = "default_restart")]
    pub restart_command: String,
}

fn default_project() -> String {
    "serendipomatic".to_string()
}
fn default_remote_path() -> String {
    "/var/www/serendipomatic/".to_string()
}
fn default_remote_acct() -> String {
    "serendip".to_string()
}
fn default_webgroup() -> String {
    "webwrite".to_string()
}
fn default_settings_file() -> String {
    "serendip.toml".to_string()
}
fn default_keep_builds() -> usize {
    3
}
fn default_build_command() -> String {
    "cargo build --release --locked".to_string()
}
fn default_binary() -> String {
    "target/release/serendip".to_string()
}
fn default_backup_db() -> String {
    "/home/serendip/bin/backup_db".to_string()
}
fn default_restore_db() -> String {
    "/home/serendip/bin/restore_db".to_string()
}
fn default_restart() -> String {
    "sudo service httpd restart".to_string()
}

impl DeployConfig {
    pub fn account(&self) -> Option<&str> {
        if self.remote_acct.is_empty() {
            None
        } else {
            Some(&self.remote_acct)
        }
    }

    pub fn version(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
    }
}

impl Config {
    /// Configuration for commands that never touch the database or server.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/serendip.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
                session_ttl_secs: default_session_ttl(),
            },
            keywords: KeywordsConfig::default(),
            spotlight: SpotlightConfig::default(),
            zotero: None,
            deploy: None,
        }
    }

    pub fn deploy(&self) -> Result<&DeployConfig> {
        self.deploy
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[deploy] section not configured"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.keywords.max_items == 0 {
        anyhow::bail!("keywords.max_items must be >= 1");
    }

    match config.keywords.extractor.as_str() {
        "frequency" | "dbpedia" => {}
        other => anyhow::bail!(
            "Unknown keyword extractor: '{}'. Must be frequency or dbpedia.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.spotlight.confidence) {
        anyhow::bail!("spotlight.confidence must be in [0.0, 1.0]");
    }

    if config.server.session_ttl_secs == 0 {
        anyhow::bail!("server.session_ttl_secs must be > 0");
    }
    if config.server.session_ttl_secs > MAX_SESSION_TTL_SECS {
        anyhow::bail!(
            "server.session_ttl_secs must be <= {} (ten years)",
            MAX_SESSION_TTL_SECS
        );
    }

    if let Some(zotero) = &config.zotero {
        if zotero.client_key.is_empty() || zotero.client_secret.is_empty() {
            anyhow::bail!("zotero.client_key and zotero.client_secret must be set");
        }
        if zotero.num_items == 0 {
            anyhow::bail!("zotero.num_items must be >= 1");
        }
    }

    if let Some(deploy) = &config.deploy {
        if deploy.project.is_empty() {
            anyhow::bail!("deploy.project must not be empty");
        }
        if deploy.host.is_empty() {
            anyhow::bail!("deploy.host must be set (use \"local\" for this machine)");
        }
        semver::Version::parse(&deploy.version())
            .with_context(|| format!("deploy.version is not semver: {}", deploy.version()))?;
    }

    Ok(config)
}
