use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Username seeded for the first Super Admin account.
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Email seeded for the first Super Admin account.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password seeded for the first Super Admin account. A random one is
    /// generated and logged once at startup when not configured.
    pub admin_password: Option<String>,
    /// Failed logins tolerated before an account is locked.
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: i64,
    /// Minutes an account stays locked after too many failures.
    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,
    /// Hours before a session expires.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_username: default_admin_username(),
            admin_email: default_admin_email(),
            admin_password: None,
            max_login_attempts: default_max_login_attempts(),
            lockout_minutes: default_lockout_minutes(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_email() -> String {
    "admin@brdss.local".to_string()
}

fn default_max_login_attempts() -> i64 {
    5
}

fn default_lockout_minutes() -> i64 {
    15
}

fn default_session_ttl_hours() -> i64 {
    12
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Directory under data_dir where dump artifacts are written.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    /// Path to the sqlite3 dump tool.
    #[serde(default = "default_dump_tool")]
    pub dump_tool: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            dump_tool: default_dump_tool(),
        }
    }
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

fn default_dump_tool() -> String {
    "sqlite3".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            backup: BackupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_lockout_policy() {
        let config = Config::default();
        assert_eq!(config.auth.max_login_attempts, 5);
        assert_eq!(config.auth.lockout_minutes, 15);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9090

            [auth]
            admin_username = "chief"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.admin_username, "chief");
        assert_eq!(config.auth.lockout_minutes, 15);
        assert_eq!(config.backup.dump_tool, "sqlite3");
    }
}
