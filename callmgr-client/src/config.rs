//! Session configuration.
//!
//! [`SessionConfig`] is the runtime configuration consumed by
//! [`Session::connect`](crate::Session::connect). [`Config`] is the file form,
//! loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CALLMGR_CONFIG)
//! 3. Secret file named by `auth.secret_file`
//! 4. Environment variables

use crate::tls::TlsClientConfig;
use callmgr_protocol::{BANNER, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default capacity of the outward event and error streams.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default cap on each of the dispatch loop's pending queues.
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

/// Default prefix of engine-generated action ids.
pub const DEFAULT_ID_PREFIX: &str = "r";

/// Manager credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Runtime session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Manager address (`host:port`).
    pub addr: String,
    /// Credentials for the automatic login on connect.
    pub credentials: Option<Credentials>,
    /// TLS configuration (plain TCP when unset).
    pub tls: Option<TlsClientConfig>,
    /// Bound on TCP connect, TLS handshake and banner read.
    pub connect_timeout: Duration,
    /// Default timeout for [`Session::call`](crate::Session::call).
    pub action_timeout: Duration,
    /// Capacity of the outward event and error streams.
    pub event_buffer: usize,
    /// Cap on each pending queue inside the dispatch loop.
    pub max_pending: usize,
    /// Prefix of engine-generated action ids.
    pub id_prefix: String,
    /// Substring the greeting line must contain.
    pub banner: String,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl SessionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            credentials: None,
            tls: None,
            connect_timeout: Duration::from_secs(10),
            action_timeout: Duration::from_secs(5),
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_pending: DEFAULT_MAX_PENDING,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            banner: BANNER.to_string(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, secret));
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = limit.max(1);
        self
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// Credentials to log in with on connect, if any are non-empty.
    pub fn login_credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref().filter(|c| !c.is_empty())
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// File configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manager endpoint.
    pub server: ServerConfig,
    /// Login credentials.
    pub auth: AuthConfig,
    /// TLS settings.
    pub tls: TlsConfig,
    /// Stream and queue sizing.
    pub queues: QueueConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// [`Config::load`] with variables looked up through `var`.
    pub fn load_from(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match var("CALLMGR_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.load_secrets()?;
        config.apply_overrides(var);
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `CALLMGR_*` overrides obtained from `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("CALLMGR_ADDR") {
            self.server.addr = addr;
        }
        if let Some(secs) = var("CALLMGR_ACTION_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.server.action_timeout_secs = secs;
        }
        if let Some(user) = var("CALLMGR_USER") {
            self.auth.username = Some(user);
        }
        if let Some(secret) = var("CALLMGR_SECRET") {
            self.auth.secret = Some(secret);
        }
        if let Some(enabled) = var("CALLMGR_TLS") {
            self.tls.enabled = parse_flag(&enabled);
        }
        if let Some(insecure) = var("CALLMGR_TLS_INSECURE") {
            self.tls.insecure = parse_flag(&insecure);
        }
        if let Some(path) = var("CALLMGR_CA_CERT") {
            self.tls.ca_cert_path = Some(PathBuf::from(path));
        }
    }

    /// Reads the secret from `auth.secret_file` when configured.
    pub fn load_secrets(&mut self) -> Result<(), ConfigError> {
        if let Some(ref path) = self.auth.secret_file {
            let secret = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            self.auth.secret = Some(secret.trim().to_string());
        }
        Ok(())
    }

    /// Converts into the runtime configuration.
    pub fn to_session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(self.server.addr.clone())
            .with_connect_timeout(Duration::from_secs(self.server.connect_timeout_secs))
            .with_action_timeout(Duration::from_secs(self.server.action_timeout_secs))
            .with_id_prefix(self.server.id_prefix.clone())
            .with_banner(self.server.banner.clone())
            .with_event_buffer(self.queues.event_buffer)
            .with_max_pending(self.queues.max_pending);

        if let Some(ref username) = self.auth.username {
            session = session.with_credentials(
                username.clone(),
                self.auth.secret.clone().unwrap_or_default(),
            );
        }

        if self.tls.enabled {
            session = session.with_tls(TlsClientConfig {
                ca_cert_path: self.tls.ca_cert_path.clone(),
                client_cert_path: self.tls.client_cert_path.clone(),
                client_key_path: self.tls.client_key_path.clone(),
                insecure: self.tls.insecure,
                server_name: self.tls.server_name.clone(),
            });
        }

        session
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Manager endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Manager address (`host:port`).
    pub addr: String,
    /// Expected greeting substring.
    pub banner: String,
    pub connect_timeout_secs: u64,
    pub action_timeout_secs: u64,
    /// Prefix of engine-generated action ids.
    pub id_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            banner: BANNER.to_string(),
            connect_timeout_secs: 10,
            action_timeout_secs: 5,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }
}

/// Login configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// File holding the secret; takes precedence over `secret`.
    pub secret_file: Option<PathBuf>,
}

/// TLS configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_cert_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
    pub insecure: bool,
    pub server_name: Option<String>,
}

/// Stream and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub event_buffer: usize,
    pub max_pending: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::new("127.0.0.1:5038");
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.action_timeout, Duration::from_secs(5));
        assert_eq!(config.id_prefix, "r");
        assert_eq!(config.banner, "Asterisk Call Manager");
        assert!(config.login_credentials().is_none());
    }

    #[test]
    fn test_read_buffer_clamping() {
        let config = SessionConfig::new("127.0.0.1:5038").with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = SessionConfig::new("127.0.0.1:5038").with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_empty_credentials_skip_login() {
        let config = SessionConfig::new("127.0.0.1:5038").with_credentials("", "");
        assert!(config.login_credentials().is_none());

        let config = SessionConfig::new("127.0.0.1:5038").with_credentials("manager", "1234");
        assert_eq!(config.login_credentials().unwrap().username, "manager");
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("manager", "1234");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("manager"));
        assert!(!debug.contains("1234"));
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  addr: pbx.example.com:5039\n  action_timeout_secs: 2\nauth:\n  username: monitor\n  secret: s3cret\ntls:\n  enabled: true\n  insecure: true\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.addr, "pbx.example.com:5039");
        assert_eq!(config.server.connect_timeout_secs, 10);

        let session = config.to_session_config();
        assert_eq!(session.action_timeout, Duration::from_secs(2));
        assert_eq!(session.login_credentials().unwrap().secret, "s3cret");
        assert!(session.tls.unwrap().insecure);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/callmgr.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/callmgr.yaml"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CALLMGR_ADDR", "10.0.0.9:5038"),
            ("CALLMGR_USER", "admin"),
            ("CALLMGR_SECRET", "pw"),
            ("CALLMGR_TLS", "1"),
            ("CALLMGR_ACTION_TIMEOUT_SECS", "not-a-number"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.addr, "10.0.0.9:5038");
        assert_eq!(config.server.action_timeout_secs, 5);
        assert_eq!(config.auth.username.as_deref(), Some("admin"));
        assert!(config.tls.enabled);
        assert!(!config.tls.insecure);
    }

    #[test]
    fn test_secret_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();

        let mut config = Config::default();
        config.auth.secret = Some("inline".to_string());
        config.auth.secret_file = Some(file.path().to_path_buf());
        config.load_secrets().unwrap();

        assert_eq!(config.auth.secret.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_env_secret_beats_secret_file() {
        let mut secret = tempfile::NamedTempFile::new().unwrap();
        writeln!(secret, "from-file").unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auth:\n  username: admin\n  secret_file: {}", secret.path().display())
            .unwrap();
        let config_path = file.path().display().to_string();

        let config = Config::load_from(|key| match key {
            "CALLMGR_CONFIG" => Some(config_path.clone()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.auth.secret.as_deref(), Some("from-file"));

        let config = Config::load_from(|key| match key {
            "CALLMGR_CONFIG" => Some(config_path.clone()),
            "CALLMGR_SECRET" => Some("from-env".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.auth.secret.as_deref(), Some("from-env"));
        assert_eq!(config.auth.username.as_deref(), Some("admin"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.server.addr, config.server.addr);
        assert_eq!(parsed.queues.max_pending, DEFAULT_MAX_PENDING);
    }
}
