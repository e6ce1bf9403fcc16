use super::types::{Account, RequestSimulator};
use crate::error_handling::types::ConfigError;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_SSH_VERSION: &str = "SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6";
pub const DEFAULT_SSH_MAX_AUTH_TRIES: usize = 3;
pub const DEFAULT_TELNET_MAX_AUTH_TRIES: usize = 4;
pub const DEFAULT_VNC_VERSION: &str = "RFB 003.008";

/// Keys shared by every service file.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ServiceBaseConfig {
    pub protocol: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl ServiceBaseConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SshConfig {
    #[serde(default = "default_ssh_version")]
    pub version: String,
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub motd: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub max_auth_tries: usize,
    #[serde(default)]
    pub simulator: HashMap<String, String>,
}

fn default_ssh_version() -> String {
    DEFAULT_SSH_VERSION.to_string()
}

fn default_hostname() -> String {
    "localhost".to_string()
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TelnetConfig {
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub motd: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub max_auth_tries: usize,
    #[serde(default)]
    pub simulator: HashMap<String, String>,
}

fn default_prompt() -> String {
    "$ ".to_string()
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    #[serde(default)]
    pub request_simulator: Vec<RequestSimulator>,
}

fn default_index() -> String {
    "index.html".to_string()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct VncConfig {
    #[serde(default = "default_vnc_version")]
    pub version: String,
    pub img_path: PathBuf,
}

fn default_vnc_version() -> String {
    DEFAULT_VNC_VERSION.to_string()
}

/// Protocol-specific settings, resolved once when the service is constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolConfig {
    Ssh(Arc<SshConfig>),
    Telnet(Arc<TelnetConfig>),
    Http(Arc<HttpConfig>),
    Vnc(Arc<VncConfig>),
}

impl ProtocolConfig {
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProtocolConfig::Ssh(_) => "ssh",
            ProtocolConfig::Telnet(_) => "telnet",
            ProtocolConfig::Http(_) => "http",
            ProtocolConfig::Vnc(_) => "vnc",
        }
    }
}

impl SshConfig {
    /// Applies the retry default: a configured ceiling of 0 means 3.
    pub fn normalized(mut self) -> Self {
        if self.max_auth_tries == 0 {
            warn!("max_auth_tries is 0, set to {}", DEFAULT_SSH_MAX_AUTH_TRIES);
            self.max_auth_tries = DEFAULT_SSH_MAX_AUTH_TRIES;
        }
        self
    }
}

impl TelnetConfig {
    /// Applies the retry default: a configured ceiling of 0 means 4.
    pub fn normalized(mut self) -> Self {
        if self.max_auth_tries == 0 {
            warn!("max_auth_tries is 0, set to {}", DEFAULT_TELNET_MAX_AUTH_TRIES);
            self.max_auth_tries = DEFAULT_TELNET_MAX_AUTH_TRIES;
        }
        self
    }
}

/// Raw contents of one service file: the shared keys plus the full table for the
/// protocol constructor to bind.
#[derive(Debug, Clone)]
pub struct ServiceFile {
    pub path: PathBuf,
    pub base: ServiceBaseConfig,
    pub table: toml::Table,
}

impl ServiceFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        let base: ServiceBaseConfig = bind(&table)?;
        Ok(Self {
            path: path.to_path_buf(),
            base,
            table,
        })
    }
}

/// Deserializes `table` into a typed configuration section.
pub fn bind<T: DeserializeOwned>(table: &toml::Table) -> Result<T, ConfigError> {
    toml::Value::Table(table.clone())
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::TomlError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSH_FILE: &str = r#"
protocol = "ssh"
application = "openssh"
enable = true
host = "127.0.0.1"
port = 2222
hostname = "web01"
max_auth_tries = 0

[[accounts]]
username = "root"
password = "123456"

[simulator]
whoami = "root"
"#;

    #[test]
    fn test_parse_base_and_bind_ssh() {
        let file = ServiceFile::parse(Path::new("ssh.toml"), SSH_FILE).unwrap();
        assert_eq!(file.base.protocol, "ssh");
        assert_eq!(file.base.application, "openssh");
        assert!(file.base.enable);
        assert_eq!(file.base.bind_address(), "127.0.0.1:2222");

        let ssh: SshConfig = bind(&file.table).unwrap();
        let ssh = ssh.normalized();
        assert_eq!(ssh.version, DEFAULT_SSH_VERSION);
        assert_eq!(ssh.hostname, "web01");
        assert_eq!(ssh.max_auth_tries, 3);
        assert_eq!(ssh.accounts.len(), 1);
        assert_eq!(ssh.simulator.get("whoami").map(String::as_str), Some("root"));
    }

    #[test]
    fn test_telnet_defaults() {
        let file = ServiceFile::parse(
            Path::new("telnet.toml"),
            "protocol = \"telnet\"\nport = 23\n",
        )
        .unwrap();
        assert_eq!(file.base.host, "0.0.0.0");
        assert!(!file.base.enable);
        let telnet: TelnetConfig = bind(&file.table).unwrap();
        let telnet = telnet.normalized();
        assert_eq!(telnet.prompt, "$ ");
        assert_eq!(telnet.max_auth_tries, DEFAULT_TELNET_MAX_AUTH_TRIES);
    }

    #[test]
    fn test_zero_retry_ceilings_fall_back() {
        let table: toml::Table = toml::from_str("max_auth_tries = 0").unwrap();
        let telnet: TelnetConfig = bind(&table).unwrap();
        assert_eq!(telnet.normalized().max_auth_tries, DEFAULT_TELNET_MAX_AUTH_TRIES);
        let ssh: SshConfig = bind(&table).unwrap();
        assert_eq!(ssh.normalized().max_auth_tries, DEFAULT_SSH_MAX_AUTH_TRIES);

        let table: toml::Table = toml::from_str("max_auth_tries = 7").unwrap();
        let telnet: TelnetConfig = bind(&table).unwrap();
        assert_eq!(telnet.normalized().max_auth_tries, 7);
    }

    #[test]
    fn test_missing_port_rejected() {
        let result = ServiceFile::parse(Path::new("x.toml"), "protocol = \"http\"\n");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_vnc_requires_image() {
        let file = ServiceFile::parse(Path::new("vnc.toml"), "protocol = \"vnc\"\nport = 5900\n")
            .unwrap();
        let result: Result<VncConfig, _> = bind(&file.table);
        assert!(result.is_err());
    }

    #[test]
    fn test_http_request_simulator() {
        let file = ServiceFile::parse(
            Path::new("http.toml"),
            r#"
protocol = "http"
port = 8080
assets_dir = "www"

[[request_simulator]]
uri = "/login"
response = { type = "string", value = "<h1>login</h1>" }
"#,
        )
        .unwrap();
        let http: HttpConfig = bind(&file.table).unwrap();
        assert_eq!(http.index, "index.html");
        assert_eq!(http.assets_dir, PathBuf::from("www"));
        assert_eq!(http.request_simulator[0].uri, "/login");
    }
}
