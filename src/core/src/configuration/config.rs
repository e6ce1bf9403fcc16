use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level agent configuration.
///
/// Loaded once at startup from a TOML file. It only describes where events go and where the
/// per-service files live; every protocol instance is configured by its own file inside
/// `services_dir`.
///
/// # Examples
///
/// ```
/// use ruche::configuration::Config;
///
/// let config = Config::from_toml_str(r#"
///     services_dir = "services"
///     [outputs.file]
///     enable = true
///     file_path = "events.jsonl"
/// "#).unwrap();
/// assert!(config.outputs.file.enable);
/// assert!(!config.outputs.kafka.enable);
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Directory scanned for one `*.toml` file per protocol instance
    pub services_dir: PathBuf,

    /// Event sink settings
    #[serde(default)]
    pub outputs: OutputsConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct OutputsConfig {
    #[serde(default)]
    pub file: FileOutputConfig,
    #[serde(default)]
    pub kafka: KafkaOutputConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct FileOutputConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub file_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct KafkaOutputConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub topic: String,
}

impl KafkaOutputConfig {
    pub fn bootstrap_server(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// * `ConfigError::IoError` if the file cannot be read
    /// * `ConfigError::TomlError` if it is not valid TOML or misses `services_dir`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// `services_dir` resolved against the current working directory.
    pub fn services_dir_absolute(&self) -> PathBuf {
        absolute_path(&self.services_dir)
    }
}

/// Joins relative paths onto the current working directory, leaving absolute paths alone.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lists every `*.toml` file below `dir`, recursively, sorted by path.
pub fn discover_service_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::DirectoryDoesNotExist(format!(
            "{} does not exist",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                files.push(path);
            }
        }
    }
    files.sort();
    debug!("Discovered {} service file(s) in {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const FULL_CONFIG: &str = r#"
services_dir = "services"

[outputs.file]
enable = true
file_path = "/tmp/events.jsonl"

[outputs.kafka]
enable = true
host = "10.0.0.1"
port = 9092
topic = "honeypot"
"#;

    #[test]
    fn test_from_file_full() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ruche.toml");
        File::create(&path)
            .unwrap()
            .write_all(FULL_CONFIG.as_bytes())
            .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.services_dir, PathBuf::from("services"));
        assert!(config.outputs.file.enable);
        assert_eq!(config.outputs.file.file_path, PathBuf::from("/tmp/events.jsonl"));
        assert_eq!(config.outputs.kafka.bootstrap_server(), "10.0.0.1:9092");
        assert_eq!(config.outputs.kafka.topic, "honeypot");
    }

    #[test]
    fn test_outputs_default_to_disabled() {
        let config = Config::from_toml_str("services_dir = \"s\"").unwrap();
        assert_eq!(config.outputs, OutputsConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let result = Config::from_toml_str("services_dir = [");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_discover_service_files_recursive_and_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("telnet.toml")).unwrap();
        File::create(dir.path().join("nested").join("http.toml")).unwrap();
        File::create(dir.path().join("README.md")).unwrap();
        File::create(dir.path().join("a-ssh.toml")).unwrap();

        let files = discover_service_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a-ssh.toml"),
                PathBuf::from("nested/http.toml"),
                PathBuf::from("telnet.toml"),
            ]
        );
    }

    #[test]
    fn test_discover_missing_directory() {
        let result = discover_service_files(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(ConfigError::DirectoryDoesNotExist(_))));
    }

    #[test]
    fn test_absolute_path_kept() {
        assert_eq!(absolute_path(Path::new("/etc/x")), PathBuf::from("/etc/x"));
        assert!(absolute_path(Path::new("x")).is_absolute());
    }

    #[test]
    #[serial]
    fn test_relative_paths_follow_working_directory() {
        let dir = tempdir().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let resolved = absolute_path(Path::new("events.jsonl"));
        let services = Config::from_toml_str("services_dir = \"services\"")
            .unwrap()
            .services_dir_absolute();
        std::env::set_current_dir(previous).unwrap();

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(resolved, root.join("events.jsonl"));
        assert_eq!(services, root.join("services"));
    }
}
