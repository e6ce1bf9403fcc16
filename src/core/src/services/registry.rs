use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::service::ServiceDescriptor;
use crate::configuration::service_config::{
    bind, HttpConfig, ProtocolConfig, ServiceBaseConfig, SshConfig, TelnetConfig, VncConfig,
};
use crate::error_handling::types::{ConfigError, RegistryError};

/// Builds a descriptor from the shared keys and the raw service table.
pub type ServiceConstructor =
    fn(ServiceBaseConfig, &toml::Table) -> Result<ServiceDescriptor, ConfigError>;

/// Protocol identifier to constructor table.
#[derive(Default)]
pub struct ServiceRegistry {
    constructors: HashMap<String, ServiceConstructor>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the ssh, telnet, http and vnc constructors.
    pub fn with_builtin_protocols() -> Self {
        let builtins: [(&str, ServiceConstructor); 4] = [
            ("ssh", ssh_service),
            ("telnet", telnet_service),
            ("http", http_service),
            ("vnc", vnc_service),
        ];
        let mut registry = Self::new();
        for (protocol, constructor) in builtins {
            // the list above has no duplicates
            let _ = registry.register(protocol, constructor);
        }
        registry
    }

    pub fn register(
        &mut self,
        protocol: &str,
        constructor: ServiceConstructor,
    ) -> Result<(), RegistryError> {
        if self.constructors.contains_key(protocol) {
            return Err(RegistryError::DuplicateProtocol(protocol.to_string()));
        }
        debug!("Registered protocol {}", protocol);
        self.constructors.insert(protocol.to_string(), constructor);
        Ok(())
    }

    pub fn resolve(&self, protocol: &str) -> Result<ServiceConstructor, RegistryError> {
        self.constructors
            .get(protocol)
            .copied()
            .ok_or_else(|| RegistryError::UnknownProtocol(protocol.to_string()))
    }

    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn ssh_service(base: ServiceBaseConfig, table: &toml::Table) -> Result<ServiceDescriptor, ConfigError> {
    let config: SshConfig = bind(table)?;
    Ok(ServiceDescriptor::new(
        base,
        ProtocolConfig::Ssh(Arc::new(config.normalized())),
    ))
}

fn telnet_service(
    base: ServiceBaseConfig,
    table: &toml::Table,
) -> Result<ServiceDescriptor, ConfigError> {
    let config: TelnetConfig = bind(table)?;
    Ok(ServiceDescriptor::new(
        base,
        ProtocolConfig::Telnet(Arc::new(config.normalized())),
    ))
}

fn http_service(base: ServiceBaseConfig, table: &toml::Table) -> Result<ServiceDescriptor, ConfigError> {
    let config: HttpConfig = bind(table)?;
    Ok(ServiceDescriptor::new(base, ProtocolConfig::Http(Arc::new(config))))
}

fn vnc_service(base: ServiceBaseConfig, table: &toml::Table) -> Result<ServiceDescriptor, ConfigError> {
    let config: VncConfig = bind(table)?;
    Ok(ServiceDescriptor::new(base, ProtocolConfig::Vnc(Arc::new(config))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::service_config::ServiceFile;
    use std::path::Path;

    #[test]
    fn test_builtin_protocols() {
        let registry = ServiceRegistry::with_builtin_protocols();
        assert_eq!(registry.protocols(), vec!["http", "ssh", "telnet", "vnc"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ServiceRegistry::with_builtin_protocols();
        assert_eq!(
            registry.register("ssh", ssh_service),
            Err(RegistryError::DuplicateProtocol("ssh".to_string()))
        );
    }

    #[test]
    fn test_unknown_protocol() {
        let registry = ServiceRegistry::with_builtin_protocols();
        assert!(matches!(
            registry.resolve("ftp"),
            Err(RegistryError::UnknownProtocol(p)) if p == "ftp"
        ));
    }

    #[test]
    fn test_constructor_binds_protocol_config() {
        let file = ServiceFile::parse(
            Path::new("telnet.toml"),
            "protocol = \"telnet\"\nenable = true\nport = 2323\nprompt = \"# \"\n",
        )
        .unwrap();
        let registry = ServiceRegistry::with_builtin_protocols();
        let constructor = registry.resolve(&file.base.protocol).unwrap();
        let descriptor = constructor(file.base.clone(), &file.table).unwrap();
        match descriptor.protocol() {
            ProtocolConfig::Telnet(config) => {
                assert_eq!(config.prompt, "# ");
                assert_eq!(config.max_auth_tries, 4);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_constructor_reports_bad_table() {
        let file = ServiceFile::parse(
            Path::new("vnc.toml"),
            "protocol = \"vnc\"\nport = 5900\n",
        )
        .unwrap();
        let constructor = ServiceRegistry::with_builtin_protocols()
            .resolve("vnc")
            .unwrap();
        assert!(constructor(file.base.clone(), &file.table).is_err());
    }
}
