use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryDoesNotExist(String),
    MissingField(String),
    UnknownProtocol(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::MissingField(e) => write!(f, "Missing configuration field: {}", e),
            ConfigError::UnknownProtocol(e) => write!(f, "Unknown protocol: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlError(err.to_string())
    }
}

#[derive(Debug, PartialEq)]
pub enum AddressParseError {
    MissingPort(String),
    InvalidPort(String),
    MissingHost(String),
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressParseError::MissingPort(a) => write!(f, "missing port in address '{}'", a),
            AddressParseError::InvalidPort(a) => write!(f, "invalid port in address '{}'", a),
            AddressParseError::MissingHost(a) => write!(f, "missing host in address '{}'", a),
        }
    }
}

impl std::error::Error for AddressParseError {}

#[derive(Debug, PartialEq)]
pub enum RegistryError {
    DuplicateProtocol(String),
    UnknownProtocol(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateProtocol(p) => write!(f, "protocol already registered: {}", p),
            RegistryError::UnknownProtocol(p) => write!(f, "service not found: {}", p),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug)]
pub enum ServiceError {
    AlreadyRunning(String),
    BindFailed {
        address: String,
        source: std::io::Error,
    },
    KeyGeneration(String),
    ImageLoad(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::AlreadyRunning(s) => write!(f, "worker already started: {}", s),
            ServiceError::BindFailed { address, source } => {
                write!(f, "unable to bind {}: {}", address, source)
            }
            ServiceError::KeyGeneration(e) => write!(f, "could not generate ssh host key: {}", e),
            ServiceError::ImageLoad(e) => write!(f, "could not load image: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {}

#[derive(Debug)]
pub enum EventError {
    Serialization(serde_json::Error),
    PipelineClosed,
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::Serialization(e) => write!(f, "event serialization failed: {}", e),
            EventError::PipelineClosed => write!(f, "event pipeline closed"),
        }
    }
}

impl std::error::Error for EventError {}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err)
    }
}

#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Connect(String),
    Publish(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "sink IO error: {}", e),
            SinkError::Connect(e) => write!(f, "sink connection failed: {}", e),
            SinkError::Publish(e) => write!(f, "sink publish failed: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err)
    }
}

#[derive(Debug)]
pub enum SessionError {
    Io(std::io::Error),
    Protocol(String),
    Event(EventError),
    Ssh(russh::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "connection IO error: {}", e),
            SessionError::Protocol(e) => write!(f, "protocol error: {}", e),
            SessionError::Event(e) => write!(f, "event error: {}", e),
            SessionError::Ssh(e) => write!(f, "ssh error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err)
    }
}

impl From<EventError> for SessionError {
    fn from(err: EventError) -> Self {
        SessionError::Event(err)
    }
}

impl From<russh::Error> for SessionError {
    fn from(err: russh::Error) -> Self {
        SessionError::Ssh(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    RegistryError(RegistryError),
    ServiceError(ServiceError),
    SinkError(SinkError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::RegistryError(e) => write!(f, "Registry error: {}", e),
            ControllerError::ServiceError(e) => write!(f, "Service error: {}", e),
            ControllerError::SinkError(e) => write!(f, "Sink error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<RegistryError> for ControllerError {
    fn from(err: RegistryError) -> Self {
        ControllerError::RegistryError(err)
    }
}

impl From<ServiceError> for ControllerError {
    fn from(err: ServiceError) -> Self {
        ControllerError::ServiceError(err)
    }
}

impl From<SinkError> for ControllerError {
    fn from(err: SinkError) -> Self {
        ControllerError::SinkError(err)
    }
}
