use crate::error_handling::types::AddressParseError;
use log::error;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// One side of a connection, as recorded in events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    /// Splits a textual `host:port` address.
    ///
    /// The port is taken after the last `:` so bracketed IPv6 addresses (`[::1]:22`) work;
    /// the brackets are dropped from the resulting host.
    pub fn parse(address: &str) -> Result<Self, AddressParseError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(address.to_string()))?;

        if port.is_empty() {
            return Err(AddressParseError::MissingPort(address.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressParseError::InvalidPort(address.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressParseError::MissingHost(address.to_string()));
        }

        Ok(Self {
            ip: host.to_string(),
            port,
        })
    }
}

/// Anything that can report its local and remote addresses as text.
///
/// Implemented for plain TCP streams and for the address pair the SSH layer keeps, so both
/// paths go through [`Endpoint::parse`].
pub trait AddressSource {
    fn local_address(&self) -> Option<String>;
    fn remote_address(&self) -> Option<String>;
}

impl AddressSource for TcpStream {
    fn local_address(&self) -> Option<String> {
        self.local_addr().ok().map(|a| a.to_string())
    }

    fn remote_address(&self) -> Option<String> {
        self.peer_addr().ok().map(|a| a.to_string())
    }
}

/// Local/remote socket addresses captured when the SSH connection was accepted.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionMetadata {
    pub local: Option<SocketAddr>,
    pub remote: Option<SocketAddr>,
}

impl ConnectionMetadata {
    pub fn of(stream: &TcpStream) -> Self {
        Self {
            local: stream.local_addr().ok(),
            remote: stream.peer_addr().ok(),
        }
    }
}

impl AddressSource for ConnectionMetadata {
    fn local_address(&self) -> Option<String> {
        self.local.map(|a| a.to_string())
    }

    fn remote_address(&self) -> Option<String> {
        self.remote.map(|a| a.to_string())
    }
}

fn resolve(address: Option<String>) -> Result<Endpoint, AddressParseError> {
    let address = address.unwrap_or_default();
    Endpoint::parse(&address)
}

/// Returns `(source, destination)` for a connection.
///
/// Unparseable addresses are logged and replaced by an empty endpoint so the session can
/// still record events.
pub fn resolve_endpoints<S: AddressSource + ?Sized>(source: &S) -> (Endpoint, Endpoint) {
    let src = resolve(source.remote_address()).unwrap_or_else(|e| {
        error!("{}", e);
        Endpoint::default()
    });
    let dst = resolve(source.local_address()).unwrap_or_else(|e| {
        error!("{}", e);
        Endpoint::default()
    });
    (src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_ipv4() {
        let ep = Endpoint::parse("192.168.1.10:2222").unwrap();
        assert_eq!(ep.ip, "192.168.1.10");
        assert_eq!(ep.port, 2222);
    }

    #[test]
    fn test_parse_ipv6_brackets() {
        let ep = Endpoint::parse("[::1]:22").unwrap();
        assert_eq!(ep.ip, "::1");
        assert_eq!(ep.port, 22);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Endpoint::parse("localhost"),
            Err(AddressParseError::MissingPort("localhost".to_string()))
        );
        assert_eq!(
            Endpoint::parse("localhost:"),
            Err(AddressParseError::MissingPort("localhost:".to_string()))
        );
        assert_eq!(
            Endpoint::parse("1.2.3.4:65536"),
            Err(AddressParseError::InvalidPort("1.2.3.4:65536".to_string()))
        );
        assert_eq!(
            Endpoint::parse("1.2.3.4:ssh"),
            Err(AddressParseError::InvalidPort("1.2.3.4:ssh".to_string()))
        );
        assert_eq!(
            Endpoint::parse(":22"),
            Err(AddressParseError::MissingHost(":22".to_string()))
        );
    }

    #[test]
    fn test_parse_port_bounds() {
        assert_eq!(Endpoint::parse("h:0").unwrap().port, 0);
        assert_eq!(Endpoint::parse("h:65535").unwrap().port, 65535);
    }

    #[test]
    fn test_metadata_path_matches_stream_path() {
        let meta = ConnectionMetadata {
            local: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 22)),
            remote: Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 40000)),
        };
        let (src, dst) = resolve_endpoints(&meta);
        assert_eq!(src, Endpoint { ip: "::1".to_string(), port: 40000 });
        assert_eq!(dst, Endpoint { ip: "10.0.0.1".to_string(), port: 22 });
    }

    #[test]
    fn test_missing_metadata_yields_default() {
        let meta = ConnectionMetadata { local: None, remote: None };
        let (src, dst) = resolve_endpoints(&meta);
        assert_eq!(src, Endpoint::default());
        assert_eq!(dst, Endpoint::default());
    }

    #[tokio::test]
    async fn test_resolve_tcp_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let (src, dst) = resolve_endpoints(&server);
        assert_eq!(src.ip, "127.0.0.1");
        assert_eq!(src.port, client.local_addr().unwrap().port());
        assert_eq!(dst.port, port);
    }
}
