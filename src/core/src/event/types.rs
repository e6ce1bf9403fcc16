use crate::network::Endpoint;
use chrono::Local;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Transport recorded on every event.
pub const IP_PROTOCOL_TCP: &str = "tcp";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Heterogeneous value stored under an event detail key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetailValue {
    Text(String),
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<DetailValue>),
    Map(Details),
}

impl From<&str> for DetailValue {
    fn from(value: &str) -> Self {
        DetailValue::Text(value.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(value: String) -> Self {
        DetailValue::Text(value)
    }
}

impl From<&String> for DetailValue {
    fn from(value: &String) -> Self {
        DetailValue::Text(value.clone())
    }
}

impl From<i64> for DetailValue {
    fn from(value: i64) -> Self {
        DetailValue::Integer(value)
    }
}

impl From<u32> for DetailValue {
    fn from(value: u32) -> Self {
        DetailValue::Integer(i64::from(value))
    }
}

impl From<Vec<u8>> for DetailValue {
    fn from(value: Vec<u8>) -> Self {
        DetailValue::Bytes(value)
    }
}

impl From<&[u8]> for DetailValue {
    fn from(value: &[u8]) -> Self {
        DetailValue::Bytes(value.to_vec())
    }
}

impl From<Vec<String>> for DetailValue {
    fn from(value: Vec<String>) -> Self {
        DetailValue::List(value.into_iter().map(DetailValue::Text).collect())
    }
}

impl From<Details> for DetailValue {
    fn from(value: Details) -> Self {
        DetailValue::Map(value)
    }
}

/// Insertion-ordered key/value details, serialized as a JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Details(Vec<(String, DetailValue)>);

impl Details {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets `key`, replacing an earlier value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<DetailValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&DetailValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

impl Serialize for Details {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// One observation of attacker behaviour.
///
/// Built through [`EventBuilder`] and never mutated afterwards; the pipeline serializes it
/// once per emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    timestamp: String,
    event_category: String,
    event_type: String,
    src_ip: String,
    dst_ip: String,
    ip_protocol: String,
    src_port: u16,
    dst_port: u16,
    details: Details,
}

impl Event {
    pub fn builder(category: &str, event_type: &str) -> EventBuilder {
        EventBuilder::new(category, event_type)
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn event_category(&self) -> &str {
        &self.event_category
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> Endpoint {
        Endpoint {
            ip: self.src_ip.clone(),
            port: self.src_port,
        }
    }

    pub fn destination(&self) -> Endpoint {
        Endpoint {
            ip: self.dst_ip.clone(),
            port: self.dst_port,
        }
    }

    pub fn ip_protocol(&self) -> &str {
        &self.ip_protocol
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&DetailValue> {
        self.details.get(key)
    }

    /// Detail as text, if present and textual.
    pub fn detail_text(&self, key: &str) -> Option<&str> {
        match self.details.get(key) {
            Some(DetailValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Canonical JSON line (no trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn new(category: &str, event_type: &str) -> Self {
        Self {
            event: Event {
                timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
                event_category: category.to_string(),
                event_type: event_type.to_string(),
                src_ip: String::new(),
                dst_ip: String::new(),
                ip_protocol: IP_PROTOCOL_TCP.to_string(),
                src_port: 0,
                dst_port: 0,
                details: Details::new(),
            },
        }
    }

    pub fn source(mut self, endpoint: &Endpoint) -> Self {
        self.event.src_ip = endpoint.ip.clone();
        self.event.src_port = endpoint.port;
        self
    }

    pub fn destination(mut self, endpoint: &Endpoint) -> Self {
        self.event.dst_ip = endpoint.ip.clone();
        self.event.dst_port = endpoint.port;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        self.event.details.insert(key, value);
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}
