use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::{Event, EventBuilder};
use crate::network::Endpoint;

/// Identity of one accepted connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub protocol: &'static str,
    pub application: String,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub start_time: DateTime<Utc>,
}

impl Session {
    pub fn new(
        protocol: &'static str,
        application: impl Into<String>,
        source: Endpoint,
        destination: Endpoint,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol,
            application: application.into(),
            source,
            destination,
            start_time: Utc::now(),
        }
    }

    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// Event builder carrying the category, both endpoints and the `protocol` detail.
    pub fn event(&self, event_type: &str) -> EventBuilder {
        Event::builder(self.protocol, event_type)
            .source(&self.source)
            .destination(&self.destination)
            .detail("protocol", self.protocol)
    }

    /// Same as [`Session::event`] with the `application` detail added.
    pub fn app_event(&self, event_type: &str) -> EventBuilder {
        self.event(event_type)
            .detail("application", self.application.as_str())
    }

    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            "telnet",
            "busybox",
            Endpoint {
                ip: "203.0.113.9".to_string(),
                port: 40000,
            },
            Endpoint {
                ip: "10.0.0.2".to_string(),
                port: 23,
            },
        )
    }

    #[test]
    fn test_event_is_prefilled() {
        let event = session().app_event("telnet-connect").build();
        assert_eq!(event.event_category(), "telnet");
        assert_eq!(event.source().port, 40000);
        assert_eq!(event.destination().ip, "10.0.0.2");
        assert_eq!(event.detail_text("protocol"), Some("telnet"));
        assert_eq!(event.detail_text("application"), Some("busybox"));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(session().id, session().id);
        assert_eq!(session().id_string().len(), 36);
    }
}
