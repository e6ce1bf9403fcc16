use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;

use super::sink::{EventSink, FailurePolicy};
use crate::configuration::config::KafkaOutputConfig;
use crate::error_handling::types::SinkError;

/// Sends one message to the broker.
#[async_trait]
pub trait Publisher: Send {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), SinkError>;
}

/// `rskafka` producer spreading records across the topic's partitions at random.
pub struct KafkaPublisher {
    topic: String,
    partitions: Vec<PartitionClient>,
}

impl KafkaPublisher {
    pub async fn connect(config: &KafkaOutputConfig) -> Result<Self, SinkError> {
        validate(config)?;
        let bootstrap = config.bootstrap_server();
        info!("outputs.kafka.bootstrap_servers: {}", bootstrap);
        info!("outputs.kafka.topic: {}", config.topic);

        let client = ClientBuilder::new(vec![bootstrap])
            .build()
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        let topics = client
            .list_topics()
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;
        let topic = topics
            .into_iter()
            .find(|t| t.name == config.topic)
            .ok_or_else(|| SinkError::Connect(format!("topic {} not found", config.topic)))?;
        if topic.partitions.is_empty() {
            return Err(SinkError::Connect(format!(
                "topic {} has no partitions",
                config.topic
            )));
        }

        let mut partitions = Vec::with_capacity(topic.partitions.len());
        for partition in &topic.partitions {
            let partition_client = client
                .partition_client(config.topic.clone(), *partition, UnknownTopicHandling::Error)
                .await
                .map_err(|e| SinkError::Connect(e.to_string()))?;
            partitions.push(partition_client);
        }
        debug!(
            "kafka topic {} has {} partition(s)",
            config.topic,
            partitions.len()
        );

        Ok(Self {
            topic: config.topic.clone(),
            partitions,
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), SinkError> {
        let index = rand::random_range(0..self.partitions.len());
        let record = Record {
            key: None,
            value: Some(payload.to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        self.partitions[index]
            .produce(vec![record], Compression::NoCompression)
            .await
            .map_err(|e| SinkError::Publish(format!("{}: {}", self.topic, e)))?;
        Ok(())
    }
}

/// Checks the settings a producer cannot work without.
pub fn validate(config: &KafkaOutputConfig) -> Result<(), SinkError> {
    if config.topic.is_empty() {
        return Err(SinkError::Connect("topic must be set".to_string()));
    }
    if config.host.is_empty() {
        return Err(SinkError::Connect("host must be set".to_string()));
    }
    if config.port == 0 {
        return Err(SinkError::Connect("port must be set".to_string()));
    }
    Ok(())
}

/// Message-queue sink. A publish failure is escalated to the supervisor.
pub struct KafkaSink {
    publisher: Box<dyn Publisher>,
}

impl KafkaSink {
    pub fn new(publisher: Box<dyn Publisher>) -> Self {
        Self { publisher }
    }

    pub async fn connect(config: &KafkaOutputConfig) -> Result<Self, SinkError> {
        let publisher = KafkaPublisher::connect(config).await?;
        Ok(Self::new(Box::new(publisher)))
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    fn name(&self) -> &'static str {
        "kafka"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Escalate
    }

    async fn write(&mut self, line: &str) -> Result<(), SinkError> {
        self.publisher.publish(line.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingPublisher {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&mut self, payload: &[u8]) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Publish("broker down".to_string()));
            }
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    fn config(host: &str, port: u16, topic: &str) -> KafkaOutputConfig {
        KafkaOutputConfig {
            enable: true,
            host: host.to_string(),
            port,
            topic: topic.to_string(),
        }
    }

    #[test]
    fn test_validate() {
        assert!(validate(&config("127.0.0.1", 9092, "events")).is_ok());
        assert!(validate(&config("127.0.0.1", 9092, "")).is_err());
        assert!(validate(&config("", 9092, "events")).is_err());
        assert!(validate(&config("127.0.0.1", 0, "events")).is_err());
    }

    #[tokio::test]
    async fn test_write_publishes_line_bytes() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut sink = KafkaSink::new(Box::new(RecordingPublisher {
            sent: sent.clone(),
            fail: false,
        }));
        sink.write("{\"a\":1}").await.unwrap();
        assert_eq!(sent.lock().unwrap().as_slice(), &[b"{\"a\":1}".to_vec()]);
        assert_eq!(sink.failure_policy(), FailurePolicy::Escalate);
    }

    #[tokio::test]
    async fn test_publish_error_is_returned() {
        let mut sink = KafkaSink::new(Box::new(RecordingPublisher {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }));
        assert!(matches!(
            sink.write("{}").await,
            Err(SinkError::Publish(_))
        ));
    }
}
