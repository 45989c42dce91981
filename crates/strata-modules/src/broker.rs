//! Message broker configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_core::{ConfigResult, Configurable, Schema};

/// One topic the service produces to or consumes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct TopicConfig {
    /// Broker-side topic name.
    #[config(required)]
    pub name: String,

    /// Partition count.
    #[config(min = 1)]
    pub partitions: u32,

    /// Replication factor.
    #[config(min = 1, max = 5)]
    pub replication: u16,
}

impl Configurable for TopicConfig {}

/// Broker module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct BrokerConfig {
    /// `kafka`, `nats` or `rabbitmq`.
    #[config(one_of = "kafka nats rabbitmq")]
    pub kind: String,

    /// Bootstrap addresses.
    #[config(required)]
    pub brokers: Vec<String>,

    /// Client identifier.
    #[config(required)]
    pub client_id: String,

    /// Topics by logical name.
    #[config(nested)]
    pub topics: IndexMap<String, TopicConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: "kafka".to_string(),
            brokers: vec!["localhost:9092".to_string()],
            client_id: "strata".to_string(),
            topics: IndexMap::new(),
        }
    }
}

impl Configurable for BrokerConfig {
    fn after_load(&mut self) -> ConfigResult<()> {
        let mut seen = Vec::with_capacity(self.brokers.len());
        for broker in self.brokers.drain(..) {
            let broker = broker.trim().to_string();
            if !broker.is_empty() && !seen.contains(&broker) {
                seen.push(broker);
            }
        }
        self.brokers = seen;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{after_load_tree, validate};

    #[test]
    fn test_after_load_normalises_brokers() {
        let mut broker = BrokerConfig {
            brokers: vec![
                " kafka-1:9092".to_string(),
                "kafka-2:9092".to_string(),
                "kafka-1:9092".to_string(),
                String::new(),
            ],
            ..BrokerConfig::default()
        };
        after_load_tree(&mut broker).unwrap();
        assert_eq!(broker.brokers, vec!["kafka-1:9092", "kafka-2:9092"]);
    }

    #[test]
    fn test_topic_violations_carry_names() {
        let mut broker = BrokerConfig::default();
        broker.topics.insert(
            "orders".to_string(),
            TopicConfig {
                name: String::new(),
                partitions: 0,
                replication: 3,
            },
        );
        let err = validate(&broker).unwrap_err();
        let violations = err.violations().unwrap();
        assert!(violations.has_field("topics.orders.name"));
        assert!(violations.has_field("topics.orders.partitions"));
    }
}
