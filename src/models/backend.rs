//! Backend kinds managed by the vault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five external system categories a server configuration row can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(alias = "kafka")]
    Kafka,
    #[serde(alias = "redis")]
    Redis,
    #[serde(rename = "RabbitMQ", alias = "rabbitmq", alias = "RabbitMq")]
    RabbitMq,
    #[serde(rename = "AWS", alias = "aws", alias = "Aws")]
    Aws,
    #[serde(alias = "azure")]
    Azure,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Kafka,
        BackendKind::Redis,
        BackendKind::RabbitMq,
        BackendKind::Aws,
        BackendKind::Azure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Kafka => "Kafka",
            BackendKind::Redis => "Redis",
            BackendKind::RabbitMq => "RabbitMQ",
            BackendKind::Aws => "AWS",
            BackendKind::Azure => "Azure",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                format!(
                    "unknown backend kind '{}', must be one of: Kafka, Redis, RabbitMQ, AWS, Azure",
                    s
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("kafka".parse::<BackendKind>().unwrap(), BackendKind::Kafka);
        assert_eq!("RABBITMQ".parse::<BackendKind>().unwrap(), BackendKind::RabbitMq);
        assert_eq!(" aws ".parse::<BackendKind>().unwrap(), BackendKind::Aws);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("postgres".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&BackendKind::RabbitMq).unwrap();
        assert_eq!(json, "\"RabbitMQ\"");
        let parsed: BackendKind = serde_json::from_str("\"Kafka\"").unwrap();
        assert_eq!(parsed, BackendKind::Kafka);
        let alias: BackendKind = serde_json::from_str("\"azure\"").unwrap();
        assert_eq!(alias, BackendKind::Azure);
    }
}
