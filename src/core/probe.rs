//! Lightweight connectivity checks used by the credential test operation.

use crate::models::backend::BackendKind;
use crate::models::server::ServerConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub message: String,
}

impl ProbeOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Backend-specific check that a server is reachable with the given credential.
///
/// Implementations must not echo the credential in the returned message.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(
        &self,
        server: &ServerConfig,
        username: Option<&str>,
        password: Option<&str>,
    ) -> ProbeOutcome;
}

/// Checks that the server address accepts a TCP connection. Does not authenticate.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn probe(
        &self,
        server: &ServerConfig,
        _username: Option<&str>,
        _password: Option<&str>,
    ) -> ProbeOutcome {
        let Some(target) = socket_target(server.kind, &server.address) else {
            return ProbeOutcome::failed(format!(
                "cannot derive host:port from address '{}'",
                server.address
            ));
        };
        match tokio::time::timeout(self.timeout, TcpStream::connect(&target)).await {
            Ok(Ok(_)) => ProbeOutcome::ok(format!("connected to {}", target)),
            Ok(Err(err)) => ProbeOutcome::failed(format!("connect to {} failed: {}", target, err)),
            Err(_) => ProbeOutcome::failed(format!(
                "connect to {} timed out after {} ms",
                target,
                self.timeout.as_millis()
            )),
        }
    }
}

/// Probes keyed by backend kind.
#[derive(Clone, Default)]
pub struct ProbeSet {
    probes: HashMap<BackendKind, Arc<dyn ConnectivityProbe>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// TCP reachability for every backend kind.
    pub fn tcp(timeout: Duration) -> Self {
        let probe: Arc<dyn ConnectivityProbe> = Arc::new(TcpProbe::new(timeout));
        let mut set = Self::new();
        for kind in BackendKind::ALL {
            set.probes.insert(kind, probe.clone());
        }
        set
    }

    pub fn with(mut self, kind: BackendKind, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probes.insert(kind, probe);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn ConnectivityProbe>> {
        self.probes.get(&kind)
    }
}

fn default_port(kind: BackendKind) -> u16 {
    match kind {
        BackendKind::Kafka => 9092,
        BackendKind::Redis => 6379,
        BackendKind::RabbitMq => 5672,
        BackendKind::Aws | BackendKind::Azure => 443,
    }
}

/// Reduce a configured address (bare `host:port`, URL, or Kafka bootstrap list)
/// to the first `host:port` to dial.
pub fn socket_target(kind: BackendKind, address: &str) -> Option<String> {
    let first = address.split(',').next()?.trim();
    let without_scheme = first.split_once("://").map(|(_, rest)| rest).unwrap_or(first);
    let authority = without_scheme.split(['/', '?']).next()?;
    let host_port = authority.rsplit_once('@').map(|(_, hp)| hp).unwrap_or(authority);
    if host_port.is_empty() {
        return None;
    }

    if host_port.starts_with('[') {
        return match host_port.rsplit_once("]:") {
            Some((_, port)) if port.parse::<u16>().is_ok() => Some(host_port.to_string()),
            _ => Some(format!("{}:{}", host_port, default_port(kind))),
        };
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Some(host_port.to_string())
        }
        Some(_) => None,
        None => Some(format!("{}:{}", host_port, default_port(kind))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_socket_target_forms() {
        assert_eq!(
            socket_target(BackendKind::Kafka, "k1:9092,k2:9092").as_deref(),
            Some("k1:9092")
        );
        assert_eq!(
            socket_target(BackendKind::RabbitMq, "amqp://user@mq.local/vhost").as_deref(),
            Some("mq.local:5672")
        );
        assert_eq!(
            socket_target(BackendKind::Redis, "redis://cache:6380/0").as_deref(),
            Some("cache:6380")
        );
        assert_eq!(
            socket_target(BackendKind::Aws, "https://sqs.eu-west-1.amazonaws.com/123/q").as_deref(),
            Some("sqs.eu-west-1.amazonaws.com:443")
        );
        assert_eq!(
            socket_target(BackendKind::Redis, "[::1]:6379").as_deref(),
            Some("[::1]:6379")
        );
        assert_eq!(socket_target(BackendKind::Redis, "host:notaport"), None);
        assert_eq!(socket_target(BackendKind::Redis, ""), None);
    }

    #[tokio::test]
    async fn test_tcp_probe_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = ServerConfig::new(1, BackendKind::Redis, addr.to_string());
        let outcome = TcpProbe::new(Duration::from_secs(2))
            .probe(&server, None, Some("pw"))
            .await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(!outcome.message.contains("pw"));
    }

    #[tokio::test]
    async fn test_tcp_probe_reports_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let server = ServerConfig::new(1, BackendKind::Redis, addr.to_string());
        let outcome = TcpProbe::new(Duration::from_secs(2))
            .probe(&server, None, None)
            .await;
        assert!(!outcome.success);
    }

    #[test]
    fn test_probe_set_lookup() {
        let set = ProbeSet::tcp(Duration::from_millis(10));
        assert!(set.get(BackendKind::Azure).is_some());
        assert!(ProbeSet::new().get(BackendKind::Azure).is_none());
    }
}
