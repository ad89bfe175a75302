//! Static catalog of administrative activity kinds recorded in the audit trail.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a mutation adds state to a backend or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationEffect {
    Constructive,
    Destructive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    ServerAdded,
    ServerRemoved,
    TopicCreated,
    TopicDeleted,
    QueueCreated,
    QueueDeleted,
    ExchangeCreated,
    ExchangeDeleted,
    SubscriptionCreated,
    SubscriptionDeleted,
    CredentialAdded,
    CredentialUpdated,
    CredentialDeleted,
}

/// Reference row describing one activity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityKindInfo {
    pub id: u32,
    pub name: &'static str,
    pub description: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

static CATALOG: &[(ActivityKind, ActivityKindInfo)] = &[
    (
        ActivityKind::ServerAdded,
        info(1, "ServerAdded", "Server configuration added", "#2e7d32", "server-plus"),
    ),
    (
        ActivityKind::ServerRemoved,
        info(2, "ServerRemoved", "Server configuration removed", "#c62828", "server-minus"),
    ),
    (
        ActivityKind::TopicCreated,
        info(3, "TopicCreated", "Topic created", "#1565c0", "topic-plus"),
    ),
    (
        ActivityKind::TopicDeleted,
        info(4, "TopicDeleted", "Topic deleted", "#c62828", "topic-minus"),
    ),
    (
        ActivityKind::QueueCreated,
        info(5, "QueueCreated", "Queue created", "#1565c0", "queue-plus"),
    ),
    (
        ActivityKind::QueueDeleted,
        info(6, "QueueDeleted", "Queue deleted", "#c62828", "queue-minus"),
    ),
    (
        ActivityKind::ExchangeCreated,
        info(7, "ExchangeCreated", "Exchange created", "#1565c0", "exchange-plus"),
    ),
    (
        ActivityKind::ExchangeDeleted,
        info(8, "ExchangeDeleted", "Exchange deleted", "#c62828", "exchange-minus"),
    ),
    (
        ActivityKind::SubscriptionCreated,
        info(9, "SubscriptionCreated", "Subscription created", "#1565c0", "link-plus"),
    ),
    (
        ActivityKind::SubscriptionDeleted,
        info(10, "SubscriptionDeleted", "Subscription deleted", "#c62828", "link-minus"),
    ),
    (
        ActivityKind::CredentialAdded,
        info(11, "CredentialAdded", "Server credential stored", "#6a1b9a", "key-plus"),
    ),
    (
        ActivityKind::CredentialUpdated,
        info(12, "CredentialUpdated", "Server credential changed", "#6a1b9a", "key-change"),
    ),
    (
        ActivityKind::CredentialDeleted,
        info(13, "CredentialDeleted", "Server credential removed", "#c62828", "key-minus"),
    ),
];

const fn info(
    id: u32,
    name: &'static str,
    description: &'static str,
    color: &'static str,
    icon: &'static str,
) -> ActivityKindInfo {
    ActivityKindInfo {
        id,
        name,
        description,
        color,
        icon,
    }
}

impl ActivityKind {
    /// All catalog rows in id order.
    pub fn catalog() -> impl Iterator<Item = &'static ActivityKindInfo> {
        CATALOG.iter().map(|(_, info)| info)
    }

    pub fn info(&self) -> &'static ActivityKindInfo {
        CATALOG
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, info)| info)
            .unwrap_or(&CATALOG[0].1)
    }

    pub fn from_id(id: u32) -> Option<Self> {
        CATALOG
            .iter()
            .find(|(_, info)| info.id == id)
            .map(|(kind, _)| *kind)
    }

    pub fn effect(&self) -> MutationEffect {
        match self {
            ActivityKind::ServerRemoved
            | ActivityKind::TopicDeleted
            | ActivityKind::QueueDeleted
            | ActivityKind::ExchangeDeleted
            | ActivityKind::SubscriptionDeleted
            | ActivityKind::CredentialDeleted => MutationEffect::Destructive,
            _ => MutationEffect::Constructive,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.info().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_unique_and_ordered() {
        let ids: Vec<u32> = ActivityKind::catalog().map(|i| i.id).collect();
        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_info_matches_display() {
        assert_eq!(ActivityKind::QueueDeleted.to_string(), "QueueDeleted");
        assert_eq!(ActivityKind::QueueDeleted.info().id, 6);
        assert_eq!(ActivityKind::from_id(6), Some(ActivityKind::QueueDeleted));
        assert_eq!(ActivityKind::from_id(999), None);
    }

    #[test]
    fn test_effects() {
        assert_eq!(ActivityKind::TopicDeleted.effect(), MutationEffect::Destructive);
        assert_eq!(ActivityKind::ServerRemoved.effect(), MutationEffect::Destructive);
        assert_eq!(ActivityKind::QueueCreated.effect(), MutationEffect::Constructive);
        assert_eq!(ActivityKind::CredentialUpdated.effect(), MutationEffect::Constructive);
    }
}
