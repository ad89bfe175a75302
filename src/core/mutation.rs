//! Ordering of audit writes relative to remote side effects.
//!
//! Domain repositories describe each mutation as a [`Mutation`] value and hand it,
//! together with the remote call, to [`MutationAuditor::run`]:
//!
//! - destructive mutations are recorded before the remote call starts, and a failed
//!   audit write aborts the call;
//! - constructive mutations are recorded only after the remote call succeeds, and a
//!   failed audit write is logged without failing the mutation.

use crate::core::audit_log::AuditTrail;
use crate::error::AuditError;
use crate::models::activity::{ActivityKind, MutationEffect};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// What a mutation does, in audit terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub activity: ActivityKind,
    pub message: String,
    pub details: Value,
}

impl Mutation {
    pub fn new(activity: ActivityKind, message: impl Into<String>) -> Self {
        Self {
            activity,
            message: message.into(),
            details: Value::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn effect(&self) -> MutationEffect {
        self.activity.effect()
    }
}

#[derive(Debug, Error)]
pub enum MutationError<E> {
    /// The pre-delete audit write failed, so the remote call never ran.
    #[error("audit record could not be written, mutation not attempted: {0}")]
    Audit(#[source] AuditError),
    #[error("{0}")]
    Remote(E),
}

impl<E> MutationError<E> {
    pub fn remote(&self) -> Option<&E> {
        match self {
            MutationError::Remote(err) => Some(err),
            MutationError::Audit(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct MutationAuditor {
    trail: Arc<dyn AuditTrail>,
}

impl fmt::Debug for MutationAuditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationAuditor").finish_non_exhaustive()
    }
}

impl MutationAuditor {
    pub fn new(trail: Arc<dyn AuditTrail>) -> Self {
        Self { trail }
    }

    /// Run `remote` with the audit write ordered by the mutation's effect.
    pub async fn run<T, E, Fut>(
        &self,
        mutation: Mutation,
        remote: Fut,
    ) -> Result<T, MutationError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        match mutation.effect() {
            MutationEffect::Destructive => {
                let id = match self.record(&mutation).await {
                    Ok(id) => id,
                    Err(err) => {
                        error!(
                            activity = %mutation.activity,
                            error = %err,
                            "pre-delete audit write failed, mutation aborted"
                        );
                        return Err(MutationError::Audit(err));
                    }
                };
                debug!(audit_id = id, activity = %mutation.activity, "intent recorded");
                remote.await.map_err(MutationError::Remote)
            }
            MutationEffect::Constructive => {
                let out = remote.await.map_err(MutationError::Remote)?;
                if let Err(err) = self.record(&mutation).await {
                    warn!(
                        activity = %mutation.activity,
                        error = %err,
                        "audit write failed after successful mutation"
                    );
                }
                Ok(out)
            }
        }
    }

    async fn record(&self, mutation: &Mutation) -> Result<u64, AuditError> {
        self.trail
            .append(mutation.activity, &mutation.message, mutation.details.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audit_log::{FileAuditTrail, MemoryAuditTrail};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Debug, PartialEq)]
    struct RemoteFailure(&'static str);

    impl fmt::Display for RemoteFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    /// In-memory stand-in for a broker's queue administration API.
    struct FakeQueues {
        fail: bool,
        called: AtomicBool,
    }

    impl FakeQueues {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                called: AtomicBool::new(false),
            }
        }

        async fn call(&self) -> Result<(), RemoteFailure> {
            self.called.store(true, Ordering::SeqCst);
            if self.fail {
                Err(RemoteFailure("broker unreachable"))
            } else {
                Ok(())
            }
        }
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    struct RejectingTrail;

    #[async_trait]
    impl AuditTrail for RejectingTrail {
        async fn append(
            &self,
            _kind: ActivityKind,
            _message: &str,
            _details: Value,
        ) -> Result<u64, AuditError> {
            Err(AuditError::Rejected("audit store offline".into()))
        }
    }

    fn delete_queue() -> Mutation {
        Mutation::new(ActivityKind::QueueDeleted, "Deleted queue orders")
            .with_details(json!({"serverId": 1, "queue": "orders"}))
    }

    fn create_queue() -> Mutation {
        Mutation::new(ActivityKind::QueueCreated, "Created queue orders")
            .with_details(json!({"serverId": 1, "queue": "orders"}))
    }

    #[tokio::test]
    async fn test_delete_audited_even_when_remote_fails() {
        let trail = MemoryAuditTrail::new();
        let auditor = MutationAuditor::new(Arc::new(trail.clone()));
        let queues = FakeQueues::new(true);

        let result = auditor.run(delete_queue(), queues.call()).await;

        assert!(matches!(result, Err(MutationError::Remote(RemoteFailure(_)))));
        let entries = trail.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].activity_kind, ActivityKind::QueueDeleted);
    }

    #[tokio::test]
    async fn test_delete_audit_written_before_remote_call() {
        let trail = MemoryAuditTrail::new();
        let auditor = MutationAuditor::new(Arc::new(trail.clone()));
        let observed = trail.clone();

        auditor
            .run(delete_queue(), async move {
                assert_eq!(observed.entries().len(), 1);
                Ok::<_, RemoteFailure>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_create_leaves_no_entry() {
        let trail = MemoryAuditTrail::new();
        let auditor = MutationAuditor::new(Arc::new(trail.clone()));
        let queues = FakeQueues::new(true);

        let result = auditor.run(create_queue(), queues.call()).await;

        assert!(result.is_err());
        assert!(trail.entries().is_empty());
    }

    #[tokio::test]
    async fn test_create_audit_written_after_remote_call() {
        let trail = MemoryAuditTrail::new();
        let auditor = MutationAuditor::new(Arc::new(trail.clone()));
        let observed = trail.clone();

        auditor
            .run(create_queue(), async move {
                assert!(observed.entries().is_empty());
                Ok::<_, RemoteFailure>(())
            })
            .await
            .unwrap();
        assert_eq!(trail.entries().len(), 1);
        assert_eq!(trail.entries()[0].activity_kind, ActivityKind::QueueCreated);
    }

    #[tokio::test]
    async fn test_delete_aborted_when_audit_fails() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let auditor = MutationAuditor::new(Arc::new(RejectingTrail));
        let queues = FakeQueues::new(false);

        let result = auditor.run(delete_queue(), queues.call()).await;

        assert!(matches!(result, Err(MutationError::Audit(_))));
        assert!(!queues.called.load(Ordering::SeqCst));
        let text = logs.text();
        assert!(text.contains("pre-delete audit write failed, mutation aborted"), "logs: {}", text);
        assert!(text.contains("QueueDeleted"));
        assert!(text.contains("ERROR"));
    }

    #[tokio::test]
    async fn test_delete_proceeds_after_interrupted_audit_write() {
        let dir = tempfile::TempDir::new().unwrap();
        let trail =
            FileAuditTrail::new(dir.path().join("audit.log"), dir.path().join("audit.lock"));
        trail
            .append(ActivityKind::QueueCreated, "Created queue orders", json!({}))
            .await
            .unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(trail.path())
            .unwrap();
        io::Write::write_all(&mut file, br#"{"id":2,"timest"#).unwrap();
        drop(file);

        let auditor = MutationAuditor::new(Arc::new(trail.clone()));
        let queues = FakeQueues::new(false);
        auditor.run(delete_queue(), queues.call()).await.unwrap();

        assert!(queues.called.load(Ordering::SeqCst));
        let entries = trail.read_log(None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].activity_kind, ActivityKind::QueueDeleted);
        assert_eq!(entries[1].id, 2);
    }

    #[tokio::test]
    async fn test_create_succeeds_when_audit_fails() {
        let auditor = MutationAuditor::new(Arc::new(RejectingTrail));
        let queues = FakeQueues::new(false);

        let result = auditor.run(create_queue(), queues.call()).await;

        assert!(result.is_ok());
        assert!(queues.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_exactly_one_entry_per_mutation() {
        let trail = MemoryAuditTrail::new();
        let auditor = MutationAuditor::new(Arc::new(trail.clone()));
        let ok = FakeQueues::new(false);

        auditor.run(create_queue(), ok.call()).await.unwrap();
        auditor.run(delete_queue(), ok.call()).await.unwrap();
        auditor
            .run(
                Mutation::new(ActivityKind::TopicDeleted, "Deleted topic events"),
                ok.call(),
            )
            .await
            .unwrap();

        let kinds: Vec<ActivityKind> = trail.entries().iter().map(|e| e.activity_kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::QueueCreated,
                ActivityKind::QueueDeleted,
                ActivityKind::TopicDeleted
            ]
        );
    }
}
