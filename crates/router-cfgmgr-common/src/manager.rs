//! Reconciler trait and the sequential event loop.
//!
//! A reconciler consumes relation lifecycle events one at a time. The loop
//! here never overlaps two events; each is handled to completion before
//! the next is looked at.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::RouterResult;
use crate::event::{RelationEvent, RelationEventKind};
use crate::task::TaskStatus;

/// Base trait for relation reconcilers.
///
/// # Example
///
/// ```ignore
/// use router_cfgmgr_common::{Reconciler, RelationEvent, RouterResult, TaskStatus};
///
/// struct MyMgr;
///
/// #[async_trait]
/// impl Reconciler for MyMgr {
///     fn name(&self) -> &str { "mymgr" }
///     fn daemon_name(&self) -> &str { "mymgrd" }
///     fn handled_events(&self) -> &[RelationEventKind] { &[RelationEventKind::Changed] }
///     async fn handle_event(&mut self, event: &RelationEvent) -> RouterResult<TaskStatus> {
///         Ok(TaskStatus::Success)
///     }
/// }
/// ```
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Returns the reconciler name (for logging).
    fn name(&self) -> &str;

    /// Returns the daemon name (e.g. "routerd").
    fn daemon_name(&self) -> &str;

    /// Returns the event kinds this reconciler acts on.
    fn handled_events(&self) -> &[RelationEventKind];

    /// Handles one event to completion.
    async fn handle_event(&mut self, event: &RelationEvent) -> RouterResult<TaskStatus>;

    /// Returns true if this reconciler acts on the given kind.
    fn handles(&self, kind: RelationEventKind) -> bool {
        self.handled_events().contains(&kind)
    }
}

/// Feeds events through a reconciler in order.
///
/// Failures are logged and classified; they never stop the loop, since
/// the hosting runtime re-delivers events as the recovery mechanism.
pub async fn process_events<R, I>(reconciler: &mut R, events: I) -> Vec<TaskStatus>
where
    R: Reconciler + ?Sized,
    I: IntoIterator<Item = RelationEvent>,
{
    let mut statuses = Vec::new();
    for event in events {
        statuses.push(process_event(reconciler, &event).await);
    }
    statuses
}

/// Handles a single event, logging and classifying the outcome.
pub async fn process_event<R>(reconciler: &mut R, event: &RelationEvent) -> TaskStatus
where
    R: Reconciler + ?Sized,
{
    if !reconciler.handles(event.kind) {
        info!(
            reconciler = reconciler.name(),
            event = %event.kind,
            unit = %event.unit,
            "Event not handled, ignoring"
        );
        return TaskStatus::Ignore;
    }

    let status = match reconciler.handle_event(event).await {
        Ok(status) => status,
        Err(e) => {
            let status = TaskStatus::from_error(&e);
            if status.is_retryable() {
                warn!(
                    reconciler = reconciler.name(),
                    event = %event.kind,
                    unit = %event.unit,
                    error = %e,
                    "Networking layer rejected change, waiting for next delivery"
                );
            } else {
                error!(
                    reconciler = reconciler.name(),
                    event = %event.kind,
                    unit = %event.unit,
                    error = %e,
                    "Failed to handle event"
                );
            }
            status
        }
    };

    info!(
        reconciler = reconciler.name(),
        event = %event.kind,
        unit = %event.unit,
        status = status.as_str(),
        "Event processed"
    );
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterError;
    use crate::relation_data;

    struct CountingMgr {
        handled: usize,
        fail_unit: Option<String>,
    }

    #[async_trait]
    impl Reconciler for CountingMgr {
        fn name(&self) -> &str {
            "counting"
        }

        fn daemon_name(&self) -> &str {
            "countingd"
        }

        fn handled_events(&self) -> &[RelationEventKind] {
            &[RelationEventKind::Joined, RelationEventKind::Changed]
        }

        async fn handle_event(&mut self, event: &RelationEvent) -> RouterResult<TaskStatus> {
            if self.fail_unit.as_deref() == Some(event.unit.as_str()) {
                return Err(RouterError::configuration("gateway", "missing"));
            }
            self.handled += 1;
            Ok(TaskStatus::Success)
        }
    }

    #[tokio::test]
    async fn test_process_events_in_order() {
        let mut mgr = CountingMgr {
            handled: 0,
            fail_unit: Some("bad/0".to_string()),
        };
        let events = vec![
            RelationEvent::joined("core/0", relation_data! {"name" => "core"}),
            RelationEvent::joined("bad/0", relation_data! {}),
            RelationEvent::departed("core/0", relation_data! {}),
            RelationEvent::changed("core/0", relation_data! {}),
        ];

        let statuses = process_events(&mut mgr, events).await;

        assert_eq!(
            statuses,
            vec![
                TaskStatus::Success,
                TaskStatus::InvalidEntry,
                TaskStatus::Ignore,
                TaskStatus::Success,
            ]
        );
        assert_eq!(mgr.handled, 2);
    }

    #[test]
    fn test_handles() {
        let mgr = CountingMgr {
            handled: 0,
            fail_unit: None,
        };
        assert_eq!(mgr.daemon_name(), "countingd");
        assert!(mgr.handles(RelationEventKind::Changed));
        assert!(!mgr.handles(RelationEventKind::Departed));
    }
}
