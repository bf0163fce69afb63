//! Time-trigger dispatcher.
//!
//! On every tick the dispatcher discovers the active time-trigger roots,
//! fires the ones whose interval has elapsed, records a log entry for each
//! firing and hands the trigger to the executors.

use crate::error::SchedulerError;
use crate::schedule::{FiringHistory, TimeTriggerSchedule, TriggerReference};
use boltflow_core::{Result, WorkflowVersionNodeId};
use boltflow_workflow::{
    WorkflowNode, WorkflowNodeType, WorkflowStore, WorkflowVersionNodeLog, append_log,
    find_active_trigger_roots,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A trigger that fired and should be executed.
#[derive(Debug, Clone)]
pub struct TriggerDispatch {
    pub trigger_reference: TriggerReference,
    /// The trigger node with its direct neighbours.
    pub trigger: WorkflowNode,
    pub fired_at: DateTime<Utc>,
}

/// Fires time triggers on their intervals.
pub struct TriggerDispatcher<S: ?Sized> {
    store: Arc<S>,
    dispatch: mpsc::Sender<TriggerDispatch>,
    /// The Lightning node log entries are recorded for.
    lightning_node_id: i64,
    history: FiringHistory,
}

impl<S: WorkflowStore + ?Sized> TriggerDispatcher<S> {
    #[must_use]
    pub fn new(store: Arc<S>, dispatch: mpsc::Sender<TriggerDispatch>, lightning_node_id: i64) -> Self {
        Self {
            store,
            dispatch,
            lightning_node_id,
            history: FiringHistory::new(),
        }
    }

    async fn record_firing(&self, reference: TriggerReference, schedule: &TimeTriggerSchedule) {
        let entry = WorkflowVersionNodeLog::new(
            self.lightning_node_id,
            schedule.node_id,
            reference.to_string(),
        )
        .with_input(json!({ "timeInSeconds": schedule.interval.as_secs() }).to_string());
        if let Err(e) = append_log(self.store.as_ref(), entry).await {
            warn!(node_id = %schedule.node_id, trigger_reference = %reference, error = %e, "failed to record trigger firing");
        }
    }

    /// Fires every due trigger once. Returns how many fired.
    ///
    /// A trigger with an unreadable schedule is skipped. A failed log
    /// append does not stop the firing.
    ///
    /// # Errors
    ///
    /// - `Discovery` if the active triggers cannot be read.
    /// - `DispatchClosed` if nobody receives dispatches any more.
    #[instrument(skip(self))]
    pub async fn tick(&mut self, now: Instant) -> Result<usize, SchedulerError> {
        let triggers = find_active_trigger_roots(self.store.as_ref(), WorkflowNodeType::TimeTrigger)
            .await
            .map_err(|e| SchedulerError::Discovery(e.current_context().clone()))?;

        let active: Vec<WorkflowVersionNodeId> = triggers.iter().map(WorkflowNode::id).collect();
        self.history.retain(&active);

        let mut fired = 0;
        for trigger in triggers {
            let schedule = match TimeTriggerSchedule::from_node(&trigger.node) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(node_id = %trigger.id(), error = %e, "skipping time trigger");
                    continue;
                }
            };
            if !self.history.is_due(&schedule, now) {
                continue;
            }

            let reference = TriggerReference::new();
            self.record_firing(reference, &schedule).await;
            self.dispatch
                .send(TriggerDispatch {
                    trigger_reference: reference,
                    trigger,
                    fired_at: Utc::now(),
                })
                .await
                .map_err(|_| SchedulerError::DispatchClosed)?;
            self.history.record(schedule.node_id, now);
            debug!(node_id = %schedule.node_id, trigger_reference = %reference, "fired time trigger");
            fired += 1;
        }
        Ok(fired)
    }

    /// Ticks every `period` until `cancel` fires or dispatch closes.
    pub async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let now = tokio::select! {
                () = cancel.cancelled() => break,
                now = interval.tick() => now,
            };
            match self.tick(now).await {
                Ok(fired) if fired > 0 => info!(fired, "dispatched time triggers"),
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "time trigger tick failed");
                    if matches!(e.current_context(), SchedulerError::DispatchClosed) {
                        break;
                    }
                }
            }
        }
        info!("time trigger dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boltflow_core::{Status, WorkflowVersionId};
    use boltflow_workflow::editor::{add_node, create_workflow};
    use boltflow_workflow::log::logs_for_node;
    use boltflow_workflow::version::update_version;
    use boltflow_workflow::{
        InMemoryWorkflowStore, NewWorkflow, NewWorkflowVersionNode, WorkflowNodeParameter,
        WorkflowNodeParameters, WorkflowParameterType, clone_or_create_version,
    };

    async fn active_version(store: &InMemoryWorkflowStore) -> WorkflowVersionId {
        let workflow = create_workflow(store, NewWorkflow::new("timer"))
            .await
            .expect("workflow");
        let mut version = clone_or_create_version(store, workflow.id, 1, String::new())
            .await
            .expect("version");
        version.status = Status::Active;
        update_version(store, version).await.expect("activate").id
    }

    async fn time_trigger(
        store: &InMemoryWorkflowStore,
        version: WorkflowVersionId,
        seconds: i64,
    ) -> WorkflowVersionNodeId {
        let parameters = WorkflowNodeParameters {
            parameters: vec![WorkflowNodeParameter::with_value(
                WorkflowParameterType::TimeInSeconds,
                json!(seconds),
            )],
        };
        add_node(
            store,
            NewWorkflowVersionNode::new(version, WorkflowNodeType::TimeTrigger)
                .with_parameters(&parameters),
        )
        .await
        .expect("trigger")
        .id
    }

    #[tokio::test(start_paused = true)]
    async fn fires_when_due_and_logs_reference() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let version = active_version(&store).await;
        let trigger = time_trigger(&store, version, 60).await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut dispatcher = TriggerDispatcher::new(store.clone(), tx, 1);

        let start = Instant::now();
        assert_eq!(dispatcher.tick(start).await.expect("tick"), 1);
        assert_eq!(
            dispatcher
                .tick(start + Duration::from_secs(30))
                .await
                .expect("tick"),
            0
        );
        assert_eq!(
            dispatcher
                .tick(start + Duration::from_secs(60))
                .await
                .expect("tick"),
            1
        );

        let first = rx.recv().await.expect("dispatch");
        let second = rx.recv().await.expect("dispatch");
        assert_eq!(first.trigger.id(), trigger);
        assert_ne!(first.trigger_reference, second.trigger_reference);

        let logs = logs_for_node(store.as_ref(), trigger, 10).await.expect("logs");
        assert_eq!(logs.len(), 2);
        assert!(
            logs.iter()
                .any(|l| l.trigger_reference == second.trigger_reference.to_string())
        );
        assert!(logs.iter().all(|l| l.node_id == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn log_failure_does_not_stop_dispatch() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let version = active_version(&store).await;
        time_trigger(&store, version, 60).await;
        store.fail_log_inserts(true);
        let (tx, mut rx) = mpsc::channel(8);
        let mut dispatcher = TriggerDispatcher::new(store.clone(), tx, 1);

        assert_eq!(dispatcher.tick(Instant::now()).await.expect("tick"), 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_schedule_is_skipped() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let version = active_version(&store).await;
        time_trigger(&store, version, 0).await;
        let valid = time_trigger(&store, version, 5).await;
        let (tx, mut rx) = mpsc::channel(8);
        let mut dispatcher = TriggerDispatcher::new(store.clone(), tx, 1);

        assert_eq!(dispatcher.tick(Instant::now()).await.expect("tick"), 1);
        assert_eq!(rx.recv().await.expect("dispatch").trigger.id(), valid);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_dispatch_is_an_error() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let version = active_version(&store).await;
        time_trigger(&store, version, 60).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut dispatcher = TriggerDispatcher::new(store.clone(), tx, 1);

        let err = dispatcher.tick(Instant::now()).await.unwrap_err();
        assert!(err.to_string().contains("receiver closed"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_fires_on_schedule_until_cancelled() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let version = active_version(&store).await;
        time_trigger(&store, version, 30).await;
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let dispatcher = TriggerDispatcher::new(store.clone(), tx, 1);
        let task = tokio::spawn(dispatcher.run(Duration::from_secs(10), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(65)).await;
        cancel.cancel();
        task.await.expect("join");

        let mut fired = 0;
        while rx.try_recv().is_ok() {
            fired += 1;
        }
        // ticks at 0, 10, ..., 60 fire at 0, 30 and 60
        assert_eq!(fired, 3);
    }
}
