//! Task Queue: persistent work items backed by the Relational Store, with
//! LLM tasks serialized behind one global permit and IO tasks running in a
//! bounded parallel pool (spec §4.11). Grounded on
//! `original_source/src/garuda_intel/services/task_queue.py`'s
//! `TaskQueueService`, recast into the teacher's worker-loop-plus-trait
//! shape (`intelligent-crawler::crawler::crawl_site` driving work through
//! a trait object) rather than the source's asyncio-task-per-job model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use intel_types::{Task, TaskCategory};

use crate::error::StoreResult;
use crate::events::{CoreEvent, EventBus};
use crate::store::RelationalStore;

/// What a handler can do mid-run: report fractional progress and check
/// whether it has been asked to stop (spec §4.11 "cooperative
/// cancellation").
pub struct TaskContext {
    store: Arc<dyn RelationalStore>,
    task_id: Uuid,
    events: EventBus,
}

impl TaskContext {
    pub async fn report_progress(&self, fraction: f32, message: Option<String>) -> StoreResult<()> {
        if let Some(mut task) = self.store.get_task(self.task_id).await? {
            task.set_progress(fraction, message.clone());
            self.store.update_task(&task).await?;
            self.events.publish(CoreEvent::TaskProgress { task_id: self.task_id, fraction, message });
        }
        Ok(())
    }

    pub async fn is_cancelled(&self) -> StoreResult<bool> {
        Ok(self
            .store
            .get_task(self.task_id)
            .await?
            .map(|t| t.status == intel_types::TaskStatus::Cancelled)
            .unwrap_or(false))
    }
}

/// The work a queued task actually performs, kept behind a trait so the
/// queue's scheduling/persistence logic is independent of what any given
/// `task_type` does (spec §4.11: the queue schedules; handlers execute).
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task, ctx: &TaskContext) -> anyhow::Result<Value>;
}

pub struct TaskQueue {
    store: Arc<dyn RelationalStore>,
    events: EventBus,
    llm_permits: Arc<Semaphore>,
    io_permits: Arc<Semaphore>,
    poll_interval: Duration,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn RelationalStore>, events: EventBus, io_worker_count: usize, poll_interval: Duration) -> Self {
        Self {
            store,
            events,
            llm_permits: Arc::new(Semaphore::new(1)),
            io_permits: Arc::new(Semaphore::new(io_worker_count.max(1))),
            poll_interval,
        }
    }

    /// Crash recovery: every task left `running` from a prior process
    /// transitions to `failed` (spec §3, §4.11, §8).
    pub async fn recover(&self) -> StoreResult<usize> {
        let recovered = self.store.recover_running_tasks().await?;
        if recovered > 0 {
            info!(recovered, "recovered tasks left running by a prior process");
        }
        Ok(recovered)
    }

    pub async fn submit(&self, task_type: impl Into<String>, category: TaskCategory, priority: i32, params: Value) -> StoreResult<Task> {
        let task = Task::new(task_type, category, priority, params);
        self.store.submit_task(&task).await?;
        self.events.publish(CoreEvent::TaskStarted { task_id: task.id.0, task_type: task.task_type.clone() });
        Ok(task)
    }

    /// Runs both category loops until `cancel` is set (spec §4.11 "the
    /// queue drains continuously").
    pub async fn run(&self, handler: Arc<dyn TaskHandler>, cancel: Arc<AtomicBool>) {
        let llm_loop = self.run_category_loop(TaskCategory::Llm, self.llm_permits.clone(), handler.clone(), cancel.clone());
        let io_loop = self.run_category_loop(TaskCategory::Io, self.io_permits.clone(), handler, cancel);
        tokio::join!(llm_loop, io_loop);
    }

    async fn run_category_loop(
        &self,
        category: TaskCategory,
        permits: Arc<Semaphore>,
        handler: Arc<dyn TaskHandler>,
        cancel: Arc<AtomicBool>,
    ) {
        while !cancel.load(Ordering::Relaxed) {
            let next = match self.store.next_pending_task(Some(category)).await {
                Ok(next) => next,
                Err(err) => {
                    warn!(error = %err, "failed to poll next pending task");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            let Some(mut task) = next else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            let Ok(permit) = permits.clone().acquire_owned().await else { break };

            task.mark_running();
            if let Err(err) = self.store.update_task(&task).await {
                warn!(error = %err, "failed to mark task running");
                drop(permit);
                continue;
            }

            let ctx = TaskContext { store: self.store.clone(), task_id: task.id.0, events: self.events.clone() };
            let outcome = handler.handle(&task, &ctx).await;

            match outcome {
                Ok(result) => {
                    task.mark_completed(Some(result));
                    self.events.publish(CoreEvent::TaskCompleted { task_id: task.id.0 });
                }
                Err(err) => {
                    task.mark_failed(err.to_string());
                    self.events.publish(CoreEvent::TaskFailed { task_id: task.id.0, error: err.to_string() });
                }
            }
            if let Err(err) = self.store.update_task(&task).await {
                warn!(error = %err, "failed to persist task outcome");
            }
            drop(permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use intel_types::TaskStatus;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(&self, task: &Task, _ctx: &TaskContext) -> anyhow::Result<Value> {
            Ok(task.params.clone())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl TaskHandler for FailingHandler {
        async fn handle(&self, _task: &Task, _ctx: &TaskContext) -> anyhow::Result<Value> {
            anyhow::bail!("handler always fails")
        }
    }

    #[tokio::test]
    async fn submitted_task_is_run_and_marked_completed() {
        let store = Arc::new(InMemoryStore::new());
        let queue = TaskQueue::new(store.clone(), EventBus::new(), 2, Duration::from_millis(5));
        let task = queue
            .submit("crawl", TaskCategory::Io, 5, serde_json::json!({"url": "https://acme.com"}))
            .await
            .unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(EchoHandler);
        let cancel_clone = cancel.clone();
        let queue_task = tokio::spawn(async move {
            queue.run(handler, cancel_clone).await;
        });

        for _ in 0..50 {
            if let Some(reloaded) = store.get_task(task.id.0).await.unwrap() {
                if reloaded.status == TaskStatus::Completed {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.store(true, Ordering::Relaxed);
        let _ = tokio::time::timeout(Duration::from_millis(200), queue_task).await;

        let reloaded = store.get_task(task.id.0).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Completed);
        assert_eq!(reloaded.result, Some(serde_json::json!({"url": "https://acme.com"})));
    }

    #[tokio::test]
    async fn failing_handler_marks_task_failed_with_error() {
        let store = Arc::new(InMemoryStore::new());
        let queue = TaskQueue::new(store.clone(), EventBus::new(), 1, Duration::from_millis(5));
        let task = queue.submit("bad", TaskCategory::Llm, 0, Value::Null).await.unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(FailingHandler);
        let cancel_clone = cancel.clone();
        let queue_task = tokio::spawn(async move {
            queue.run(handler, cancel_clone).await;
        });

        for _ in 0..50 {
            if let Some(reloaded) = store.get_task(task.id.0).await.unwrap() {
                if reloaded.status == TaskStatus::Failed {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.store(true, Ordering::Relaxed);
        let _ = tokio::time::timeout(Duration::from_millis(200), queue_task).await;

        let reloaded = store.get_task(task.id.0).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Failed);
        assert!(reloaded.error.is_some());
    }

    #[tokio::test]
    async fn recover_reports_count_from_store() {
        let store = Arc::new(InMemoryStore::new());
        let mut task = Task::new("stale", TaskCategory::Io, 0, Value::Null);
        task.mark_running();
        store.submit_task(&task).await.unwrap();

        let queue = TaskQueue::new(store, EventBus::new(), 1, Duration::from_millis(5));
        let recovered = queue.recover().await.unwrap();
        assert_eq!(recovered, 1);
    }
}
