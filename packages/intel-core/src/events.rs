//! In-process fan-out of progress events to subscribers (spec §2 "Event
//! Bus"). Modeled as an explicit `broadcast::Sender` field passed into
//! every component that needs it, rather than a `static`, per SPEC_FULL.md
//! §9's "global mutable state" design note. Mirrors the shape of the
//! teacher's `CrawlerEvent` enum in `intelligent-crawler/src/events.rs`,
//! generalized to the components this crate actually has.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A progress event emitted by the Explorer, Agent Service, Task Queue or
/// RAG Answerer for observers (dashboards, CLIs) to subscribe to. This
/// crate only defines and fans out events; rendering them is an external
/// collaborator's concern (spec §1 Non-goals: CLI/HTTP/UI are out of
/// scope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    PageFetchStarted { url: String, depth: u32 },
    PageFetchFailed { url: String, reason: String },
    PageExplored { url: String, page_type: String, findings: usize },
    PageSkippedDuplicate { url: String, similarity: f32 },
    EntityMerged { source_id: Uuid, target_id: Uuid, reason: String },
    TaskStarted { task_id: Uuid, task_type: String },
    TaskProgress { task_id: Uuid, fraction: f32, message: Option<String> },
    TaskCompleted { task_id: Uuid },
    TaskFailed { task_id: Uuid, error: String },
    AgentRunStarted { run_id: Uuid, mode: String },
    AgentRunCompleted { run_id: Uuid, mode: String },
}

/// One envelope wraps every emitted event with a timestamp, the way a
/// structured log line would, so subscribers don't need to stamp events
/// themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub at: DateTime<Utc>,
    pub event: CoreEvent,
}

/// Bounded broadcast channel. Slow subscribers that fall behind the
/// buffer lose the oldest events rather than blocking publishers — this
/// is a progress feed, not an audit log (the Relational Store's Task
/// table is the audit log of record).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

const DEFAULT_CAPACITY: usize = 1024;

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Publishes an event. Never fails: if there are no subscribers the
    /// send simply has no effect, matching the source's fire-and-forget
    /// event emission.
    pub fn publish(&self, event: CoreEvent) {
        let envelope = EventEnvelope { at: Utc::now(), event };
        let _ = self.sender.send(envelope);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(CoreEvent::PageExplored {
            url: "https://example.com".to_string(),
            page_type: "homepage".to_string(),
            findings: 2,
        });
        let received = rx.recv().await.unwrap();
        matches!(received.event, CoreEvent::PageExplored { .. });
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(CoreEvent::TaskStarted {
            task_id: Uuid::new_v4(),
            task_type: "crawl".to_string(),
        });
    }
}
