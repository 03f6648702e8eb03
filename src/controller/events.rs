//! # Events
//!
//! Human-visible Kubernetes Events tied to the record being synced.
//!
//! Recording is fire-and-forget: [`EventRecorder::record`] returns
//! immediately and a failure to publish is only logged.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::{debug, warn};

/// Action reported on every event this controller emits
const EVENT_ACTION: &str = "Sync";

pub trait EventRecorder: Send + Sync {
    fn record(&self, subject: &ObjectReference, event_type: EventType, reason: &str, message: &str);
}

/// Publishes events through the Kubernetes events API
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
    reporter: String,
}

impl std::fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder")
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
        };
        Self {
            reporter: controller.to_string(),
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl EventRecorder for KubeEventRecorder {
    fn record(&self, subject: &ObjectReference, event_type: EventType, reason: &str, message: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(reason, "No async runtime available, dropping event");
            return;
        };

        let recorder = self.recorder.clone();
        let reference = subject.clone();
        let event = Event {
            type_: event_type,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: EVENT_ACTION.to_string(),
            secondary: None,
        };

        handle.spawn(async move {
            match recorder.publish(&event, &reference).await {
                Ok(()) => debug!(reason = %event.reason, "event.published"),
                Err(e) => warn!(
                    reason = %event.reason,
                    resource.namespace = reference.namespace.as_deref().unwrap_or_default(),
                    resource.name = reference.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Failed to publish event"
                ),
            }
        });
    }
}

/// One event captured by [`MemoryEventRecorder`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedEvent {
    pub name: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryEventRecorder {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[cfg(test)]
impl MemoryEventRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[cfg(test)]
impl EventRecorder for MemoryEventRecorder {
    fn record(&self, subject: &ObjectReference, event_type: EventType, reason: &str, message: &str) {
        self.events.lock().unwrap().push(RecordedEvent {
            name: subject.name.clone().unwrap_or_default(),
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}
