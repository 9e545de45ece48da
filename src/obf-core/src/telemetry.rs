// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build telemetry.
//!
//! The controller reports progress, activity messages and state snapshots
//! through a [`TelemetryPublisher`]. Publishing never blocks and never fails:
//! listener errors are logged and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller::ControllerSnapshot;

pub const TOPIC_LAYERS: &str = "BuildStatus/Trace/Layers";
pub const TOPIC_ACTIVITY: &str = "BuildStatus/Trace/Activity";
pub const TOPIC_STATUS: &str = "BuildStatus/Trace/Status";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("telemetry delivery failed: {0}")]
    Delivery(String),
}

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiver side of build telemetry.
///
/// All methods default to doing nothing, so listeners override only what
/// they forward.
pub trait TelemetryListener: Send + Sync {
    /// Layer progress; `current_layer` is 1-based, 0 before the first layer.
    fn on_progress(&self, _total_layers: usize, _current_layer: usize) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn on_activity(&self, _message: &str) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn on_status(&self, _snapshot: &ControllerSnapshot) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Fans telemetry out to registered listeners.
pub struct TelemetryPublisher {
    listeners: Vec<(ListenerId, Arc<dyn TelemetryListener>)>,
}

impl Default for TelemetryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryPublisher {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Returns an ID that can be used to unregister it.
    pub fn register(&mut self, listener: Arc<dyn TelemetryListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn publish_progress(&self, total_layers: usize, current_layer: usize) {
        debug!("Progress: layer {}/{}", current_layer, total_layers);
        for (id, listener) in &self.listeners {
            if let Err(e) = listener.on_progress(total_layers, current_layer) {
                debug!("Listener {:?} dropped progress: {}", id, e);
            }
        }
    }

    pub fn publish_activity(&self, message: &str) {
        info!("{}", message);
        for (id, listener) in &self.listeners {
            if let Err(e) = listener.on_activity(message) {
                debug!("Listener {:?} dropped activity: {}", id, e);
            }
        }
    }

    pub fn publish_status(&self, snapshot: &ControllerSnapshot) {
        for (id, listener) in &self.listeners {
            if let Err(e) = listener.on_status(snapshot) {
                debug!("Listener {:?} dropped status: {}", id, e);
            }
        }
    }
}

/// One published telemetry record, tagged with its topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "fields")]
pub enum TelemetryEvent {
    #[serde(rename = "BuildStatus/Trace/Layers")]
    Layers {
        build_layers: usize,
        current_layer: usize,
    },
    #[serde(rename = "BuildStatus/Trace/Activity")]
    Activity { current_activity: String },
    #[serde(rename = "BuildStatus/Trace/Status")]
    Status(ControllerSnapshot),
}

impl TelemetryEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            TelemetryEvent::Layers { .. } => TOPIC_LAYERS,
            TelemetryEvent::Activity { .. } => TOPIC_ACTIVITY,
            TelemetryEvent::Status(_) => TOPIC_STATUS,
        }
    }
}

/// Latest known state of a build run, as served to operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub run_id: Option<Uuid>,
    pub build_layers: usize,
    pub current_layer: usize,
    pub current_activity: Option<String>,
    pub controller: Option<ControllerSnapshot>,
}

/// Listener that rebroadcasts telemetry over tokio channels.
///
/// Every event goes out on a broadcast channel; the accumulated
/// [`BuildStatus`] is kept in a watch channel for late readers.
pub struct BroadcastTelemetry {
    events: broadcast::Sender<TelemetryEvent>,
    status: watch::Sender<BuildStatus>,
}

impl BroadcastTelemetry {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(run_id: Option<Uuid>) -> Self {
        Self::with_capacity(run_id, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(run_id: Option<Uuid>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let (status, _) = watch::channel(BuildStatus {
            run_id,
            ..BuildStatus::default()
        });
        Self { events, status }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.events.subscribe()
    }

    pub fn status_receiver(&self) -> watch::Receiver<BuildStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> BuildStatus {
        self.status.borrow().clone()
    }

    fn send(&self, event: TelemetryEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

impl TelemetryListener for BroadcastTelemetry {
    fn on_progress(&self, total_layers: usize, current_layer: usize) -> Result<(), TelemetryError> {
        self.status.send_modify(|status| {
            status.build_layers = total_layers;
            status.current_layer = current_layer;
        });
        self.send(TelemetryEvent::Layers {
            build_layers: total_layers,
            current_layer,
        });
        Ok(())
    }

    fn on_activity(&self, message: &str) -> Result<(), TelemetryError> {
        self.status
            .send_modify(|status| status.current_activity = Some(message.to_string()));
        self.send(TelemetryEvent::Activity {
            current_activity: message.to_string(),
        });
        Ok(())
    }

    fn on_status(&self, snapshot: &ControllerSnapshot) -> Result<(), TelemetryError> {
        self.status
            .send_modify(|status| status.controller = Some(snapshot.clone()));
        self.send(TelemetryEvent::Status(snapshot.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::controller::BuildPhase;

    #[derive(Default)]
    struct Recorder {
        activities: Mutex<Vec<String>>,
        progress: Mutex<Vec<(usize, usize)>>,
    }

    impl TelemetryListener for Recorder {
        fn on_progress(&self, total: usize, current: usize) -> Result<(), TelemetryError> {
            self.progress.lock().unwrap().push((total, current));
            Ok(())
        }

        fn on_activity(&self, message: &str) -> Result<(), TelemetryError> {
            self.activities.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl TelemetryListener for Broken {
        fn on_progress(&self, _: usize, _: usize) -> Result<(), TelemetryError> {
            Err(TelemetryError::Delivery("broker down".into()))
        }

        fn on_activity(&self, _: &str) -> Result<(), TelemetryError> {
            Err(TelemetryError::Delivery("broker down".into()))
        }
    }

    #[test]
    fn test_failing_listener_does_not_affect_others() {
        let recorder = Arc::new(Recorder::default());
        let mut publisher = TelemetryPublisher::new();
        publisher.register(Arc::new(Broken));
        publisher.register(recorder.clone());

        publisher.publish_progress(3, 1);
        publisher.publish_activity("Init");

        assert_eq!(*recorder.progress.lock().unwrap(), vec![(3, 1)]);
        assert_eq!(*recorder.activities.lock().unwrap(), vec!["Init".to_string()]);
    }

    #[test]
    fn test_unregister() {
        let recorder = Arc::new(Recorder::default());
        let mut publisher = TelemetryPublisher::new();
        let id = publisher.register(recorder.clone());
        assert_eq!(publisher.listener_count(), 1);
        publisher.unregister(id);
        assert_eq!(publisher.listener_count(), 0);
        publisher.publish_activity("ignored");
        assert!(recorder.activities.lock().unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_without_subscribers_is_fine() {
        let telemetry = BroadcastTelemetry::new(None);
        assert!(telemetry.on_progress(2, 0).is_ok());
        assert!(telemetry.on_activity("Init").is_ok());
        assert_eq!(telemetry.status().current_activity.as_deref(), Some("Init"));
    }

    #[tokio::test]
    async fn test_broadcast_events_and_status() {
        let run_id = Uuid::new_v4();
        let telemetry = Arc::new(BroadcastTelemetry::new(Some(run_id)));
        let mut events = telemetry.subscribe();
        let mut publisher = TelemetryPublisher::new();
        publisher.register(telemetry.clone());

        publisher.publish_progress(3, 2);
        publisher.publish_activity("Recoat cycle. Layer 2");
        let snapshot = ControllerSnapshot {
            phase: BuildPhase::Recoat,
            total_layers: 3,
            current_layer: 2,
            ..ControllerSnapshot::default()
        };
        publisher.publish_status(&snapshot);

        assert_eq!(
            events.recv().await.unwrap(),
            TelemetryEvent::Layers {
                build_layers: 3,
                current_layer: 2
            }
        );
        let activity = events.recv().await.unwrap();
        assert_eq!(activity.topic(), TOPIC_ACTIVITY);
        assert_eq!(
            events.recv().await.unwrap(),
            TelemetryEvent::Status(snapshot.clone())
        );

        let status = telemetry.status();
        assert_eq!(status.run_id, Some(run_id));
        assert_eq!(status.current_layer, 2);
        assert_eq!(status.controller, Some(snapshot));
    }

    #[test]
    fn test_event_serialization_uses_topic_names() {
        let event = TelemetryEvent::Layers {
            build_layers: 3,
            current_layer: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "BuildStatus/Trace/Layers");
        assert_eq!(json["fields"]["build_layers"], 3);
        assert_eq!(json["fields"]["current_layer"], 0);
    }
}
