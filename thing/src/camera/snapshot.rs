//! Snapshot property: latest captured image and change notifications

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::hardware::params::ImageFormat;

/// Published after every successful capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEvent {
    /// Count of successful captures since start, starting at 1
    pub sequence: u64,
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
}

/// Options for the snapshot property
#[derive(Debug, Clone)]
pub struct Options {
    /// Where the latest image lives on disk
    pub path: PathBuf,

    /// How many past events `/events` reports
    pub history: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/picam-thing/snapshot.jpg"),
            history: 16,
        }
    }
}

/// The read-only "most recent image" property.
///
/// Its value is a link to a fixed file path rather than inline image bytes.
pub struct SnapshotProperty {
    path: PathBuf,
    format: ImageFormat,
    history: RwLock<VecDeque<SnapshotEvent>>,
    capacity: usize,
    events: broadcast::Sender<SnapshotEvent>,
}

impl SnapshotProperty {
    pub fn new(options: &Options, format: ImageFormat) -> Self {
        let (events, _) = broadcast::channel(options.history.max(1));
        Self {
            path: options.path.clone(),
            format,
            history: RwLock::new(VecDeque::with_capacity(options.history)),
            capacity: options.history,
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    /// Record a new snapshot and notify subscribers
    pub fn notify(&self, event: SnapshotEvent) {
        {
            let mut history = self.history.write();
            if self.capacity > 0 && history.len() == self.capacity {
                history.pop_front();
            }
            if self.capacity > 0 {
                history.push_back(event.clone());
            }
        }
        // no subscribers is fine
        let receivers = self.events.send(event).unwrap_or(0);
        debug!("Snapshot event sent to {} subscribers", receivers);
    }

    pub fn latest(&self) -> Option<SnapshotEvent> {
        self.history.read().back().cloned()
    }

    /// Past events, oldest first
    pub fn history(&self) -> Vec<SnapshotEvent> {
        self.history.read().iter().cloned().collect()
    }

    /// Push feed of new snapshots for embedders and event forwarders.
    ///
    /// The HTTP surface serves the polled history from [`Self::history`]
    /// instead; a receiver that falls behind loses the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.events.subscribe()
    }
}
