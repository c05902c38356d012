//! Server state

use std::sync::Arc;

use crate::camera::controller::CameraController;
use crate::camera::snapshot::SnapshotProperty;
use crate::server::thing::ThingDescription;
use crate::workers::scheduler::SchedulerStatus;

/// Server state shared across handlers
pub struct ServerState {
    pub controller: Arc<CameraController>,
    pub snapshot: Arc<SnapshotProperty>,
    pub scheduler: Arc<SchedulerStatus>,
    pub description: ThingDescription,
}

impl ServerState {
    pub fn new(
        controller: Arc<CameraController>,
        snapshot: Arc<SnapshotProperty>,
        scheduler: Arc<SchedulerStatus>,
        description: ThingDescription,
    ) -> Self {
        Self {
            controller,
            snapshot,
            scheduler,
            description,
        }
    }
}
