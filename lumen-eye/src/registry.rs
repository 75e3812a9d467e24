//! Process-wide table of room workers, at most one per room

use crate::error::VisionError;
use crate::worker::{PipelineContext, RoomStreamWorker, WorkerSpec};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One room's worker. `replace` serializes writers for the whole
/// stop-and-start sequence; `current` is only locked to read or swap the
/// handle, so readers never wait on a camera.
#[derive(Default)]
struct RoomSlot {
    replace: Mutex<()>,
    current: Mutex<Option<Arc<RoomStreamWorker>>>,
}

impl RoomSlot {
    fn take(&self) -> Option<Arc<RoomStreamWorker>> {
        self.current.lock().take()
    }
}

type Slot = Arc<RoomSlot>;

/// Maps room id to its active [`RoomStreamWorker`].
///
/// Replacing a worker takes the old one out of its slot and stops it before
/// the new one is started, so `get` sees either no worker or exactly one.
/// Operations on different rooms do not wait on each other.
pub struct WorkerRegistry {
    context: PipelineContext,
    slots: Mutex<HashMap<String, Slot>>,
}

impl WorkerRegistry {
    pub fn new(context: PipelineContext) -> Self {
        Self {
            context,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    fn slot(&self, room_id: &str) -> Slot {
        self.slots
            .lock()
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    fn existing_slot(&self, room_id: &str) -> Option<Slot> {
        self.slots.lock().get(room_id).cloned()
    }

    /// Stop any worker registered for the room, then start and install a
    /// new one. If the new worker fails to start the room is left empty.
    ///
    /// When the old worker misses its join timeout while still holding its
    /// source, no new source is opened and `ShutdownTimeout` is returned.
    pub fn create_or_replace(&self, spec: WorkerSpec) -> Result<Arc<RoomStreamWorker>, VisionError> {
        let room_id = spec.room_id.clone();
        let slot = self.slot(&room_id);
        let _replacing = slot.replace.lock();

        if let Some(old) = slot.take() {
            info!(room_id = %room_id, "Replacing room worker");
            if let Err(e) = old.stop() {
                if !old.source_released() {
                    warn!(room_id = %room_id, "Previous worker still owns its source, not replacing: {}", e);
                    return Err(e);
                }
                warn!(room_id = %room_id, "Previous worker did not stop cleanly: {}", e);
            }
        }

        let worker = Arc::new(RoomStreamWorker::start(&self.context, spec)?);
        *slot.current.lock() = Some(worker.clone());
        Ok(worker)
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<RoomStreamWorker>> {
        self.existing_slot(room_id)?.current.lock().clone()
    }

    /// Stop and forget the room's worker. Returns false if none was registered.
    ///
    /// A join timeout is logged; the worker is forgotten either way.
    pub fn remove_and_stop(&self, room_id: &str) -> bool {
        let Some(slot) = self.existing_slot(room_id) else {
            return false;
        };
        let _replacing = slot.replace.lock();
        let Some(worker) = slot.take() else {
            return false;
        };
        if let Err(e) = worker.stop() {
            warn!(room_id = %room_id, "{}", e);
        }
        true
    }

    pub fn room_ids(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();
        slots
            .into_iter()
            .filter(|(_, slot)| slot.current.lock().is_some())
            .map(|(id, _)| id)
            .collect()
    }

    /// Stop every worker. Individual failures are logged and skipped.
    pub fn stop_all(&self) {
        let slots: Vec<(String, Slot)> = self.slots.lock().drain().collect();
        for (room_id, slot) in slots {
            let _replacing = slot.replace.lock();
            let Some(worker) = slot.take() else {
                continue;
            };
            if let Err(e) = worker.stop() {
                warn!(room_id = %room_id, "Failed to stop room worker: {}", e);
            }
        }
        info!("All registry workers stopped");
    }
}
