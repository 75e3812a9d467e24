//! Starts and stops one worker per room and reports occupancy out of band

use crate::error::VisionError;
use crate::processing::OccupancyTransition;
use crate::reporter::{OccupancyReporter, ReportQueue};
use crate::worker::{PipelineContext, RoomStreamWorker, TransitionCallback, WorkerSpec};
use lumen_core::Room;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Default)]
struct RoomTable {
    workers: HashMap<String, Arc<RoomStreamWorker>>,
    /// Rooms whose source is being opened outside the lock
    starting: HashSet<String>,
}

/// Runs room workers whose transitions go to an [`OccupancyReporter`]
/// rather than a direct callback into the caller.
pub struct MultiRoomOrchestrator {
    context: PipelineContext,
    rooms: Mutex<RoomTable>,
    reports: Mutex<ReportQueue>,
    stop_timeout: Duration,
}

impl MultiRoomOrchestrator {
    pub fn new(context: PipelineContext, reporter: Arc<dyn OccupancyReporter>) -> Result<Self, VisionError> {
        let stop_timeout = context.config.stop_timeout();
        Ok(Self {
            context,
            rooms: Mutex::new(RoomTable::default()),
            reports: Mutex::new(ReportQueue::spawn(reporter)?),
            stop_timeout,
        })
    }

    /// Start monitoring `room`: its network stream if one is configured,
    /// otherwise its local camera. A live or starting worker is left
    /// untouched. The source is opened without holding the room table.
    pub fn start(&self, room: &Room) -> Result<StartOutcome, VisionError> {
        {
            let mut rooms = self.rooms.lock();
            let live = rooms.workers.get(&room.id).map_or(false, |worker| worker.is_running());
            if live || rooms.starting.contains(&room.id) {
                info!(room_id = %room.id, "Worker already running, ignoring start");
                return Ok(StartOutcome::AlreadyRunning);
            }
            rooms.starting.insert(room.id.clone());
        }

        let mut spec = WorkerSpec::new(room.id.clone(), room.capture_source()).with_devices(room.devices);
        if let Some(sender) = self.reports.lock().sender() {
            let callback: TransitionCallback = Arc::new(move |transition: &OccupancyTransition| {
                let _ = sender.send(transition.clone());
            });
            spec = spec.with_callback(callback);
        }

        let started = RoomStreamWorker::start(&self.context, spec);
        let mut rooms = self.rooms.lock();
        rooms.starting.remove(&room.id);
        // A finished worker left behind has already released its source
        rooms.workers.insert(room.id.clone(), Arc::new(started?));
        drop(rooms);
        info!(room_id = %room.id, source = %room.capture_source(), "Room monitoring started");
        Ok(StartOutcome::Started)
    }

    /// Stop the room's worker, waiting a bounded time for it to exit.
    /// The handle is forgotten even when the join times out.
    pub fn stop(&self, room_id: &str) -> bool {
        let Some(worker) = self.rooms.lock().workers.remove(room_id) else {
            return false;
        };
        match worker.stop_with_timeout(self.stop_timeout) {
            Ok(()) => info!(room_id = %room_id, "Room monitoring stopped"),
            Err(e) => warn!(room_id = %room_id, "{}", e),
        }
        true
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<RoomStreamWorker>> {
        self.rooms.lock().workers.get(room_id).cloned()
    }

    pub fn is_running(&self, room_id: &str) -> bool {
        self.get(room_id).map_or(false, |worker| worker.is_running())
    }

    pub fn stop_all(&self) {
        let workers: Vec<(String, Arc<RoomStreamWorker>)> = self.rooms.lock().workers.drain().collect();
        for (room_id, worker) in workers {
            if let Err(e) = worker.stop_with_timeout(self.stop_timeout) {
                warn!(room_id = %room_id, "{}", e);
            }
        }
        self.reports.lock().shutdown(self.stop_timeout);
        info!("All orchestrator workers stopped");
    }
}
