//! Occupancy reporting for the decoupled orchestrator

use crate::error::VisionError;
use crate::processing::OccupancyTransition;
use crossbeam::channel::{self, Receiver, Sender};
use lumen_core::{ControlConfig, RoomTable};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives occupancy transitions off the worker threads
pub trait OccupancyReporter: Send + Sync {
    fn report(&self, transition: &OccupancyTransition) -> Result<(), VisionError>;
}

#[derive(Debug, Serialize)]
struct OccupancyUpdate<'a> {
    room_id: &'a str,
    occupied: bool,
}

/// POSTs `{room_id, occupied}` to the control endpoint
pub struct HttpOccupancyReporter {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpOccupancyReporter {
    pub fn new(config: &ControlConfig) -> Result<Self, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.report_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.occupancy_url.clone(),
        })
    }
}

impl OccupancyReporter for HttpOccupancyReporter {
    fn report(&self, transition: &OccupancyTransition) -> Result<(), VisionError> {
        let body = OccupancyUpdate {
            room_id: &transition.room_id,
            occupied: transition.occupied,
        };
        let response = self.client.post(&self.url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(VisionError::Report(format!(
                "{} answered {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes transitions straight into the in-process room table
pub struct RoomTableReporter {
    rooms: Arc<RoomTable>,
}

impl RoomTableReporter {
    pub fn new(rooms: Arc<RoomTable>) -> Self {
        Self { rooms }
    }
}

impl OccupancyReporter for RoomTableReporter {
    fn report(&self, transition: &OccupancyTransition) -> Result<(), VisionError> {
        self.rooms
            .apply_transition(&transition.room_id, transition.occupied, transition.devices)?;
        Ok(())
    }
}

/// Dedicated thread draining transitions into a reporter, so worker
/// threads only pay for a channel send.
pub struct ReportQueue {
    sender: Option<Sender<OccupancyTransition>>,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl ReportQueue {
    pub fn spawn(reporter: Arc<dyn OccupancyReporter>) -> Result<Self, VisionError> {
        let (sender, receiver) = channel::unbounded::<OccupancyTransition>();
        let (done_tx, done) = channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name("lumen-reporter".to_string())
            .spawn(move || {
                for transition in receiver {
                    match reporter.report(&transition) {
                        Ok(()) => debug!(room_id = %transition.room_id, "Occupancy reported"),
                        Err(e) => warn!(
                            room_id = %transition.room_id,
                            occupied = transition.occupied,
                            "Occupancy report failed: {}",
                            e
                        ),
                    }
                }
                info!("Occupancy reporter stopped");
                let _ = done_tx.send(());
            })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            done,
        })
    }

    /// Sender handed to worker callbacks
    pub fn sender(&self) -> Option<Sender<OccupancyTransition>> {
        self.sender.clone()
    }

    /// Close the queue and wait up to `timeout` for queued reports to
    /// drain. Callbacks still holding a sender keep the thread alive until
    /// they drop it; in that case the thread is detached.
    pub fn shutdown(&mut self, timeout: Duration) {
        self.sender.take();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.done.recv_timeout(timeout).is_err() {
            warn!(?timeout, "Occupancy reporter still busy, detaching");
            return;
        }
        if handle.join().is_err() {
            warn!("Occupancy reporter thread panicked");
        }
    }
}

impl Drop for ReportQueue {
    fn drop(&mut self) {
        // Detach rather than block on workers that still hold senders
        self.sender.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lumen_core::{DeviceState, RoomDefinition};
    use parking_lot::Mutex;

    fn transition(room_id: &str, occupied: bool) -> OccupancyTransition {
        OccupancyTransition {
            room_id: room_id.to_string(),
            previous: Some(!occupied),
            occupied,
            person_count: usize::from(occupied),
            devices: DeviceState {
                light: occupied,
                ac: false,
            },
            timestamp: Utc::now(),
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, bool)>>);

    impl OccupancyReporter for Recording {
        fn report(&self, t: &OccupancyTransition) -> Result<(), VisionError> {
            self.0.lock().push((t.room_id.clone(), t.occupied));
            Ok(())
        }
    }

    #[test]
    fn test_queue_delivers_in_order() {
        let recording = Arc::new(Recording::default());
        let mut queue = ReportQueue::spawn(recording.clone()).unwrap();
        let sender = queue.sender().unwrap();
        sender.send(transition("Lab", true)).unwrap();
        sender.send(transition("Lab", false)).unwrap();
        drop(sender);
        queue.shutdown(Duration::from_secs(5));

        assert_eq!(
            *recording.0.lock(),
            vec![("Lab".to_string(), true), ("Lab".to_string(), false)]
        );
    }

    #[test]
    fn test_room_table_reporter() {
        let rooms = Arc::new(RoomTable::from_definitions(&[RoomDefinition::new("Lab")]));
        let reporter = RoomTableReporter::new(rooms.clone());

        reporter.report(&transition("Lab", true)).unwrap();
        let room = rooms.get("Lab").unwrap();
        assert!(room.occupied);
        assert!(room.devices.light);

        assert!(reporter.report(&transition("Attic", true)).is_err());
    }

    #[test]
    fn test_http_reporter_unreachable_endpoint() {
        let config = ControlConfig {
            occupancy_url: "http://127.0.0.1:9/api/occupancy".to_string(),
            report_timeout_ms: 200,
        };
        let reporter = HttpOccupancyReporter::new(&config).unwrap();
        assert!(matches!(
            reporter.report(&transition("Lab", true)),
            Err(VisionError::Report(_))
        ));
    }
}
