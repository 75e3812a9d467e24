//! Typed room model and the in-memory room table owned by the control layer

use crate::config::RoomDefinition;
use crate::energy::apply_energy_policy;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Light and AC switch state of a room
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub light: bool,
    pub ac: bool,
}

/// Where a room's video comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoomSource {
    #[default]
    None,
    LocalCamera { index: i32 },
    NetworkStream { url: String },
}

impl RoomSource {
    pub fn stream_url(&self) -> Option<&str> {
        match self {
            RoomSource::NetworkStream { url } => Some(url.as_str()),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RoomSource::NetworkStream { .. })
    }
}

impl std::fmt::Display for RoomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomSource::None => write!(f, "none"),
            RoomSource::LocalCamera { index } => write!(f, "camera:{}", index),
            // credentials may be embedded in the URL
            RoomSource::NetworkStream { url } => write!(f, "stream:{}", redact_credentials(url)),
        }
    }
}

fn redact_credentials(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

/// CCTV camera login used to build an RTSP URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CctvCredentials {
    pub ip: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    "0".to_string()
}

impl CctvCredentials {
    pub fn rtsp_url(&self) -> String {
        format!(
            "rtsp://{}:{}@{}:554/Streaming/Channels/{}",
            self.username, self.password, self.ip, self.channel
        )
    }
}

/// A monitored room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub occupied: bool,
    pub devices: DeviceState,
    pub source: RoomSource,
    /// Local camera used when the room has no network stream
    pub camera_index: i32,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            occupied: false,
            devices: DeviceState::default(),
            source: RoomSource::None,
            camera_index: 0,
        }
    }

    /// Source a worker for this room should capture from: the configured
    /// network stream, otherwise the room's local camera.
    pub fn capture_source(&self) -> RoomSource {
        match &self.source {
            RoomSource::NetworkStream { url } => RoomSource::NetworkStream { url: url.clone() },
            _ => RoomSource::LocalCamera {
                index: self.camera_index,
            },
        }
    }
}

impl From<&RoomDefinition> for Room {
    fn from(def: &RoomDefinition) -> Self {
        let source = match def.stream_url.as_deref() {
            Some(url) if !url.is_empty() => RoomSource::NetworkStream {
                url: url.to_string(),
            },
            _ => RoomSource::None,
        };
        Self {
            id: def.id.clone(),
            occupied: false,
            devices: DeviceState::default(),
            source,
            camera_index: def.camera_index,
        }
    }
}

/// Process-local table of room state, keyed by room id
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: RwLock<BTreeMap<String, Room>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(definitions: &[RoomDefinition]) -> Self {
        let rooms = definitions
            .iter()
            .map(|def| (def.id.clone(), Room::from(def)))
            .collect();
        Self {
            rooms: RwLock::new(rooms),
        }
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.read().contains_key(room_id)
    }

    pub fn get(&self, room_id: &str) -> Result<Room> {
        self.rooms
            .read()
            .get(room_id)
            .cloned()
            .ok_or_else(|| Error::UnknownRoom(room_id.to_string()))
    }

    /// All rooms, ordered by id
    pub fn snapshot(&self) -> Vec<Room> {
        self.rooms.read().values().cloned().collect()
    }

    /// Insert a fresh room if `room_id` is not present yet
    pub fn ensure_room(&self, room_id: &str) -> Room {
        self.rooms
            .write()
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id))
            .clone()
    }

    /// Record an occupancy report and apply the energy policy
    pub fn update_occupancy(&self, room_id: &str, occupied: bool) -> Result<Room> {
        self.with_room(room_id, |room| {
            room.occupied = occupied;
            if apply_energy_policy(&mut room.devices, occupied) {
                info!(
                    room_id = %room.id,
                    light = room.devices.light,
                    ac = room.devices.ac,
                    "Energy policy applied"
                );
            }
        })
    }

    /// Record occupancy together with device state decided elsewhere
    pub fn apply_transition(&self, room_id: &str, occupied: bool, devices: DeviceState) -> Result<Room> {
        self.with_room(room_id, |room| {
            room.occupied = occupied;
            room.devices = devices;
        })
    }

    pub fn set_source(&self, room_id: &str, source: RoomSource) -> Result<Room> {
        self.with_room(room_id, |room| room.source = source)
    }

    fn with_room(&self, room_id: &str, f: impl FnOnce(&mut Room)) -> Result<Room> {
        let mut rooms = self.rooms.write();
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| Error::UnknownRoom(room_id.to_string()))?;
        f(room);
        Ok(room.clone())
    }
}
