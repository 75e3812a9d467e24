//! lumen-core: shared domain types for the lumen occupancy service
//!
//! Rooms, device state, the energy policy and service configuration live
//! here so the vision pipeline and the transport layer agree on one model.

pub mod error;
pub mod config;
pub mod energy;
pub mod room;

pub use error::{Error, Result};
pub use config::{LumenConfig, PipelineConfig, ServerConfig, ControlConfig, RoomDefinition};
pub use energy::apply_energy_policy;
pub use room::{CctvCredentials, DeviceState, Room, RoomSource, RoomTable};
