//! # dss-protocol
//!
//! Shared vocabulary for the dss-scene engine.
//!
//! A digitalSTROM installation is organised as an apartment containing zones
//! (rooms), each zone containing groups (colors: light, shade, audio, ...).
//! Scenes are addressed by a `(zone, group, scene)` triple and devices by
//! their dSID.
//!
//! ```rust
//! use dss_protocol::{EventKind, SceneEvent, SceneId, SceneNumber, ZoneId, GroupId};
//!
//! let id = SceneId::from_parts(ZoneId::new(3), GroupId::new(1), SceneNumber::new(5));
//! assert_eq!(id.as_str(), "3-1-5");
//!
//! let event = SceneEvent::zone(ZoneId::new(3), GroupId::new(1), SceneNumber::new(5), EventKind::Call);
//! assert_eq!(event.scene_id(), Some(id));
//! ```

pub mod code_table;
pub mod command;
pub mod error;
pub mod event;
pub mod ids;

pub use code_table::{CodeTable, ConnectionStatusFlag};
pub use command::SceneCommand;
pub use error::ParseIdError;
pub use event::{EventKind, EventSource, SceneEvent};
pub use ids::{DeviceId, GroupId, SceneId, SceneNumber, ZoneId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::code_table::{CodeTable, ConnectionStatusFlag};
    pub use crate::command::SceneCommand;
    pub use crate::event::{EventKind, EventSource, SceneEvent};
    pub use crate::ids::{DeviceId, GroupId, SceneId, SceneNumber, ZoneId};
}
