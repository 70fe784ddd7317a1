//! Listener traits and identifiers
//!
//! Listeners are called from their own dispatch thread, never from the
//! thread that triggered the change.

use serde::{Deserialize, Serialize};
use std::fmt;

use dss_protocol::{DeviceId, SceneEvent, SceneId};

use crate::discovery::DiscoveryStatus;
use crate::scene::SceneSnapshot;

/// Which scene notifications a [`SceneStatusListener`] wants
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SceneListenerId {
    /// Discovery observer: receives added/removed scenes and phase status
    Discovery,
    /// State changes of one scene
    Scene(SceneId),
}

/// Observer of scene state, or of discovery when registered as
/// [`SceneListenerId::Discovery`]
pub trait SceneStatusListener: Send + Sync + 'static {
    fn listener_id(&self) -> SceneListenerId;

    fn on_scene_state_changed(&self, _scene: &SceneSnapshot, _active: bool) {}

    fn on_scene_removed(&self, _scene: &SceneSnapshot) {}

    /// Discovery observers only
    fn on_scene_added(&self, _scene: &SceneSnapshot) {}

    /// Discovery observers only
    fn on_discovery_status(&self, _status: &DiscoveryStatus) {}
}

/// Observer of external scene calls on one device
pub trait DeviceSceneListener: Send + Sync + 'static {
    fn device_id(&self) -> DeviceId;

    fn on_device_scene(&self, event: &SceneEvent);
}

/// Which manager a status report comes from
///
/// Only the scene manager lives in this crate; other managers of an
/// installation report under their own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ManagerType {
    SceneManager,
}

impl fmt::Display for ManagerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerType::SceneManager => f.write_str("scene manager"),
        }
    }
}

/// Lifecycle state of the scene manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The event intake failed; `start()` is required to recover
    Error,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Stopped => "stopped",
            ManagerState::Starting => "starting",
            ManagerState::Running => "running",
            ManagerState::Stopping => "stopping",
            ManagerState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Observer of manager lifecycle transitions
pub trait ManagerStatusListener: Send + Sync + 'static {
    fn on_status_changed(&self, state: ManagerState);
}

/// Handle returned by listener registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
