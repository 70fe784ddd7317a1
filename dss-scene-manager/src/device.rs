//! Devices and the device registry collaborator
//!
//! Devices are owned by whatever keeps the installation's device list; the
//! scene manager only resolves them by id and records which scenes ran.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use dss_protocol::{DeviceId, SceneCommand, SceneNumber};

/// How many previously applied scenes a device remembers for undo
const HISTORY_LIMIT: usize = 16;

#[derive(Debug, Default)]
struct DeviceState {
    last_scene: Option<SceneNumber>,
    history: Vec<SceneNumber>,
    last_command: Option<SceneCommand>,
    output: Option<u16>,
}

/// A device as seen by the scene manager
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    name: Option<String>,
    state: Mutex<DeviceState>,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn last_scene(&self) -> Option<SceneNumber> {
        self.state.lock().last_scene
    }

    pub fn last_command(&self) -> Option<SceneCommand> {
        self.state.lock().last_command.clone()
    }

    pub fn output(&self) -> Option<u16> {
        self.state.lock().output
    }

    /// Record that `scene` now applies to this device
    pub fn apply_scene(&self, scene: SceneNumber, output: Option<u16>) {
        let mut state = self.state.lock();
        if let Some(previous) = state.last_scene.replace(scene) {
            if state.history.len() == HISTORY_LIMIT {
                state.history.remove(0);
            }
            state.history.push(previous);
        }
        if output.is_some() {
            state.output = output;
        }
    }

    /// Revert the last applied scene
    ///
    /// Returns the scene that was undone, or `None` when nothing was applied.
    pub fn undo_scene(&self) -> Option<SceneNumber> {
        let mut state = self.state.lock();
        let undone = state.last_scene.take()?;
        state.last_scene = state.history.pop();
        Some(undone)
    }

    pub(crate) fn record_command(&self, command: SceneCommand) {
        self.state.lock().last_command = Some(command);
    }
}

/// Resolves device ids to live devices
#[cfg_attr(test, mockall::automock)]
pub trait DeviceRegistry: Send + Sync {
    fn resolve_device(&self, id: &DeviceId) -> Option<Arc<Device>>;
}

/// Device registry backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    devices: DashMap<DeviceId, Arc<Device>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device, returning the shared handle
    pub fn insert(&self, device: Device) -> Arc<Device> {
        let device = Arc::new(device);
        self.devices.insert(device.id().clone(), Arc::clone(&device));
        device
    }

    pub fn remove(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.remove(id).map(|(_, device)| device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn resolve_device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id).map(|entry| Arc::clone(entry.value()))
    }
}
