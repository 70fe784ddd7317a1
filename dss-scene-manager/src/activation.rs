//! Scene activation
//!
//! Local calls register the echo they will cause, dispatch a command through
//! the transport and update scene and device state. External events take the
//! other direction: after the echo check they update state and notify
//! listeners.

use std::fmt;
use std::sync::Arc;

use dss_protocol::{DeviceId, EventKind, EventSource, SceneCommand, SceneEvent, SceneId, SceneNumber};

use crate::device::{Device, DeviceRegistry};
use crate::echo::{EchoKey, EchoSuppressor};
use crate::hub::ListenerHub;
use crate::registry::{Admission, SceneRegistry};
use crate::scene::Scene;
use crate::transport::EventTransport;

/// Result of a local scene or device call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The scene is now active
    Activated,
    /// The scene is now inactive
    Deactivated,
    /// The device ran the scene
    DeviceCalled(SceneNumber),
    /// The device reverted this scene
    DeviceUndone(SceneNumber),
    /// The scene has not been confirmed by discovery
    NotCallable,
    /// The device is unknown to the device registry
    NotFound,
    /// The device has no scene to undo
    NoPriorScene,
    /// The transport refused the command; nothing changed
    DispatchFailed,
}

impl CallOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            CallOutcome::Activated
                | CallOutcome::Deactivated
                | CallOutcome::DeviceCalled(_)
                | CallOutcome::DeviceUndone(_)
        )
    }
}

/// Result of handling an external event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The event was the echo of a local command
    Suppressed,
    Applied,
    /// The event referred to something unknown
    Dropped,
}

/// Applies scene calls, undos and external scene events
pub struct SceneActivationEngine {
    registry: Arc<SceneRegistry>,
    echo: Arc<EchoSuppressor>,
    hub: Arc<ListenerHub>,
    devices: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn EventTransport>,
}

impl SceneActivationEngine {
    pub fn new(
        registry: Arc<SceneRegistry>,
        echo: Arc<EchoSuppressor>,
        hub: Arc<ListenerHub>,
        devices: Arc<dyn DeviceRegistry>,
        transport: Arc<dyn EventTransport>,
    ) -> Self {
        Self {
            registry,
            echo,
            hub,
            devices,
            transport,
        }
    }

    /// Call a scene, registering it first if it is not known yet
    ///
    /// With `report_new` a newly registered callable scene is announced to
    /// discovery observers.
    pub fn call_scene(&self, scene: Scene, report_new: bool) -> CallOutcome {
        let scene = self.admit(scene, report_new);
        self.activate(&scene)
    }

    pub fn call_scene_by_id(&self, id: &SceneId) -> CallOutcome {
        let scene = self.registry.get(id);
        self.activate(&scene)
    }

    pub fn undo_scene(&self, scene: Scene) -> CallOutcome {
        let scene = self.admit(scene, true);
        self.deactivate(&scene)
    }

    pub fn undo_scene_by_id(&self, id: &SceneId) -> CallOutcome {
        let scene = self.registry.get(id);
        self.deactivate(&scene)
    }

    /// Register `scene`, or update the registered instance when `scene` is
    /// callable and the registered one is not
    fn admit(&self, scene: Scene, report_new: bool) -> Arc<Scene> {
        if !scene.is_callable() {
            return self.registry.get_or_insert(scene).0;
        }

        let id = scene.id().clone();
        let admission = self.registry.add(scene);
        if report_new && admission.is_new_callable() {
            if let Some(scene) = admission.scene() {
                self.hub.notify_scene_added(&scene.snapshot());
            }
        }
        match admission {
            Admission::Inserted(scene) | Admission::Updated { scene, .. } => scene,
            Admission::Rejected => self.registry.get(&id),
        }
    }

    fn activate(&self, scene: &Arc<Scene>) -> CallOutcome {
        let Some(target) = scene.target().filter(|_| scene.is_callable()) else {
            tracing::debug!("Scene {} is not callable", scene.id());
            return CallOutcome::NotCallable;
        };

        let command = SceneCommand::CallScene {
            zone: target.zone,
            group: target.group,
            scene: target.scene,
        };
        let deltas = scene.deltas();
        let mut keys = vec![EchoKey::for_command(&command)];
        keys.extend(
            deltas
                .iter()
                .map(|delta| EchoKey::device(delta.device.clone(), target.scene, EventKind::Call)),
        );
        if !self.dispatch(&command, &keys) {
            return CallOutcome::DispatchFailed;
        }

        self.apply_activation(scene);
        for delta in &deltas {
            match self.devices.resolve_device(&delta.device) {
                Some(device) => {
                    device.apply_scene(target.scene, delta.output);
                    device.record_command(command.clone());
                }
                None => tracing::debug!("Scene {} affects unknown device {}", scene.id(), delta.device),
            }
        }
        tracing::debug!("Activated scene {}", scene.id());
        CallOutcome::Activated
    }

    fn deactivate(&self, scene: &Arc<Scene>) -> CallOutcome {
        let Some(target) = scene.target().filter(|_| scene.is_callable()) else {
            tracing::debug!("Scene {} is not callable", scene.id());
            return CallOutcome::NotCallable;
        };

        let command = SceneCommand::UndoScene {
            zone: target.zone,
            group: target.group,
            scene: target.scene,
        };
        let deltas = scene.deltas();
        let mut keys = vec![EchoKey::for_command(&command)];
        keys.extend(
            deltas
                .iter()
                .map(|delta| EchoKey::device(delta.device.clone(), target.scene, EventKind::Undo)),
        );
        if !self.dispatch(&command, &keys) {
            return CallOutcome::DispatchFailed;
        }

        self.apply_undo(scene);
        for delta in &deltas {
            if let Some(device) = self.devices.resolve_device(&delta.device) {
                if device.last_scene() == Some(target.scene) {
                    device.undo_scene();
                }
                device.record_command(command.clone());
            }
        }
        tracing::debug!("Deactivated scene {}", scene.id());
        CallOutcome::Deactivated
    }

    /// Mark `scene` active and every other active scene on its zone/group
    /// inactive, notifying scene listeners of each change
    fn apply_activation(&self, scene: &Arc<Scene>) {
        if scene.activate() {
            self.hub.notify_scene_state(&scene.snapshot(), true);
        }
        let (Some(zone), Some(group)) = (scene.zone(), scene.group()) else {
            return;
        };
        for other in self.registry.scenes_in(zone, group) {
            if Arc::ptr_eq(&other, scene) {
                continue;
            }
            if other.is_active() && other.deactivate() {
                self.hub.notify_scene_state(&other.snapshot(), false);
            }
        }
    }

    /// Return `scene` to its state before the last activation
    fn apply_undo(&self, scene: &Arc<Scene>) {
        if scene.revert() {
            self.hub.notify_scene_state(&scene.snapshot(), false);
        }
    }

    pub fn call_device_scene(&self, device: &DeviceId, scene: SceneNumber) -> CallOutcome {
        match self.devices.resolve_device(device) {
            Some(device) => self.call_device_scene_on(&device, scene),
            None => {
                tracing::warn!("Cannot call scene {} on unknown device {}", scene, device);
                CallOutcome::NotFound
            }
        }
    }

    pub fn call_device_scene_on(&self, device: &Arc<Device>, scene: SceneNumber) -> CallOutcome {
        let command = SceneCommand::CallDeviceScene {
            device: device.id().clone(),
            scene,
        };
        if !self.dispatch(&command, &[EchoKey::for_command(&command)]) {
            return CallOutcome::DispatchFailed;
        }
        device.apply_scene(scene, None);
        device.record_command(command);
        tracing::debug!("Called scene {} on device {}", scene, device.id());
        CallOutcome::DeviceCalled(scene)
    }

    pub fn undo_device_scene(&self, device: &DeviceId) -> CallOutcome {
        match self.devices.resolve_device(device) {
            Some(device) => self.undo_device_scene_on(&device),
            None => {
                tracing::warn!("Cannot undo scene on unknown device {}", device);
                CallOutcome::NotFound
            }
        }
    }

    pub fn undo_device_scene_on(&self, device: &Arc<Device>) -> CallOutcome {
        let Some(scene) = device.last_scene() else {
            tracing::debug!("Device {} has no scene to undo", device.id());
            return CallOutcome::NoPriorScene;
        };
        let command = SceneCommand::UndoDeviceScene {
            device: device.id().clone(),
            scene,
        };
        if !self.dispatch(&command, &[EchoKey::for_command(&command)]) {
            return CallOutcome::DispatchFailed;
        }
        device.undo_scene();
        device.record_command(command);
        tracing::debug!("Undid scene {} on device {}", scene, device.id());
        CallOutcome::DeviceUndone(scene)
    }

    /// Register the expected echoes, then issue `command`
    ///
    /// On failure the expectations are revoked again.
    fn dispatch(&self, command: &SceneCommand, keys: &[EchoKey]) -> bool {
        for key in keys {
            self.echo.expect(key.clone());
        }
        match self.transport.issue_command(command) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to issue {}: {}", command, e);
                for key in keys {
                    self.echo.revoke(key);
                }
                false
            }
        }
    }

    /// Process an event from the bus
    pub fn handle_event(&self, event: &SceneEvent) -> EventOutcome {
        if self.echo.check(&EchoKey::for_event(event)) {
            tracing::trace!("Suppressed echo {}", event);
            return EventOutcome::Suppressed;
        }

        match &event.source {
            EventSource::Device(device_id) => self.handle_device_event(device_id, event),
            EventSource::Zone { zone, group } => {
                let id = SceneId::from_parts(*zone, *group, event.scene);
                match event.kind {
                    EventKind::Call => {
                        if !event.scene.is_valid() {
                            tracing::debug!("Dropping call of uncallable scene {}", id);
                            return EventOutcome::Dropped;
                        }
                        let scene = self.admit(Scene::new(*zone, *group, event.scene), true);
                        self.apply_activation(&scene);
                        EventOutcome::Applied
                    }
                    EventKind::Undo => match self.registry.find(&id) {
                        Some(scene) => {
                            self.apply_undo(&scene);
                            EventOutcome::Applied
                        }
                        None => {
                            tracing::debug!("Undo for unknown scene {}", id);
                            EventOutcome::Dropped
                        }
                    },
                }
            }
        }
    }

    fn handle_device_event(&self, device_id: &DeviceId, event: &SceneEvent) -> EventOutcome {
        let Some(device) = self.devices.resolve_device(device_id) else {
            tracing::debug!("Event for unknown device {}", device_id);
            return EventOutcome::Dropped;
        };
        match event.kind {
            EventKind::Call => device.apply_scene(event.scene, None),
            EventKind::Undo => {
                if device.last_scene() == Some(event.scene) {
                    device.undo_scene();
                }
            }
        }
        self.hub.notify_device_scene(event);
        EventOutcome::Applied
    }
}

impl fmt::Debug for SceneActivationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneActivationEngine")
            .field("scenes", &self.registry.len())
            .field("pending_echoes", &self.echo.pending())
            .finish()
    }
}
