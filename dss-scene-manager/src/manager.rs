//! Sync-first facade over the scene engine
//!
//! [`SceneManager`] wires the registry, echo suppressor, listener hub,
//! discovery coordinator and activation engine together and runs the intake
//! worker between `start()` and `stop()`.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use dss_protocol::{DeviceId, EventKind, GroupId, SceneId, SceneNumber, ZoneId};

use crate::activation::{CallOutcome, SceneActivationEngine};
use crate::config::SceneManagerConfig;
use crate::device::{Device, DeviceRegistry};
use crate::discovery::{DiscoveryStatus, SceneDiscoveryCoordinator, SceneSource};
use crate::echo::{EchoKey, EchoSuppressor};
use crate::error::{Result, SceneManagerError};
use crate::hub::{ListenerHub, SceneNotification};
use crate::listener::{
    DeviceSceneListener, ManagerState, ManagerStatusListener, ManagerType, RegistrationId,
    SceneListenerId, SceneStatusListener,
};
use crate::registry::SceneRegistry;
use crate::scene::{ActivationState, Scene};
use crate::transport::{EventTransport, TransportError};
use crate::worker::{spawn_intake_worker, IntakeCommand, IntakeContext};

struct IntakeHandle {
    command_tx: mpsc::Sender<IntakeCommand>,
    handle: JoinHandle<()>,
}

impl IntakeHandle {
    fn shutdown(self) {
        let _ = self.command_tx.send(IntakeCommand::Shutdown);
        if self.handle.join().is_err() {
            tracing::warn!("Intake worker panicked");
        }
    }
}

/// Coordinates scenes, echoes, discovery and listeners for one installation
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dss_scene_manager::prelude::*;
///
/// # fn main() -> dss_scene_manager::Result<()> {
/// let transport = Arc::new(LoopbackTransport::with_echo());
/// let manager = SceneManager::new(
///     SceneManagerConfig::default(),
///     transport,
///     Arc::new(InMemoryDeviceRegistry::new()),
///     Arc::new(StaticSceneSource::new()),
/// )?;
///
/// manager.start()?;
/// let outcome = manager.call_scene(Scene::new(ZoneId::new(3), GroupId::new(1), SceneNumber::new(5)));
/// assert_eq!(outcome, CallOutcome::Activated);
/// manager.stop();
/// # Ok(())
/// # }
/// ```
pub struct SceneManager {
    config: SceneManagerConfig,
    registry: Arc<SceneRegistry>,
    echo: Arc<EchoSuppressor>,
    hub: Arc<ListenerHub>,
    engine: Arc<SceneActivationEngine>,
    discovery: SceneDiscoveryCoordinator,
    transport: Arc<dyn EventTransport>,
    intake: Mutex<Option<IntakeHandle>>,
    /// Serializes start and stop
    lifecycle: Mutex<()>,
}

impl SceneManager {
    pub fn new(
        config: SceneManagerConfig,
        transport: Arc<dyn EventTransport>,
        devices: Arc<dyn DeviceRegistry>,
        source: Arc<dyn SceneSource>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SceneRegistry::new());
        let echo = Arc::new(EchoSuppressor::new(config.echo_ttl));
        let hub = Arc::new(ListenerHub::new(config.listener_queue_capacity));
        let engine = Arc::new(SceneActivationEngine::new(
            Arc::clone(&registry),
            Arc::clone(&echo),
            Arc::clone(&hub),
            devices,
            Arc::clone(&transport),
        ));
        let discovery = SceneDiscoveryCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            source,
            config.discovery_phase_timeout,
        );

        Ok(Self {
            config,
            registry,
            echo,
            hub,
            engine,
            discovery,
            transport,
            intake: Mutex::new(None),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SceneManagerConfig {
        &self.config
    }

    // Lifecycle

    /// Start the event intake
    ///
    /// Does nothing when already running. Recovers from the error state by
    /// restarting the transport.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if matches!(self.hub.state(), ManagerState::Running | ManagerState::Starting) {
            return Ok(());
        }

        // A worker left over from a transport fault
        if let Some(stale) = self.intake.lock().take() {
            stale.shutdown();
        }

        self.hub.set_state(ManagerState::Starting);
        let messages = match self.transport.start() {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!("Failed to start event transport: {}", e);
                self.hub.set_state(ManagerState::Error);
                return Err(e.into());
            }
        };

        let (command_tx, command_rx) = mpsc::channel();
        let context = IntakeContext {
            engine: Arc::clone(&self.engine),
            echo: Arc::clone(&self.echo),
            hub: Arc::clone(&self.hub),
            sweep_interval: self.config.sweep_interval,
        };
        let handle = match spawn_intake_worker(context, messages, command_rx) {
            Ok(handle) => handle,
            Err(source) => {
                self.transport.stop();
                self.hub.set_state(ManagerState::Error);
                return Err(SceneManagerError::WorkerSpawn {
                    name: "dss-intake".to_string(),
                    source,
                });
            }
        };
        *self.intake.lock() = Some(IntakeHandle { command_tx, handle });

        if !self
            .hub
            .transition(&[ManagerState::Starting], ManagerState::Running)
        {
            // The stream failed before startup completed
            return Err(TransportError::NotRunning.into());
        }

        if self.config.generate_scenes_on_start {
            self.discovery.generate_scenes();
        }
        Ok(())
    }

    /// Stop the event intake and cancel a running discovery
    ///
    /// Discovery runs even without a started intake, so it is cancelled on
    /// every call. Otherwise calling `stop` on a stopped manager has no
    /// effect.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.hub.state() == ManagerState::Stopped {
            self.discovery.cancel();
            return;
        }

        self.hub.set_state(ManagerState::Stopping);
        self.discovery.cancel();

        let intake = self.intake.lock().take();
        if let Some(intake) = &intake {
            let _ = intake.command_tx.send(IntakeCommand::Shutdown);
        }
        self.transport.stop();
        if let Some(intake) = intake {
            intake.shutdown();
        }

        self.hub.set_state(ManagerState::Stopped);
    }

    pub fn manager_state(&self) -> ManagerState {
        self.hub.state()
    }

    pub const fn manager_type(&self) -> ManagerType {
        ManagerType::SceneManager
    }

    // Scene calls

    /// Call a scene, announcing it to discovery observers if it is new
    pub fn call_scene(&self, scene: Scene) -> CallOutcome {
        self.engine.call_scene(scene, true)
    }

    /// Call a scene by id; unknown ids are registered as not callable
    pub fn call_scene_by_id(&self, id: &SceneId) -> CallOutcome {
        self.engine.call_scene_by_id(id)
    }

    /// Call a zone/group scene without announcing a new scene to discovery
    pub fn call_scene_without_discovery(&self, zone: ZoneId, group: GroupId, scene: SceneNumber) -> CallOutcome {
        self.engine.call_scene(Scene::new(zone, group, scene), false)
    }

    pub fn undo_scene(&self, scene: Scene) -> CallOutcome {
        self.engine.undo_scene(scene)
    }

    pub fn undo_scene_by_id(&self, id: &SceneId) -> CallOutcome {
        self.engine.undo_scene_by_id(id)
    }

    pub fn call_device_scene(&self, device: &DeviceId, scene: SceneNumber) -> CallOutcome {
        self.engine.call_device_scene(device, scene)
    }

    pub fn call_device_scene_on(&self, device: &Arc<Device>, scene: SceneNumber) -> CallOutcome {
        self.engine.call_device_scene_on(device, scene)
    }

    pub fn undo_device_scene(&self, device: &DeviceId) -> CallOutcome {
        self.engine.undo_device_scene(device)
    }

    pub fn undo_device_scene_on(&self, device: &Arc<Device>) -> CallOutcome {
        self.engine.undo_device_scene_on(device)
    }

    // Registry

    /// Add a callable scene
    ///
    /// Returns `false` for a scene that is not callable. Discovery observers
    /// are told about scenes that became callable.
    pub fn add_scene(&self, scene: Scene) -> bool {
        let admission = self.registry.add(scene);
        if admission.is_new_callable() {
            if let Some(scene) = admission.scene() {
                self.hub.notify_scene_added(&scene.snapshot());
            }
        }
        admission.scene().is_some()
    }

    /// Remove a scene and tell its listeners and discovery observers
    pub fn remove_scene(&self, id: &SceneId) -> Option<Arc<Scene>> {
        let removed = self.registry.remove(id)?;
        tracing::debug!("Removed scene {}", id);
        self.hub.notify_scene_removed(&removed.snapshot());
        Some(removed)
    }

    pub fn scene(&self, id: &SceneId) -> Option<Arc<Scene>> {
        self.registry.find(id)
    }

    /// All known scenes, sorted by id
    pub fn scenes(&self) -> Vec<Arc<Scene>> {
        self.registry.list()
    }

    // Echoes

    /// Expect the bus to report `scene` being called on `device`
    pub fn add_echo_for_device(&self, device: &DeviceId, scene: SceneNumber) {
        self.echo
            .expect(EchoKey::device(device.clone(), scene, EventKind::Call));
    }

    /// Expect the bus to report the scene `id` being called
    pub fn add_echo_for_scene(&self, id: &SceneId) {
        self.echo.expect(EchoKey::scene(id.clone(), EventKind::Call));
    }

    pub fn pending_echoes(&self) -> usize {
        self.echo.pending()
    }

    // Listeners

    /// Register a scene listener or discovery observer
    ///
    /// A scene listener for an unknown id creates that scene. Listeners are
    /// first told the current state: the scene's activation state when
    /// known, or for discovery observers every callable scene followed by
    /// the discovery status.
    pub fn register_scene_listener(&self, listener: Arc<dyn SceneStatusListener>) -> Result<RegistrationId> {
        let replay = || match listener.listener_id() {
            SceneListenerId::Scene(id) => {
                let scene = self.registry.get(&id);
                match scene.state() {
                    ActivationState::Unknown => Vec::new(),
                    state => vec![SceneNotification::StateChanged(
                        scene.snapshot(),
                        state == ActivationState::Active,
                    )],
                }
            }
            SceneListenerId::Discovery => {
                let mut initial: Vec<_> = self
                    .registry
                    .list()
                    .iter()
                    .filter(|scene| scene.is_callable())
                    .map(|scene| SceneNotification::Added(scene.snapshot()))
                    .collect();
                initial.push(SceneNotification::Discovery(self.discovery.status()));
                initial
            }
        };
        self.hub.register_scene_listener(Arc::clone(&listener), replay)
    }

    pub fn unregister_scene_listener(&self, id: RegistrationId) -> bool {
        self.hub.unregister(id)
    }

    pub fn register_device_listener(&self, listener: Arc<dyn DeviceSceneListener>) -> Result<RegistrationId> {
        self.hub.register_device_listener(listener)
    }

    pub fn unregister_device_listener(&self, id: RegistrationId) -> bool {
        self.hub.unregister(id)
    }

    pub fn register_status_listener(&self, listener: Arc<dyn ManagerStatusListener>) -> Result<()> {
        self.hub.register_status_listener(listener)
    }

    pub fn unregister_status_listener(&self) -> bool {
        self.hub.unregister_status_listener()
    }

    pub fn is_discovery_registered(&self) -> bool {
        self.hub.is_discovery_registered()
    }

    // Discovery

    /// Run discovery for every phase that has not succeeded yet
    ///
    /// Returns `false` when a run is already in progress.
    pub fn generate_scenes(&self) -> bool {
        self.discovery.generate_scenes()
    }

    pub fn scenes_generated(&self) -> bool {
        self.discovery.scenes_generated()
    }

    pub fn discovery_status(&self) -> DiscoveryStatus {
        self.discovery.status()
    }

    /// Apply a status vector reported from outside, e.g. restored state
    pub fn report_discovery_status(&self, vector: [char; 4]) -> DiscoveryStatus {
        self.discovery.report_status(vector)
    }
}

impl Drop for SceneManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneManager")
            .field("state", &self.hub.state())
            .field("scenes", &self.registry.len())
            .field("discovery", &self.discovery.status())
            .finish()
    }
}
