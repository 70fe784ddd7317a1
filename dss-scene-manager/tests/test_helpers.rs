//! Test helpers for integration testing.
//!
//! Recording listeners forward every callback into a channel so tests can
//! wait for notifications with a timeout.

#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use dss_scene_manager::{
    DeviceId, DeviceSceneListener, DiscoveryStatus, InMemoryDeviceRegistry, LoopbackTransport,
    ManagerState, ManagerStatusListener, SceneEvent, SceneId, SceneListenerId, SceneManager,
    SceneManagerConfig, SceneSnapshot, SceneStatusListener, StaticSceneSource,
};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// A scene listener callback, as recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    StateChanged { id: SceneId, active: bool },
    Added(SceneId),
    Removed(SceneId),
    Status(String),
}

pub struct RecordingSceneListener {
    id: SceneListenerId,
    tx: Mutex<mpsc::Sender<Recorded>>,
}

impl SceneStatusListener for RecordingSceneListener {
    fn listener_id(&self) -> SceneListenerId {
        self.id.clone()
    }

    fn on_scene_state_changed(&self, scene: &SceneSnapshot, active: bool) {
        let _ = self.tx.lock().send(Recorded::StateChanged {
            id: scene.id.clone(),
            active,
        });
    }

    fn on_scene_removed(&self, scene: &SceneSnapshot) {
        let _ = self.tx.lock().send(Recorded::Removed(scene.id.clone()));
    }

    fn on_scene_added(&self, scene: &SceneSnapshot) {
        let _ = self.tx.lock().send(Recorded::Added(scene.id.clone()));
    }

    fn on_discovery_status(&self, status: &DiscoveryStatus) {
        let _ = self.tx.lock().send(Recorded::Status(status.to_string()));
    }
}

/// Helper function to create a recording scene or discovery listener.
pub fn scene_listener(id: SceneListenerId) -> (Arc<RecordingSceneListener>, mpsc::Receiver<Recorded>) {
    let (tx, rx) = mpsc::channel();
    let listener = Arc::new(RecordingSceneListener {
        id,
        tx: Mutex::new(tx),
    });
    (listener, rx)
}

pub struct RecordingDeviceListener {
    device: DeviceId,
    tx: Mutex<mpsc::Sender<SceneEvent>>,
}

impl DeviceSceneListener for RecordingDeviceListener {
    fn device_id(&self) -> DeviceId {
        self.device.clone()
    }

    fn on_device_scene(&self, event: &SceneEvent) {
        let _ = self.tx.lock().send(event.clone());
    }
}

pub fn device_listener(device: &str) -> (Arc<RecordingDeviceListener>, mpsc::Receiver<SceneEvent>) {
    let (tx, rx) = mpsc::channel();
    let listener = Arc::new(RecordingDeviceListener {
        device: DeviceId::new(device),
        tx: Mutex::new(tx),
    });
    (listener, rx)
}

pub struct RecordingStatusListener {
    tx: Mutex<mpsc::Sender<ManagerState>>,
}

impl ManagerStatusListener for RecordingStatusListener {
    fn on_status_changed(&self, state: ManagerState) {
        let _ = self.tx.lock().send(state);
    }
}

pub fn status_listener() -> (Arc<RecordingStatusListener>, mpsc::Receiver<ManagerState>) {
    let (tx, rx) = mpsc::channel();
    (Arc::new(RecordingStatusListener { tx: Mutex::new(tx) }), rx)
}

/// A manager wired to in-memory collaborators
pub struct TestRig {
    pub manager: SceneManager,
    pub transport: Arc<LoopbackTransport>,
    pub devices: Arc<InMemoryDeviceRegistry>,
    pub source: Arc<StaticSceneSource>,
}

pub fn rig_with(transport: LoopbackTransport, source: StaticSceneSource) -> TestRig {
    let transport = Arc::new(transport);
    let devices = Arc::new(InMemoryDeviceRegistry::new());
    let source = Arc::new(source);
    let manager = SceneManager::new(
        SceneManagerConfig::fast(),
        Arc::clone(&transport) as _,
        Arc::clone(&devices) as _,
        Arc::clone(&source) as _,
    )
    .expect("Failed to create scene manager");
    TestRig {
        manager,
        transport,
        devices,
        source,
    }
}

pub fn rig() -> TestRig {
    rig_with(LoopbackTransport::new(), StaticSceneSource::new())
}

/// Wait for the next notification matching `predicate`, skipping others.
pub fn recv_matching<T>(rx: &mpsc::Receiver<T>, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
    let deadline = Instant::now() + RECV_TIMEOUT;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(item) if predicate(&item) => return Some(item),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Assert that nothing arrives for a short while.
pub fn assert_quiet<T: std::fmt::Debug>(rx: &mpsc::Receiver<T>) {
    if let Ok(item) = rx.recv_timeout(QUIET_PERIOD) {
        panic!("Expected no notification, got {:?}", item);
    }
}

/// Poll `condition` until it holds or the timeout passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
