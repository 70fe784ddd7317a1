//! Listener registry and manager state
//!
//! The hub keeps every registered listener together with its dispatch queue
//! and owns the [`ManagerState`]. All notify methods are fire-and-forget.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use dss_protocol::{DeviceId, SceneEvent, SceneId};

use crate::discovery::DiscoveryStatus;
use crate::dispatch::ListenerQueue;
use crate::error::{Result, SceneManagerError};
use crate::listener::{
    DeviceSceneListener, ManagerState, ManagerStatusListener, RegistrationId, SceneListenerId,
    SceneStatusListener,
};
use crate::scene::SceneSnapshot;

/// Notification delivered to a [`SceneStatusListener`]
#[derive(Debug, Clone)]
pub(crate) enum SceneNotification {
    StateChanged(SceneSnapshot, bool),
    Removed(SceneSnapshot),
    Added(SceneSnapshot),
    Discovery(DiscoveryStatus),
}

struct Registered<N: Send + 'static> {
    id: RegistrationId,
    queue: ListenerQueue<N>,
}

/// Where a registration lives, for unregistering by id
#[derive(Debug, Clone)]
enum Slot {
    Scene(SceneId),
    Discovery,
    Device(DeviceId),
}

pub struct ListenerHub {
    queue_capacity: usize,
    next_id: AtomicU64,
    slots: Mutex<HashMap<RegistrationId, Slot>>,
    scene_listeners: RwLock<HashMap<SceneId, Vec<Registered<SceneNotification>>>>,
    discovery_listeners: RwLock<Vec<Registered<SceneNotification>>>,
    device_listeners: RwLock<HashMap<DeviceId, Vec<Registered<SceneEvent>>>>,
    status_listener: Mutex<Option<ListenerQueue<ManagerState>>>,
    state: Mutex<ManagerState>,
}

impl ListenerHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            next_id: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
            scene_listeners: RwLock::new(HashMap::new()),
            discovery_listeners: RwLock::new(Vec::new()),
            device_listeners: RwLock::new(HashMap::new()),
            status_listener: Mutex::new(None),
            state: Mutex::new(ManagerState::Stopped),
        }
    }

    fn allocate_id(&self) -> RegistrationId {
        RegistrationId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn scene_queue(
        &self,
        id: RegistrationId,
        listener: Arc<dyn SceneStatusListener>,
        initial: Vec<SceneNotification>,
    ) -> Result<ListenerQueue<SceneNotification>> {
        let name = format!("dss-scene-{}", id);
        // Room for the whole replay on top of the regular backlog
        let capacity = self.queue_capacity + initial.len();
        let queue = ListenerQueue::spawn(name.clone(), capacity, move |notification| {
            match notification {
                SceneNotification::StateChanged(scene, active) => {
                    listener.on_scene_state_changed(&scene, active)
                }
                SceneNotification::Removed(scene) => listener.on_scene_removed(&scene),
                SceneNotification::Added(scene) => listener.on_scene_added(&scene),
                SceneNotification::Discovery(status) => listener.on_discovery_status(&status),
            }
        })
        .map_err(|source| SceneManagerError::WorkerSpawn { name, source })?;
        for notification in initial {
            queue.post(notification);
        }
        Ok(queue)
    }

    /// Register a scene or discovery listener
    ///
    /// `initial` is evaluated while the listener list is locked against
    /// broadcasts, and its notifications are queued for this listener
    /// before any later broadcast reaches it.
    pub(crate) fn register_scene_listener<F>(
        &self,
        listener: Arc<dyn SceneStatusListener>,
        initial: F,
    ) -> Result<RegistrationId>
    where
        F: FnOnce() -> Vec<SceneNotification>,
    {
        let id = self.allocate_id();
        let slot = match listener.listener_id() {
            SceneListenerId::Discovery => {
                let mut listeners = self.discovery_listeners.write();
                let queue = self.scene_queue(id, listener, initial())?;
                listeners.push(Registered { id, queue });
                Slot::Discovery
            }
            SceneListenerId::Scene(scene_id) => {
                let mut listeners = self.scene_listeners.write();
                let queue = self.scene_queue(id, listener, initial())?;
                listeners
                    .entry(scene_id.clone())
                    .or_default()
                    .push(Registered { id, queue });
                Slot::Scene(scene_id)
            }
        };
        tracing::debug!("Registered scene listener {} for {:?}", id, slot);
        self.slots.lock().insert(id, slot);
        Ok(id)
    }

    pub fn register_device_listener(&self, listener: Arc<dyn DeviceSceneListener>) -> Result<RegistrationId> {
        let id = self.allocate_id();
        let device_id = listener.device_id();
        let name = format!("dss-device-{}", id);
        let queue = ListenerQueue::spawn(name.clone(), self.queue_capacity, move |event: SceneEvent| {
            listener.on_device_scene(&event)
        })
        .map_err(|source| SceneManagerError::WorkerSpawn { name, source })?;

        self.device_listeners
            .write()
            .entry(device_id.clone())
            .or_default()
            .push(Registered { id, queue });
        self.slots.lock().insert(id, Slot::Device(device_id));
        Ok(id)
    }

    /// Remove a scene, discovery or device listener
    ///
    /// Returns `false` when the id is unknown (e.g. already unregistered).
    pub fn unregister(&self, id: RegistrationId) -> bool {
        let Some(slot) = self.slots.lock().remove(&id) else {
            return false;
        };

        match slot {
            Slot::Scene(scene_id) => {
                let mut listeners = self.scene_listeners.write();
                if let Some(registered) = listeners.get_mut(&scene_id) {
                    registered.retain(|r| r.id != id);
                    if registered.is_empty() {
                        listeners.remove(&scene_id);
                    }
                }
            }
            Slot::Discovery => self.discovery_listeners.write().retain(|r| r.id != id),
            Slot::Device(device_id) => {
                let mut listeners = self.device_listeners.write();
                if let Some(registered) = listeners.get_mut(&device_id) {
                    registered.retain(|r| r.id != id);
                    if registered.is_empty() {
                        listeners.remove(&device_id);
                    }
                }
            }
        }
        tracing::debug!("Unregistered listener {}", id);
        true
    }

    /// Set the manager status listener, replacing any previous one
    ///
    /// The listener first receives the current state.
    pub fn register_status_listener(&self, listener: Arc<dyn ManagerStatusListener>) -> Result<()> {
        let name = "dss-manager-status".to_string();
        let queue = ListenerQueue::spawn(name.clone(), self.queue_capacity, move |state| {
            listener.on_status_changed(state)
        })
        .map_err(|source| SceneManagerError::WorkerSpawn { name, source })?;

        let mut slot = self.status_listener.lock();
        queue.post(self.state());
        if slot.replace(queue).is_some() {
            tracing::debug!("Replaced manager status listener");
        }
        Ok(())
    }

    pub fn unregister_status_listener(&self) -> bool {
        self.status_listener.lock().take().is_some()
    }

    pub fn is_discovery_registered(&self) -> bool {
        !self.discovery_listeners.read().is_empty()
    }

    /// Number of scene listeners attached to `scene`
    pub fn scene_listener_count(&self, scene: &SceneId) -> usize {
        self.scene_listeners.read().get(scene).map_or(0, Vec::len)
    }

    pub fn listener_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub(crate) fn notify_scene_state(&self, scene: &SceneSnapshot, active: bool) {
        if let Some(listeners) = self.scene_listeners.read().get(&scene.id) {
            for r in listeners {
                r.queue
                    .post(SceneNotification::StateChanged(scene.clone(), active));
            }
        }
    }

    pub(crate) fn notify_scene_removed(&self, scene: &SceneSnapshot) {
        if let Some(listeners) = self.scene_listeners.read().get(&scene.id) {
            for r in listeners {
                r.queue.post(SceneNotification::Removed(scene.clone()));
            }
        }
        for r in self.discovery_listeners.read().iter() {
            r.queue.post(SceneNotification::Removed(scene.clone()));
        }
    }

    pub(crate) fn notify_scene_added(&self, scene: &SceneSnapshot) {
        for r in self.discovery_listeners.read().iter() {
            r.queue.post(SceneNotification::Added(scene.clone()));
        }
    }

    pub(crate) fn notify_discovery_status(&self, status: DiscoveryStatus) {
        for r in self.discovery_listeners.read().iter() {
            r.queue.post(SceneNotification::Discovery(status));
        }
    }

    pub(crate) fn notify_device_scene(&self, event: &SceneEvent) {
        let Some(device) = event.device_id() else {
            return;
        };
        if let Some(listeners) = self.device_listeners.read().get(device) {
            for r in listeners {
                r.queue.post(event.clone());
            }
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.state.lock()
    }

    /// Move to `next` unconditionally, returning the previous state
    pub(crate) fn set_state(&self, next: ManagerState) -> ManagerState {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            self.report_state(previous, next);
        }
        previous
    }

    /// Move to `next` only when the current state is one of `from`
    pub(crate) fn transition(&self, from: &[ManagerState], next: ManagerState) -> bool {
        let previous = {
            let mut state = self.state.lock();
            if !from.contains(&*state) {
                return false;
            }
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            self.report_state(previous, next);
        }
        true
    }

    fn report_state(&self, previous: ManagerState, next: ManagerState) {
        tracing::info!("Scene manager {} -> {}", previous, next);
        if let Some(queue) = self.status_listener.lock().as_ref() {
            queue.post(next);
        }
    }
}

impl std::fmt::Debug for ListenerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHub")
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;
    use dss_protocol::{EventKind, SceneNumber};
    use std::sync::mpsc;
    use std::time::Duration;

    struct ChannelListener {
        id: SceneListenerId,
        tx: Mutex<mpsc::Sender<String>>,
    }

    impl SceneStatusListener for ChannelListener {
        fn listener_id(&self) -> SceneListenerId {
            self.id.clone()
        }

        fn on_scene_state_changed(&self, scene: &SceneSnapshot, active: bool) {
            let _ = self.tx.lock().send(format!("{}:{}", scene.id, active));
        }

        fn on_scene_added(&self, scene: &SceneSnapshot) {
            let _ = self.tx.lock().send(format!("added:{}", scene.id));
        }
    }

    struct DeviceChannel {
        device: DeviceId,
        tx: Mutex<mpsc::Sender<SceneEvent>>,
    }

    impl DeviceSceneListener for DeviceChannel {
        fn device_id(&self) -> DeviceId {
            self.device.clone()
        }

        fn on_device_scene(&self, event: &SceneEvent) {
            let _ = self.tx.lock().send(event.clone());
        }
    }

    struct StatusChannel(Mutex<mpsc::Sender<ManagerState>>);

    impl ManagerStatusListener for StatusChannel {
        fn on_status_changed(&self, state: ManagerState) {
            let _ = self.0.lock().send(state);
        }
    }

    fn snapshot(id: &str) -> SceneSnapshot {
        Scene::provisional(SceneId::new(id)).snapshot()
    }

    #[test]
    fn test_scene_listener_receives_only_its_scene() {
        let hub = ListenerHub::new(16);
        let (tx, rx) = mpsc::channel();
        let listener = Arc::new(ChannelListener {
            id: SceneListenerId::Scene(SceneId::new("1-1-5")),
            tx: Mutex::new(tx),
        });
        hub.register_scene_listener(listener, Vec::new).unwrap();

        hub.notify_scene_state(&snapshot("1-1-6"), true);
        hub.notify_scene_state(&snapshot("1-1-5"), true);

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "1-1-5:true");
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_initial_notifications_come_first() {
        let hub = ListenerHub::new(16);
        let (tx, rx) = mpsc::channel();
        let listener = Arc::new(ChannelListener {
            id: SceneListenerId::Discovery,
            tx: Mutex::new(tx),
        });
        hub.register_scene_listener(
            listener,
            || vec![SceneNotification::Added(snapshot("0-0-72"))],
        )
        .unwrap();
        assert!(hub.is_discovery_registered());

        hub.notify_scene_added(&snapshot("0-0-73"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "added:0-0-72");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "added:0-0-73");
    }

    #[test]
    fn test_unregister_by_id() {
        let hub = ListenerHub::new(16);
        let (tx, rx) = mpsc::channel();
        let id = hub
            .register_scene_listener(
                Arc::new(ChannelListener {
                    id: SceneListenerId::Scene(SceneId::new("1-1-5")),
                    tx: Mutex::new(tx),
                }),
                Vec::new,
            )
            .unwrap();
        assert_eq!(hub.scene_listener_count(&SceneId::new("1-1-5")), 1);

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert_eq!(hub.listener_count(), 0);

        hub.notify_scene_state(&snapshot("1-1-5"), true);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_device_listener_filters_by_device() {
        let hub = ListenerHub::new(16);
        let (tx, rx) = mpsc::channel();
        hub.register_device_listener(Arc::new(DeviceChannel {
            device: DeviceId::new("dev1"),
            tx: Mutex::new(tx),
        }))
        .unwrap();

        let other = SceneEvent::device(DeviceId::new("dev2"), SceneNumber::new(5), EventKind::Call);
        let mine = SceneEvent::device(DeviceId::new("dev1"), SceneNumber::new(5), EventKind::Call);
        hub.notify_device_scene(&other);
        hub.notify_device_scene(&mine);

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), mine);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_transitions_are_reported() {
        let hub = ListenerHub::new(16);
        let (tx, rx) = mpsc::channel();
        hub.register_status_listener(Arc::new(StatusChannel(Mutex::new(tx))))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), ManagerState::Stopped);

        assert!(hub.transition(&[ManagerState::Stopped], ManagerState::Starting));
        assert!(!hub.transition(&[ManagerState::Stopped], ManagerState::Running));
        assert_eq!(hub.set_state(ManagerState::Running), ManagerState::Starting);

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), ManagerState::Starting);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), ManagerState::Running);
        assert!(hub.unregister_status_listener());
        assert!(!hub.unregister_status_listener());
    }
}
