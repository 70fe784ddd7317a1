//! Scene model
//!
//! A [`Scene`] is shared as `Arc<Scene>` between the registry, the activation
//! engine and callers. Its identity (id and zone/group/scene target) is fixed
//! at construction; everything else lives behind a lock.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use dss_protocol::{DeviceId, GroupId, SceneId, SceneNumber, ZoneId};

/// What part of the installation a scene addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneScope {
    /// A user-named scene, or an id without a zone/group target
    Named,
    /// Zone 0, group 0
    Apartment,
    /// A whole zone (group 0)
    Zone,
    /// A single group inside a zone
    Group,
}

/// Activation state of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationState {
    Unknown,
    Active,
    Inactive,
}

/// The zone/group/scene triple a scene call is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneTarget {
    pub zone: ZoneId,
    pub group: GroupId,
    pub scene: SceneNumber,
}

impl SceneTarget {
    pub fn scope(&self) -> SceneScope {
        match (self.zone.is_apartment(), self.group.is_broadcast()) {
            (true, true) => SceneScope::Apartment,
            (false, true) => SceneScope::Zone,
            (_, false) => SceneScope::Group,
        }
    }
}

/// One device affected by a scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDelta {
    pub device: DeviceId,
    /// Output value the device takes when the scene runs, if known
    pub output: Option<u16>,
}

impl DeviceDelta {
    pub fn new(device: impl Into<DeviceId>) -> Self {
        Self {
            device: device.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: u16) -> Self {
        self.output = Some(output);
        self
    }
}

#[derive(Debug)]
struct SceneInner {
    name: Option<String>,
    callable: bool,
    state: ActivationState,
    /// State before the last change
    previous: ActivationState,
    deltas: Vec<DeviceDelta>,
}

/// A triggerable configuration of device states
#[derive(Debug)]
pub struct Scene {
    id: SceneId,
    target: Option<SceneTarget>,
    inner: RwLock<SceneInner>,
}

impl Scene {
    /// A scene for a zone/group/scene triple
    ///
    /// Callable when the scene number is inside the range the bus accepts.
    pub fn new(zone: ZoneId, group: GroupId, scene: SceneNumber) -> Self {
        Self {
            id: SceneId::from_parts(zone, group, scene),
            target: Some(SceneTarget { zone, group, scene }),
            inner: RwLock::new(SceneInner {
                name: None,
                callable: scene.is_valid(),
                state: ActivationState::Unknown,
                previous: ActivationState::Unknown,
                deltas: Vec::new(),
            }),
        }
    }

    /// A scene known only by id, not yet confirmed by discovery
    pub fn provisional(id: SceneId) -> Self {
        let target = id
            .parts()
            .ok()
            .map(|(zone, group, scene)| SceneTarget { zone, group, scene });
        Self {
            id,
            target,
            inner: RwLock::new(SceneInner {
                name: None,
                callable: false,
                state: ActivationState::Unknown,
                previous: ActivationState::Unknown,
                deltas: Vec::new(),
            }),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.inner.get_mut().name = Some(name.into());
        self
    }

    pub fn with_deltas(mut self, deltas: Vec<DeviceDelta>) -> Self {
        self.inner.get_mut().deltas = deltas;
        self
    }

    pub fn id(&self) -> &SceneId {
        &self.id
    }

    pub fn target(&self) -> Option<SceneTarget> {
        self.target
    }

    pub fn zone(&self) -> Option<ZoneId> {
        self.target.map(|t| t.zone)
    }

    pub fn group(&self) -> Option<GroupId> {
        self.target.map(|t| t.group)
    }

    pub fn scene_number(&self) -> Option<SceneNumber> {
        self.target.map(|t| t.scene)
    }

    pub fn name(&self) -> Option<String> {
        self.inner.read().name.clone()
    }

    pub fn scope(&self) -> SceneScope {
        if self.inner.read().name.is_some() {
            return SceneScope::Named;
        }
        self.target.map_or(SceneScope::Named, |t| t.scope())
    }

    pub fn is_callable(&self) -> bool {
        self.inner.read().callable
    }

    /// Mark the scene callable
    ///
    /// Scenes without a zone/group target can never become callable.
    /// Returns whether the flag changed.
    pub fn mark_callable(&self) -> bool {
        if self.target.is_none() {
            return false;
        }
        let mut inner = self.inner.write();
        let changed = !inner.callable;
        inner.callable = true;
        changed
    }

    pub fn state(&self) -> ActivationState {
        self.inner.read().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == ActivationState::Active
    }

    pub fn deltas(&self) -> Vec<DeviceDelta> {
        self.inner.read().deltas.clone()
    }

    /// Set the state to active, returning whether it changed
    pub(crate) fn activate(&self) -> bool {
        self.set_state(ActivationState::Active)
    }

    /// Set the state to inactive, returning whether it changed
    pub(crate) fn deactivate(&self) -> bool {
        self.set_state(ActivationState::Inactive)
    }

    /// The state this scene had before its last change
    pub fn previous_state(&self) -> ActivationState {
        self.inner.read().previous
    }

    /// Undo the last activation, returning to the state before it
    ///
    /// A scene that is not active has nothing to undo. Returns whether the
    /// state changed.
    pub(crate) fn revert(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.state != ActivationState::Active {
            return false;
        }
        inner.state = inner.previous;
        inner.previous = ActivationState::Active;
        true
    }

    fn set_state(&self, state: ActivationState) -> bool {
        let mut inner = self.inner.write();
        let changed = inner.state != state;
        if changed {
            inner.previous = inner.state;
            inner.state = state;
        }
        changed
    }

    /// Take over what `other` knows about this scene, keeping our state
    ///
    /// Returns whether this scene became callable.
    pub(crate) fn merge_from(&self, other: &Scene) -> bool {
        let (name, deltas, callable) = {
            let other = other.inner.read();
            (other.name.clone(), other.deltas.clone(), other.callable)
        };

        let mut inner = self.inner.write();
        if name.is_some() {
            inner.name = name;
        }
        if !deltas.is_empty() {
            inner.deltas = deltas;
        }
        let became_callable = callable && !inner.callable && self.target.is_some();
        if became_callable {
            inner.callable = true;
        }
        became_callable
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let inner = self.inner.read();
        let scope = if inner.name.is_some() {
            SceneScope::Named
        } else {
            self.target.map_or(SceneScope::Named, |t| t.scope())
        };
        SceneSnapshot {
            id: self.id.clone(),
            scope,
            target: self.target,
            name: inner.name.clone(),
            callable: inner.callable,
            state: inner.state,
            deltas: inner.deltas.clone(),
        }
    }
}

/// Point-in-time copy of a scene, handed to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub id: SceneId,
    pub scope: SceneScope,
    pub target: Option<SceneTarget>,
    pub name: Option<String>,
    pub callable: bool,
    pub state: ActivationState,
    pub deltas: Vec<DeviceDelta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, SceneScope::Apartment)]
    #[case(4, 0, SceneScope::Zone)]
    #[case(4, 1, SceneScope::Group)]
    #[case(0, 2, SceneScope::Group)]
    fn test_scope_from_target(#[case] zone: u32, #[case] group: u16, #[case] expected: SceneScope) {
        let scene = Scene::new(ZoneId::new(zone), GroupId::new(group), SceneNumber::new(5));
        assert_eq!(scene.scope(), expected);
    }

    #[test]
    fn test_named_scene_scope() {
        let scene = Scene::new(ZoneId::new(4), GroupId::new(1), SceneNumber::new(5)).with_name("Dinner");
        assert_eq!(scene.scope(), SceneScope::Named);
        assert_eq!(scene.name().as_deref(), Some("Dinner"));
    }

    #[test]
    fn test_provisional_scene_is_not_callable() {
        let scene = Scene::provisional(SceneId::new("2-1-5"));
        assert!(!scene.is_callable());
        assert_eq!(scene.state(), ActivationState::Unknown);
        assert_eq!(scene.zone(), Some(ZoneId::new(2)));

        assert!(scene.mark_callable());
        assert!(scene.is_callable());
        assert!(!scene.mark_callable());
    }

    #[test]
    fn test_untargeted_scene_never_callable() {
        let scene = Scene::provisional(SceneId::new("movie-night"));
        assert!(scene.target().is_none());
        assert!(!scene.mark_callable());
        assert_eq!(scene.scope(), SceneScope::Named);
    }

    #[test]
    fn test_out_of_range_scene_number_not_callable() {
        let scene = Scene::new(ZoneId::new(1), GroupId::new(1), SceneNumber::new(200));
        assert!(!scene.is_callable());
    }

    #[test]
    fn test_activate_and_deactivate_report_changes() {
        let scene = Scene::new(ZoneId::new(1), GroupId::new(1), SceneNumber::new(5));
        assert!(scene.activate());
        assert!(!scene.activate());
        assert!(scene.is_active());
        assert!(scene.deactivate());
        assert_eq!(scene.state(), ActivationState::Inactive);
    }

    #[test]
    fn test_revert_returns_to_state_before_activation() {
        let scene = Scene::new(ZoneId::new(1), GroupId::new(1), SceneNumber::new(5));
        assert!(!scene.revert());

        scene.activate();
        assert_eq!(scene.previous_state(), ActivationState::Unknown);
        assert!(scene.revert());
        assert_eq!(scene.state(), ActivationState::Unknown);
        assert_eq!(scene.previous_state(), ActivationState::Active);

        scene.activate();
        scene.deactivate();
        scene.activate();
        assert!(scene.revert());
        assert_eq!(scene.state(), ActivationState::Inactive);
        // Nothing left to undo
        assert!(!scene.revert());
        assert_eq!(scene.state(), ActivationState::Inactive);
    }

    #[test]
    fn test_merge_keeps_state_and_takes_metadata() {
        let existing = Scene::provisional(SceneId::new("1-1-5"));
        existing.activate();

        let discovered = Scene::new(ZoneId::new(1), GroupId::new(1), SceneNumber::new(5))
            .with_name("Reading")
            .with_deltas(vec![DeviceDelta::new("dev1").with_output(128)]);

        assert!(existing.merge_from(&discovered));
        assert!(existing.is_callable());
        assert!(existing.is_active());
        assert_eq!(existing.name().as_deref(), Some("Reading"));
        assert_eq!(existing.deltas().len(), 1);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let scene = Scene::new(ZoneId::new(1), GroupId::new(1), SceneNumber::new(5))
            .with_deltas(vec![DeviceDelta::new("dev1").with_output(180)]);
        scene.activate();

        let value = serde_json::to_value(scene.snapshot()).unwrap();
        assert_eq!(value["id"], "1-1-5");
        assert_eq!(value["scope"], "Group");
        assert_eq!(value["state"], "Active");
        assert_eq!(value["callable"], true);
        assert_eq!(value["deltas"][0]["output"], 180);

        let back: SceneSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, scene.snapshot());
    }
}
