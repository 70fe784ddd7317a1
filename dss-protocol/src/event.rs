//! Scene events as delivered by the event transport

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseIdError;
use crate::ids::{DeviceId, GroupId, SceneId, SceneNumber, ZoneId};

/// Whether an event reports a scene call or an undo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Call,
    Undo,
}

impl EventKind {
    /// Event name used on the bus
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Call => "callScene",
            EventKind::Undo => "undoScene",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "callScene" => Ok(EventKind::Call),
            "undoScene" => Ok(EventKind::Undo),
            other => Err(ParseIdError::UnknownEventName(other.to_string())),
        }
    }
}

/// Origin of a scene event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    /// A single device executed the scene
    Device(DeviceId),
    /// A zone/group scene call (group 0 addresses the whole zone)
    Zone { zone: ZoneId, group: GroupId },
}

/// A discrete scene event `{source, scene, kind}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneEvent {
    pub source: EventSource,
    pub scene: SceneNumber,
    pub kind: EventKind,
}

impl SceneEvent {
    pub fn device(device: DeviceId, scene: SceneNumber, kind: EventKind) -> Self {
        Self {
            source: EventSource::Device(device),
            scene,
            kind,
        }
    }

    pub fn zone(zone: ZoneId, group: GroupId, scene: SceneNumber, kind: EventKind) -> Self {
        Self {
            source: EventSource::Zone { zone, group },
            scene,
            kind,
        }
    }

    /// Internal scene id addressed by a zone/group event
    ///
    /// Device events carry no scene id of their own.
    pub fn scene_id(&self) -> Option<SceneId> {
        match &self.source {
            EventSource::Zone { zone, group } => Some(SceneId::from_parts(*zone, *group, self.scene)),
            EventSource::Device(_) => None,
        }
    }

    pub fn device_id(&self) -> Option<&DeviceId> {
        match &self.source {
            EventSource::Device(id) => Some(id),
            EventSource::Zone { .. } => None,
        }
    }
}

impl fmt::Display for SceneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            EventSource::Device(id) => write!(f, "{} device={} scene={}", self.kind, id, self.scene),
            EventSource::Zone { zone, group } => write!(
                f,
                "{} zone={} group={} scene={}",
                self.kind, zone, group, self.scene
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!("callScene".parse::<EventKind>().unwrap(), EventKind::Call);
        assert_eq!("undoScene".parse::<EventKind>().unwrap(), EventKind::Undo);
        assert!("blink".parse::<EventKind>().is_err());
        assert_eq!(EventKind::Undo.to_string(), "undoScene");
    }

    #[test]
    fn test_zone_event_scene_id() {
        let event = SceneEvent::zone(ZoneId::new(0), GroupId::new(0), SceneNumber::new(72), EventKind::Call);
        assert_eq!(event.scene_id().unwrap().as_str(), "0-0-72");
        assert!(event.device_id().is_none());
    }

    #[test]
    fn test_device_event_has_no_scene_id() {
        let event = SceneEvent::device(DeviceId::new("abc"), SceneNumber::new(5), EventKind::Call);
        assert!(event.scene_id().is_none());
        assert_eq!(event.device_id(), Some(&DeviceId::new("abc")));
    }

    #[test]
    fn test_event_serializes() {
        let event = SceneEvent::device(DeviceId::new("abc"), SceneNumber::new(5), EventKind::Undo);
        let json = serde_json::to_string(&event).unwrap();
        let back: SceneEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
