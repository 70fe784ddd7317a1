//! Outgoing scene commands handed to the event transport

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{EventKind, SceneEvent};
use crate::ids::{DeviceId, GroupId, SceneNumber, ZoneId};

/// A command the scene manager asks the transport to put on the bus
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SceneCommand {
    CallDeviceScene {
        device: DeviceId,
        scene: SceneNumber,
    },
    UndoDeviceScene {
        device: DeviceId,
        scene: SceneNumber,
    },
    CallScene {
        zone: ZoneId,
        group: GroupId,
        scene: SceneNumber,
    },
    UndoScene {
        zone: ZoneId,
        group: GroupId,
        scene: SceneNumber,
    },
}

impl SceneCommand {
    pub fn kind(&self) -> EventKind {
        match self {
            SceneCommand::CallDeviceScene { .. } | SceneCommand::CallScene { .. } => EventKind::Call,
            SceneCommand::UndoDeviceScene { .. } | SceneCommand::UndoScene { .. } => EventKind::Undo,
        }
    }

    /// The event the bus reports back once this command has been executed
    pub fn echo_event(&self) -> SceneEvent {
        let kind = self.kind();
        match self {
            SceneCommand::CallDeviceScene { device, scene }
            | SceneCommand::UndoDeviceScene { device, scene } => {
                SceneEvent::device(device.clone(), *scene, kind)
            }
            SceneCommand::CallScene { zone, group, scene }
            | SceneCommand::UndoScene { zone, group, scene } => {
                SceneEvent::zone(*zone, *group, *scene, kind)
            }
        }
    }
}

impl fmt::Display for SceneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.echo_event())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_event_matches_command() {
        let cmd = SceneCommand::UndoScene {
            zone: ZoneId::new(2),
            group: GroupId::new(1),
            scene: SceneNumber::new(5),
        };
        let event = cmd.echo_event();
        assert_eq!(event.kind, EventKind::Undo);
        assert_eq!(event.scene_id().unwrap().as_str(), "2-1-5");
    }

    #[test]
    fn test_device_command_kind() {
        let cmd = SceneCommand::CallDeviceScene {
            device: DeviceId::new("dev1"),
            scene: SceneNumber::new(5),
        };
        assert_eq!(cmd.kind(), EventKind::Call);
        assert_eq!(cmd.to_string(), "callScene device=dev1 scene=5");
    }
}
