//! Identity types for devices, zones, groups and scenes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ParseIdError;

/// Macro to generate common string ID type implementations
macro_rules! impl_id_type {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name::new(s)
            }
        }
    };
}

/// Unique identifier for a digitalSTROM device (its dSID)
///
/// Normalized to upper-case hex with any "dsid:" prefix removed, so ids
/// coming from events and from configuration compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new DeviceId, normalizing the format
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into().trim().to_ascii_uppercase();
        let normalized = id.strip_prefix("DSID:").unwrap_or(&id);
        Self(normalized.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl_id_type!(DeviceId);

/// Identifier of a scene known to the scene manager
///
/// Internal scenes use the `"<zone>-<group>-<scene>"` form. Any other string
/// is accepted as an id but does not address a zone/group target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Build the internal id for a zone/group/scene triple
    pub fn from_parts(zone: ZoneId, group: GroupId, scene: SceneNumber) -> Self {
        Self(format!("{}-{}-{}", zone.0, group.0, scene.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split an internal id back into its triple
    pub fn parts(&self) -> Result<(ZoneId, GroupId, SceneNumber), ParseIdError> {
        let mut split = self.0.split('-');
        let (Some(zone), Some(group), Some(scene), None) =
            (split.next(), split.next(), split.next(), split.next())
        else {
            return Err(ParseIdError::MalformedSceneId(self.0.clone()));
        };

        let zone = zone
            .parse::<u32>()
            .map_err(|_| ParseIdError::InvalidComponent {
                component: "zone",
                value: zone.to_string(),
            })?;
        let group = group
            .parse::<u16>()
            .map_err(|_| ParseIdError::InvalidComponent {
                component: "group",
                value: group.to_string(),
            })?;
        let scene = scene
            .parse::<u8>()
            .map_err(|_| ParseIdError::InvalidComponent {
                component: "scene",
                value: scene.to_string(),
            })?;

        Ok((ZoneId(zone), GroupId(group), SceneNumber(scene)))
    }
}

impl_id_type!(SceneId);

/// Zone (room) identifier; zone 0 is the whole apartment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(u32);

impl ZoneId {
    pub const APARTMENT: ZoneId = ZoneId(0);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_apartment(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Group (color) identifier; group 0 addresses every group of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(u16);

impl GroupId {
    pub const BROADCAST: GroupId = GroupId(0);

    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scene number as carried on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneNumber(u8);

impl SceneNumber {
    /// Highest scene number a zone or group scene call may carry
    pub const MAX: u8 = 127;

    pub fn new(number: u8) -> Self {
        Self(number)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether the number is inside the range the bus accepts for calls
    pub fn is_valid(self) -> bool {
        self.0 <= Self::MAX
    }
}

impl fmt::Display for SceneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for SceneNumber {
    fn from(n: u8) -> Self {
        SceneNumber(n)
    }
}
