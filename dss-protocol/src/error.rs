//! Error types for dss-protocol

use thiserror::Error;

/// Errors produced when parsing identifiers or event names
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    /// A scene id did not have the `zone-group-scene` shape
    #[error("scene id '{0}' is not of the form <zone>-<group>-<scene>")]
    MalformedSceneId(String),

    /// A numeric component was out of range or not a number
    #[error("invalid {component} '{value}' in scene id")]
    InvalidComponent {
        component: &'static str,
        value: String,
    },

    /// Unknown event name
    #[error("unknown event name '{0}'")]
    UnknownEventName(String),
}
