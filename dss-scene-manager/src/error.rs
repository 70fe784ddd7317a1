use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur in the scene manager
///
/// Scene and device calls never fail with an error; they report a
/// [`CallOutcome`](crate::activation::CallOutcome) instead. Errors are reserved
/// for lifecycle operations.
#[derive(Error, Debug)]
pub enum SceneManagerError {
    /// The event transport refused to start or failed while running
    #[error("Event transport error: {0}")]
    Transport(#[from] TransportError),

    /// A worker or listener thread could not be spawned
    #[error("Failed to spawn {name} thread: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration values are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for scene manager operations
pub type Result<T> = std::result::Result<T, SceneManagerError>;
