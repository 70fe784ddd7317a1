//! # dss-scene-manager
//!
//! A sync-first scene coordination engine for digitalSTROM style
//! installations.
//!
//! ## Overview
//!
//! The scene manager keeps a registry of scenes, calls scenes on zones,
//! groups and single devices, and follows what happens on the bus. Commands
//! it issues itself come back as events; those echoes are recognized and
//! dropped so only genuine external changes reach listeners.
//!
//! ## Key Features
//!
//! - **Sync-First API**: no async/await; background work runs on dedicated threads
//! - **Echo Suppression**: self-caused events are consumed once, within a TTL
//! - **Scene Discovery**: four independent phases with a 4-character status vector
//! - **Stable Identity**: one `Arc<Scene>` per scene id, even under concurrent creation
//! - **Non-blocking Listeners**: each listener has its own bounded queue and thread
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dss_scene_manager::prelude::*;
//!
//! # fn main() -> dss_scene_manager::Result<()> {
//! let source = StaticSceneSource::new().with_scene(
//!     DiscoveryPhase::Zone,
//!     DiscoveredScene::new(ZoneId::new(3), GroupId::new(0), SceneNumber::new(5)),
//! );
//! let manager = SceneManager::new(
//!     SceneManagerConfig::default(),
//!     Arc::new(LoopbackTransport::with_echo()),
//!     Arc::new(InMemoryDeviceRegistry::new()),
//!     Arc::new(source),
//! )?;
//!
//! manager.start()?;
//! manager.generate_scenes();
//! manager.call_scene_by_id(&SceneId::new("3-0-5"));
//! manager.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`SceneRegistry`] owns scenes keyed by id
//! - [`EchoSuppressor`] tracks expected echoes of issued commands
//! - [`SceneDiscoveryCoordinator`] runs discovery on a worker with its own tokio runtime
//! - [`SceneActivationEngine`] applies local calls and external events
//! - [`ListenerHub`] dispatches notifications and holds the [`ManagerState`]
//! - an intake worker thread feeds transport events to the engine

pub mod activation;
pub mod config;
pub mod device;
pub mod discovery;
mod dispatch;
pub mod echo;
pub mod error;
pub mod hub;
pub mod listener;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod scene;
pub mod transport;
pub mod worker;

// Re-export main types for convenience
pub use activation::{CallOutcome, EventOutcome, SceneActivationEngine};
pub use config::SceneManagerConfig;
pub use device::{Device, DeviceRegistry, InMemoryDeviceRegistry};
pub use discovery::{
    DiscoveredScene, DiscoveryPhase, DiscoveryStatus, PhaseStatus, SceneDiscoveryCoordinator,
    SceneSource, SourceError, StaticSceneSource,
};
pub use echo::{EchoKey, EchoSuppressor};
pub use error::{Result, SceneManagerError};
pub use hub::ListenerHub;
pub use listener::{
    DeviceSceneListener, ManagerState, ManagerStatusListener, ManagerType, RegistrationId,
    SceneListenerId, SceneStatusListener,
};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use manager::SceneManager;
pub use registry::{Admission, SceneRegistry};
pub use scene::{ActivationState, DeviceDelta, Scene, SceneScope, SceneSnapshot, SceneTarget};
pub use transport::{EventTransport, LoopbackTransport, TransportError, TransportMessage};

// Re-export the protocol vocabulary
pub use dss_protocol::{
    DeviceId, EventKind, EventSource, GroupId, SceneCommand, SceneEvent, SceneId, SceneNumber,
    ZoneId,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CallOutcome, DeviceSceneListener, DiscoveredScene, DiscoveryPhase, DiscoveryStatus,
        InMemoryDeviceRegistry, LoopbackTransport, ManagerState, ManagerStatusListener, Scene,
        SceneListenerId, SceneManager, SceneManagerConfig, SceneSnapshot, SceneStatusListener,
        StaticSceneSource,
    };
    pub use dss_protocol::prelude::*;
}
