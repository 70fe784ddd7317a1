//! Scene discovery
//!
//! Discovery runs in four independent phases (named, apartment, zone and
//! group scenes). Each phase fetches scenes from a [`SceneSource`] on a
//! background worker and admits them to the registry as callable. Phase
//! progress is published as a 4-character status vector:
//!
//! | position | phase     |
//! |----------|-----------|
//! | 0        | named     |
//! | 1        | apartment |
//! | 2        | zone      |
//! | 3        | group     |
//!
//! with `'0'` for not generated, `'1'` for generated and `'2'` for failed.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;

use dss_protocol::{GroupId, SceneNumber, ZoneId};

use crate::hub::ListenerHub;
use crate::registry::SceneRegistry;
use crate::scene::Scene;

/// One of the four discovery phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryPhase {
    Named,
    Apartment,
    Zone,
    Group,
}

impl DiscoveryPhase {
    /// All phases in status-vector order
    pub const ALL: [DiscoveryPhase; 4] = [
        DiscoveryPhase::Named,
        DiscoveryPhase::Apartment,
        DiscoveryPhase::Zone,
        DiscoveryPhase::Group,
    ];

    /// Position in the status vector
    pub fn index(self) -> usize {
        match self {
            DiscoveryPhase::Named => 0,
            DiscoveryPhase::Apartment => 1,
            DiscoveryPhase::Zone => 2,
            DiscoveryPhase::Group => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiscoveryPhase::Named => "named",
            DiscoveryPhase::Apartment => "apartment",
            DiscoveryPhase::Zone => "zone",
            DiscoveryPhase::Group => "group",
        }
    }
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Progress of a single phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl PhaseStatus {
    /// Character used for this status in the status vector
    pub fn flag(self) -> char {
        match self {
            PhaseStatus::NotStarted | PhaseStatus::InProgress => '0',
            PhaseStatus::Succeeded => '1',
            PhaseStatus::Failed => '2',
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Succeeded | PhaseStatus::Failed)
    }
}

/// Status of all four discovery phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscoveryStatus {
    phases: [PhaseStatus; 4],
}

impl DiscoveryStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, phase: DiscoveryPhase) -> PhaseStatus {
        self.phases[phase.index()]
    }

    pub fn set(&mut self, phase: DiscoveryPhase, status: PhaseStatus) {
        self.phases[phase.index()] = status;
    }

    /// True when every phase has either succeeded or failed
    pub fn all_terminal(&self) -> bool {
        self.phases.iter().all(|s| s.is_terminal())
    }

    pub fn all_succeeded(&self) -> bool {
        self.phases.iter().all(|s| *s == PhaseStatus::Succeeded)
    }

    pub fn any_in_progress(&self) -> bool {
        self.phases.contains(&PhaseStatus::InProgress)
    }

    pub fn to_vector(&self) -> [char; 4] {
        self.phases.map(PhaseStatus::flag)
    }
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in self.to_vector() {
            write!(f, "{}", flag)?;
        }
        Ok(())
    }
}

/// A scene reported by a [`SceneSource`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredScene {
    pub zone: ZoneId,
    pub group: GroupId,
    pub scene: SceneNumber,
    pub name: Option<String>,
}

impl DiscoveredScene {
    pub fn new(zone: ZoneId, group: GroupId, scene: SceneNumber) -> Self {
        Self {
            zone,
            group,
            scene,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn into_scene(self) -> Scene {
        let scene = Scene::new(self.zone, self.group, self.scene);
        match self.name {
            Some(name) => scene.with_name(name),
            None => scene,
        }
    }
}

/// Why a discovery phase produced no scenes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Scene source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed scene data: {0}")]
    Malformed(String),

    #[error("Phase timed out after {0:?}")]
    Timeout(Duration),
}

/// Where discovery gets its scenes from
///
/// Calls may block; they run on the discovery worker's blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait SceneSource: Send + Sync {
    fn named_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError>;

    fn apartment_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError>;

    fn zone_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError>;

    fn group_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError>;
}

fn fetch_phase(source: &dyn SceneSource, phase: DiscoveryPhase) -> Result<Vec<DiscoveredScene>, SourceError> {
    match phase {
        DiscoveryPhase::Named => source.named_scenes(),
        DiscoveryPhase::Apartment => source.apartment_scenes(),
        DiscoveryPhase::Zone => source.zone_scenes(),
        DiscoveryPhase::Group => source.group_scenes(),
    }
}

#[derive(Debug, Default)]
struct PhaseScript {
    scenes: Vec<DiscoveredScene>,
    failure: Option<String>,
    delay: Duration,
}

/// Scene source serving a fixed set of scenes per phase
///
/// Phases can be scripted to fail or to respond slowly, which makes this
/// source useful for simulations as well as tests.
#[derive(Debug, Default)]
pub struct StaticSceneSource {
    phases: [PhaseScript; 4],
    requests: [AtomicUsize; 4],
}

impl StaticSceneSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scene(mut self, phase: DiscoveryPhase, scene: DiscoveredScene) -> Self {
        self.phases[phase.index()].scenes.push(scene);
        self
    }

    pub fn with_scenes(mut self, phase: DiscoveryPhase, scenes: Vec<DiscoveredScene>) -> Self {
        self.phases[phase.index()].scenes.extend(scenes);
        self
    }

    /// Make `phase` fail with `reason`
    pub fn failing(mut self, phase: DiscoveryPhase, reason: impl Into<String>) -> Self {
        self.phases[phase.index()].failure = Some(reason.into());
        self
    }

    /// Delay every answer for `phase`
    pub fn with_delay(mut self, phase: DiscoveryPhase, delay: Duration) -> Self {
        self.phases[phase.index()].delay = delay;
        self
    }

    /// How many times `phase` has been queried
    pub fn requests(&self, phase: DiscoveryPhase) -> usize {
        self.requests[phase.index()].load(Ordering::SeqCst)
    }

    fn serve(&self, phase: DiscoveryPhase) -> Result<Vec<DiscoveredScene>, SourceError> {
        self.requests[phase.index()].fetch_add(1, Ordering::SeqCst);
        let script = &self.phases[phase.index()];
        if !script.delay.is_zero() {
            thread::sleep(script.delay);
        }
        match &script.failure {
            Some(reason) => Err(SourceError::Unavailable(reason.clone())),
            None => Ok(script.scenes.clone()),
        }
    }
}

impl SceneSource for StaticSceneSource {
    fn named_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError> {
        self.serve(DiscoveryPhase::Named)
    }

    fn apartment_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError> {
        self.serve(DiscoveryPhase::Apartment)
    }

    fn zone_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError> {
        self.serve(DiscoveryPhase::Zone)
    }

    fn group_scenes(&self) -> Result<Vec<DiscoveredScene>, SourceError> {
        self.serve(DiscoveryPhase::Group)
    }
}

#[derive(Debug, Default)]
struct RunState {
    status: DiscoveryStatus,
    /// Incremented per run and on cancel; results of older runs are ignored
    run: u64,
}

/// State shared with the discovery worker
struct DiscoveryShared {
    registry: Arc<SceneRegistry>,
    hub: Arc<ListenerHub>,
    source: Arc<dyn SceneSource>,
    state: Mutex<RunState>,
}

impl DiscoveryShared {
    fn finish_phase(&self, run: u64, phase: DiscoveryPhase, result: Result<Vec<DiscoveredScene>, SourceError>) {
        if !self.is_current(run, phase) {
            tracing::debug!("Ignoring stale result for {} discovery", phase);
            return;
        }

        let outcome = match result {
            Ok(found) => {
                let total = found.len();
                let added = self.admit(found);
                tracing::info!("{} discovery found {} scenes ({} new)", phase, total, added);
                PhaseStatus::Succeeded
            }
            Err(e) => {
                tracing::warn!("{} discovery failed: {}", phase, e);
                PhaseStatus::Failed
            }
        };

        let status = {
            let mut state = self.state.lock();
            if state.run != run || state.status.get(phase) != PhaseStatus::InProgress {
                return;
            }
            state.status.set(phase, outcome);
            state.status
        };
        tracing::debug!("Discovery status {}", status);
        self.hub.notify_discovery_status(status);
    }

    fn is_current(&self, run: u64, phase: DiscoveryPhase) -> bool {
        let state = self.state.lock();
        state.run == run && state.status.get(phase) == PhaseStatus::InProgress
    }

    /// Add discovered scenes, returning how many became newly callable
    fn admit(&self, found: Vec<DiscoveredScene>) -> usize {
        let mut added = 0;
        for discovered in found {
            let admission = self.registry.add(discovered.into_scene());
            if !admission.is_new_callable() {
                continue;
            }
            if let Some(scene) = admission.scene() {
                self.hub.notify_scene_added(&scene.snapshot());
                added += 1;
            }
        }
        added
    }
}

struct DiscoveryRun {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives the discovery phases and owns their status
pub struct SceneDiscoveryCoordinator {
    shared: Arc<DiscoveryShared>,
    phase_timeout: Duration,
    worker: Mutex<Option<DiscoveryRun>>,
}

impl SceneDiscoveryCoordinator {
    pub fn new(
        registry: Arc<SceneRegistry>,
        hub: Arc<ListenerHub>,
        source: Arc<dyn SceneSource>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(DiscoveryShared {
                registry,
                hub,
                source,
                state: Mutex::new(RunState::default()),
            }),
            phase_timeout,
            worker: Mutex::new(None),
        }
    }

    pub fn status(&self) -> DiscoveryStatus {
        self.shared.state.lock().status
    }

    /// True once every phase has finished, successfully or not
    pub fn scenes_generated(&self) -> bool {
        self.status().all_terminal()
    }

    /// Start a discovery run for every phase that has not succeeded yet
    ///
    /// Returns `false` without touching any flag while a run is in progress,
    /// and when every phase already succeeded.
    pub fn generate_scenes(&self) -> bool {
        let (run, phases) = {
            let mut state = self.shared.state.lock();
            if state.status.any_in_progress() {
                tracing::debug!("Discovery already in progress ({})", state.status);
                return false;
            }
            let phases: Vec<DiscoveryPhase> = DiscoveryPhase::ALL
                .into_iter()
                .filter(|phase| state.status.get(*phase) != PhaseStatus::Succeeded)
                .collect();
            if phases.is_empty() {
                return false;
            }
            for phase in &phases {
                state.status.set(*phase, PhaseStatus::InProgress);
            }
            state.run += 1;
            (state.run, phases)
        };

        tracing::info!("Starting scene discovery for {:?}", phases);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let timeout = self.phase_timeout;
        let worker_phases = phases.clone();
        let spawned = thread::Builder::new()
            .name("dss-discovery".to_string())
            .spawn(move || run_discovery(shared, run, worker_phases, timeout, cancel_rx));

        match spawned {
            Ok(handle) => {
                let previous = self.worker.lock().replace(DiscoveryRun {
                    cancel: cancel_tx,
                    handle,
                });
                if let Some(previous) = previous {
                    let _ = previous.handle.join();
                }
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn discovery worker: {}", e);
                for phase in phases {
                    self.shared
                        .finish_phase(run, phase, Err(SourceError::Unavailable(e.to_string())));
                }
                false
            }
        }
    }

    /// Abort a running discovery
    ///
    /// Phases still in progress go back to not-started.
    pub fn cancel(&self) {
        let worker = self.worker.lock().take();

        let status = {
            let mut state = self.shared.state.lock();
            if !state.status.any_in_progress() {
                None
            } else {
                state.run += 1;
                for phase in DiscoveryPhase::ALL {
                    if state.status.get(phase) == PhaseStatus::InProgress {
                        state.status.set(phase, PhaseStatus::NotStarted);
                    }
                }
                Some(state.status)
            }
        };

        if let Some(worker) = worker {
            let _ = worker.cancel.send(true);
            if worker.handle.join().is_err() {
                tracing::warn!("Discovery worker panicked");
            }
        }

        if let Some(status) = status {
            tracing::info!("Scene discovery cancelled ({})", status);
            self.shared.hub.notify_discovery_status(status);
        }
    }

    /// Apply an externally reported status vector
    ///
    /// `'1'` marks a phase succeeded and `'2'` failed. `'0'` never reverts a
    /// phase, and a succeeded phase is never marked failed.
    pub fn report_status(&self, vector: [char; 4]) -> DiscoveryStatus {
        let status = {
            let mut state = self.shared.state.lock();
            for (phase, flag) in DiscoveryPhase::ALL.into_iter().zip(vector) {
                match flag {
                    '0' => {}
                    '1' => state.status.set(phase, PhaseStatus::Succeeded),
                    '2' if state.status.get(phase) != PhaseStatus::Succeeded => {
                        state.status.set(phase, PhaseStatus::Failed)
                    }
                    '2' => {}
                    other => tracing::warn!("Ignoring invalid status flag {:?} for {} phase", other, phase),
                }
            }
            state.status
        };
        self.shared.hub.notify_discovery_status(status);
        status
    }
}

impl Drop for SceneDiscoveryCoordinator {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.cancel.send(true);
        }
    }
}

impl fmt::Debug for SceneDiscoveryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneDiscoveryCoordinator")
            .field("status", &self.status())
            .field("phase_timeout", &self.phase_timeout)
            .finish()
    }
}

/// Body of the discovery worker thread
fn run_discovery(
    shared: Arc<DiscoveryShared>,
    run: u64,
    phases: Vec<DiscoveryPhase>,
    timeout: Duration,
    cancel: watch::Receiver<bool>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime for discovery worker: {}", e);
            for phase in phases {
                shared.finish_phase(run, phase, Err(SourceError::Unavailable(e.to_string())));
            }
            return;
        }
    };

    rt.block_on(async {
        let mut tasks = JoinSet::new();
        for phase in phases {
            let shared = Arc::clone(&shared);
            let mut cancel = cancel.clone();
            tasks.spawn(async move {
                let source = Arc::clone(&shared.source);
                let fetch = tokio::task::spawn_blocking(move || fetch_phase(source.as_ref(), phase));

                tokio::select! {
                    result = tokio::time::timeout(timeout, fetch) => {
                        let result = match result {
                            Ok(Ok(found)) => found,
                            Ok(Err(join_error)) => Err(SourceError::Unavailable(join_error.to_string())),
                            Err(_) => Err(SourceError::Timeout(timeout)),
                        };
                        shared.finish_phase(run, phase, result);
                    }
                    _ = cancel.wait_for(|cancelled| *cancelled) => {
                        tracing::debug!("{} discovery cancelled", phase);
                    }
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    });

    // Timed-out source calls may still be blocking; don't wait for them
    rt.shutdown_background();
    tracing::debug!("Discovery worker finished");
}
