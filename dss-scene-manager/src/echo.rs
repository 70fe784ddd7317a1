//! Echo suppression for self-issued commands
//!
//! Every command the manager puts on the bus comes back as an event. Before
//! dispatching, the manager records the event it expects; when that event
//! arrives it is consumed here instead of being processed as an external
//! change. Expectations expire after a fixed TTL so a lost echo cannot hide a
//! later, genuine event with the same key.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use dss_protocol::{DeviceId, EventKind, EventSource, SceneCommand, SceneEvent, SceneId, SceneNumber};

/// What an expected echo looks like
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EchoKey {
    Device {
        device: DeviceId,
        scene: SceneNumber,
        kind: EventKind,
    },
    Scene {
        scene: SceneId,
        kind: EventKind,
    },
}

impl EchoKey {
    pub fn device(device: DeviceId, scene: SceneNumber, kind: EventKind) -> Self {
        EchoKey::Device {
            device,
            scene,
            kind,
        }
    }

    pub fn scene(scene: SceneId, kind: EventKind) -> Self {
        EchoKey::Scene { scene, kind }
    }

    /// Key an incoming event is matched against
    pub fn for_event(event: &SceneEvent) -> Self {
        match &event.source {
            EventSource::Device(device) => EchoKey::device(device.clone(), event.scene, event.kind),
            EventSource::Zone { zone, group } => {
                EchoKey::scene(SceneId::from_parts(*zone, *group, event.scene), event.kind)
            }
        }
    }

    /// Key of the echo a command will produce
    pub fn for_command(command: &SceneCommand) -> Self {
        Self::for_event(&command.echo_event())
    }
}

/// Table of expected echoes with consume-once semantics
#[derive(Debug)]
pub struct EchoSuppressor {
    ttl: Duration,
    /// Deadlines per key, oldest first
    entries: Mutex<HashMap<EchoKey, VecDeque<Instant>>>,
}

impl EchoSuppressor {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expect one event matching `key` within the TTL
    pub fn expect(&self, key: EchoKey) {
        let deadline = Instant::now() + self.ttl;
        tracing::trace!("Expecting echo {:?}", key);
        self.entries.lock().entry(key).or_default().push_back(deadline);
    }

    /// Test for and consume an expectation matching `key`
    ///
    /// Returns `true` when the event is an echo and must be dropped.
    pub fn check(&self, key: &EchoKey) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let Some(deadlines) = entries.get_mut(key) else {
            return false;
        };

        while deadlines.front().is_some_and(|deadline| *deadline <= now) {
            deadlines.pop_front();
            tracing::trace!("Echo {:?} expired before it arrived", key);
        }

        let matched = deadlines.pop_front().is_some();
        if deadlines.is_empty() {
            entries.remove(key);
        }
        matched
    }

    /// Drop one pending expectation for `key`, e.g. when dispatch failed
    pub fn revoke(&self, key: &EchoKey) -> bool {
        let mut entries = self.entries.lock();
        let Some(deadlines) = entries.get_mut(key) else {
            return false;
        };
        // The newest expectation belongs to the command that just failed
        let revoked = deadlines.pop_back().is_some();
        if deadlines.is_empty() {
            entries.remove(key);
        }
        revoked
    }

    /// Remove every expired expectation, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.lock().retain(|_, deadlines| {
            let before = deadlines.len();
            deadlines.retain(|deadline| *deadline > now);
            removed += before - deadlines.len();
            !deadlines.is_empty()
        });
        if removed > 0 {
            tracing::trace!("Swept {} expired echo expectations", removed);
        }
        removed
    }

    /// Number of expectations still pending (expired ones included until swept)
    pub fn pending(&self) -> usize {
        self.entries.lock().values().map(VecDeque::len).sum()
    }
}
