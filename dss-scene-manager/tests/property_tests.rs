//! Property-based tests for registry identity, echo accounting and the
//! discovery status vector.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use dss_scene_manager::{
    DeviceId, DiscoveryPhase, DiscoveryStatus, EchoKey, EchoSuppressor, EventKind, PhaseStatus,
    Scene, SceneId, SceneNumber, SceneRegistry,
};

fn phase_status() -> impl Strategy<Value = PhaseStatus> {
    prop_oneof![
        Just(PhaseStatus::NotStarted),
        Just(PhaseStatus::InProgress),
        Just(PhaseStatus::Succeeded),
        Just(PhaseStatus::Failed),
    ]
}

fn status_from(phases: &[PhaseStatus; 4]) -> DiscoveryStatus {
    let mut status = DiscoveryStatus::new();
    for (phase, value) in DiscoveryPhase::ALL.into_iter().zip(phases.iter()) {
        status.set(phase, *value);
    }
    status
}

proptest! {
    #[test]
    fn get_always_returns_the_same_instance(ids in prop::collection::vec("[a-z0-9-]{1,8}", 1..20)) {
        let registry = SceneRegistry::new();
        let first: Vec<Arc<Scene>> = ids.iter().map(|id| registry.get(&SceneId::new(id.as_str()))).collect();
        let second: Vec<Arc<Scene>> = ids.iter().map(|id| registry.get(&SceneId::new(id.as_str()))).collect();

        for (a, b) in first.iter().zip(second.iter()) {
            prop_assert!(Arc::ptr_eq(a, b));
        }
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(registry.len(), unique.len());
    }

    #[test]
    fn scenes_generated_iff_no_phase_pending(phases in prop::array::uniform4(phase_status())) {
        let status = status_from(&phases);
        let pending = phases
            .iter()
            .any(|p| matches!(p, PhaseStatus::NotStarted | PhaseStatus::InProgress));
        prop_assert_eq!(status.all_terminal(), !pending);
    }

    #[test]
    fn status_vector_matches_phase_flags(phases in prop::array::uniform4(phase_status())) {
        let status = status_from(&phases);
        let vector = status.to_vector();
        for (i, phase) in phases.iter().enumerate() {
            let expected = match phase {
                PhaseStatus::NotStarted | PhaseStatus::InProgress => '0',
                PhaseStatus::Succeeded => '1',
                PhaseStatus::Failed => '2',
            };
            prop_assert_eq!(vector[i], expected);
        }
        prop_assert_eq!(status.to_string().len(), 4);
    }

    #[test]
    fn each_expectation_is_consumed_once(expected in 0usize..10, scene in 0u8..64) {
        let echo = EchoSuppressor::new(Duration::from_secs(60));
        let key = EchoKey::device(DeviceId::new("dev1"), SceneNumber::new(scene), EventKind::Call);
        for _ in 0..expected {
            echo.expect(key.clone());
        }

        let consumed = (0..expected + 3).filter(|_| echo.check(&key)).count();
        prop_assert_eq!(consumed, expected);
        prop_assert_eq!(echo.pending(), 0);
    }
}
