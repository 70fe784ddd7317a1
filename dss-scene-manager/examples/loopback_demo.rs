//! Loopback Demo - runs the scene manager against an in-process bus
//!
//! This example shows:
//! - Scene discovery with a static scene source
//! - Local scene calls whose echoes are suppressed
//! - External events reaching scene and device listeners
//!
//! Run with: cargo run -p dss-scene-manager --example loopback_demo
//! Set DSS_LOG_MODE=debug for verbose output.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dss_scene_manager::logging::init_logging_from_env;
use dss_scene_manager::prelude::*;
use dss_scene_manager::Device;

struct PrintingListener(SceneListenerId);

impl SceneStatusListener for PrintingListener {
    fn listener_id(&self) -> SceneListenerId {
        self.0.clone()
    }

    fn on_scene_state_changed(&self, scene: &SceneSnapshot, active: bool) {
        println!("  scene {} is now {}", scene.id, if active { "active" } else { "inactive" });
    }

    fn on_scene_added(&self, scene: &SceneSnapshot) {
        let name = scene.name.as_deref().unwrap_or("-");
        println!("  discovered {} ({:?}, name: {})", scene.id, scene.scope, name);
    }

    fn on_discovery_status(&self, status: &DiscoveryStatus) {
        println!("  discovery status {}", status);
    }
}

struct PrintingDeviceListener(DeviceId);

impl DeviceSceneListener for PrintingDeviceListener {
    fn device_id(&self) -> DeviceId {
        self.0.clone()
    }

    fn on_device_scene(&self, event: &SceneEvent) {
        println!("  device event: {}", event);
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    println!("=== dss-scene loopback demo ===\n");

    let source = StaticSceneSource::new()
        .with_scene(
            DiscoveryPhase::Named,
            DiscoveredScene::new(ZoneId::new(3), GroupId::new(1), SceneNumber::new(17)).named("Dinner"),
        )
        .with_scene(
            DiscoveryPhase::Apartment,
            DiscoveredScene::new(ZoneId::APARTMENT, GroupId::BROADCAST, SceneNumber::new(72)),
        )
        .with_scene(
            DiscoveryPhase::Zone,
            DiscoveredScene::new(ZoneId::new(3), GroupId::BROADCAST, SceneNumber::new(5)),
        )
        .with_delay(DiscoveryPhase::Group, Duration::from_millis(100));

    let transport = Arc::new(LoopbackTransport::with_echo());
    let devices = Arc::new(InMemoryDeviceRegistry::new());
    devices.insert(Device::new("3504175fe0000000000012ab").with_name("Ceiling light"));

    let manager = SceneManager::new(
        SceneManagerConfig::default(),
        Arc::clone(&transport) as _,
        Arc::clone(&devices) as _,
        Arc::new(source),
    )?;

    manager.register_scene_listener(Arc::new(PrintingListener(SceneListenerId::Discovery)))?;
    manager.register_scene_listener(Arc::new(PrintingListener(SceneListenerId::Scene(
        SceneId::new("3-1-17"),
    ))))?;
    let light = DeviceId::new("3504175fe0000000000012ab");
    manager.register_device_listener(Arc::new(PrintingDeviceListener(light.clone())))?;

    manager.start()?;
    println!("Manager {}", manager.manager_state());

    println!("\nRunning discovery...");
    manager.generate_scenes();
    while !manager.scenes_generated() {
        thread::sleep(Duration::from_millis(20));
    }
    println!("Known scenes: {}", manager.scenes().len());

    println!("\nCalling scene 3-1-17 locally (echo is suppressed)...");
    println!("  outcome: {:?}", manager.call_scene_by_id(&SceneId::new("3-1-17")));
    thread::sleep(Duration::from_millis(100));

    println!("\nSomeone presses a wall switch...");
    transport.inject(SceneEvent::device(light.clone(), SceneNumber::new(5), EventKind::Call));
    transport.inject(SceneEvent::zone(ZoneId::new(3), GroupId::new(1), SceneNumber::new(17), EventKind::Undo));
    thread::sleep(Duration::from_millis(100));

    println!("\nUndo on the light:");
    println!("  outcome: {:?}", manager.undo_device_scene(&light));

    manager.stop();
    println!("\nManager {}", manager.manager_state());
    Ok(())
}
