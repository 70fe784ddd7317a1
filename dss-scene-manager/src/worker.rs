//! Background intake worker
//!
//! Receives transport messages on a dedicated thread, feeds events to the
//! activation engine and periodically sweeps expired echo expectations.
//! The parent [`SceneManager`](crate::SceneManager) controls it through a
//! command channel.

use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::activation::SceneActivationEngine;
use crate::echo::EchoSuppressor;
use crate::hub::ListenerHub;
use crate::listener::ManagerState;
use crate::transport::TransportMessage;

/// Commands sent from the SceneManager to the intake worker
#[derive(Debug)]
pub enum IntakeCommand {
    /// Shutdown the worker
    Shutdown,
}

/// Everything the intake loop works on
pub(crate) struct IntakeContext {
    pub engine: Arc<SceneActivationEngine>,
    pub echo: Arc<EchoSuppressor>,
    pub hub: Arc<ListenerHub>,
    pub sweep_interval: Duration,
}

/// Spawns the intake worker thread
pub(crate) fn spawn_intake_worker(
    context: IntakeContext,
    messages: mpsc::Receiver<TransportMessage>,
    command_rx: mpsc::Receiver<IntakeCommand>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("dss-intake".to_string())
        .spawn(move || run_intake_loop(context, messages, command_rx))
}

/// Why the intake loop stopped
#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Shutdown,
    Fault(String),
    StreamClosed,
}

fn run_intake_loop(
    context: IntakeContext,
    messages: mpsc::Receiver<TransportMessage>,
    command_rx: mpsc::Receiver<IntakeCommand>,
) {
    tracing::info!("Intake worker started");
    let mut last_sweep = Instant::now();

    let exit = loop {
        match command_rx.try_recv() {
            Ok(IntakeCommand::Shutdown) => break Exit::Shutdown,
            Err(TryRecvError::Disconnected) => break Exit::Shutdown,
            Err(TryRecvError::Empty) => {}
        }

        match messages.recv_timeout(context.sweep_interval) {
            Ok(TransportMessage::Event(event)) => {
                tracing::trace!("Received {}", event);
                context.engine.handle_event(&event);
            }
            Ok(TransportMessage::Fault(reason)) => break Exit::Fault(reason),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break Exit::StreamClosed,
        }

        if last_sweep.elapsed() >= context.sweep_interval {
            context.echo.sweep();
            last_sweep = Instant::now();
        }
    };

    match exit {
        Exit::Shutdown => tracing::info!("Intake worker received shutdown command"),
        Exit::Fault(reason) => {
            tracing::error!("Event transport failed: {}", reason);
            context
                .hub
                .transition(&[ManagerState::Starting, ManagerState::Running], ManagerState::Error);
        }
        Exit::StreamClosed => {
            // Closing the stream is expected while stopping
            if context
                .hub
                .transition(&[ManagerState::Starting, ManagerState::Running], ManagerState::Error)
            {
                tracing::error!("Event stream closed unexpectedly");
            }
        }
    }
    tracing::info!("Intake worker shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InMemoryDeviceRegistry;
    use crate::echo::EchoKey;
    use crate::registry::SceneRegistry;
    use crate::transport::LoopbackTransport;
    use dss_protocol::{DeviceId, EventKind, SceneNumber};

    fn context(hub: Arc<ListenerHub>, echo: Arc<EchoSuppressor>) -> IntakeContext {
        let engine = SceneActivationEngine::new(
            Arc::new(SceneRegistry::new()),
            Arc::clone(&echo),
            Arc::clone(&hub),
            Arc::new(InMemoryDeviceRegistry::new()),
            Arc::new(LoopbackTransport::new()),
        );
        IntakeContext {
            engine: Arc::new(engine),
            echo,
            hub,
            sweep_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_shutdown_command_stops_worker() {
        let hub = Arc::new(ListenerHub::new(4));
        hub.set_state(ManagerState::Running);
        let echo = Arc::new(EchoSuppressor::new(Duration::from_secs(5)));
        let (_msg_tx, msg_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();

        let handle = spawn_intake_worker(context(Arc::clone(&hub), echo), msg_rx, cmd_rx).unwrap();
        cmd_tx.send(IntakeCommand::Shutdown).unwrap();
        handle.join().unwrap();
        assert_eq!(hub.state(), ManagerState::Running);
    }

    #[test]
    fn test_fault_moves_to_error() {
        let hub = Arc::new(ListenerHub::new(4));
        hub.set_state(ManagerState::Running);
        let echo = Arc::new(EchoSuppressor::new(Duration::from_secs(5)));
        let (msg_tx, msg_rx) = mpsc::channel();
        let (_cmd_tx, cmd_rx) = mpsc::channel();

        let handle = spawn_intake_worker(context(Arc::clone(&hub), echo), msg_rx, cmd_rx).unwrap();
        msg_tx.send(TransportMessage::Fault("bus reset".to_string())).unwrap();
        handle.join().unwrap();
        assert_eq!(hub.state(), ManagerState::Error);
    }

    #[test]
    fn test_closed_stream_while_stopping_is_not_an_error() {
        let hub = Arc::new(ListenerHub::new(4));
        hub.set_state(ManagerState::Stopping);
        let echo = Arc::new(EchoSuppressor::new(Duration::from_secs(5)));
        let (msg_tx, msg_rx) = mpsc::channel::<TransportMessage>();
        let (_cmd_tx, cmd_rx) = mpsc::channel();

        let handle = spawn_intake_worker(context(Arc::clone(&hub), echo), msg_rx, cmd_rx).unwrap();
        drop(msg_tx);
        handle.join().unwrap();
        assert_eq!(hub.state(), ManagerState::Stopping);
    }

    #[test]
    fn test_sweeps_expired_echoes() {
        let hub = Arc::new(ListenerHub::new(4));
        let echo = Arc::new(EchoSuppressor::new(Duration::from_millis(5)));
        echo.expect(EchoKey::device(DeviceId::new("dev1"), SceneNumber::new(5), EventKind::Call));
        let (_msg_tx, msg_rx) = mpsc::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel();

        let handle = spawn_intake_worker(context(hub, Arc::clone(&echo)), msg_rx, cmd_rx).unwrap();
        thread::sleep(Duration::from_millis(100));
        cmd_tx.send(IntakeCommand::Shutdown).unwrap();
        handle.join().unwrap();
        assert_eq!(echo.pending(), 0);
    }
}
