//! Event transport collaborator
//!
//! The transport delivers scene events from the bus and accepts outgoing
//! scene commands. [`LoopbackTransport`] is an in-process implementation
//! used for simulations and tests.

use std::sync::mpsc;

use parking_lot::Mutex;
use thiserror::Error;

use dss_protocol::{SceneCommand, SceneEvent};

/// Something the transport hands to the intake worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Event(SceneEvent),
    /// The connection failed; the manager moves to its error state
    Fault(String),
}

/// Errors raised by an [`EventTransport`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport is not running")]
    NotRunning,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Command rejected: {0}")]
    Rejected(String),
}

/// Source of scene events and sink for scene commands
#[cfg_attr(test, mockall::automock)]
pub trait EventTransport: Send + Sync {
    /// Open the event stream
    ///
    /// Dropping every sender of the returned channel signals the end of the
    /// stream.
    fn start(&self) -> Result<mpsc::Receiver<TransportMessage>, TransportError>;

    fn stop(&self);

    /// Put a command on the bus
    fn issue_command(&self, command: &SceneCommand) -> Result<(), TransportError>;
}

/// Channel-backed transport
///
/// Events are injected with [`inject`](Self::inject). When built with
/// [`with_echo`](Self::with_echo), every issued command is reported back as
/// the event the bus would produce for it.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    sender: Mutex<Option<mpsc::Sender<TransportMessage>>>,
    issued: Mutex<Vec<SceneCommand>>,
    echo_commands: bool,
    refuse_start: Mutex<Option<String>>,
    reject_commands: Mutex<Option<String>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo issued commands back as events
    pub fn with_echo() -> Self {
        Self {
            echo_commands: true,
            ..Self::default()
        }
    }

    /// Make the next `start` calls fail, or succeed again with `None`
    pub fn refuse_start(&self, reason: Option<String>) {
        *self.refuse_start.lock() = reason;
    }

    /// Make `issue_command` fail, or succeed again with `None`
    pub fn reject_commands(&self, reason: Option<String>) {
        *self.reject_commands.lock() = reason;
    }

    /// Deliver an event as if it came from the bus
    ///
    /// Returns `false` when the transport is not running.
    pub fn inject(&self, event: SceneEvent) -> bool {
        self.send(TransportMessage::Event(event))
    }

    /// Report a connection failure and close the stream
    pub fn fault(&self, reason: impl Into<String>) -> bool {
        let sent = self.send(TransportMessage::Fault(reason.into()));
        self.sender.lock().take();
        sent
    }

    /// Commands issued so far, oldest first
    pub fn issued_commands(&self) -> Vec<SceneCommand> {
        self.issued.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    fn send(&self, message: TransportMessage) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => {
                tracing::debug!("Loopback transport not running, dropping {:?}", message);
                false
            }
        }
    }
}

impl EventTransport for LoopbackTransport {
    fn start(&self) -> Result<mpsc::Receiver<TransportMessage>, TransportError> {
        if let Some(reason) = self.refuse_start.lock().clone() {
            return Err(TransportError::Connection(reason));
        }
        let (tx, rx) = mpsc::channel();
        if self.sender.lock().replace(tx).is_some() {
            tracing::debug!("Loopback transport restarted, previous stream closed");
        }
        Ok(rx)
    }

    fn stop(&self) {
        self.sender.lock().take();
    }

    fn issue_command(&self, command: &SceneCommand) -> Result<(), TransportError> {
        if let Some(reason) = self.reject_commands.lock().clone() {
            return Err(TransportError::Rejected(reason));
        }
        self.issued.lock().push(command.clone());
        tracing::trace!("Issued {}", command);

        if self.echo_commands {
            self.send(TransportMessage::Event(command.echo_event()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_protocol::{DeviceId, EventKind, SceneNumber};

    fn device_call() -> SceneCommand {
        SceneCommand::CallDeviceScene {
            device: DeviceId::new("dev1"),
            scene: SceneNumber::new(5),
        }
    }

    #[test]
    fn test_inject_requires_running_transport() {
        let transport = LoopbackTransport::new();
        let event = SceneEvent::device(DeviceId::new("dev1"), SceneNumber::new(5), EventKind::Call);
        assert!(!transport.inject(event.clone()));

        let rx = transport.start().unwrap();
        assert!(transport.inject(event.clone()));
        assert_eq!(rx.recv().unwrap(), TransportMessage::Event(event));
    }

    #[test]
    fn test_echo_reports_issued_commands() {
        let transport = LoopbackTransport::with_echo();
        let rx = transport.start().unwrap();

        transport.issue_command(&device_call()).unwrap();
        assert_eq!(transport.issued_commands(), vec![device_call()]);
        assert_eq!(rx.recv().unwrap(), TransportMessage::Event(device_call().echo_event()));
    }

    #[test]
    fn test_stop_closes_stream() {
        let transport = LoopbackTransport::new();
        let rx = transport.start().unwrap();
        transport.stop();
        assert!(!transport.is_running());
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_fault_is_delivered_then_stream_closes() {
        let transport = LoopbackTransport::new();
        let rx = transport.start().unwrap();
        assert!(transport.fault("bus reset"));
        assert_eq!(rx.recv().unwrap(), TransportMessage::Fault("bus reset".to_string()));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_scripted_failures() {
        let transport = LoopbackTransport::new();
        transport.refuse_start(Some("no route".to_string()));
        assert_eq!(
            transport.start().unwrap_err(),
            TransportError::Connection("no route".to_string())
        );
        transport.refuse_start(None);
        assert!(transport.start().is_ok());

        transport.reject_commands(Some("busy".to_string()));
        assert!(transport.issue_command(&device_call()).is_err());
        assert!(transport.issued_commands().is_empty());
    }
}
