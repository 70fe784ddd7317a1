//! Per-listener notification queues
//!
//! Each listener gets a bounded queue drained by a dedicated thread. Posting
//! never blocks: when a listener falls behind and its queue is full, further
//! notifications for it are dropped and logged.

use std::io;
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread;

pub(crate) struct ListenerQueue<N: Send + 'static> {
    tx: SyncSender<N>,
    label: String,
}

impl<N: Send + 'static> ListenerQueue<N> {
    /// Spawn the dispatch thread; `handler` runs once per notification
    pub(crate) fn spawn<F>(label: impl Into<String>, capacity: usize, mut handler: F) -> io::Result<Self>
    where
        F: FnMut(N) + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = mpsc::sync_channel::<N>(capacity);

        let thread_label = label.clone();
        thread::Builder::new().name(label.clone()).spawn(move || {
            for notification in rx {
                handler(notification);
            }
            tracing::trace!("Listener queue {} closed", thread_label);
        })?;

        Ok(Self { tx, label })
    }

    /// Queue a notification without blocking
    pub(crate) fn post(&self, notification: N) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Listener queue {} is full, dropping notification", self.label);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Listener queue {} has no dispatch thread", self.label);
                false
            }
        }
    }
}
