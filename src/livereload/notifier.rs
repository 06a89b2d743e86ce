//! Reload signal fan-out.
//!
//! A [`Notifier`] is the bridge between the external rebuild watcher and
//! the connected browsers: the watcher calls [`Notifier::broadcast`] when
//! a rebuild completes, and every currently connected [`Listener`]
//! observes the signal. Delivery is fan-out over a bounded broadcast
//! channel: one slow or vanished listener never blocks the broadcaster or
//! its peers.

use tokio::sync::broadcast;
use tracing::debug;

/// Queued-signal headroom per listener. A dev-loop browser only ever
/// needs the latest signal, so lag just collapses into one reload.
const SIGNAL_BUFFER: usize = 16;

/// Broadcasts "reload now" to every connected listener.
///
/// Cheap to clone; clones share the listener registry. Hand one clone to
/// the rebuild event source and another to
/// [`livereload::filter`](crate::livereload::filter).
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<()>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_BUFFER);
        Self { tx }
    }

    /// Registers a new long-lived listener. Dropping the returned
    /// [`Listener`] disconnects it.
    pub fn connect(&self) -> Listener {
        debug!(listeners = self.tx.receiver_count() + 1, "reload listener connected");
        Listener { rx: self.tx.subscribe() }
    }

    /// Signals every currently connected listener. Never blocks: the
    /// channel buffers per listener, and with no listeners the signal is
    /// dropped and logged.
    pub fn broadcast(&self) {
        match self.tx.send(()) {
            Ok(listeners) => debug!(listeners, "reload signal sent"),
            Err(_) => debug!("reload signal dropped, no listeners connected"),
        }
    }

    /// Number of currently connected listeners.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// One connected browser waiting for a reload signal.
pub struct Listener {
    rx: broadcast::Receiver<()>,
}

impl Listener {
    /// Waits for the next reload signal. Returns `false` only when every
    /// [`Notifier`] clone has been dropped. A lagged listener missed
    /// signals, which still means reload, so lag reports `true`.
    pub async fn recv(&mut self) -> bool {
        match self.rx.recv().await {
            Ok(()) => true,
            Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }
}
