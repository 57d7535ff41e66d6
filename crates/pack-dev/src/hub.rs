//! Fan-out of hot-update messages to connected clients.

use pack_core::{HmrMessage, HotUpdateSink};
use tokio::sync::broadcast;

/// Messages buffered per client before it counts as lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Broadcast hub shared by the rebuild worker and every socket.
#[derive(Debug, Clone)]
pub struct HmrHub {
    tx: broadcast::Sender<HmrMessage>,
}

impl Default for HmrHub {
    fn default() -> Self {
        Self::new()
    }
}

impl HmrHub {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Receive every message sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.tx.subscribe()
    }

    /// Number of connected clients.
    #[must_use]
    pub fn clients(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl HotUpdateSink for HmrHub {
    fn send(&self, message: &HmrMessage) {
        // No clients is not an error
        let _ = self.tx.send(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_reaches_every_subscriber() {
        let hub = HmrHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.clone().subscribe();
        assert_eq!(hub.clients(), 2);

        hub.send(&HmrMessage::Reload);
        assert_eq!(a.try_recv().unwrap(), HmrMessage::Reload);
        assert_eq!(b.try_recv().unwrap(), HmrMessage::Reload);
    }

    #[test]
    fn test_send_without_clients() {
        let hub = HmrHub::new();
        hub.send(&HmrMessage::Connected);
        assert_eq!(hub.clients(), 0);
    }
}
