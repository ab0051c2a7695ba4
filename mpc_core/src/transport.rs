// Party-To-Party Transport
// ========================
// The engine does not ship bytes itself. It talks to one handler per remote
// party, installed on the registry before the online phase starts.

use std::sync::mpsc::Sender;

use crate::error::{EngineError, Result};

/// Delivers a message to one remote party. Implementations own their
/// connection state and must be safe to share between evaluator threads.
pub trait TransportHandler: Send + Sync {
    fn send_message(&self, payload: Vec<u8>) -> Result<()>;
}

/// A transport handler backed by an in-process channel. Used by the demo
/// driver and the tests to wire simulated parties together.
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl TransportHandler for ChannelTransport {
    fn send_message(&self, payload: Vec<u8>) -> Result<()> {
        self.tx.send(payload).map_err(|_| {
            EngineError::TransportFailure("receiving side of the channel is gone".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_channel_transport_delivers() {
        let (tx, rx) = channel();
        let transport = ChannelTransport::new(tx);
        transport.send_message(vec![1, 2, 3]).unwrap();
        assert_eq!(rx.recv().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_channel_transport_reports_closed_channel() {
        let (tx, rx) = channel();
        drop(rx);
        let transport = ChannelTransport::new(tx);
        let err = transport.send_message(vec![0]).unwrap_err();
        assert!(matches!(err, EngineError::TransportFailure(_)));
    }
}
