// Loopback Oblivious Transfer
// ===========================
// An insecure, in-process AC-OT exchange for simulated multi-party runs:
// all parties share one hub, and each matching register_send /
// register_receive pair is wired through a mailbox. The sender deposits
// (mask, correlation) pairs, the receiver blocks until delivery and
// derives its outputs from its choice bits. No bytes leave the process
// and nothing is hidden from anybody, which is exactly what the demo
// driver and the protocol tests need.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use helpers::bits::BitString;

use crate::error::{EngineError, Result};
use crate::ot::{AcOtReceiver, AcOtSender, OtProvider};

/// Keeps the low `bits` bits of `value`.
fn truncate(value: u128, bits: usize) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}

/// (sending party, receiving party, registration index on that pair)
type MailboxKey = (usize, usize, usize);

#[derive(Default)]
struct Mailbox {
    /// One (mask, correlation) pair per transfer, truncated to the vector
    /// length, set exactly once by the sender.
    payload: Mutex<Option<Vec<(u128, u128)>>>,
    delivered: Condvar,
}

/// Connects the loopback providers of all simulated parties.
#[derive(Default)]
pub struct LoopbackOtHub {
    mailboxes: Mutex<HashMap<MailboxKey, Arc<Mailbox>>>,
}

impl LoopbackOtHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The OT provider for one party of the simulated run.
    pub fn provider(self: &Arc<Self>, my_id: usize) -> LoopbackOtProvider {
        LoopbackOtProvider {
            hub: Arc::clone(self),
            my_id,
            send_registrations: HashMap::new(),
            receive_registrations: HashMap::new(),
        }
    }

    fn mailbox(&self, key: MailboxKey) -> Arc<Mailbox> {
        let mut mailboxes = self.mailboxes.lock().expect("mailbox table lock poisoned");
        Arc::clone(mailboxes.entry(key).or_default())
    }
}

pub struct LoopbackOtProvider {
    hub: Arc<LoopbackOtHub>,
    my_id: usize,
    /// Registration counters per peer; both sides counting in lock-step is
    /// what pairs a sender handle with its receiver handle.
    send_registrations: HashMap<usize, usize>,
    receive_registrations: HashMap<usize, usize>,
}

impl LoopbackOtProvider {
    fn check_registration(&self, peer_id: usize, bit_length: usize) -> Result<()> {
        if peer_id == self.my_id {
            return Err(EngineError::InvalidArgument(format!(
                "cannot run an oblivious transfer with ourselves, party {peer_id}"
            )));
        }
        if bit_length == 0 || bit_length > 128 {
            return Err(EngineError::InvalidArgument(format!(
                "unsupported transfer vector length {bit_length}"
            )));
        }
        Ok(())
    }
}

impl OtProvider for LoopbackOtProvider {
    fn register_send(
        &mut self,
        peer_id: usize,
        bit_length: usize,
        message_count: usize,
    ) -> Result<Box<dyn AcOtSender>> {
        self.check_registration(peer_id, bit_length)?;
        let counter = self.send_registrations.entry(peer_id).or_insert(0);
        let index = *counter;
        *counter += 1;
        Ok(Box::new(LoopbackSender {
            mailbox: self.hub.mailbox((self.my_id, peer_id, index)),
            bit_length,
            message_count,
            correlations: None,
            masks: None,
            rng: ChaCha20Rng::from_os_rng(),
        }))
    }

    fn register_receive(
        &mut self,
        peer_id: usize,
        bit_length: usize,
        message_count: usize,
    ) -> Result<Box<dyn AcOtReceiver>> {
        self.check_registration(peer_id, bit_length)?;
        let counter = self.receive_registrations.entry(peer_id).or_insert(0);
        let index = *counter;
        *counter += 1;
        Ok(Box::new(LoopbackReceiver {
            mailbox: self.hub.mailbox((peer_id, self.my_id, index)),
            bit_length,
            message_count,
            choices: None,
            corrections_sent: false,
        }))
    }
}

struct LoopbackSender {
    mailbox: Arc<Mailbox>,
    bit_length: usize,
    message_count: usize,
    correlations: Option<Vec<u128>>,
    masks: Option<Vec<u128>>,
    rng: ChaCha20Rng,
}

impl std::fmt::Debug for LoopbackSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSender")
            .field("bit_length", &self.bit_length)
            .field("message_count", &self.message_count)
            .finish()
    }
}

impl AcOtSender for LoopbackSender {
    fn set_inputs(&mut self, correlations: Vec<BitString>) -> Result<()> {
        if correlations.len() != self.message_count {
            return Err(EngineError::ProtocolViolation(format!(
                "expected {} sender inputs, got {}",
                self.message_count,
                correlations.len()
            )));
        }
        if correlations.iter().any(|c| c.len() != self.bit_length) {
            return Err(EngineError::ProtocolViolation(format!(
                "sender inputs must be {} bits wide",
                self.bit_length
            )));
        }
        self.correlations = Some(correlations.iter().map(BitString::to_u128).collect());
        Ok(())
    }

    fn send_messages(&mut self) -> Result<()> {
        let correlations = self.correlations.as_ref().ok_or_else(|| {
            EngineError::ProtocolViolation(
                "sender inputs were not set before send_messages".to_string(),
            )
        })?;
        let masks: Vec<u128> = (0..self.message_count)
            .map(|_| truncate(self.rng.random::<u128>(), self.bit_length))
            .collect();
        let payload = masks
            .iter()
            .zip(correlations)
            .map(|(&mask, &correlation)| (mask, correlation))
            .collect();
        *self
            .mailbox
            .payload
            .lock()
            .expect("loopback mailbox lock poisoned") = Some(payload);
        self.mailbox.delivered.notify_all();
        self.masks = Some(masks);
        Ok(())
    }

    fn outputs(&mut self) -> Result<Vec<BitString>> {
        let masks = self.masks.as_ref().ok_or_else(|| {
            EngineError::ProtocolViolation(
                "send_messages must run before the sender outputs are read".to_string(),
            )
        })?;
        Ok(masks
            .iter()
            .map(|&mask| BitString::from_u128(mask, self.bit_length))
            .collect())
    }
}

struct LoopbackReceiver {
    mailbox: Arc<Mailbox>,
    bit_length: usize,
    message_count: usize,
    choices: Option<BitString>,
    corrections_sent: bool,
}

impl AcOtReceiver for LoopbackReceiver {
    fn set_choices(&mut self, choices: BitString) -> Result<()> {
        if choices.len() != self.message_count {
            return Err(EngineError::ProtocolViolation(format!(
                "expected {} choice bits, got {}",
                self.message_count,
                choices.len()
            )));
        }
        self.choices = Some(choices);
        Ok(())
    }

    fn send_corrections(&mut self) -> Result<()> {
        if self.choices.is_none() {
            return Err(EngineError::ProtocolViolation(
                "choices were not set before send_corrections".to_string(),
            ));
        }
        self.corrections_sent = true;
        Ok(())
    }

    fn outputs(&mut self) -> Result<Vec<BitString>> {
        if !self.corrections_sent {
            return Err(EngineError::ProtocolViolation(
                "send_corrections must run before the receiver outputs are read".to_string(),
            ));
        }
        let choices = self.choices.as_ref().ok_or_else(|| {
            EngineError::ProtocolViolation("receiver choices are missing".to_string())
        })?;

        let mut payload = self
            .mailbox
            .payload
            .lock()
            .expect("loopback mailbox lock poisoned");
        while payload.is_none() {
            payload = self
                .mailbox
                .delivered
                .wait(payload)
                .expect("loopback mailbox lock poisoned");
        }
        let pairs = payload.clone().unwrap_or_default();
        if pairs.len() != self.message_count {
            return Err(EngineError::ProtocolViolation(format!(
                "peer delivered {} transfers, expected {}",
                pairs.len(),
                self.message_count
            )));
        }

        Ok(pairs
            .iter()
            .enumerate()
            .map(|(i, &(mask, correlation))| {
                let value = if choices.bit(i) {
                    truncate(mask.wrapping_add(correlation), self.bit_length)
                } else {
                    mask
                };
                BitString::from_u128(value, self.bit_length)
            })
            .collect())
    }
}
