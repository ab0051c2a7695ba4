// Oblivious-Transfer Interface
// ============================
// What the engine consumes from an additively correlated OT (AC-OT)
// provider. For each transfer the sender picks a correlation `c`, ends up
// with a random mask `m`, and the receiver ends up with `m + c` or `m`
// depending on its choice bit. All values are bit strings of exactly the
// vector length given at registration, little-endian bit order.

use helpers::bits::BitString;

use crate::error::Result;

/// Registers batched AC-OTs against remote parties. Registration happens
/// in the pre-setup phase; both sides of a party pair must register in the
/// identical order or the handles will not match up.
pub trait OtProvider: Send {
    fn register_send(
        &mut self,
        peer_id: usize,
        bit_length: usize,
        message_count: usize,
    ) -> Result<Box<dyn AcOtSender>>;

    fn register_receive(
        &mut self,
        peer_id: usize,
        bit_length: usize,
        message_count: usize,
    ) -> Result<Box<dyn AcOtReceiver>>;
}

/// Sender side of one batched AC-OT.
pub trait AcOtSender: Send + std::fmt::Debug {
    /// Sets the additive correlations, one bit string per transfer.
    fn set_inputs(&mut self, correlations: Vec<BitString>) -> Result<()>;

    /// Drives the sender's message flow to completion.
    fn send_messages(&mut self) -> Result<()>;

    /// The sender's random masks, available after `send_messages`.
    fn outputs(&mut self) -> Result<Vec<BitString>>;
}

/// Receiver side of one batched AC-OT.
pub trait AcOtReceiver: Send {
    /// Sets the choice bits, one per transfer.
    fn set_choices(&mut self, choices: BitString) -> Result<()>;

    /// Sends the receiver's corrections derived from its choices.
    fn send_corrections(&mut self) -> Result<()>;

    /// Per transfer: `mask + correlation` when the choice bit was set,
    /// plain `mask` otherwise. May block until the peer has sent.
    fn outputs(&mut self) -> Result<Vec<BitString>>;
}
