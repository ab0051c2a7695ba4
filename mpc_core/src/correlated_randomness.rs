// Square-Pair Correlated Randomness
// =================================
// Precomputes additive shares of pairs (a, a*a) between all parties, for
// machine-word widths of 8 to 128 bits. Multiplication of the locally
// sampled shares is reduced to additively correlated OTs: for each bit of
// the receiver's share, the sender offers its own share shifted by that
// bit position, so the per-bit outputs sum to the cross product of the two
// shares. Pairs are consumed by square gates during the online phase.
//
// Two-phase lifecycle: `pre_setup` registers all OTs (request accounting
// is frozen from then on), `setup` drives them to completion, folds the
// outputs into the `c` vectors and signals readiness through a waitable
// completion condition.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use helpers::bits::BitString;
use helpers::words::SpWord;

use crate::error::{EngineError, Result};
use crate::ot::{AcOtReceiver, AcOtSender, OtProvider};
use crate::stats::{Phase, RunTimeStats};
use crate::sync::Completion;

/// Maximum number of square pairs folded into one OT batch. Must be
/// identical on all parties.
pub const MAX_BATCH: usize = 128;

/// Additive shares of square pairs of one width: `a[i]` is this party's
/// share of a random value, `c[i]` its share of that value's square.
#[derive(Debug, Clone, Default)]
pub struct SquarePairs<T> {
    requested: usize,
    a: Vec<T>,
    c: Vec<T>,
}

impl<T: SpWord> SquarePairs<T> {
    pub fn a(&self) -> &[T] {
        &self.a
    }

    pub fn c(&self) -> &[T] {
        &self.c
    }

    pub fn len(&self) -> usize {
        self.requested
    }

    pub fn is_empty(&self) -> bool {
        self.requested == 0
    }
}

/// One batch of square pairs per supported width.
#[derive(Debug, Default)]
pub struct SquarePairStore {
    w8: SquarePairs<u8>,
    w16: SquarePairs<u16>,
    w32: SquarePairs<u32>,
    w64: SquarePairs<u64>,
    w128: SquarePairs<u128>,
}

/// Selects the store batch belonging to a word width.
pub trait SpElement: SpWord {
    fn pairs(store: &SquarePairStore) -> &SquarePairs<Self>;
    fn pairs_mut(store: &mut SquarePairStore) -> &mut SquarePairs<Self>;
}

macro_rules! impl_sp_element {
    ($($ty:ty => $field:ident),*) => {$(
        impl SpElement for $ty {
            fn pairs(store: &SquarePairStore) -> &SquarePairs<Self> {
                &store.$field
            }

            fn pairs_mut(store: &mut SquarePairStore) -> &mut SquarePairs<Self> {
                &mut store.$field
            }
        }
    )*};
}

impl_sp_element!(u8 => w8, u16 => w16, u32 => w32, u64 => w64, u128 => w128);

/// Two-phase provider of square-pair correlated randomness.
pub trait SpProvider {
    /// Whether any square pairs were requested at all.
    fn need_sps(&self) -> bool;

    /// Registers the OTs backing the requested pairs.
    fn pre_setup(&mut self) -> Result<()>;

    /// Drives the OTs to completion, derives the `c` shares and signals
    /// the completion condition.
    fn setup(&mut self) -> Result<()>;

    /// The condition online-phase threads wait on. Only signalled when
    /// `need_sps()` holds; callers must check that first.
    fn completion(&self) -> Completion;
}

#[derive(Default)]
struct PeerOts {
    senders: VecDeque<Box<dyn AcOtSender>>,
    receivers: VecDeque<Box<dyn AcOtReceiver>>,
}

/// Square-pair provider on top of a batched AC-OT provider.
///
/// Towards parties with a lower id the local party plays the OT sender,
/// towards parties with a higher id the receiver. Handles are registered
/// and consumed in a fixed order (peer by peer, widths ascending, batches
/// in index order) which all parties must share for the pairs to match up.
pub struct SpProviderFromOts {
    my_id: usize,
    num_parties: usize,
    store: SquarePairStore,
    peers: Vec<PeerOts>,
    ot: Box<dyn OtProvider>,
    rng: ChaCha20Rng,
    stats: Arc<Mutex<RunTimeStats>>,
    completion: Completion,
    ots_registered: bool,
}

impl SpProviderFromOts {
    pub fn new(
        my_id: usize,
        num_parties: usize,
        ot: Box<dyn OtProvider>,
        stats: Arc<Mutex<RunTimeStats>>,
    ) -> Result<Self> {
        Self::with_rng(my_id, num_parties, ot, stats, ChaCha20Rng::from_os_rng())
    }

    /// Like `new` but with a caller-provided share RNG, so a simulated run
    /// can be reproduced from a seed.
    pub fn with_rng(
        my_id: usize,
        num_parties: usize,
        ot: Box<dyn OtProvider>,
        stats: Arc<Mutex<RunTimeStats>>,
        rng: ChaCha20Rng,
    ) -> Result<Self> {
        if num_parties < 2 {
            return Err(EngineError::InvalidArgument(format!(
                "need at least two parties, got {num_parties}"
            )));
        }
        if my_id >= num_parties {
            return Err(EngineError::InvalidArgument(format!(
                "party id {my_id} out of range for {num_parties} parties"
            )));
        }
        Ok(Self {
            my_id,
            num_parties,
            store: SquarePairStore::default(),
            peers: (0..num_parties).map(|_| PeerOts::default()).collect(),
            ot,
            rng,
            stats,
            completion: Completion::new(),
            ots_registered: false,
        })
    }

    /// Requests `count` additional square pairs of width `T` and returns
    /// the index of the first one. Only valid while the circuit is being
    /// built; requests are frozen once `pre_setup` has started.
    pub fn request<T: SpElement>(&mut self, count: usize) -> Result<usize> {
        if count == 0 {
            return Err(EngineError::InvalidArgument(
                "cannot request zero square pairs".to_string(),
            ));
        }
        if self.ots_registered {
            return Err(EngineError::InvalidArgument(
                "square pair requests are frozen once pre-setup has started".to_string(),
            ));
        }
        let pairs = T::pairs_mut(&mut self.store);
        let start = pairs.requested;
        pairs.requested += count;
        Ok(start)
    }

    /// The finished shares of width `T`. Fails with `NotReady` until the
    /// completion condition has been signalled.
    pub fn sps<T: SpElement>(&self) -> Result<&SquarePairs<T>> {
        if !self.completion.is_set() {
            return Err(EngineError::NotReady);
        }
        Ok(T::pairs(&self.store))
    }

    fn sample_pairs<T: SpElement>(&mut self) {
        let Self { rng, store, .. } = self;
        let pairs = T::pairs_mut(store);
        pairs.a = (0..pairs.requested).map(|_| T::random(rng)).collect();
        pairs.c = pairs.a.iter().map(|&a| a.wrapping_mul(a)).collect();
    }

    fn register_ots(&mut self) -> Result<()> {
        self.sample_pairs::<u8>();
        self.sample_pairs::<u16>();
        self.sample_pairs::<u32>();
        self.sample_pairs::<u64>();
        self.sample_pairs::<u128>();

        // The peer and width order below is a protocol invariant: every
        // party registers against every other party in the identical
        // sequence, which is what pairs up sender and receiver handles.
        for peer_id in 0..self.num_parties {
            if peer_id == self.my_id {
                continue;
            }
            self.register_ots_with_peer::<u8>(peer_id)?;
            self.register_ots_with_peer::<u16>(peer_id)?;
            self.register_ots_with_peer::<u32>(peer_id)?;
            self.register_ots_with_peer::<u64>(peer_id)?;
            self.register_ots_with_peer::<u128>(peer_id)?;
        }
        Ok(())
    }

    fn register_ots_with_peer<T: SpElement>(&mut self, peer_id: usize) -> Result<()> {
        let Self {
            my_id,
            store,
            peers,
            ot,
            ..
        } = self;
        let pairs = T::pairs(store);
        let width = T::BITS;

        let mut sp_id = 0;
        while sp_id < pairs.requested {
            let batch = (pairs.requested - sp_id).min(MAX_BATCH);
            if peer_id < *my_id {
                // We play the sender: one correlation per (pair, bit),
                // namely our share shifted to the bit position.
                let mut handle = ot.register_send(peer_id, width, batch * width)?;
                let mut correlations = Vec::with_capacity(batch * width);
                for k in 0..batch {
                    let a = pairs.a[sp_id + k];
                    for bit in 0..width {
                        correlations.push(BitString::from_u128(
                            a.wrapping_shl(bit as u32).to_u128(),
                            width,
                        ));
                    }
                }
                handle.set_inputs(correlations)?;
                peers[peer_id].senders.push_back(handle);
            } else {
                // We play the receiver: the choice for (pair, bit) is the
                // corresponding bit of our own share.
                let mut handle = ot.register_receive(peer_id, width, batch * width)?;
                let mut choices = BitString::zeros(batch * width);
                for k in 0..batch {
                    let a = pairs.a[sp_id + k];
                    for bit in 0..width {
                        choices.set_bit(k * width + bit, a.bit(bit));
                    }
                }
                handle.set_choices(choices)?;
                peers[peer_id].receivers.push_back(handle);
            }
            sp_id += batch;
        }
        Ok(())
    }

    fn parse_outputs(&mut self) -> Result<()> {
        for peer_id in 0..self.num_parties {
            if peer_id == self.my_id {
                continue;
            }
            self.parse_outputs_from_peer::<u8>(peer_id)?;
            self.parse_outputs_from_peer::<u16>(peer_id)?;
            self.parse_outputs_from_peer::<u32>(peer_id)?;
            self.parse_outputs_from_peer::<u64>(peer_id)?;
            self.parse_outputs_from_peer::<u128>(peer_id)?;
        }

        // Every registered handle must have been consumed by now.
        for (peer_id, peer) in self.peers.iter().enumerate() {
            if !peer.senders.is_empty() || !peer.receivers.is_empty() {
                return Err(EngineError::ProtocolViolation(format!(
                    "leftover oblivious transfer handles for party {peer_id}"
                )));
            }
        }
        Ok(())
    }

    /// Folds one peer's OT outputs into the `c` shares. The sender's masks
    /// are subtracted twice, the receiver's outputs added twice; summed
    /// over both directions of a party pair this contributes exactly
    /// `2 * a_i * a_j` to the reconstructed `c`, completing the square.
    fn parse_outputs_from_peer<T: SpElement>(&mut self, peer_id: usize) -> Result<()> {
        let Self {
            my_id,
            store,
            peers,
            ..
        } = self;
        let pairs = T::pairs_mut(store);
        let width = T::BITS;
        let we_send = peer_id < *my_id;

        let mut sp_id = 0;
        while sp_id < pairs.requested {
            let batch = (pairs.requested - sp_id).min(MAX_BATCH);
            let outputs = if we_send {
                peers[peer_id]
                    .senders
                    .pop_front()
                    .ok_or_else(|| {
                        EngineError::ProtocolViolation(format!(
                            "missing sender handle for party {peer_id}"
                        ))
                    })?
                    .outputs()?
            } else {
                peers[peer_id]
                    .receivers
                    .pop_front()
                    .ok_or_else(|| {
                        EngineError::ProtocolViolation(format!(
                            "missing receiver handle for party {peer_id}"
                        ))
                    })?
                    .outputs()?
            };
            if outputs.len() != batch * width {
                return Err(EngineError::ProtocolViolation(format!(
                    "expected {} transfer outputs from party {peer_id}, got {}",
                    batch * width,
                    outputs.len()
                )));
            }

            for k in 0..batch {
                for bit in 0..width {
                    let output = &outputs[k * width + bit];
                    if output.len() != width {
                        return Err(EngineError::ProtocolViolation(format!(
                            "transfer output from party {peer_id} is {} bits wide, expected {width}",
                            output.len()
                        )));
                    }
                    let mask = T::from_u128(output.to_u128());
                    let twice = mask.wrapping_add(mask);
                    let c = &mut pairs.c[sp_id + k];
                    *c = if we_send {
                        c.wrapping_sub(twice)
                    } else {
                        c.wrapping_add(twice)
                    };
                }
            }
            sp_id += batch;
        }
        Ok(())
    }
}

impl SpProvider for SpProviderFromOts {
    fn need_sps(&self) -> bool {
        self.store.w8.requested > 0
            || self.store.w16.requested > 0
            || self.store.w32.requested > 0
            || self.store.w64.requested > 0
            || self.store.w128.requested > 0
    }

    fn pre_setup(&mut self) -> Result<()> {
        if !self.need_sps() {
            return Ok(());
        }
        debug!("party {}: square pair pre-setup started", self.my_id);
        self.stats
            .lock()
            .expect("statistics lock poisoned")
            .record_start(Phase::SpPresetup);
        self.ots_registered = true;
        self.register_ots()?;
        self.stats
            .lock()
            .expect("statistics lock poisoned")
            .record_end(Phase::SpPresetup);
        debug!("party {}: square pair pre-setup finished", self.my_id);
        Ok(())
    }

    fn setup(&mut self) -> Result<()> {
        if !self.need_sps() {
            return Ok(());
        }
        if !self.ots_registered {
            return Err(EngineError::ProtocolViolation(
                "setup requires pre-setup to have run".to_string(),
            ));
        }
        debug!("party {}: square pair setup started", self.my_id);
        self.stats
            .lock()
            .expect("statistics lock poisoned")
            .record_start(Phase::SpSetup);

        // One worker per peer. Each worker only touches the handle lists
        // of its own peer, so the loop runs without any locking.
        let my_id = self.my_id;
        let peers = &mut self.peers;
        thread::scope(|scope| -> Result<()> {
            let mut workers = Vec::new();
            for (peer_id, peer) in peers.iter_mut().enumerate() {
                if peer_id == my_id {
                    continue;
                }
                workers.push(scope.spawn(move || -> Result<()> {
                    for sender in peer.senders.iter_mut() {
                        sender.send_messages()?;
                    }
                    for receiver in peer.receivers.iter_mut() {
                        receiver.send_corrections()?;
                    }
                    Ok(())
                }));
            }
            for worker in workers {
                worker.join().expect("square pair setup worker panicked")?;
            }
            Ok(())
        })?;

        self.parse_outputs()?;
        self.completion.set();
        self.stats
            .lock()
            .expect("statistics lock poisoned")
            .record_end(Phase::SpSetup);
        debug!("party {}: square pair setup finished", self.my_id);
        Ok(())
    }

    fn completion(&self) -> Completion {
        self.completion.clone()
    }
}
