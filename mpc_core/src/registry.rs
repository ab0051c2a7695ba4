// Circuit Registry
// ================
// Single point of truth for one running session: id allocation, the gate
// and wire tables, the input-gate index, the per-party transport handlers
// and the queue of gates that are ready to run.
//
// Id allocation and gate registration happen while the circuit is built,
// before any evaluator thread exists, so those methods take `&mut self`
// and need no locks. Once the registry is shared behind an `Arc`, only the
// active-gate queue and the evaluated counter are touched concurrently.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::{EngineError, Result};
use crate::transport::TransportHandler;
use crate::types::{Gate, GateId, SharingId, Wire, WireId};

pub struct Registry {
    my_id: usize,
    next_gate_id: GateId,
    next_wire_id: WireId,
    next_arithmetic_sharing_id: SharingId,
    next_boolean_sharing_id: SharingId,
    gates: Vec<Option<Gate>>,
    wires: Vec<Option<Wire>>,
    input_gates: Vec<GateId>,
    transports: Vec<Option<Arc<dyn TransportHandler>>>,
    active_gates: Mutex<VecDeque<GateId>>,
    evaluated: AtomicUsize,
}

impl Registry {
    pub fn new(my_id: usize) -> Self {
        Self {
            my_id,
            next_gate_id: 0,
            next_wire_id: 0,
            next_arithmetic_sharing_id: 0,
            next_boolean_sharing_id: 0,
            gates: Vec::new(),
            wires: Vec::new(),
            input_gates: Vec::new(),
            transports: Vec::new(),
            active_gates: Mutex::new(VecDeque::new()),
            evaluated: AtomicUsize::new(0),
        }
    }

    pub fn my_id(&self) -> usize {
        self.my_id
    }

    /// Number of parties, implied by the installed transport table.
    pub fn num_parties(&self) -> usize {
        self.transports.len()
    }

    pub fn next_gate_id(&mut self) -> GateId {
        let id = self.next_gate_id;
        self.next_gate_id += 1;
        id
    }

    pub fn next_wire_id(&mut self) -> WireId {
        let id = self.next_wire_id;
        self.next_wire_id += 1;
        id
    }

    /// Reserves `count` consecutive arithmetic sharing ids and returns the
    /// first one.
    pub fn next_arithmetic_sharing_id(&mut self, count: u64) -> Result<SharingId> {
        if count == 0 {
            return Err(EngineError::InvalidArgument(
                "cannot reserve zero arithmetic sharing ids".to_string(),
            ));
        }
        let start = self.next_arithmetic_sharing_id;
        self.next_arithmetic_sharing_id += count;
        Ok(start)
    }

    /// Reserves `count` consecutive boolean sharing ids and returns the
    /// first one.
    pub fn next_boolean_sharing_id(&mut self, count: u64) -> Result<SharingId> {
        if count == 0 {
            return Err(EngineError::InvalidArgument(
                "cannot reserve zero boolean sharing ids".to_string(),
            ));
        }
        let start = self.next_boolean_sharing_id;
        self.next_boolean_sharing_id += count;
        Ok(start)
    }

    /// Appends a gate to the gate table and returns its slot id.
    ///
    /// Gates must arrive in id order: the slot index is the gate id.
    pub fn register_gate(&mut self, gate: Gate) -> GateId {
        let id = gate.id();
        assert_eq!(
            id as usize,
            self.gates.len(),
            "gates must be registered in id order"
        );
        self.gates.push(Some(gate));
        id
    }

    /// Registers a gate and records it in the input-gate index.
    pub fn register_input_gate(&mut self, gate: Gate) -> GateId {
        let id = self.register_gate(gate);
        self.input_gates.push(id);
        id
    }

    /// Ids of all input gates, in registration order.
    pub fn input_gates(&self) -> &[GateId] {
        &self.input_gates
    }

    /// Looks up a gate. Returns `None` for tombstoned and unknown ids.
    pub fn get_gate(&self, id: GateId) -> Option<&Gate> {
        self.gates.get(id as usize)?.as_ref()
    }

    /// Tombstones a gate slot. The slot stays indexable but holds no gate
    /// from here on. Unknown ids are ignored.
    pub fn unregister_gate(&mut self, id: GateId) {
        if let Some(slot) = self.gates.get_mut(id as usize) {
            *slot = None;
        }
    }

    /// Appends a wire to the wire table and returns its slot id.
    pub fn register_wire(&mut self, wire: Wire) -> WireId {
        let id = wire.id();
        assert_eq!(
            id as usize,
            self.wires.len(),
            "wires must be registered in id order"
        );
        self.wires.push(Some(wire));
        id
    }

    /// Looks up a wire. Returns `None` for tombstoned and unknown ids.
    pub fn get_wire(&self, id: WireId) -> Option<&Wire> {
        self.wires.get(id as usize)?.as_ref()
    }

    /// Tombstones a wire slot. Unknown ids are ignored.
    pub fn unregister_wire(&mut self, id: WireId) {
        if let Some(slot) = self.wires.get_mut(id as usize) {
            *slot = None;
        }
    }

    /// Installs the per-party transport handler table. The local party's
    /// slot is `None`. Must be called before `send`.
    pub fn register_transports(&mut self, handlers: Vec<Option<Arc<dyn TransportHandler>>>) {
        self.transports = handlers;
    }

    /// Hands `payload` to the transport handler of `party_id`.
    pub fn send(&self, party_id: usize, payload: Vec<u8>) -> Result<()> {
        if party_id == self.my_id {
            return Err(EngineError::InvalidArgument(format!(
                "cannot send a message to ourselves, party {party_id}"
            )));
        }
        let handler = self
            .transports
            .get(party_id)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "no transport handler registered for party {party_id}"
                ))
            })?;
        handler.send_message(payload)
    }

    /// Marks a gate as ready to run. Thread-safe.
    pub fn add_to_active_queue(&self, gate_id: GateId) {
        let mut queue = self
            .active_gates
            .lock()
            .expect("active gate queue lock poisoned");
        queue.push_back(gate_id);
        trace!("party {}: gate {} is active", self.my_id, gate_id);
    }

    /// Pops the next active gate, or `None` when the queue is empty.
    ///
    /// The emptiness check happens under the lock so concurrent pops can
    /// never observe a stale size.
    pub fn pop_active_gate(&self) -> Option<GateId> {
        let mut queue = self
            .active_gates
            .lock()
            .expect("active gate queue lock poisoned");
        queue.pop_front()
    }

    /// Bumps the evaluated-gate counter. Thread-safe.
    pub fn increment_evaluated(&self) {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of gates evaluated so far. Only consulted for termination,
    /// so relaxed ordering is enough.
    pub fn evaluated_count(&self) -> usize {
        self.evaluated.load(Ordering::Relaxed)
    }

    /// Total number of registered gates, tombstoned slots included.
    pub fn total_gates(&self) -> usize {
        self.gates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GateKind;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn dummy_gate(id: GateId, kind: GateKind) -> Gate {
        Gate::new(id, kind, vec![], vec![])
    }

    #[test]
    fn test_gate_id_allocation_counts_from_zero() {
        let mut registry = Registry::new(0);
        assert_eq!(registry.next_gate_id(), 0);
        assert_eq!(registry.next_gate_id(), 1);
        assert_eq!(registry.next_gate_id(), 2);
        assert_eq!(registry.next_wire_id(), 0);
        assert_eq!(registry.next_wire_id(), 1);
    }

    #[test]
    fn test_sharing_id_ranges_are_disjoint() {
        let mut registry = Registry::new(0);
        assert_eq!(registry.next_arithmetic_sharing_id(4).unwrap(), 0);
        assert_eq!(registry.next_arithmetic_sharing_id(1).unwrap(), 4);
        assert_eq!(registry.next_arithmetic_sharing_id(3).unwrap(), 5);

        // The boolean counter runs independently.
        assert_eq!(registry.next_boolean_sharing_id(2).unwrap(), 0);
        assert_eq!(registry.next_boolean_sharing_id(2).unwrap(), 2);
    }

    #[test]
    fn test_zero_sized_sharing_reservation_is_rejected() {
        let mut registry = Registry::new(0);
        let err = registry.next_arithmetic_sharing_id(0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        let err = registry.next_boolean_sharing_id(0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_gate_registration_and_tombstone() {
        let mut registry = Registry::new(0);
        let id = registry.next_gate_id();
        let slot = registry.register_gate(dummy_gate(id, GateKind::And));
        assert_eq!(slot, 0);
        assert_eq!(registry.get_gate(0).unwrap().kind(), &GateKind::And);
        assert_eq!(registry.total_gates(), 1);

        registry.unregister_gate(0);
        assert!(registry.get_gate(0).is_none());
        // The slot stays indexable, the table does not shrink.
        assert_eq!(registry.total_gates(), 1);
        // Unknown ids read as tombstones too.
        assert!(registry.get_gate(7).is_none());
    }

    #[test]
    fn test_input_gate_index_keeps_registration_order() {
        let mut registry = Registry::new(0);
        let and_id = registry.next_gate_id();
        registry.register_gate(dummy_gate(and_id, GateKind::And));
        let in0 = registry.next_gate_id();
        registry.register_input_gate(dummy_gate(in0, GateKind::BooleanInput { sharing_id: 0 }));
        let in1 = registry.next_gate_id();
        registry.register_input_gate(dummy_gate(in1, GateKind::ArithmeticInput { sharing_id: 0 }));
        assert_eq!(registry.input_gates(), &[in0, in1]);
    }

    #[test]
    fn test_wire_registration_and_tombstone() {
        let mut registry = Registry::new(0);
        let id = registry.next_wire_id();
        registry.register_wire(Wire::new(id, 1));
        assert_eq!(registry.get_wire(0).unwrap().num_simd(), 1);
        registry.unregister_wire(0);
        assert!(registry.get_wire(0).is_none());
    }

    struct CountingTransport {
        sent: AtomicUsize,
    }

    impl TransportHandler for CountingTransport {
        fn send_message(&self, _payload: Vec<u8>) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_send_to_self_is_rejected_without_io() {
        let handler0 = Arc::new(CountingTransport {
            sent: AtomicUsize::new(0),
        });
        let handler2 = Arc::new(CountingTransport {
            sent: AtomicUsize::new(0),
        });
        let dyn0: Arc<dyn TransportHandler> = handler0.clone();
        let dyn2: Arc<dyn TransportHandler> = handler2.clone();
        let mut registry = Registry::new(1);
        registry.register_transports(vec![Some(dyn0), None, Some(dyn2)]);
        assert_eq!(registry.num_parties(), 3);

        let err = registry.send(1, vec![0xAB]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert_eq!(handler0.sent.load(Ordering::SeqCst), 0);
        assert_eq!(handler2.sent.load(Ordering::SeqCst), 0);

        registry.send(0, vec![0xAB]).unwrap();
        assert_eq!(handler0.sent.load(Ordering::SeqCst), 1);

        let err = registry.send(5, vec![0xAB]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_active_queue_concurrent_drain() {
        let registry = Arc::new(Registry::new(0));
        let producers_done = Arc::new(AtomicBool::new(false));
        let collected = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::new();
        for ids in [vec![0u64, 2, 4, 6, 8], vec![1u64, 3, 5, 7, 9]] {
            let registry = Arc::clone(&registry);
            workers.push(thread::spawn(move || {
                for id in ids {
                    registry.add_to_active_queue(id);
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let producers_done = Arc::clone(&producers_done);
            let collected = Arc::clone(&collected);
            consumers.push(thread::spawn(move || loop {
                match registry.pop_active_gate() {
                    Some(id) => collected.lock().unwrap().push(id),
                    None if producers_done.load(Ordering::SeqCst) => break,
                    None => thread::yield_now(),
                }
            }));
        }

        for worker in workers {
            worker.join().unwrap();
        }
        producers_done.store(true, Ordering::SeqCst);
        for consumer in consumers {
            consumer.join().unwrap();
        }

        let mut ids = collected.lock().unwrap().clone();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        assert!(registry.pop_active_gate().is_none());
    }

    #[test]
    fn test_evaluated_counter() {
        let registry = Registry::new(0);
        assert_eq!(registry.evaluated_count(), 0);
        registry.increment_evaluated();
        registry.increment_evaluated();
        assert_eq!(registry.evaluated_count(), 2);
    }
}
