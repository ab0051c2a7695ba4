use anyhow::Result;
use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;

use helpers::read_config::read_config;
use mpc_core::config::Config;
use mpc_core::correlated_randomness::{SpProvider, SpProviderFromOts};
use mpc_core::loopback_ot::LoopbackOtHub;
use mpc_core::registry::Registry;
use mpc_core::stats::RunTimeStats;
use mpc_core::types::{Gate, GateKind, Wire};

fn main() -> Result<()> {
    // Initialize environment variables and logging
    dotenv().ok();
    let config = Config::from_file("config.txt").unwrap_or_default();
    env_logger::Builder::from_env(
        Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let role = read_config("config.txt", "role").unwrap_or_else(|| "square_pairs".to_string());
    info!("mpc-engine demo starting with role: {}", role);

    match role.as_str() {
        "registry" => run_registry_demo()?,
        "square_pairs" => run_square_pair_demo(config.parties)?,
        invalid => {
            error!("Invalid role '{}'. Must be: registry or square_pairs", invalid);
            process::exit(1);
        }
    }

    Ok(())
}

/// Builds a tiny circuit, feeds its gates through the active-gate queue and
/// drains the queue from worker threads.
fn run_registry_demo() -> Result<()> {
    let mut registry = Registry::new(0);

    // NOT((in0 XOR in1) AND in2) OR in0, plus an output gate
    let mut wires = Vec::new();
    for _ in 0..7 {
        let id = registry.next_wire_id();
        wires.push(registry.register_wire(Wire::new(id, 1)));
    }
    let sharing = registry.next_boolean_sharing_id(3)?;
    let mut gate_ids = Vec::new();
    for (offset, wire) in wires.iter().take(3).enumerate() {
        let id = registry.next_gate_id();
        gate_ids.push(registry.register_input_gate(Gate::new(
            id,
            GateKind::BooleanInput {
                sharing_id: sharing + offset as u64,
            },
            vec![],
            vec![*wire],
        )));
    }
    let xor = registry.next_gate_id();
    gate_ids.push(registry.register_gate(Gate::new(
        xor,
        GateKind::Xor,
        vec![wires[0], wires[1]],
        vec![wires[3]],
    )));
    let and = registry.next_gate_id();
    gate_ids.push(registry.register_gate(Gate::new(
        and,
        GateKind::And,
        vec![wires[3], wires[2]],
        vec![wires[4]],
    )));
    let not = registry.next_gate_id();
    gate_ids.push(registry.register_gate(Gate::new(
        not,
        GateKind::Not,
        vec![wires[4]],
        vec![wires[5]],
    )));
    let or = registry.next_gate_id();
    gate_ids.push(registry.register_gate(Gate::new(
        or,
        GateKind::Or,
        vec![wires[5], wires[0]],
        vec![wires[6]],
    )));
    let output = registry.next_gate_id();
    gate_ids.push(registry.register_gate(Gate::new(
        output,
        GateKind::Output,
        vec![wires[6]],
        vec![],
    )));

    info!(
        "registry demo: {} gates ({} inputs), {} wires",
        registry.total_gates(),
        registry.input_gates().len(),
        wires.len()
    );

    // The build phase is over; share the registry and let workers drain
    // the queue.
    let registry = Arc::new(registry);
    for id in gate_ids {
        registry.add_to_active_queue(id);
    }

    let mut workers = Vec::new();
    for worker in 0..2 {
        let registry = Arc::clone(&registry);
        workers.push(thread::spawn(move || {
            while let Some(gate_id) = registry.pop_active_gate() {
                let kind = registry
                    .get_gate(gate_id)
                    .map(|gate| format!("{:?}", gate.kind()));
                info!("worker {}: evaluating gate {} {:?}", worker, gate_id, kind);
                registry.increment_evaluated();
            }
        }));
    }
    for worker in workers {
        worker.join().expect("registry demo worker panicked");
    }

    info!(
        "registry demo: evaluated {}/{} gates",
        registry.evaluated_count(),
        registry.total_gates()
    );
    Ok(())
}

/// Runs all parties of a simulated session in-process over the loopback OT
/// hub, generates square pairs and verifies that the shares reconstruct.
fn run_square_pair_demo(parties: usize) -> Result<()> {
    const U32_PAIRS: usize = 4;
    const U128_PAIRS: usize = 1;

    type PartyResult = ((Vec<u32>, Vec<u32>), serde_json::Value);

    let hub = LoopbackOtHub::new();
    let mut workers = Vec::new();
    for party in 0..parties {
        let hub = Arc::clone(&hub);
        workers.push(thread::spawn(move || -> Result<PartyResult> {
            let stats = Arc::new(Mutex::new(RunTimeStats::new()));
            let mut provider = SpProviderFromOts::new(
                party,
                parties,
                Box::new(hub.provider(party)),
                Arc::clone(&stats),
            )?;
            provider.request::<u32>(U32_PAIRS)?;
            provider.request::<u128>(U128_PAIRS)?;
            provider.pre_setup()?;
            provider.setup()?;

            let pairs = provider.sps::<u32>()?;
            let shares = (pairs.a().to_vec(), pairs.c().to_vec());
            let stats_json = stats.lock().expect("statistics lock poisoned").as_json();
            Ok((shares, stats_json))
        }));
    }

    let mut a_sums = vec![0u32; U32_PAIRS];
    let mut c_sums = vec![0u32; U32_PAIRS];
    for (party, worker) in workers.into_iter().enumerate() {
        let ((a, c), stats_json) = worker.join().expect("party thread panicked")?;
        info!(
            "party {} square pair statistics: {}",
            party,
            serde_json::to_string(&stats_json)?
        );
        for i in 0..U32_PAIRS {
            a_sums[i] = a_sums[i].wrapping_add(a[i]);
            c_sums[i] = c_sums[i].wrapping_add(c[i]);
        }
    }

    for i in 0..U32_PAIRS {
        let value = a_sums[i];
        let square = c_sums[i];
        info!(
            "pair {}: value {} squares to {} (mod 2^{})",
            i,
            value,
            square,
            u32::BITS
        );
        assert_eq!(square, value.wrapping_mul(value));
    }
    info!(
        "square pair demo: all {} u32 pairs reconstructed correctly across {} parties",
        U32_PAIRS, parties
    );
    Ok(())
}
