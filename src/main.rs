//! `nitta` — the command-line surface (§6 "CLI surface (minimal,
//! engine-facing)"). Loads an algorithm and a microarchitecture
//! declaration, then either prints the functional trace (`--fsim`),
//! runs synthesis and prints the schedule, or (`--lsim`) prints the
//! testbench vectors derived from a synthesized schedule.

use clap::Parser;
use nitta::algorithm::AlgorithmSpec;
use nitta::boundary::{build_testbench, functional_trace, microcode_dump, schedule_json};
use nitta::cli::Cli;
use nitta::driver::policy::SearchPolicy;
use nitta::driver::{NodeStatus, SearchNode, SynthesisDriver};
use nitta::ir::{DataflowGraph, VarId};
use nitta::microarch::MicroarchSpec;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let alg_text = std::fs::read_to_string(&cli.algfile).map_err(|e| format!("reading {:?}: {e}", cli.algfile))?;
    let alg = AlgorithmSpec::from_json(&alg_text).map_err(|e| format!("parsing {:?}: {e}", cli.algfile))?;
    let functions = alg.functions();

    if cli.fsim {
        let cycles = cli.cycles.unwrap_or(5);
        let traced = vec![VarId::new(alg.entry.as_str())];
        let trace = functional_trace(&functions, cycles, &traced).map_err(|e| e.to_string())?;
        print!("{}", trace.to_tsv());
        return Ok(());
    }

    let march_text =
        std::fs::read_to_string(&cli.microarch).map_err(|e| format!("reading {:?}: {e}", cli.microarch))?;
    let mut march = MicroarchSpec::from_toml(&march_text).map_err(|e| format!("parsing {:?}: {e}", cli.microarch))?;
    if let Some(sync) = cli.io_sync {
        march.io_sync = sync.into();
    }

    let network = march.build_network("net").load_algorithm(functions.clone());
    let graph = DataflowGraph::cluster(functions.iter().cloned().map(DataflowGraph::leaf).collect());

    let driver = SynthesisDriver::new(SearchPolicy::GreedyBestFirst);
    let root = SearchNode::root(network, graph);
    let node = driver.synthesize(root).map_err(|e| e.to_string())?;
    if node.status() != NodeStatus::Complete {
        return Err("synthesis did not reach a complete schedule before the deadline".into());
    }
    info!(ticks = node.network.next_tick().clock, "synthesis complete");

    if cli.lsim {
        let testbench = build_testbench(&node.network, &functions).map_err(|e| e.to_string())?;
        for v in &testbench {
            match &v.expected_transport {
                Some(t) => println!("{}\t{}\t{}\t{}->{}\t{}", v.cycle, v.tick, t.var, t.src, t.dst, t.expected),
                None => println!("{}\t{}\t-\t-\t-", v.cycle, v.tick),
            }
        }
        return Ok(());
    }

    let schedule = schedule_json(&node.network).map_err(|e| e.to_string())?;
    println!("{schedule}");

    if cli.verbose {
        for (t, word) in microcode_dump(&node.network).map_err(|e| e.to_string())? {
            eprintln!("{t}\t{word}");
        }
    }

    Ok(())
}
