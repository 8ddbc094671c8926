/*!
boundary — driving the functional simulator, generating testbench
vectors and the microcode dump, and restating the out-of-scope
collaborators' interfaces (§1 "front-end parser", "HDL/testbench
emitter") as Rust traits the engine's output is shaped to feed (§6).

Nothing in this module is itself a front-end parser or an HDL emitter —
both remain out of scope, per spec §1. What lives here is the contract
between the engine and those collaborators: the functional trace
(`--fsim`), the testbench vector sequence, and the hex microcode dump.
*/

use crate::error::NittaResult;
use crate::ir::{Function, FunctionalSimulator, VarId};
use crate::network::BusNetwork;
use crate::process::{Instruction, Placement, ProcessRecord, StepDesc};
use crate::value::Value;
use crate::PuTag;
use serde_json::{json, Value as Json};
use std::collections::HashMap;

/// One row of the `--fsim` functional trace: the full variable
/// valuation observed at the end of a simulated cycle.
pub struct FunctionalTrace {
    pub header: Vec<VarId>,
    pub rows: Vec<Vec<Value>>,
}

impl FunctionalTrace {
    /// Tab-separated rendering, one line per row, header first — what
    /// `--fsim` prints directly (§6).
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        out.push_str(
            &self
                .header
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("\t"),
        );
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\t"));
            out.push('\n');
        }
        out
    }
}

/// Run the functional simulator for `cycles` cycles and project the
/// resulting history onto `traced` (in the given order), ignoring any
/// variable the algorithm doesn't resolve that cycle.
pub fn functional_trace(functions: &[Function], cycles: usize, traced: &[VarId]) -> NittaResult<FunctionalTrace> {
    let mut sim = FunctionalSimulator::new(functions);
    let history = sim.run(cycles)?;
    let rows = history
        .iter()
        .map(|valuation| {
            traced
                .iter()
                .map(|v| valuation.get(v).copied().unwrap_or_default())
                .collect()
        })
        .collect();
    Ok(FunctionalTrace {
        header: traced.to_vec(),
        rows,
    })
}

/// One microcode word per tick in `[-1, next_tick]` (§6 "Microcode
/// dump"); tick `-1` is the reset no-op every network starts from.
pub fn microcode_dump(network: &BusNetwork) -> NittaResult<Vec<(i64, String)>> {
    let last = network.next_tick().clock;
    (-1..=last).map(|t| Ok((t, network.microcode_at(t)?.to_hex()))).collect()
}

/// One entry of the testbench vector sequence (§6 "Testbench
/// vectors"): a schedule tick that either carries a `Transport` (and
/// so an expected value the functional simulator predicts) or is a
/// trace-only record with no data movement.
pub struct TestbenchVector {
    pub cycle: usize,
    pub tick: i64,
    pub expected_transport: Option<ExpectedTransport>,
}

pub struct ExpectedTransport {
    pub var: VarId,
    pub src: PuTag,
    pub dst: PuTag,
    pub expected: Value,
}

/// Build the vector sequence by walking every tick the schedule
/// occupies and pairing each `Transport` step with `simulate(var)` at
/// that tick. Schedule ticks and simulator cycles are the same integer
/// axis here — the engine is cycle-accurate by construction (§2), so
/// tick `t` is cycle `t` once ticks are clamped to `>= 0`.
pub fn build_testbench(network: &BusNetwork, functions: &[Function]) -> NittaResult<Vec<TestbenchVector>> {
    let last = network.next_tick().clock.max(0);
    let cycles = (last + 1) as usize;
    let mut sim = FunctionalSimulator::new(functions);
    let history = sim.run(cycles)?;

    let mut out = Vec::new();
    for t in 0..=last {
        let cycle = t as usize;
        let valuation: &HashMap<VarId, Value> = &history[cycle];
        let transports = network.process().instruction_at(t);
        let mut at_tick = vec![];
        for instr in transports {
            if let Instruction::Transport { var, src, dst } = instr {
                let expected = valuation.get(var).copied().unwrap_or_default();
                at_tick.push(ExpectedTransport {
                    var: var.clone(),
                    src: src.clone(),
                    dst: dst.clone(),
                    expected,
                });
            }
        }
        if at_tick.is_empty() {
            out.push(TestbenchVector {
                cycle,
                tick: t,
                expected_transport: None,
            });
        } else {
            for transport in at_tick {
                out.push(TestbenchVector {
                    cycle,
                    tick: t,
                    expected_transport: Some(transport),
                });
            }
        }
    }
    Ok(out)
}

/// §6 "Schedule output": one step of a `ProcessRecord`, rendered as the
/// `{id, time, kind, payload, relations}` shape the HDL emitter
/// consumes. `time` is a single tick for `Placement::Instant` and a
/// `[start, end]` pair for `Placement::Interval`.
fn step_json(record: &ProcessRecord, id: crate::process::StepId) -> Option<Json> {
    let step = record.step(id)?;
    let time = match step.placement {
        Placement::Instant(t) => json!(t.clock),
        Placement::Interval(a, b) => json!([a.clock, b.clock]),
    };
    let (kind, payload) = match &step.desc {
        StepDesc::Cad(text) => ("cad", json!(text)),
        StepDesc::Function(f) => ("function", json!(f.to_string())),
        StepDesc::EndpointRole(role) => ("endpointRole", json!(role.to_string())),
        StepDesc::Instruction(instr) => ("instruction", instruction_json(instr)),
        StepDesc::Nested { pu_tag, inner_id } => (
            "nested",
            json!({"puTag": pu_tag, "innerId": inner_id}),
        ),
    };
    let relations: Vec<crate::process::StepId> = record
        .relations()
        .iter()
        .filter(|(high, _)| *high == id)
        .map(|(_, low)| *low)
        .collect();
    Some(json!({
        "id": id,
        "time": time,
        "kind": kind,
        "payload": payload,
        "relations": relations,
    }))
}

fn instruction_json(instr: &Instruction) -> Json {
    match instr {
        Instruction::FramLoad(addr) => json!({"op": "framLoad", "addr": addr}),
        Instruction::FramSave(addr) => json!({"op": "framSave", "addr": addr}),
        Instruction::SerialLatch => json!({"op": "serialLatch"}),
        Instruction::SerialCompute => json!({"op": "serialCompute"}),
        Instruction::DividerStart => json!({"op": "dividerStart"}),
        Instruction::ShiftApply(by) => json!({"op": "shiftApply", "by": by}),
        Instruction::SpiShift => json!({"op": "spiShift"}),
        Instruction::Transport { var, src, dst } => {
            json!({"op": "transport", "var": var.to_string(), "src": src, "dst": dst})
        }
        Instruction::Nop => json!({"op": "nop"}),
    }
}

/// Serialize the network's aggregated process record (§4.E "Aggregated
/// process") into the schedule output format of §6: one JSON object per
/// step, in step-id order.
pub fn schedule_json(network: &BusNetwork) -> NittaResult<String> {
    let record = network.aggregate_process();
    let steps: Vec<Json> = record.steps().iter().filter_map(|s| step_json(&record, s.id)).collect();
    serde_json::to_string_pretty(&steps).map_err(|e| crate::error::NittaError::Other(e.to_string()))
}

/// The front-end parser's obligation (§1, out of scope): lower a
/// source description into the flat function set and entry point the
/// engine consumes via `crate::algorithm::AlgorithmSpec`.
pub trait AlgorithmSource {
    fn lower(&self) -> NittaResult<(Vec<Function>, VarId)>;
}

/// The HDL/testbench emitter's obligation (§1, out of scope): consume
/// a finished `ProcessRecord` plus the microcode dump and testbench
/// vectors this module produces.
pub trait ScheduleSink {
    fn emit(&mut self, network: &BusNetwork, testbench: &[TestbenchVector]) -> NittaResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn functional_trace_matches_fibonacci() {
        let funcs = vec![
            Function::loop_fn(Value::int(32, 0), "b2".into(), vec!["a1".into()]),
            Function::loop_fn(Value::int(32, 1), "c".into(), vec!["b1".into(), "b2".into()]),
            Function::add("a1".into(), "b1".into(), vec!["c".into()]),
        ];
        let traced = vec![VarId::new("a1")];
        let trace = functional_trace(&funcs, 5, &traced).unwrap();
        let tsv = trace.to_tsv();
        assert!(tsv.starts_with("a1\n"));
        assert_eq!(trace.rows.len(), 5);
    }

    #[test]
    fn microcode_dump_starts_at_reset_tick() {
        let mut pus = HashMap::new();
        pus.insert(
            "fram1".to_string(),
            crate::pu::Pu::Fram(crate::pu::FramPu::new("fram1", 4)),
        );
        let network = BusNetwork::new("net", pus, 4, crate::pu::IoSync::Sync);
        let dump = microcode_dump(&network).unwrap();
        assert_eq!(dump[0].0, -1);
    }

    #[test]
    fn schedule_json_renders_every_step_with_relations() {
        let mut pus = HashMap::new();
        pus.insert(
            "fram1".to_string(),
            crate::pu::Pu::Fram(crate::pu::FramPu::new("fram1", 4)),
        );
        let network = BusNetwork::new("net", pus, 4, crate::pu::IoSync::Sync);
        let text = schedule_json(&network).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed.is_array());
    }
}
