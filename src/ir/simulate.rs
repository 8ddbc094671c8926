/*!
The functional simulator: drives an algorithm (a flat set of functions)
cycle-by-cycle, independent of any synthesized schedule. This is the
reference the testbench layer (§6) compares a synthesized HDL dump
against, and what `--fsim` prints directly.
*/

use crate::error::{NittaError, NittaResult};
use crate::ir::function::{simulation_failure, Function};
use crate::ir::variable::VarId;
use crate::value::Value;
use std::collections::{HashMap, VecDeque};

/// External channel and memory state a function may read/write as a
/// side effect of simulation (`send`, `receive`, `framInput`,
/// `framOutput`).
#[derive(Default)]
pub struct ExternalIo {
    pub receive_queues: HashMap<VarId, VecDeque<Value>>,
    pub send_log: HashMap<VarId, Vec<Value>>,
    pub fram_cells: HashMap<u32, Value>,
    pub drop_on_empty: bool,
}

/// The per-cycle view a `Function::simulate` call receives: this
/// cycle's resolved input values, last cycle's output values (for
/// `reg`/`loop`), and external channel access.
pub struct CycleContext<'a> {
    pub cycle: usize,
    pub inputs: &'a HashMap<VarId, Value>,
    pub previous_outputs: &'a HashMap<VarId, Value>,
    pub external: &'a mut ExternalIo,
}

impl<'a> CycleContext<'a> {
    pub fn input(&self, v: &VarId) -> NittaResult<Value> {
        self.inputs
            .get(v)
            .copied()
            .ok_or_else(|| simulation_failure(v, self.cycle, "input not yet resolved this cycle"))
    }

    pub fn previous(&self, v: &VarId) -> NittaResult<Value> {
        Ok(self.previous_outputs.get(v).copied().unwrap_or(Value::int(1, 0)))
    }

    pub fn send(&mut self, v: &VarId, value: Value) {
        self.external.send_log.entry(v.clone()).or_default().push(value);
    }

    pub fn receive(&mut self, out: &VarId, _named: Option<&VarId>) -> NittaResult<Value> {
        let q = self.external.receive_queues.entry(out.clone()).or_default();
        match q.pop_front() {
            Some(v) => Ok(v),
            None if self.external.drop_on_empty => Ok(Value::int(1, 0)),
            None => Err(simulation_failure(out, self.cycle, "receive on empty channel")),
        }
    }

    pub fn fram_read(&self, addr: u32) -> Value {
        self.external.fram_cells.get(&addr).copied().unwrap_or(Value::int(32, 0))
    }

    pub fn fram_write(&mut self, addr: u32, value: Value) {
        self.external.fram_cells.insert(addr, value);
    }
}

/// Drives a flat function set across `n` cycles, resolving each
/// function's outputs in dependency order within a cycle (functions
/// with no unresolved inputs first; `loop`/`constant` never block since
/// they need no same-cycle input).
pub struct FunctionalSimulator<'f> {
    functions: &'f [Function],
    pub external: ExternalIo,
}

impl<'f> FunctionalSimulator<'f> {
    pub fn new(functions: &'f [Function]) -> Self {
        Self {
            functions,
            external: ExternalIo::default(),
        }
    }

    /// Run `cycles` cycles, returning, for each cycle, the full
    /// variable valuation observed at the end of the cycle.
    pub fn run(&mut self, cycles: usize) -> NittaResult<Vec<HashMap<VarId, Value>>> {
        let mut history = Vec::with_capacity(cycles);
        let mut previous: HashMap<VarId, Value> = HashMap::new();
        for cycle in 0..cycles {
            let valuation = self.run_cycle(cycle, &previous)?;
            previous = valuation.clone();
            history.push(valuation);
        }
        Ok(history)
    }

    fn run_cycle(
        &mut self,
        cycle: usize,
        previous: &HashMap<VarId, Value>,
    ) -> NittaResult<HashMap<VarId, Value>> {
        let mut resolved: HashMap<VarId, Value> = HashMap::new();
        let mut remaining: Vec<&Function> = self.functions.iter().collect();
        // Fixed-point resolution: repeatedly simulate any function all
        // of whose inputs are already resolved, until none progress.
        loop {
            let mut progressed = false;
            let mut still_remaining = Vec::new();
            for f in remaining {
                let ready = f.inputs.iter().all(|v| resolved.contains_key(v));
                if !ready {
                    still_remaining.push(f);
                    continue;
                }
                let mut ctx = CycleContext {
                    cycle,
                    inputs: &resolved,
                    previous_outputs: previous,
                    external: &mut self.external,
                };
                let outs = f.simulate(&mut ctx)?;
                resolved.extend(outs);
                progressed = true;
            }
            remaining = still_remaining;
            if !progressed {
                break;
            }
        }
        if !remaining.is_empty() {
            let stuck = remaining[0];
            let culprit = stuck.inputs.first().cloned().unwrap_or_else(|| VarId::new("?"));
            return Err(NittaError::SimulationFailure {
                var: culprit,
                cycle,
                reason: format!("unresolved dependency cycle at function `{stuck}`"),
            });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::function::Function;

    #[test]
    fn fibonacci_internal_matches_s1() {
        // S1: loop(0, b2, [a1]); loop(1, c, [b1,b2]); add(a1,b1,[c])
        let funcs = vec![
            Function::loop_fn(Value::int(32, 0), "b2".into(), vec!["a1".into()]),
            Function::loop_fn(Value::int(32, 1), "c".into(), vec!["b1".into(), "b2".into()]),
            Function::add("a1".into(), "b1".into(), vec!["c".into()]),
        ];
        let mut sim = FunctionalSimulator::new(&funcs);
        let history = sim.run(5).unwrap();
        let a1_values: Vec<i128> = history
            .iter()
            .map(|cycle| match cycle[&VarId::new("a1")].kind {
                crate::value::ValueKind::Int(i) => i.raw,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(a1_values, vec![0, 1, 1, 2, 3]);
    }

    #[test]
    fn teacup_fixed_point_matches_s3() {
        // temp_next = temp - (temp - ambient) * k * dt ; k=0.125, dt=0.125,
        // the Newton's-law-of-cooling model of §8 S3. `fx24.32` gives a
        // 56-bit raw word (24 integer bits, 32 fractional), far more
        // precision than this scenario's magnitudes need, so the reference
        // values below are just the exact real-arithmetic recurrence
        // `T_{n+1} = T_n * (1 - k*dt)`, i.e. `180 * 0.984375^n`.
        let k = Value::fx_from_f64(24, 32, 0.125);
        let dt = Value::fx_from_f64(24, 32, 0.125);
        let ambient = Value::fx_from_f64(24, 32, 0.0);
        let funcs = vec![
            Function::loop_fn(
                Value::fx_from_f64(24, 32, 180.0),
                "temp_next".into(),
                vec!["temp_cup_1".into()],
            ),
            Function::constant(k, vec!["k".into()]),
            Function::constant(dt, vec!["dt".into()]),
            Function::constant(ambient, vec!["a".into()]),
            Function::sub("temp_cup_1".into(), "a".into(), vec!["delta".into()]),
            Function::mul("delta".into(), "k".into(), vec!["dtemp".into()]),
            Function::mul("dtemp".into(), "dt".into(), vec!["dtemp_dt".into()]),
            Function::sub("temp_cup_1".into(), "dtemp_dt".into(), vec!["temp_next".into()]),
        ];
        let mut sim = FunctionalSimulator::new(&funcs);
        let history = sim.run(10).unwrap();
        let expected = [
            180.000, 177.1875, 174.418945, 171.693649, 169.010936, 166.370140, 163.770607, 161.211691, 158.692758,
            156.213184,
        ];
        for (cycle, exp) in history.iter().zip(expected.iter()) {
            let v = match cycle[&VarId::new("temp_cup_1")].kind {
                crate::value::ValueKind::Fx(f) => f.to_f64(),
                _ => unreachable!(),
            };
            assert!((v - exp).abs() < 1e-3, "got {v}, expected {exp}");
        }
    }
}
