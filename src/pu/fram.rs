/*!
Fram — framed memory PU (§4.D). A fixed-size array of cells, each with
three independent reservation slots (`input`, `current`, `output`) and
an initial value.

Admissible function→cell bindings:
- `framInput(addr, outs)` → `cell[addr].input` (requires `input` free).
- `framOutput(addr, in)` → `cell[addr].output` (requires `output` free).
- `reg(in, outs)` → any cell's `current` slot whose `output` is not
  already used or blocked.
- `loop(x0, outs, in)` → any cell whose `input` and `output` are both
  free; the cell's initial value becomes `x0`.
- `constant(x, outs)` → any fully-free cell; the cell's initial value
  becomes `x`; `input` and `output` become blocked.

A cell's `input` slot, once occupied, ultimately offers a `Source`
(the loaded value is broadcast); its `output` slot offers a `Target`
(a value is written in); its `current` slot offers `Target` then
`Source` in order (write the next value, then broadcast it) — except
for `constant`, which has no input to write and so only ever offers
`Source`.
*/

use crate::endpoint::{EndpointDecision, EndpointOption, EndpointRole};
use crate::error::{NittaError, NittaResult};
use crate::ir::{Function, FunctionTag, Lock, VarId};
use crate::process::{Instruction, Placement, ProcessRecord, StepDesc, StepId};
use crate::pu::{MicrocodeWord, Port, PuOps};
use crate::time::{IntInterval, TaggedTime, TimeConstraint, TimeInterval};
use crate::PuTag;
use std::collections::{HashMap, HashSet};

/// Default port-to-signal map: the "strobe" signal covers both load and
/// save, matching the single `oe`/`wr` bit this PU drove before the map
/// existed.
fn default_ports() -> HashMap<String, u32> {
    HashMap::from([("strobe".to_string(), 0)])
}

#[derive(Clone, Debug, Default)]
enum Slot {
    #[default]
    Free,
    Reserved(Box<Occupant>),
    Blocked,
}

#[derive(Clone, Debug)]
struct Occupant {
    function: Function,
    /// Outputs not yet delivered by a `Source` decision (input/current
    /// slots), or the single input not yet written by a `Target`
    /// decision (output/current slots).
    pending_outputs: HashSet<VarId>,
    written: bool,
    endpoint_steps: Vec<StepId>,
}

impl Occupant {
    fn new(function: Function) -> Self {
        let pending_outputs = function.outputs.iter().cloned().collect();
        Self {
            function,
            pending_outputs,
            written: false,
            endpoint_steps: vec![],
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Cell {
    initial: crate::value::Value,
    input: Slot,
    current: Slot,
    output: Slot,
    last_write: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct FramPu {
    tag: PuTag,
    cells: Vec<Cell>,
    process: ProcessRecord,
    local_next_tick: i64,
    ports: HashMap<String, u32>,
}

impl FramPu {
    pub fn new(tag: impl Into<PuTag>, size: usize) -> Self {
        Self {
            tag: tag.into(),
            cells: vec![Cell::default(); size],
            process: ProcessRecord::new(),
            local_next_tick: 0,
            ports: default_ports(),
        }
    }

    /// Override the default port-to-signal map. Keys not present in
    /// `ports` keep their default bit assignment.
    pub fn with_ports(mut self, ports: HashMap<String, u32>) -> Self {
        self.ports.extend(ports);
        self
    }

    fn pending_regs(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(&c.current, Slot::Reserved(o) if o.function.tag == FunctionTag::Reg))
            .count()
    }

    fn free_output_cells(&self) -> usize {
        self.cells.iter().filter(|c| !matches!(c.output, Slot::Blocked)).count()
    }

    fn const_or_loop_reservations(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| {
                matches!(&c.current, Slot::Reserved(o) if matches!(o.function.tag, FunctionTag::Constant | FunctionTag::Loop))
            })
            .count()
    }

    fn finalize(process: &mut ProcessRecord, occupant: &Occupant, last_tick: i64) {
        let start = occupant
            .endpoint_steps
            .first()
            .and_then(|id| process.step(*id))
            .map(|s| s.placement.start().clock)
            .unwrap_or(last_tick);
        let fn_step = process.add_step(
            Placement::Interval(TaggedTime::new(start), TaggedTime::new(last_tick)),
            StepDesc::Function(occupant.function.clone()),
        );
        for ep in &occupant.endpoint_steps {
            process.add_relation(fn_step, *ep);
        }
    }
}

impl PuOps for FramPu {
    fn tag(&self) -> &PuTag {
        &self.tag
    }

    fn try_bind(&self, f: &Function) -> NittaResult<FramPu> {
        let mut next = self.clone();
        match f.tag {
            FunctionTag::FramInput => {
                let addr = f.fram_addr() as usize;
                let cell = next
                    .cells
                    .get_mut(addr)
                    .ok_or_else(|| bind_err(f, "fram address out of range"))?;
                if !matches!(cell.input, Slot::Free) {
                    return Err(bind_err(f, "input slot already reserved"));
                }
                cell.input = Slot::Reserved(Box::new(Occupant::new(f.clone())));
            }
            FunctionTag::FramOutput => {
                let addr = f.fram_addr() as usize;
                let cell = next
                    .cells
                    .get_mut(addr)
                    .ok_or_else(|| bind_err(f, "fram address out of range"))?;
                if !matches!(cell.output, Slot::Free) {
                    return Err(bind_err(f, "output slot already reserved"));
                }
                cell.output = Slot::Reserved(Box::new(Occupant::new(f.clone())));
            }
            FunctionTag::Reg => {
                if next.pending_regs() + 1 > next.free_output_cells().saturating_sub(next.const_or_loop_reservations())
                {
                    return Err(bind_err(f, "no spare cell: reg demand exceeds free output cells"));
                }
                let idx = next
                    .cells
                    .iter()
                    .position(|c| matches!(c.current, Slot::Free) && !matches!(c.output, Slot::Blocked))
                    .ok_or_else(|| bind_err(f, "no free current slot with an unblocked output"))?;
                next.cells[idx].current = Slot::Reserved(Box::new(Occupant::new(f.clone())));
            }
            FunctionTag::Loop => {
                let idx = next
                    .cells
                    .iter()
                    .position(|c| matches!(c.input, Slot::Free) && matches!(c.output, Slot::Free))
                    .ok_or_else(|| bind_err(f, "no cell with both input and output free"))?;
                next.cells[idx].initial = f.literal[0];
                next.cells[idx].current = Slot::Reserved(Box::new(Occupant::new(f.clone())));
            }
            FunctionTag::Constant => {
                let idx = next
                    .cells
                    .iter()
                    .position(|c| matches!(c.input, Slot::Free) && matches!(c.current, Slot::Free) && matches!(c.output, Slot::Free))
                    .ok_or_else(|| bind_err(f, "no fully free cell"))?;
                next.cells[idx].initial = f.literal[0];
                next.cells[idx].input = Slot::Blocked;
                next.cells[idx].output = Slot::Blocked;
                next.cells[idx].current = Slot::Reserved(Box::new(Occupant::new(f.clone())));
            }
            _ => return Err(bind_err(f, "function tag not admissible on Fram")),
        }
        Ok(next)
    }

    fn endpoint_options(&self) -> Vec<EndpointOption> {
        let mut out = vec![];
        let time = TimeConstraint::new(
            TimeInterval::new(TaggedTime::new(self.local_next_tick), TaggedTime::unbounded()),
            IntInterval::new(1, 1),
        );
        for cell in &self.cells {
            if let Slot::Reserved(o) = &cell.input {
                if !o.pending_outputs.is_empty() {
                    out.push(EndpointOption {
                        role: EndpointRole::Source(o.pending_outputs.iter().cloned().collect()),
                        time,
                    });
                }
            }
            if let Slot::Reserved(o) = &cell.current {
                if !o.written && !o.function.inputs.is_empty() {
                    out.push(EndpointOption {
                        role: EndpointRole::Target(o.function.inputs[0].clone()),
                        time,
                    });
                } else if !o.pending_outputs.is_empty() {
                    out.push(EndpointOption {
                        role: EndpointRole::Source(o.pending_outputs.iter().cloned().collect()),
                        time,
                    });
                }
            }
            if let Slot::Reserved(o) = &cell.output {
                if !o.written {
                    out.push(EndpointOption {
                        role: EndpointRole::Target(o.function.inputs[0].clone()),
                        time,
                    });
                }
            }
        }
        out
    }

    fn endpoint_decision(&self, d: &EndpointDecision) -> NittaResult<FramPu> {
        let mut next = self.clone();
        let tick = d.at.inf().clock;
        let addr_of = |role: &EndpointRole, vars: &HashSet<VarId>| -> bool {
            match role {
                EndpointRole::Source(vs) => vs.iter().all(|v| vars.contains(v)),
                EndpointRole::Target(v) => vars.contains(v),
            }
        };
        for (addr, cell) in next.cells.iter_mut().enumerate() {
            if let Slot::Reserved(o) = &mut cell.input {
                if let EndpointRole::Source(vs) = &d.role {
                    if addr_of(&d.role, &o.pending_outputs) {
                        next.process.add_step(
                            Placement::Instant(TaggedTime::new(tick - 1)),
                            StepDesc::Instruction(Instruction::FramLoad(addr as u32)),
                        );
                        let ep = next.process.add_step(
                            Placement::Interval(d.at.inf(), d.at.sup()),
                            StepDesc::EndpointRole(d.role.clone()),
                        );
                        o.endpoint_steps.push(ep);
                        for v in vs {
                            o.pending_outputs.remove(v);
                        }
                        cell.last_write = None;
                        if o.pending_outputs.is_empty() {
                            FramPu::finalize(&mut next.process, o, d.at.sup().clock);
                            cell.input = Slot::Free;
                        }
                        next.local_next_tick = d.at.sup().clock + 1;
                        next.process.update_tick(d.at.sup().checked_add(1));
                        return Ok(next);
                    }
                }
            }
            if let Slot::Reserved(o) = &mut cell.current {
                match &d.role {
                    EndpointRole::Target(v) if !o.written && o.function.inputs.first() == Some(v) => {
                        next.process.add_step(
                            Placement::Instant(d.at.inf()),
                            StepDesc::Instruction(Instruction::FramSave(addr as u32)),
                        );
                        let ep = next.process.add_step(
                            Placement::Interval(d.at.inf(), d.at.sup()),
                            StepDesc::EndpointRole(d.role.clone()),
                        );
                        o.endpoint_steps.push(ep);
                        o.written = true;
                        cell.last_write = Some(d.at.sup().clock);
                        next.local_next_tick = d.at.sup().clock + 1;
                        next.process.update_tick(d.at.sup().checked_add(1));
                        return Ok(next);
                    }
                    EndpointRole::Source(vs) if addr_of(&d.role, &o.pending_outputs) => {
                        next.process.add_step(
                            Placement::Instant(TaggedTime::new(tick - 1)),
                            StepDesc::Instruction(Instruction::FramLoad(addr as u32)),
                        );
                        let ep = next.process.add_step(
                            Placement::Interval(d.at.inf(), d.at.sup()),
                            StepDesc::EndpointRole(d.role.clone()),
                        );
                        o.endpoint_steps.push(ep);
                        for v in vs {
                            o.pending_outputs.remove(v);
                        }
                        cell.last_write = None;
                        if o.pending_outputs.is_empty() {
                            FramPu::finalize(&mut next.process, o, d.at.sup().clock);
                            if o.function.tag != FunctionTag::Loop {
                                cell.current = Slot::Free;
                            } else {
                                // loop keeps its current reservation and resets
                                // for the next feedback cycle
                                o.pending_outputs = o.function.outputs.iter().cloned().collect();
                                o.written = false;
                                o.endpoint_steps.clear();
                            }
                        }
                        next.local_next_tick = d.at.sup().clock + 1;
                        next.process.update_tick(d.at.sup().checked_add(1));
                        return Ok(next);
                    }
                    _ => {}
                }
            }
            if let Slot::Reserved(o) = &mut cell.output {
                if let EndpointRole::Target(v) = &d.role {
                    if !o.written && o.function.inputs.first() == Some(v) {
                        next.process.add_step(
                            Placement::Instant(d.at.inf()),
                            StepDesc::Instruction(Instruction::FramSave(addr as u32)),
                        );
                        let ep = next.process.add_step(
                            Placement::Interval(d.at.inf(), d.at.sup()),
                            StepDesc::EndpointRole(d.role.clone()),
                        );
                        o.endpoint_steps.push(ep);
                        o.written = true;
                        cell.last_write = Some(d.at.sup().clock);
                        FramPu::finalize(&mut next.process, o, d.at.sup().clock);
                        cell.output = Slot::Free;
                        next.local_next_tick = d.at.sup().clock + 1;
                        next.process.update_tick(d.at.sup().checked_add(1));
                        return Ok(next);
                    }
                }
            }
        }
        Err(NittaError::OptionViolation {
            pu: self.tag.clone(),
        })
    }

    fn process(&self) -> &ProcessRecord {
        &self.process
    }

    fn microcode_at(&self, t: i64, bus_width: usize) -> MicrocodeWord {
        let mut word = MicrocodeWord::no_op(bus_width);
        let strobe = self.ports.get("strobe").copied();
        for instr in self.process.instruction_at(t) {
            match instr {
                Instruction::FramLoad(_) | Instruction::FramSave(_) => {
                    if let Some(bit) = strobe {
                        if (bit as usize) < bus_width {
                            word.set(bit as usize, true);
                        }
                    }
                }
                _ => {}
            }
        }
        word
    }

    fn locks(&self) -> Vec<Lock> {
        self.cells
            .iter()
            .flat_map(|c| match &c.current {
                Slot::Reserved(o) => o.function.locks(),
                _ => vec![],
            })
            .collect()
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port {
                name: "addr".into(),
                width: 32,
            },
            Port {
                name: "oe".into(),
                width: 1,
            },
            Port {
                name: "wr".into(),
                width: 1,
            },
        ]
    }
}

fn bind_err(f: &Function, reason: &str) -> NittaError {
    NittaError::BindRejection {
        function: f.to_string(),
        reasons: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn constant_blocks_input_and_output() {
        let fram = FramPu::new("fram1", 4);
        let c = Function::constant(Value::int(8, 5), vec!["k".into()]);
        let bound = fram.try_bind(&c).unwrap();
        assert!(matches!(bound.cells[0].input, Slot::Blocked));
        assert!(matches!(bound.cells[0].output, Slot::Blocked));
        assert!(matches!(bound.cells[0].current, Slot::Reserved(_)));
    }

    #[test]
    fn fram_input_offers_source() {
        let fram = FramPu::new("fram1", 4);
        let fi = Function::fram_input(2, vec!["v".into()]);
        let bound = fram.try_bind(&fi).unwrap();
        let opts = bound.endpoint_options();
        assert!(opts
            .iter()
            .any(|o| matches!(&o.role, EndpointRole::Source(vs) if vs.contains(&VarId::new("v")))));
    }

    #[test]
    fn fram_output_commit_finalizes_function() {
        let fram = FramPu::new("fram1", 4);
        let fo = Function::fram_output(0, "x".into());
        let bound = fram.try_bind(&fo).unwrap();
        let decision = EndpointDecision {
            role: EndpointRole::Target(VarId::new("x")),
            at: TimeInterval::new(TaggedTime::new(0), TaggedTime::new(0)),
        };
        let after = bound.endpoint_decision(&decision).unwrap();
        assert!(matches!(after.cells[0].output, Slot::Free));
        assert!(after
            .process
            .steps()
            .iter()
            .any(|s| matches!(s.desc, StepDesc::Function(_))));
    }
}
