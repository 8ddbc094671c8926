/*!
The generic serial-PU pattern (§4.D): "at most one function in flight;
on bind, function is enqueued in `remains`; on first endpoint, it
becomes `current` and accumulates input variables in the declared
order; on last endpoint it becomes a completed `Function` step whose
covering interval is `[start_tick, last_endpoint_tick]`."

`Accumulator`, `Multiplier` and `Shift` are all instances of this
pattern, differing only in which function tags they accept — expressed
here as a zero-sized `SerialKind` marker type per PU so the pattern is
written once and the PU-specific admissibility check is a single
associated function.
*/

use crate::endpoint::{EndpointDecision, EndpointOption, EndpointRole};
use crate::error::{NittaError, NittaResult};
use crate::ir::{Function, FunctionTag, Lock};
use crate::process::{Instruction, Placement, ProcessRecord, StepDesc};
use crate::pu::{MicrocodeWord, Port, PuOps};
use crate::time::{IntInterval, TaggedTime, TimeConstraint, TimeInterval};
use crate::PuTag;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Default port-to-signal map shared by every `SerialPu<K>` instance,
/// unless overridden per declaration.
fn default_ports() -> HashMap<String, u32> {
    HashMap::from([("latch".to_string(), 1), ("compute".to_string(), 2)])
}

pub trait SerialKind: Clone + std::fmt::Debug {
    fn name() -> &'static str;
    fn accepts(tag: &FunctionTag) -> bool;

    /// The microinstruction emitted when the in-flight function's final
    /// output is delivered. Accumulator and Multiplier both just mark
    /// the generic compute step; Shift carries its own shift amount.
    fn compute_instruction(f: &Function) -> Instruction {
        Instruction::SerialCompute
    }
}

#[derive(Clone, Debug)]
pub struct AccumulatorKind;
impl SerialKind for AccumulatorKind {
    fn name() -> &'static str {
        "accumulator"
    }
    fn accepts(tag: &FunctionTag) -> bool {
        matches!(tag, FunctionTag::Add | FunctionTag::Sub)
    }
}

#[derive(Clone, Debug)]
pub struct MultiplierKind;
impl SerialKind for MultiplierKind {
    fn name() -> &'static str {
        "multiplier"
    }
    fn accepts(tag: &FunctionTag) -> bool {
        matches!(tag, FunctionTag::Mul)
    }
}

#[derive(Clone, Debug)]
pub struct ShiftKind;
impl SerialKind for ShiftKind {
    fn name() -> &'static str {
        "shift"
    }
    fn accepts(tag: &FunctionTag) -> bool {
        matches!(tag, FunctionTag::ShiftL | FunctionTag::ShiftR)
    }
    fn compute_instruction(f: &Function) -> Instruction {
        Instruction::ShiftApply(f.shift_amount())
    }
}

#[derive(Clone, Debug)]
struct InFlight {
    function: Function,
    start_tick: i64,
    next_input: usize,
    delivered_output: bool,
    endpoint_steps: Vec<crate::process::StepId>,
}

#[derive(Clone, Debug)]
pub struct SerialPu<K> {
    tag: PuTag,
    remains: Vec<Function>,
    current: Option<InFlight>,
    process: ProcessRecord,
    local_next_tick: i64,
    ports: HashMap<String, u32>,
    _kind: PhantomData<K>,
}

impl<K: SerialKind> SerialPu<K> {
    pub fn new(tag: impl Into<PuTag>) -> Self {
        Self {
            tag: tag.into(),
            remains: vec![],
            current: None,
            process: ProcessRecord::new(),
            local_next_tick: 0,
            ports: default_ports(),
            _kind: PhantomData,
        }
    }

    /// Override the default port-to-signal map. Keys not present in
    /// `ports` keep their default bit assignment.
    pub fn with_ports(mut self, ports: HashMap<String, u32>) -> Self {
        self.ports.extend(ports);
        self
    }

    fn head(&self) -> Option<&Function> {
        self.current.as_ref().map(|c| &c.function).or_else(|| self.remains.first())
    }
}

impl<K: SerialKind> PuOps for SerialPu<K> {
    fn tag(&self) -> &PuTag {
        &self.tag
    }

    fn try_bind(&self, f: &Function) -> NittaResult<SerialPu<K>> {
        if !K::accepts(&f.tag) {
            return Err(NittaError::BindRejection {
                function: f.to_string(),
                reasons: format!("{} does not accept tag {:?}", K::name(), f.tag),
            });
        }
        let mut next = self.clone();
        next.remains.push(f.clone());
        Ok(next)
    }

    fn endpoint_options(&self) -> Vec<EndpointOption> {
        let time = TimeConstraint::new(
            TimeInterval::new(TaggedTime::new(self.local_next_tick), TaggedTime::unbounded()),
            IntInterval::new(1, 1),
        );
        match (&self.current, self.remains.first()) {
            (Some(c), _) if c.next_input < c.function.inputs.len() => {
                vec![EndpointOption {
                    role: EndpointRole::Target(c.function.inputs[c.next_input].clone()),
                    time,
                }]
            }
            (Some(c), _) if !c.delivered_output => {
                vec![EndpointOption {
                    role: EndpointRole::Source(c.function.outputs.clone()),
                    time,
                }]
            }
            (None, Some(head)) => {
                vec![EndpointOption {
                    role: EndpointRole::Target(head.inputs[0].clone()),
                    time,
                }]
            }
            _ => vec![],
        }
    }

    fn endpoint_decision(&self, d: &EndpointDecision) -> NittaResult<SerialPu<K>> {
        let mut next = self.clone();
        let tick = d.at.inf().clock;

        if next.current.is_none() {
            if next.remains.is_empty() {
                return Err(NittaError::OptionViolation {
                    pu: self.tag.clone(),
                });
            }
            let head = next.remains.remove(0);
            if EndpointRole::Target(head.inputs[0].clone()) != d.role {
                return Err(NittaError::OptionViolation {
                    pu: self.tag.clone(),
                });
            }
            let ep = next.process.add_step(
                Placement::Interval(d.at.inf(), d.at.sup()),
                StepDesc::EndpointRole(d.role.clone()),
            );
            next.process.add_step(
                Placement::Instant(d.at.inf()),
                StepDesc::Instruction(Instruction::SerialLatch),
            );
            next.current = Some(InFlight {
                function: head,
                start_tick: tick,
                next_input: 1,
                delivered_output: false,
                endpoint_steps: vec![ep],
            });
            next.local_next_tick = d.at.sup().clock + 1;
            next.process.update_tick(d.at.sup().checked_add(1));
            return Ok(next);
        }

        let c = next.current.as_mut().unwrap();
        if c.next_input < c.function.inputs.len() {
            if EndpointRole::Target(c.function.inputs[c.next_input].clone()) != d.role {
                return Err(NittaError::OptionViolation {
                    pu: self.tag.clone(),
                });
            }
            let ep = next.process.add_step(
                Placement::Interval(d.at.inf(), d.at.sup()),
                StepDesc::EndpointRole(d.role.clone()),
            );
            next.process.add_step(
                Placement::Instant(d.at.inf()),
                StepDesc::Instruction(Instruction::SerialLatch),
            );
            let c = next.current.as_mut().unwrap();
            c.next_input += 1;
            c.endpoint_steps.push(ep);
            next.local_next_tick = d.at.sup().clock + 1;
            next.process.update_tick(d.at.sup().checked_add(1));
            return Ok(next);
        }

        if !c.delivered_output {
            if EndpointRole::Source(c.function.outputs.clone()) != d.role {
                return Err(NittaError::OptionViolation {
                    pu: self.tag.clone(),
                });
            }
            let ep = next.process.add_step(
                Placement::Interval(d.at.inf(), d.at.sup()),
                StepDesc::EndpointRole(d.role.clone()),
            );
            next.process.add_step(
                Placement::Instant(d.at.inf()),
                StepDesc::Instruction(K::compute_instruction(&c.function)),
            );
            let finished = next.current.take().unwrap();
            let mut endpoint_steps = finished.endpoint_steps;
            endpoint_steps.push(ep);
            let fn_step = next.process.add_step(
                Placement::Interval(TaggedTime::new(finished.start_tick), d.at.sup()),
                StepDesc::Function(finished.function),
            );
            for e in endpoint_steps {
                next.process.add_relation(fn_step, e);
            }
            next.local_next_tick = d.at.sup().clock + 1;
            next.process.update_tick(d.at.sup().checked_add(1));
            return Ok(next);
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
        let latch = self.ports.get("latch").copied();
        let compute = self.ports.get("compute").copied();
        for instr in self.process.instruction_at(t) {
            match instr {
                Instruction::SerialLatch => {
                    if let Some(bit) = latch {
                        if (bit as usize) < bus_width {
                            word.set(bit as usize, true);
                        }
                    }
                }
                Instruction::SerialCompute | Instruction::ShiftApply(_) => {
                    if let Some(bit) = compute {
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
        self.head().map(|f| f.locks()).unwrap_or_default()
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port {
                name: "latch".into(),
                width: 1,
            },
            Port {
                name: "compute".into(),
                width: 1,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VarId;

    #[test]
    fn accumulator_rejects_mul() {
        let acc: SerialPu<AccumulatorKind> = SerialPu::new("acc1");
        let mul = Function::mul("a".into(), "b".into(), vec!["c".into()]);
        assert!(acc.try_bind(&mul).is_err());
    }

    #[test]
    fn serial_pu_completes_after_all_endpoints() {
        let acc: SerialPu<AccumulatorKind> = SerialPu::new("acc1");
        let add = Function::add("a".into(), "b".into(), vec!["c".into()]);
        let bound = acc.try_bind(&add).unwrap();

        let d1 = EndpointDecision {
            role: EndpointRole::Target(VarId::new("a")),
            at: TimeInterval::new(TaggedTime::new(0), TaggedTime::new(0)),
        };
        let s1 = bound.endpoint_decision(&d1).unwrap();

        let d2 = EndpointDecision {
            role: EndpointRole::Target(VarId::new("b")),
            at: TimeInterval::new(TaggedTime::new(1), TaggedTime::new(1)),
        };
        let s2 = s1.endpoint_decision(&d2).unwrap();

        let d3 = EndpointDecision {
            role: EndpointRole::Source(vec![VarId::new("c")]),
            at: TimeInterval::new(TaggedTime::new(2), TaggedTime::new(2)),
        };
        let s3 = s2.endpoint_decision(&d3).unwrap();
        assert!(s3.current.is_none());
        assert!(s3
            .process
            .steps()
            .iter()
            .any(|s| matches!(s.desc, StepDesc::Function(_))));
    }

    #[test]
    fn shift_pu_emits_shift_apply_with_its_amount() {
        let shift: SerialPu<ShiftKind> = SerialPu::new("shift1");
        let sh = Function::shift_l(VarId::new("a"), 3, vec!["c".into()]);
        let bound = shift.try_bind(&sh).unwrap();

        let d1 = EndpointDecision {
            role: EndpointRole::Target(VarId::new("a")),
            at: TimeInterval::new(TaggedTime::new(0), TaggedTime::new(0)),
        };
        let s1 = bound.endpoint_decision(&d1).unwrap();

        let d2 = EndpointDecision {
            role: EndpointRole::Source(vec![VarId::new("c")]),
            at: TimeInterval::new(TaggedTime::new(1), TaggedTime::new(1)),
        };
        let s2 = s1.endpoint_decision(&d2).unwrap();
        assert!(s2
            .process
            .steps()
            .iter()
            .any(|s| matches!(s.desc, StepDesc::Instruction(Instruction::ShiftApply(3)))));

        let word = s2.microcode_at(1, 4);
        assert_eq!(word.bits[2], Some(true));
    }
}
