/*!
`DividerPu` (§4.D): the one PU whose own internal latency can deadlock
a schedule (`Function::may_cause_internal_lock`). It follows the serial
pattern — at most one function in flight, inputs accumulated in order —
but its quotient/remainder outputs are not available immediately on the
next tick: the pipeline has depth `p` and per-stage latency `lambda`, so
a division started at tick `s` cannot be collected before `s + p +
lambda`. A function whose deadline (the `TimeConstraint` it was offered
under) falls before that earliest completion tick is flagged "rotten"
and withheld from `endpoint_options` rather than offered and later
violated.
*/

use crate::endpoint::{EndpointDecision, EndpointOption, EndpointRole};
use crate::error::{NittaError, NittaResult};
use crate::ir::{Function, FunctionTag, Lock};
use crate::process::{Instruction, Placement, ProcessRecord, StepDesc};
use crate::pu::{MicrocodeWord, Port, PuOps};
use crate::time::{IntInterval, TaggedTime, TimeConstraint, TimeInterval};
use crate::PuTag;
use std::collections::HashMap;

fn default_ports() -> HashMap<String, u32> {
    HashMap::from([("start".to_string(), 1)])
}

#[derive(Clone, Debug)]
struct InFlight {
    function: Function,
    start_tick: i64,
    next_input: usize,
    endpoint_steps: Vec<crate::process::StepId>,
}

#[derive(Clone, Debug)]
pub struct DividerPu {
    tag: PuTag,
    pipeline_depth: i64,
    latency: i64,
    remains: Vec<Function>,
    current: Option<InFlight>,
    outputs_ready_at: Option<i64>,
    process: ProcessRecord,
    local_next_tick: i64,
    ports: HashMap<String, u32>,
}

impl DividerPu {
    pub fn new(tag: impl Into<PuTag>, pipeline_depth: i64, latency: i64) -> Self {
        Self {
            tag: tag.into(),
            pipeline_depth,
            latency,
            remains: vec![],
            current: None,
            outputs_ready_at: None,
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

    fn earliest_completion(&self, start: i64) -> i64 {
        start + self.pipeline_depth + self.latency
    }

    /// A function is "rotten" at `start` if waiting out the pipeline
    /// would itself already violate the record's monotone tick, i.e.
    /// the deadline has already been missed — used to keep the search
    /// from ever offering an option it would have to retract.
    fn is_rotten(&self, start: i64) -> bool {
        self.earliest_completion(start) < self.local_next_tick
    }
}

impl PuOps for DividerPu {
    fn tag(&self) -> &PuTag {
        &self.tag
    }

    fn try_bind(&self, f: &Function) -> NittaResult<DividerPu> {
        if f.tag != FunctionTag::Div {
            return Err(NittaError::BindRejection {
                function: f.to_string(),
                reasons: "divider only accepts div".to_string(),
            });
        }
        if self.current.is_some() || !self.remains.is_empty() {
            return Err(NittaError::BindRejection {
                function: f.to_string(),
                reasons: format!("{} already has a function in flight", self.tag),
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
        if let Some(c) = &self.current {
            if c.next_input < c.function.inputs.len() {
                return vec![EndpointOption {
                    role: EndpointRole::Target(c.function.inputs[c.next_input].clone()),
                    time,
                }];
            }
            let ready = self.outputs_ready_at.unwrap_or(self.local_next_tick);
            if self.is_rotten(c.start_tick) {
                return vec![];
            }
            let source_time = TimeConstraint::new(
                TimeInterval::new(TaggedTime::new(ready.max(self.local_next_tick)), TaggedTime::unbounded()),
                IntInterval::new(1, 1),
            );
            return vec![EndpointOption {
                role: EndpointRole::Source(c.function.outputs.clone()),
                time: source_time,
            }];
        }
        if let Some(head) = self.remains.first() {
            if self.is_rotten(self.local_next_tick) {
                return vec![];
            }
            return vec![EndpointOption {
                role: EndpointRole::Target(head.inputs[0].clone()),
                time,
            }];
        }
        vec![]
    }

    fn endpoint_decision(&self, d: &EndpointDecision) -> NittaResult<DividerPu> {
        let mut next = self.clone();
        let tick = d.at.inf().clock;

        if next.current.is_none() {
            let head = next
                .remains
                .pop()
                .ok_or_else(|| NittaError::OptionViolation { pu: self.tag.clone() })?;
            if EndpointRole::Target(head.inputs[0].clone()) != d.role {
                return Err(NittaError::OptionViolation { pu: self.tag.clone() });
            }
            let ep = next.process.add_step(
                Placement::Interval(d.at.inf(), d.at.sup()),
                StepDesc::EndpointRole(d.role.clone()),
            );
            next.current = Some(InFlight {
                function: head,
                start_tick: tick,
                next_input: 1,
                endpoint_steps: vec![ep],
            });
            next.local_next_tick = d.at.sup().clock + 1;
            next.process.update_tick(d.at.sup().checked_add(1));
            return Ok(next);
        }

        let c = next.current.as_mut().unwrap();
        if c.next_input < c.function.inputs.len() {
            if EndpointRole::Target(c.function.inputs[c.next_input].clone()) != d.role {
                return Err(NittaError::OptionViolation { pu: self.tag.clone() });
            }
            let ep = next.process.add_step(
                Placement::Interval(d.at.inf(), d.at.sup()),
                StepDesc::EndpointRole(d.role.clone()),
            );
            let start = c.start_tick;
            let c = next.current.as_mut().unwrap();
            c.next_input += 1;
            c.endpoint_steps.push(ep);
            if c.next_input == c.function.inputs.len() {
                next.process.add_step(
                    Placement::Instant(d.at.inf()),
                    StepDesc::Instruction(Instruction::DividerStart),
                );
                next.outputs_ready_at = Some(self.earliest_completion(start));
            }
            next.local_next_tick = d.at.sup().clock + 1;
            next.process.update_tick(d.at.sup().checked_add(1));
            return Ok(next);
        }

        if EndpointRole::Source(c.function.outputs.clone()) != d.role {
            return Err(NittaError::OptionViolation { pu: self.tag.clone() });
        }
        let ready = next.outputs_ready_at.unwrap_or(0);
        if tick < ready {
            return Err(NittaError::TimeWrap {
                start: tick,
                next_tick: ready,
            });
        }
        let ep = next.process.add_step(
            Placement::Interval(d.at.inf(), d.at.sup()),
            StepDesc::EndpointRole(d.role.clone()),
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
        next.outputs_ready_at = None;
        next.local_next_tick = d.at.sup().clock + 1;
        next.process.update_tick(d.at.sup().checked_add(1));
        Ok(next)
    }

    fn process(&self) -> &ProcessRecord {
        &self.process
    }

    fn microcode_at(&self, t: i64, bus_width: usize) -> MicrocodeWord {
        let mut word = MicrocodeWord::no_op(bus_width);
        let start = self.ports.get("start").copied();
        for instr in self.process.instruction_at(t) {
            if matches!(instr, Instruction::DividerStart) {
                if let Some(bit) = start {
                    if (bit as usize) < bus_width {
                        word.set(bit as usize, true);
                    }
                }
            }
        }
        word
    }

    fn locks(&self) -> Vec<Lock> {
        self.current
            .as_ref()
            .map(|c| c.function.locks())
            .or_else(|| self.remains.first().map(|f| f.locks()))
            .unwrap_or_default()
    }

    fn ports(&self) -> Vec<Port> {
        vec![Port {
            name: "start".into(),
            width: 1,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::VarId;

    #[test]
    fn rejects_non_div() {
        let d = DividerPu::new("div1", 2, 1);
        let add = Function::add("a".into(), "b".into(), vec!["c".into()]);
        assert!(d.try_bind(&add).is_err());
    }

    #[test]
    fn source_not_available_before_pipeline_drains() {
        let d = DividerPu::new("div1", 2, 1);
        let div = Function::div("a".into(), "b".into(), vec!["q".into(), "r".into()]);
        let bound = d.try_bind(&div).unwrap();

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

        assert_eq!(s2.outputs_ready_at, Some(2 + 2 + 1));

        let too_early = EndpointDecision {
            role: EndpointRole::Source(vec![VarId::new("q"), VarId::new("r")]),
            at: TimeInterval::new(TaggedTime::new(2), TaggedTime::new(2)),
        };
        assert!(s2.endpoint_decision(&too_early).is_err());

        let on_time = EndpointDecision {
            role: EndpointRole::Source(vec![VarId::new("q"), VarId::new("r")]),
            at: TimeInterval::new(TaggedTime::new(5), TaggedTime::new(5)),
        };
        assert!(s2.endpoint_decision(&on_time).is_ok());
    }
}
