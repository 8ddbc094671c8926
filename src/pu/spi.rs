/*!
`SpiPu` (§4.D): a half-duplex master/slave serial link, modeled as a
ring buffer of external words. `send` functions bind a value to go out
next; `receive` functions bind a slot to read the next incoming word.
Endpoints are only offered in ring order — the PU will not let a
downstream `send` jump ahead of one still waiting in the buffer — which
is what makes this PU a natural home for the dataflow graph's external
I/O boundary (§4.H) rather than an ordinary serial PU.

`io_sync` selects how the transfer clock relates to the CAD clock:
`Sync` ticks together with it, `Async` runs free and is sampled,
`OnBoard` defers entirely to an external interface contract (§6) the
boundary layer supplies at simulation time.
*/

use crate::endpoint::{EndpointDecision, EndpointOption, EndpointRole};
use crate::error::{NittaError, NittaResult};
use crate::ir::{Function, FunctionTag, Lock};
use crate::process::{Instruction, Placement, ProcessRecord, StepDesc};
use crate::pu::{MicrocodeWord, Port, PuOps};
use crate::time::{IntInterval, TaggedTime, TimeConstraint, TimeInterval};
use crate::PuTag;
use std::collections::{HashMap, VecDeque};

fn default_ports() -> HashMap<String, u32> {
    HashMap::from([("shift".to_string(), 0)])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IoSync {
    Sync,
    Async,
    OnBoard,
}

#[derive(Clone, Debug)]
enum Slot {
    Pending(Function),
    InFlight { function: Function, endpoint_step: crate::process::StepId },
}

#[derive(Clone, Debug)]
pub struct SpiPu {
    tag: PuTag,
    sync: IoSync,
    ring: VecDeque<Slot>,
    process: ProcessRecord,
    local_next_tick: i64,
    ports: HashMap<String, u32>,
}

impl SpiPu {
    pub fn new(tag: impl Into<PuTag>, sync: IoSync) -> Self {
        Self {
            tag: tag.into(),
            sync,
            ring: VecDeque::new(),
            process: ProcessRecord::new(),
            local_next_tick: 0,
            ports: default_ports(),
        }
    }

    pub fn sync(&self) -> IoSync {
        self.sync
    }

    /// Override the default port-to-signal map. Keys not present in
    /// `ports` keep their default bit assignment.
    pub fn with_ports(mut self, ports: HashMap<String, u32>) -> Self {
        self.ports.extend(ports);
        self
    }
}

impl PuOps for SpiPu {
    fn tag(&self) -> &PuTag {
        &self.tag
    }

    fn try_bind(&self, f: &Function) -> NittaResult<SpiPu> {
        if !matches!(f.tag, FunctionTag::Send | FunctionTag::Receive) {
            return Err(NittaError::BindRejection {
                function: f.to_string(),
                reasons: "spi only accepts send/receive".to_string(),
            });
        }
        let mut next = self.clone();
        next.ring.push_back(Slot::Pending(f.clone()));
        Ok(next)
    }

    fn endpoint_options(&self) -> Vec<EndpointOption> {
        let time = TimeConstraint::new(
            TimeInterval::new(TaggedTime::new(self.local_next_tick), TaggedTime::unbounded()),
            IntInterval::new(1, 1),
        );
        match self.ring.front() {
            Some(Slot::Pending(f)) => match f.tag {
                FunctionTag::Send => vec![EndpointOption {
                    role: EndpointRole::Target(f.inputs[0].clone()),
                    time,
                }],
                FunctionTag::Receive => vec![EndpointOption {
                    role: EndpointRole::Source(f.outputs.clone()),
                    time,
                }],
                _ => unreachable!("non-io function admitted into spi ring"),
            },
            _ => vec![],
        }
    }

    fn endpoint_decision(&self, d: &EndpointDecision) -> NittaResult<SpiPu> {
        let mut next = self.clone();
        let head = next
            .ring
            .front()
            .cloned()
            .ok_or_else(|| NittaError::OptionViolation { pu: self.tag.clone() })?;
        let f = match &head {
            Slot::Pending(f) => f.clone(),
            Slot::InFlight { .. } => {
                return Err(NittaError::OptionViolation { pu: self.tag.clone() })
            }
        };
        let expected_role = match f.tag {
            FunctionTag::Send => EndpointRole::Target(f.inputs[0].clone()),
            FunctionTag::Receive => EndpointRole::Source(f.outputs.clone()),
            _ => unreachable!(),
        };
        if expected_role != d.role {
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
            StepDesc::Instruction(Instruction::SpiShift),
        );
        let fn_step = next.process.add_step(
            Placement::Interval(d.at.inf(), d.at.sup()),
            StepDesc::Function(f.clone()),
        );
        next.process.add_relation(fn_step, ep);
        next.ring.pop_front();
        next.local_next_tick = d.at.sup().clock + 1;
        next.process.update_tick(d.at.sup().checked_add(1));
        Ok(next)
    }

    fn process(&self) -> &ProcessRecord {
        &self.process
    }

    fn microcode_at(&self, t: i64, bus_width: usize) -> MicrocodeWord {
        let mut word = MicrocodeWord::no_op(bus_width);
        let shift = self.ports.get("shift").copied();
        for instr in self.process.instruction_at(t) {
            if matches!(instr, Instruction::SpiShift) {
                if let Some(bit) = shift {
                    if (bit as usize) < bus_width {
                        word.set(bit as usize, true);
                    }
                }
            }
        }
        word
    }

    fn locks(&self) -> Vec<Lock> {
        vec![]
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port {
                name: "mosi".into(),
                width: 1,
            },
            Port {
                name: "miso".into(),
                width: 1,
            },
            Port {
                name: "sclk".into(),
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
    fn ring_order_is_enforced() {
        let spi = SpiPu::new("spi1", IoSync::Sync);
        let send1 = Function::send("a".into());
        let send2 = Function::send("b".into());
        let bound = spi.try_bind(&send1).unwrap().try_bind(&send2).unwrap();

        let jump_ahead = EndpointDecision {
            role: EndpointRole::Target(VarId::new("b")),
            at: TimeInterval::new(TaggedTime::new(0), TaggedTime::new(0)),
        };
        assert!(bound.endpoint_decision(&jump_ahead).is_err());

        let in_order = EndpointDecision {
            role: EndpointRole::Target(VarId::new("a")),
            at: TimeInterval::new(TaggedTime::new(0), TaggedTime::new(0)),
        };
        let after = bound.endpoint_decision(&in_order).unwrap();
        assert_eq!(after.ring.len(), 1);
    }

    #[test]
    fn receive_offers_source() {
        let spi = SpiPu::new("spi1", IoSync::Async);
        let recv = Function::receive(vec!["x".into()]);
        let bound = spi.try_bind(&recv).unwrap();
        let opts = bound.endpoint_options();
        assert_eq!(opts.len(), 1);
        assert!(matches!(&opts[0].role, EndpointRole::Source(vs) if vs.contains(&VarId::new("x"))));
    }
}
