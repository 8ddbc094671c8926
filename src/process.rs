/*!
`ProcessRecord` — the append-only schedule history (§3, §4.C). It is
the *only* witness of scheduling: every derived query
(`what_happens_at`, `instruction_at`, `endpoint_at`,
`transferred_variables`) reads it back rather than consulting any PU or
network state directly.
*/

use crate::endpoint::EndpointRole;
use crate::ir::{Function, VarId};
use crate::time::TaggedTime;
use crate::PuTag;

pub type StepId = u64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Placement {
    Instant(TaggedTime),
    Interval(TaggedTime, TaggedTime),
}

impl Placement {
    pub fn start(&self) -> TaggedTime {
        match self {
            Placement::Instant(t) => *t,
            Placement::Interval(a, _) => *a,
        }
    }

    pub fn end(&self) -> TaggedTime {
        match self {
            Placement::Instant(t) => *t,
            Placement::Interval(_, b) => *b,
        }
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start().clock && t <= self.end().clock
    }

    pub fn overlaps(&self, other: &Placement) -> bool {
        self.start().clock <= other.end().clock && other.start().clock <= self.end().clock
    }
}

/// A PU-specific microinstruction, or a bus-network transport — the
/// set of instruction shapes named across §4.D/§4.E.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    FramLoad(u32),
    FramSave(u32),
    SerialLatch,
    SerialCompute,
    DividerStart,
    ShiftApply(u32),
    SpiShift,
    Transport { var: VarId, src: PuTag, dst: PuTag },
    Nop,
}

#[derive(Clone, Debug)]
pub enum StepDesc {
    Cad(String),
    Function(Function),
    EndpointRole(EndpointRole),
    Instruction(Instruction),
    Nested {
        pu_tag: PuTag,
        inner_id: StepId,
    },
}

#[derive(Clone, Debug)]
pub struct Step {
    pub id: StepId,
    pub placement: Placement,
    pub desc: StepDesc,
}

/// Relation `(high, low)`: `high` is an abstraction of `low` — e.g. a
/// `Function` step relates to the endpoint/instruction steps that
/// realize it, or a nested import relates to the sub-PU step it wraps.
pub type Relation = (StepId, StepId);

#[derive(Clone, Debug)]
pub struct ProcessRecord {
    steps: Vec<Step>,
    relations: Vec<Relation>,
    next_id: StepId,
    pub next_tick: TaggedTime,
}

impl Default for ProcessRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRecord {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            relations: Vec::new(),
            next_id: 0,
            next_tick: TaggedTime::new(0),
        }
    }

    pub fn add_step(&mut self, placement: Placement, desc: StepDesc) -> StepId {
        let id = self.next_id;
        self.next_id += 1;
        self.steps.push(Step { id, placement, desc });
        id
    }

    pub fn add_relation(&mut self, high: StepId, low: StepId) {
        self.relations.push((high, low));
    }

    /// Monotone tick update: `next_tick` never decreases (§3 invariant,
    /// §5 "monotone time").
    pub fn update_tick(&mut self, t: TaggedTime) {
        if t.clock > self.next_tick.clock {
            self.next_tick = t;
        }
    }

    /// Imports a sub-PU's step into this (parent) timeline, recording a
    /// vertical relation from the fresh wrapper step down to the
    /// original.
    pub fn nest(&mut self, pu_tag: PuTag, inner: &Step) -> StepId {
        let id = self.add_step(
            inner.placement,
            StepDesc::Nested {
                pu_tag,
                inner_id: inner.id,
            },
        );
        self.add_relation(id, inner.id);
        id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Every step whose placement covers tick `t`.
    pub fn what_happens_at(&self, t: i64) -> Vec<&Step> {
        self.steps.iter().filter(|s| s.placement.contains(t)).collect()
    }

    pub fn instruction_at(&self, t: i64) -> Vec<&Instruction> {
        self.what_happens_at(t)
            .into_iter()
            .filter_map(|s| match &s.desc {
                StepDesc::Instruction(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn endpoint_at(&self, t: i64) -> Vec<&EndpointRole> {
        self.what_happens_at(t)
            .into_iter()
            .filter_map(|s| match &s.desc {
                StepDesc::EndpointRole(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Every variable named by a `Transport` instruction anywhere in
    /// the record.
    pub fn transferred_variables(&self) -> Vec<VarId> {
        self.steps
            .iter()
            .filter_map(|s| match &s.desc {
                StepDesc::Instruction(Instruction::Transport { var, .. }) => Some(var.clone()),
                _ => None,
            })
            .collect()
    }

    /// All `Transport` steps, for the bus-exclusivity check (§8
    /// property 2).
    pub fn transport_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.desc, StepDesc::Instruction(Instruction::Transport { .. })))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn update_tick_is_monotone() {
        let mut p = ProcessRecord::new();
        p.update_tick(TaggedTime::new(5));
        p.update_tick(TaggedTime::new(3));
        assert_eq!(p.next_tick.clock, 5);
        p.update_tick(TaggedTime::new(9));
        assert_eq!(p.next_tick.clock, 9);
    }

    #[test]
    fn nest_records_vertical_relation() {
        let mut inner = ProcessRecord::new();
        let inner_id = inner.add_step(Placement::Instant(TaggedTime::new(1)), StepDesc::Cad("x".into()));
        let inner_step = inner.step(inner_id).unwrap().clone();

        let mut outer = ProcessRecord::new();
        let wrapper_id = outer.nest("fram1".to_string(), &inner_step);
        assert!(outer.relations().contains(&(wrapper_id, inner_id)));
    }

    #[test]
    fn bus_exclusivity_detects_overlap() {
        let mut p = ProcessRecord::new();
        p.add_step(
            Placement::Interval(TaggedTime::new(0), TaggedTime::new(2)),
            StepDesc::Instruction(Instruction::Transport {
                var: VarId::new("a"),
                src: "acc".into(),
                dst: "fram1".into(),
            }),
        );
        p.add_step(
            Placement::Interval(TaggedTime::new(1), TaggedTime::new(3)),
            StepDesc::Instruction(Instruction::Transport {
                var: VarId::new("b"),
                src: "acc".into(),
                dst: "fram2".into(),
            }),
        );
        let transports = p.transport_steps();
        assert_eq!(transports.len(), 2);
        assert!(transports[0].placement.overlaps(&transports[1].placement));
    }

    proptest::proptest! {
        /// §8 property 3: `next_tick` is monotonically non-decreasing
        /// across any sequence of `update_tick` calls, regardless of
        /// the order the ticks arrive in.
        #[test]
        fn update_tick_never_regresses(ticks in proptest::collection::vec(0i64..10_000, 0..50)) {
            let mut p = ProcessRecord::new();
            let mut seen_max = p.next_tick.clock;
            for t in ticks {
                p.update_tick(TaggedTime::new(t));
                prop_assert!(p.next_tick.clock >= seen_max);
                seen_max = p.next_tick.clock;
            }
        }
    }
}
