/*!
The uniform problem surface (§4.F): a *problem* is a pair
`(options, decision)`. The bus network exports Bind, Dataflow,
Refactor (break-loop / optimize-accumulate / resolve-deadlock) and
delegates Endpoint to whichever sub-PU the option names. The synthesis
driver (`crate::driver`) treats every `ProblemOption` uniformly: collect,
score, pick, apply.

This module only carries the data each option/decision needs; scoring
lives in `crate::driver::metrics` and application lives on
`crate::network::BusNetwork` so that a problem value stays a plain,
`Clone`-able description of a possible move.
*/

use crate::endpoint::{EndpointDecision, EndpointOption};
use crate::ir::{Function, VarId};
use crate::PuTag;

#[derive(Clone, Debug)]
pub struct BindOption {
    pub function: Function,
    pub pu_tag: PuTag,
    /// How many PUs in the current model would accept this function —
    /// `1` means this is the only option (a "forced" bind), which the
    /// obvious-binding policy (§4.G) singles out.
    pub alternative_count: usize,
    /// A function is critical when binding it has an externally visible
    /// effect (`send`/`framOutput`) the schedule cannot complete
    /// without, regardless of alternative PUs.
    pub critical: bool,
    /// How many other pending functions directly consume one of this
    /// function's output variables — binding this one is what would let
    /// them progress.
    pub enablement: usize,
    /// Ticks between the network's current `next_tick` and the earliest
    /// endpoint this function would offer once bound.
    pub restlessness: i64,
}

#[derive(Clone, Debug)]
pub struct DataflowOption {
    pub source_pu: PuTag,
    pub source: EndpointOption,
    /// One `(destination PU, Target option)` pair per routed variable.
    /// A variable with no current consumer is simply absent here — the
    /// decision that picks this option broadcasts it as "held" per
    /// §4.E.
    pub targets: Vec<(PuTag, VarId, EndpointOption)>,
}

impl DataflowOption {
    /// Earliest tick this transfer could start, per §4.E: the max of the
    /// network's own `next_tick` and every participant's `available.inf`.
    pub fn earliest_start(&self, network_next_tick: i64) -> i64 {
        let mut earliest = network_next_tick.max(self.source.time.available.inf().clock);
        for (_, _, t) in &self.targets {
            earliest = earliest.max(t.time.available.inf().clock);
        }
        earliest
    }
}

#[derive(Clone, Debug)]
pub struct DataflowDecision {
    pub source_pu: PuTag,
    pub source: EndpointDecision,
    pub targets: Vec<(PuTag, EndpointDecision)>,
}

/// Break-loop and optimize-accumulate rewrite the dataflow graph;
/// resolve-deadlock rewrites the binding state. All three are
/// deterministic once a target is chosen, so the decision is the option
/// itself.
#[derive(Clone, Debug)]
pub enum RefactorOption {
    BreakLoop {
        target: Function,
        locks_broken: usize,
    },
    OptimizeAccumulate {
        chain: Vec<Function>,
        locks_broken: usize,
    },
    ResolveDeadlock {
        vars: Vec<VarId>,
        locks_broken: usize,
    },
}

impl RefactorOption {
    pub fn locks_broken(&self) -> usize {
        match self {
            RefactorOption::BreakLoop { locks_broken, .. }
            | RefactorOption::OptimizeAccumulate { locks_broken, .. }
            | RefactorOption::ResolveDeadlock { locks_broken, .. } => *locks_broken,
        }
    }

    /// A signature identifying "what pending variable set this refactor
    /// touches", used by the termination check (§4.G) to recognize a
    /// refactor that keeps firing without changing anything.
    pub fn signature(&self) -> String {
        match self {
            RefactorOption::BreakLoop { target, .. } => format!("break:{target}"),
            RefactorOption::OptimizeAccumulate { chain, .. } => {
                format!("accum:{}", chain.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(">"))
            }
            RefactorOption::ResolveDeadlock { vars, .. } => {
                format!("deadlock:{}", vars.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum ProblemOption {
    Bind(BindOption),
    Dataflow(DataflowOption),
    Refactor(RefactorOption),
    Endpoint(PuTag, EndpointOption),
}

#[derive(Clone, Debug)]
pub enum ProblemDecision {
    Bind(BindOption),
    Dataflow(DataflowDecision),
    Refactor(RefactorOption),
    Endpoint(PuTag, EndpointDecision),
}
