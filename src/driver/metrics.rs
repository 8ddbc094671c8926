/*!
Option scoring (§4.G): a lexicographic priority over *global* metrics
(how many bindings/dataflows/refactors are on offer at this node) and
*specific* metrics per option kind. `combine` stays a separate pure
function from option enumeration (§9 "Metrics as an open table") so a
policy can be swapped without touching how options are produced.
*/

use crate::network::BusNetwork;
use crate::problem::{BindOption, DataflowOption, ProblemOption, RefactorOption};

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetrics {
    pub binding_count: usize,
    pub dataflow_count: usize,
    pub refactor_count: usize,
}

impl GlobalMetrics {
    pub fn collect(options: &[ProblemOption]) -> Self {
        let mut m = GlobalMetrics::default();
        for o in options {
            match o {
                ProblemOption::Bind(_) => m.binding_count += 1,
                ProblemOption::Dataflow(_) => m.dataflow_count += 1,
                ProblemOption::Refactor(_) => m.refactor_count += 1,
                ProblemOption::Endpoint(_, _) => {}
            }
        }
        m
    }
}

fn score_bind(b: &BindOption) -> i64 {
    if b.critical {
        2000
    } else if b.alternative_count == 1 {
        500
    } else {
        200 + 10 * b.enablement as i64 - 2 * b.restlessness
    }
}

/// A dataflow option is "restricted-time" when its source can only
/// start at a single tick — waiting even one cycle would invalidate it.
fn is_restricted_time(d: &DataflowOption) -> bool {
    d.source.time.available.width() == 1
}

fn score_dataflow(d: &DataflowOption, network: &BusNetwork, global: &GlobalMetrics) -> i64 {
    let wait_time = d.earliest_start(network.next_tick().clock) - network.next_tick().clock;
    if global.dataflow_count >= 2 {
        10_000 + 200 - wait_time
    } else if is_restricted_time(d) {
        300
    } else {
        200 - wait_time
    }
}

fn score_refactor(r: &RefactorOption) -> i64 {
    let base = match r {
        RefactorOption::BreakLoop { .. } => 1000,
        RefactorOption::OptimizeAccumulate { .. } => 400,
        RefactorOption::ResolveDeadlock { .. } => 5000,
    };
    base + 50 * r.locks_broken() as i64
}

/// Combine a single option's specific score with the global counts at
/// this node into the final priority the policy sorts by.
pub fn score(network: &BusNetwork, global: &GlobalMetrics, option: &ProblemOption) -> i64 {
    match option {
        ProblemOption::Bind(b) => score_bind(b),
        ProblemOption::Dataflow(d) => score_dataflow(d, network, global),
        ProblemOption::Refactor(r) => score_refactor(r),
        ProblemOption::Endpoint(_, _) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Function;

    #[test]
    fn forced_bind_outranks_ordinary_bind() {
        let forced = BindOption {
            function: Function::add("a".into(), "b".into(), vec!["c".into()]),
            pu_tag: "acc1".into(),
            alternative_count: 1,
            critical: false,
            enablement: 0,
            restlessness: 0,
        };
        let ordinary = BindOption {
            alternative_count: 2,
            ..forced.clone()
        };
        assert!(score_bind(&forced) > score_bind(&ordinary));
    }

    #[test]
    fn critical_outranks_forced() {
        let forced = BindOption {
            function: Function::send("a".into()),
            pu_tag: "spi1".into(),
            alternative_count: 1,
            critical: false,
            enablement: 0,
            restlessness: 0,
        };
        let critical = BindOption { critical: true, ..forced.clone() };
        assert!(score_bind(&critical) > score_bind(&forced));
    }
}
