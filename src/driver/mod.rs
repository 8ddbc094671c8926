/*!
driver — the synthesis tree search (§4.G, §5). A `SearchNode` is an
immutable snapshot `{network, graph}` plus the bookkeeping the search
needs to stay deterministic; `SynthesisDriver` walks nodes by
collecting every `ProblemOption`, scoring them with `metrics::score`,
and applying the winner, until a node is complete, dead, or the
deadline passes.
*/

pub mod metrics;
pub mod policy;

use crate::error::{NittaError, NittaResult};
use crate::ir::{DataflowGraph, VarId};
use crate::network::BusNetwork;
use crate::problem::{DataflowDecision, DataflowOption, ProblemOption, RefactorOption};
use crate::time::{TaggedTime, TimeInterval};
pub use policy::SearchPolicy;
use std::collections::HashSet;
use std::time::Instant;

/// §4.G: a node is complete when nothing remains to bind or transport;
/// dead when no options remain but it is not complete; in-progress
/// otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Complete,
    Dead,
    InProgress,
}

/// One point in the search tree. `decision_index` is this node's
/// position among its siblings — the tie-break the spec requires when
/// two options score equally (§5 "a node's children are totally
/// ordered by decision_index").
#[derive(Clone, Debug)]
pub struct SearchNode {
    pub network: BusNetwork,
    pub graph: DataflowGraph,
    pub decision_index: u64,
    pub depth: u32,
}

impl SearchNode {
    pub fn root(network: BusNetwork, graph: DataflowGraph) -> Self {
        Self {
            network,
            graph,
            decision_index: 0,
            depth: 0,
        }
    }

    /// Every currently offered option, across bind, dataflow and
    /// refactor. Resolve-deadlock is only offered once bind, dataflow
    /// and the other two refactors are all exhausted (§4.E) — offering
    /// it earlier would mask a binding the network could still make.
    pub fn options(&self) -> Vec<ProblemOption> {
        let mut out: Vec<ProblemOption> = self.network.bind_options().into_iter().map(ProblemOption::Bind).collect();
        out.extend(self.network.dataflow_options().into_iter().map(ProblemOption::Dataflow));

        let mut refactors = self.network.break_loop_options(&self.graph);
        refactors.extend(self.network.optimize_accumulate_options(&self.graph));

        if out.is_empty() && refactors.is_empty() && !self.network.is_complete() {
            refactors.extend(self.network.resolve_deadlock_options(&self.blocked_vars()));
        }
        refactors.retain(|r| !self.network.would_exceed_repetition_limit(r));
        out.extend(refactors.into_iter().map(ProblemOption::Refactor));
        out
    }

    pub fn status(&self) -> NodeStatus {
        if self.network.is_complete() {
            NodeStatus::Complete
        } else if self.options().is_empty() {
            NodeStatus::Dead
        } else {
            NodeStatus::InProgress
        }
    }

    /// Variables named by a lock whose own producer has not bound yet
    /// — candidates for resolve-deadlock's renaming (§4.E).
    fn blocked_vars(&self) -> Vec<VarId> {
        self.network
            .locks()
            .into_iter()
            .map(|(_, lock)| lock.locked)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect()
    }

    /// `(unbound function count, untransferred variable count)` for
    /// the `DeadlockDetected` error (§7).
    pub fn unbound_and_untransferred(&self) -> (usize, usize) {
        let unbound = self.network.remains_len();
        let all_vars: HashSet<VarId> = self.graph.functions().iter().flat_map(|f| f.outputs.iter().cloned()).collect();
        let mut transferred: HashSet<VarId> = self.network.process().transferred_variables().into_iter().collect();
        for pu in self.network.pus().values() {
            transferred.extend(pu.process().transferred_variables());
        }
        let untransferred = all_vars.difference(&transferred).count();
        (unbound, untransferred)
    }

    /// Turn a `DataflowOption` into a concrete `DataflowDecision` at its
    /// earliest admissible start, per §4.E: the source spans
    /// `[start, start+duration-1]`, and each target starts no earlier
    /// than its own `available.inf` but otherwise rides the same
    /// transfer.
    fn earliest_dataflow_decision(&self, opt: &DataflowOption) -> DataflowDecision {
        let start = opt.earliest_start(self.network.next_tick().clock);
        let src_dur = opt.source.time.duration.inf().max(1);
        let source = crate::endpoint::EndpointDecision {
            role: opt.source.role.clone(),
            at: TimeInterval::new(TaggedTime::new(start), TaggedTime::new(start + src_dur - 1)),
        };
        let targets = opt
            .targets
            .iter()
            .map(|(tag, _, o)| {
                let t_start = start.max(o.time.available.inf().clock);
                let dur = o.time.duration.inf().max(1);
                (
                    tag.clone(),
                    crate::endpoint::EndpointDecision {
                        role: o.role.clone(),
                        at: TimeInterval::new(TaggedTime::new(t_start), TaggedTime::new(t_start + dur - 1)),
                    },
                )
            })
            .collect();
        DataflowDecision {
            source_pu: opt.source_pu.clone(),
            source,
            targets,
        }
    }

    /// Apply one option, producing the child node at `decision_index`
    /// among its siblings.
    pub fn apply(&self, option: &ProblemOption, decision_index: u64) -> NittaResult<SearchNode> {
        let mut node = SearchNode {
            network: self.network.clone(),
            graph: self.graph.clone(),
            decision_index,
            depth: self.depth + 1,
        };
        match option {
            ProblemOption::Bind(b) => {
                node.network = self.network.apply_bind(b)?;
            }
            ProblemOption::Dataflow(d) => {
                let decision = self.earliest_dataflow_decision(d);
                node.network = self.network.apply_dataflow(&decision)?;
            }
            ProblemOption::Refactor(r) => match r {
                RefactorOption::BreakLoop { .. } => {
                    let (network, graph, _diff) = self.network.apply_break_loop(&self.graph, r)?;
                    node.network = network;
                    node.graph = graph;
                }
                RefactorOption::OptimizeAccumulate { .. } => {
                    let (network, graph, _diff) = self.network.apply_optimize_accumulate(&self.graph, r)?;
                    node.network = network;
                    node.graph = graph;
                }
                RefactorOption::ResolveDeadlock { .. } => {
                    let (network, diff) = self.network.apply_resolve_deadlock(r)?;
                    node.network = network;
                    node.graph = self.graph.patch(&diff);
                }
            },
            ProblemOption::Endpoint(tag, o) => {
                let start = o.time.earliest_start(self.network.next_tick());
                let dur = o.time.duration.inf().max(1);
                let decision = crate::endpoint::EndpointDecision {
                    role: o.role.clone(),
                    at: TimeInterval::new(start, start.checked_add(dur - 1)),
                };
                node.network = self.network.apply_endpoint(tag, &decision)?;
            }
        }
        Ok(node)
    }
}

/// Drives the search to completion (or failure) under a policy and an
/// optional deadline. On deadline the driver returns the best
/// *complete* node seen, or the deepest *in-progress* node if none is
/// complete (§5 "Cancellation and timeout").
pub struct SynthesisDriver {
    policy: SearchPolicy,
    deadline: Option<Instant>,
}

impl SynthesisDriver {
    pub fn new(policy: SearchPolicy) -> Self {
        Self { policy, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run the search from `start` to completion (§4.G).
    pub fn synthesize(&self, start: SearchNode) -> NittaResult<SearchNode> {
        let mut current = start;
        let mut deepest_in_progress = current.clone();

        loop {
            if let Some(dl) = self.deadline {
                if Instant::now() >= dl {
                    return Ok(deepest_in_progress);
                }
            }
            match current.status() {
                NodeStatus::Complete => return Ok(current),
                NodeStatus::Dead => {
                    let (unbound, untransferred) = current.unbound_and_untransferred();
                    return Err(NittaError::DeadlockDetected { unbound, untransferred });
                }
                NodeStatus::InProgress => {
                    let options = current.options();
                    let chosen_index = self.select(&current, &options)?;
                    current = current.apply(&options[chosen_index], chosen_index as u64)?;
                    deepest_in_progress = current.clone();
                }
            }
        }
    }

    /// Index into `options` of the move this policy picks next.
    fn select(&self, node: &SearchNode, options: &[ProblemOption]) -> NittaResult<usize> {
        if options.is_empty() {
            return Err(NittaError::Other("select called with no options".into()));
        }
        if matches!(self.policy, SearchPolicy::ObviousBinding) {
            if let Some(i) = options
                .iter()
                .position(|o| matches!(o, ProblemOption::Bind(b) if b.alternative_count == 1))
            {
                return Ok(i);
            }
        }
        if let SearchPolicy::BoundedAllThreads { width, depth } = self.policy {
            return Ok(self.select_bounded(node, options, width, depth));
        }
        Ok(Self::top_pick(&node.network, options))
    }

    /// Highest score wins; on a tie the lowest index (earliest
    /// decision_index) wins, matching §5's total order over siblings.
    fn top_pick(network: &BusNetwork, options: &[ProblemOption]) -> usize {
        let global = metrics::GlobalMetrics::collect(options);
        options
            .iter()
            .enumerate()
            .map(|(i, o)| (metrics::score(network, &global, o), i))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|(_, i)| i)
            .unwrap()
    }

    /// `BoundedAllThreads` (§4.G): expand the top `width` options by
    /// immediate score, roll each one out `depth` further steps
    /// greedily, and pick the branch whose rollout accumulates the
    /// highest total score — genuine lookahead rather than the
    /// single-path top pick the other two policies use.
    fn select_bounded(&self, node: &SearchNode, options: &[ProblemOption], width: usize, depth: u32) -> usize {
        let global = metrics::GlobalMetrics::collect(options);
        let mut by_score: Vec<(i64, usize)> = options
            .iter()
            .enumerate()
            .map(|(i, o)| (metrics::score(&node.network, &global, o), i))
            .collect();
        by_score.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        by_score.truncate(width.max(1));

        let candidates: Vec<(i64, usize)> = by_score
            .into_iter()
            .map(|(immediate, i)| {
                let rollout = match node.apply(&options[i], i as u64) {
                    Ok(child) => immediate + self.rollout_score(&child, depth.saturating_sub(1)),
                    Err(_) => i64::MIN,
                };
                (rollout, i)
            })
            .collect();

        candidates
            .iter()
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .map(|&(_, i)| i)
            .unwrap()
    }

    /// Continue greedily from `node` for up to `remaining_depth` more
    /// steps, summing the score of the option taken at each step; stops
    /// early at a complete, dead, or option-less node.
    fn rollout_score(&self, node: &SearchNode, remaining_depth: u32) -> i64 {
        if remaining_depth == 0 {
            return 0;
        }
        let options = node.options();
        if options.is_empty() {
            return 0;
        }
        let global = metrics::GlobalMetrics::collect(&options);
        let (score, i) = options
            .iter()
            .enumerate()
            .map(|(i, o)| (metrics::score(&node.network, &global, o), i))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
            .unwrap();
        match node.apply(&options[i], i as u64) {
            Ok(child) => score + self.rollout_score(&child, remaining_depth - 1),
            Err(_) => score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DataflowGraph, Function};
    use crate::pu::fram::FramPu;
    use crate::pu::serial::{AccumulatorKind, SerialPu};
    use crate::pu::{IoSync, Pu};
    use std::collections::HashMap;

    fn add_network() -> (BusNetwork, DataflowGraph) {
        let mut pus = HashMap::new();
        pus.insert("fram1".to_string(), Pu::Fram(FramPu::new("fram1", 4)));
        pus.insert("acc1".to_string(), Pu::Accumulator(SerialPu::<AccumulatorKind>::new("acc1")));
        let network = BusNetwork::new("net", pus, 8, IoSync::Sync);

        let fo_a = Function::fram_output(0, "a".into());
        let fo_b = Function::fram_output(1, "b".into());
        let add = Function::add("a".into(), "b".into(), vec!["c".into()]);
        let fi_c = Function::fram_input(2, vec!["c".into()]);
        let graph = DataflowGraph::cluster(vec![
            DataflowGraph::leaf(fo_a.clone()),
            DataflowGraph::leaf(fo_b.clone()),
            DataflowGraph::leaf(add.clone()),
            DataflowGraph::leaf(fi_c.clone()),
        ]);
        let network = network.load_algorithm(vec![fo_a, fo_b, add, fi_c]);
        (network, graph)
    }

    #[test]
    fn synthesize_reaches_a_complete_node() {
        let (network, graph) = add_network();
        let driver = SynthesisDriver::new(SearchPolicy::GreedyBestFirst);
        let result = driver.synthesize(SearchNode::root(network, graph));
        assert!(result.is_ok(), "expected a completed schedule, got {result:?}");
        let node = result.unwrap();
        assert_eq!(node.status(), NodeStatus::Complete);
    }

    #[test]
    fn obvious_binding_prefers_forced_binds_first() {
        let (network, graph) = add_network();
        let driver = SynthesisDriver::new(SearchPolicy::ObviousBinding);
        let root = SearchNode::root(network, graph);
        let options = root.options();
        let chosen = driver.select(&root, &options).unwrap();
        assert!(matches!(&options[chosen], ProblemOption::Bind(b) if b.alternative_count == 1));
    }

    #[test]
    fn bounded_all_threads_reaches_a_complete_node() {
        let (network, graph) = add_network();
        let driver = SynthesisDriver::new(SearchPolicy::BoundedAllThreads { width: 3, depth: 2 });
        let result = driver.synthesize(SearchNode::root(network, graph));
        assert!(result.is_ok(), "expected a completed schedule, got {result:?}");
        assert_eq!(result.unwrap().status(), NodeStatus::Complete);
    }

    #[test]
    fn bounded_all_threads_rollout_picks_an_offered_option() {
        let (network, graph) = add_network();
        let root = SearchNode::root(network, graph);
        let options = root.options();

        let bounded = SynthesisDriver::new(SearchPolicy::BoundedAllThreads {
            width: options.len(),
            depth: 3,
        });
        let chosen = bounded.select(&root, &options).unwrap();
        assert!(chosen < options.len());
    }
}
