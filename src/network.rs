/*!
`BusNetwork` (§4.E): the container PU. It hosts every sub-PU, owns the
shared bus timeline, enumerates binding and dataflow options across
sub-PUs, and applies the problem-surface decisions of §4.F.
*/

use crate::endpoint::{EndpointDecision, EndpointRole};
use crate::error::{NittaError, NittaResult};
use crate::ir::{graph, DataflowGraph, Diff, Function, Patch, VarId};
use crate::problem::{BindOption, DataflowDecision, DataflowOption, RefactorOption};
use crate::process::{Instruction, Placement, ProcessRecord, StepDesc, StepId};
use crate::pu::{IoSync, Pu};
use crate::time::TaggedTime;
use crate::PuTag;
use std::collections::{HashMap, VecDeque};

/// Default buffer-repetition bound (§4.G): a refactor whose signature
/// repeats `n` times in a row without changing the pending variable set
/// is rejected rather than looping forever.
pub const DEFAULT_REPETITION_LIMIT: usize = 2;

#[derive(Clone, Debug)]
pub struct BusNetwork {
    tag: PuTag,
    remains: Vec<Function>,
    binded: HashMap<PuTag, Vec<Function>>,
    pus: HashMap<PuTag, Pu>,
    process: ProcessRecord,
    bus_width: usize,
    io_sync: IoSync,
    repetition_limit: usize,
    recent_refactors: VecDeque<String>,
}

impl BusNetwork {
    pub fn new(tag: impl Into<PuTag>, pus: HashMap<PuTag, Pu>, bus_width: usize, io_sync: IoSync) -> Self {
        Self {
            tag: tag.into(),
            remains: vec![],
            binded: HashMap::new(),
            pus,
            process: ProcessRecord::new(),
            bus_width,
            io_sync,
            repetition_limit: DEFAULT_REPETITION_LIMIT,
            recent_refactors: VecDeque::new(),
        }
    }

    pub fn with_repetition_limit(mut self, limit: usize) -> Self {
        self.repetition_limit = limit;
        self
    }

    pub fn load_algorithm(&self, functions: impl IntoIterator<Item = Function>) -> BusNetwork {
        let mut next = self.clone();
        next.remains.extend(functions);
        next
    }

    pub fn tag(&self) -> &PuTag {
        &self.tag
    }

    pub fn remains_len(&self) -> usize {
        self.remains.len()
    }

    pub fn pus(&self) -> &HashMap<PuTag, Pu> {
        &self.pus
    }

    pub fn process(&self) -> &ProcessRecord {
        &self.process
    }

    pub fn next_tick(&self) -> TaggedTime {
        self.process.next_tick
    }

    pub fn io_sync(&self) -> IoSync {
        self.io_sync
    }

    // ---- Bind -----------------------------------------------------

    /// For each function in `remains`, every sub-PU whose `try_bind`
    /// succeeds is one option; `alternative_count` is the size of that
    /// accepting set (§4.E "number of alternative PUs").
    pub fn bind_options(&self) -> Vec<BindOption> {
        let mut out = vec![];
        for f in &self.remains {
            let accepting: Vec<&PuTag> = self
                .pus
                .iter()
                .filter(|(_, pu)| pu.try_bind(f).is_ok())
                .map(|(tag, _)| tag)
                .collect();
            let critical = matches!(f.tag, crate::ir::FunctionTag::Send | crate::ir::FunctionTag::FramOutput);
            let enablement = self
                .remains
                .iter()
                .filter(|g| !std::ptr::eq(*g, f) && g.inputs.iter().any(|i| f.outputs.contains(i)))
                .count();
            for tag in &accepting {
                let restlessness = self
                    .pus
                    .get(*tag)
                    .and_then(|pu| pu.try_bind(f).ok())
                    .and_then(|pu| pu.endpoint_options().first().cloned())
                    .map(|o| (o.time.available.inf().clock - self.process.next_tick.clock).max(0))
                    .unwrap_or(0);
                out.push(BindOption {
                    function: f.clone(),
                    pu_tag: (*tag).clone(),
                    alternative_count: accepting.len(),
                    critical,
                    enablement,
                    restlessness,
                });
            }
        }
        out
    }

    pub fn apply_bind(&self, opt: &BindOption) -> NittaResult<BusNetwork> {
        let mut next = self.clone();
        let pos = next
            .remains
            .iter()
            .position(|f| f == &opt.function)
            .ok_or_else(|| NittaError::Other(format!("function {} not in remains", opt.function)))?;
        let f = next.remains.remove(pos);
        let pu = next
            .pus
            .get(&opt.pu_tag)
            .ok_or_else(|| NittaError::Other(format!("unknown PU tag {}", opt.pu_tag)))?;
        let bound_pu = pu.try_bind(&f)?;
        next.pus.insert(opt.pu_tag.clone(), bound_pu);
        next.binded.entry(opt.pu_tag.clone()).or_default().push(f.clone());
        next.process.add_step(
            Placement::Instant(next.process.next_tick),
            StepDesc::Cad(format!("bind {f} to {}", opt.pu_tag)),
        );
        Ok(next)
    }

    // ---- Dataflow ---------------------------------------------------

    /// Scan every sub-PU's `endpoint_options`; for each `Source(vs)`
    /// option, form a dataflow option routing each `v ∈ vs` to at most
    /// one `Target(v)` option of some *other* PU, rejecting assignments
    /// that would double-book a destination PU (§4.E constraint 1).
    /// Variables with no available consumer are simply omitted from
    /// `targets` ("held", per §4.E) rather than dropping the option —
    /// only an option whose `targets` end up entirely empty is dropped.
    pub fn dataflow_options(&self) -> Vec<DataflowOption> {
        let mut out = vec![];
        for (src_tag, src_pu) in &self.pus {
            for src_opt in src_pu.endpoint_options() {
                let vs = match &src_opt.role {
                    EndpointRole::Source(vs) => vs.clone(),
                    EndpointRole::Target(_) => continue,
                };
                let mut targets = vec![];
                let mut used_dst: Vec<&PuTag> = vec![];
                for v in &vs {
                    let pick = self.pus.iter().find(|(dst_tag, dst_pu)| {
                        *dst_tag != src_tag
                            && !used_dst.contains(dst_tag)
                            && dst_pu
                                .endpoint_options()
                                .iter()
                                .any(|o| matches!(&o.role, EndpointRole::Target(tv) if tv == v))
                    });
                    if let Some((dst_tag, dst_pu)) = pick {
                        let opt = dst_pu
                            .endpoint_options()
                            .into_iter()
                            .find(|o| matches!(&o.role, EndpointRole::Target(tv) if tv == v))
                            .unwrap();
                        used_dst.push(dst_tag);
                        targets.push((dst_tag.clone(), v.clone(), opt));
                    }
                }
                if targets.is_empty() {
                    continue;
                }
                out.push(DataflowOption {
                    source_pu: src_tag.clone(),
                    source: src_opt,
                    targets,
                });
            }
        }
        out
    }

    /// `src_start = s.at.inf`; `src_duration` is the max over targets of
    /// `(t.at.inf - src_start + t.at.width)`; apply source then every
    /// target, append one `Transport` per variable, advance `next_tick`.
    pub fn apply_dataflow(&self, decision: &DataflowDecision) -> NittaResult<BusNetwork> {
        let mut next = self.clone();
        let src_start = decision.source.at.inf();

        let src_pu = next
            .pus
            .get(&decision.source_pu)
            .ok_or_else(|| NittaError::Other(format!("unknown PU tag {}", decision.source_pu)))?
            .clone();
        let applied_src = src_pu.endpoint_decision(&decision.source)?;
        next.pus.insert(decision.source_pu.clone(), applied_src);

        let mut src_duration = decision.source.at.width();
        for (_, d) in &decision.targets {
            let candidate = d.at.inf().clock - src_start.clock + d.at.width();
            src_duration = src_duration.max(candidate);
        }
        let src_end = TaggedTime::new(src_start.clock + src_duration - 1);

        for (dst_tag, d) in &decision.targets {
            let dst_pu = next
                .pus
                .get(dst_tag)
                .ok_or_else(|| NittaError::Other(format!("unknown PU tag {dst_tag}")))?
                .clone();
            let applied = dst_pu.endpoint_decision(d)?;
            next.pus.insert(dst_tag.clone(), applied);

            let vars = match &d.role {
                EndpointRole::Target(v) => vec![v.clone()],
                EndpointRole::Source(vs) => vs.clone(),
            };
            for v in vars {
                next.process.add_step(
                    Placement::Interval(src_start, src_end),
                    StepDesc::Instruction(Instruction::Transport {
                        var: v,
                        src: decision.source_pu.clone(),
                        dst: dst_tag.clone(),
                    }),
                );
            }
        }
        next.process.update_tick(decision.source.at.sup().checked_add(1));
        for (_, d) in &decision.targets {
            next.process.update_tick(d.at.sup().checked_add(1));
        }
        Ok(next)
    }

    // ---- Break-loop ---------------------------------------------------

    pub fn break_loop_options(&self, graph: &DataflowGraph) -> Vec<RefactorOption> {
        graph
            .functions()
            .into_iter()
            .filter(|f| f.breaks_evaluation_loop())
            .map(|f| RefactorOption::BreakLoop {
                target: f.clone(),
                locks_broken: f.locks().len(),
            })
            .collect()
    }

    /// Find the PU holding the `loop` function, substitute the two
    /// pseudo-functions into its binding list, and let the PU rebuild
    /// itself: the caller is expected to `try_bind` the two replacements
    /// onto the same PU tag the `loop` function occupied (§4.E).
    pub fn apply_break_loop(
        &self,
        graph: &DataflowGraph,
        opt: &RefactorOption,
    ) -> NittaResult<(BusNetwork, DataflowGraph, Diff)> {
        let RefactorOption::BreakLoop { target, .. } = opt else {
            return Err(NittaError::Other("not a break-loop option".into()));
        };
        let (new_graph, diff, begin, end) = graph::break_loop(graph, target)
            .ok_or_else(|| NittaError::Other(format!("{target} is not a loop function")))?;

        let mut next = self.clone();
        let owner = next
            .binded
            .iter()
            .find(|(_, fs)| fs.iter().any(|f| f == target))
            .map(|(tag, _)| tag.clone())
            .ok_or_else(|| NittaError::Other(format!("no PU owns {target}")))?;

        {
            let fs = next.binded.get_mut(&owner).unwrap();
            fs.retain(|f| f != target);
            fs.push(begin.clone());
            fs.push(end.clone());
        }
        let pu = next.pus.get(&owner).unwrap().clone();
        let pu = pu.try_bind(&begin)?;
        let pu = pu.try_bind(&end)?;
        next.pus.insert(owner.clone(), pu);
        next.process.add_step(
            Placement::Instant(next.process.next_tick),
            StepDesc::Cad(format!("break-loop {target} into {begin} / {end}")),
        );
        next.note_refactor(opt);
        Ok((next, new_graph, diff))
    }

    // ---- Optimize-accumulate -------------------------------------------

    /// Find maximal chains of single-consumer `add`/`sub` leaves in
    /// binding order: a leaf `g` continues a chain started at `f` if `f`
    /// has exactly one output, that output is consumed by exactly one
    /// other leaf in the graph, and that leaf is `g`.
    pub fn optimize_accumulate_options(&self, graph: &DataflowGraph) -> Vec<RefactorOption> {
        let functions = graph.functions();
        let mut consumer_count: HashMap<VarId, usize> = HashMap::new();
        for f in &functions {
            for input in &f.inputs {
                *consumer_count.entry(input.clone()).or_insert(0) += 1;
            }
        }
        let mut chains = vec![];
        let mut consumed_as_continuation: std::collections::HashSet<VarId> = Default::default();
        for f in &functions {
            if !matches!(f.tag, crate::ir::FunctionTag::Add | crate::ir::FunctionTag::Sub) {
                continue;
            }
            if f.outputs.len() != 1 {
                continue;
            }
            let out = &f.outputs[0];
            if consumed_as_continuation.contains(out) {
                continue;
            }
            let mut chain = vec![(*f).clone()];
            let mut cursor = out.clone();
            loop {
                if consumer_count.get(&cursor).copied().unwrap_or(0) != 1 {
                    break;
                }
                let next_leaf = functions.iter().find(|g| {
                    matches!(g.tag, crate::ir::FunctionTag::Add | crate::ir::FunctionTag::Sub)
                        && g.inputs.contains(&cursor)
                });
                match next_leaf {
                    Some(g) if g.outputs.len() == 1 => {
                        consumed_as_continuation.insert(cursor.clone());
                        chain.push((*g).clone());
                        cursor = g.outputs[0].clone();
                    }
                    _ => break,
                }
            }
            if chain.len() > 1 {
                let locks_broken: usize = chain.iter().map(|f| f.locks().len()).sum();
                chains.push(RefactorOption::OptimizeAccumulate { chain, locks_broken });
            }
        }
        chains
    }

    pub fn apply_optimize_accumulate(
        &self,
        graph: &DataflowGraph,
        opt: &RefactorOption,
    ) -> NittaResult<(BusNetwork, DataflowGraph, Diff)> {
        let RefactorOption::OptimizeAccumulate { chain, .. } = opt else {
            return Err(NittaError::Other("not an optimize-accumulate option".into()));
        };
        let (new_graph, diff, merged) = graph::optimize_accumulate(graph, chain)
            .ok_or_else(|| NittaError::Other("chain is not a valid add/sub run".into()))?;

        let mut next = self.clone();
        let owner = next
            .binded
            .iter()
            .find(|(_, fs)| fs.iter().any(|f| f == &chain[0]))
            .map(|(tag, _)| tag.clone());

        if let Some(owner) = owner {
            let fs = next.binded.get_mut(&owner).unwrap();
            fs.retain(|f| !chain.contains(f));
            fs.push(merged.clone());
            let pu = next.pus.get(&owner).unwrap().clone();
            let pu = pu.try_bind(&merged)?;
            next.pus.insert(owner, pu);
        } else {
            next.remains.retain(|f| !chain.contains(f));
            next.remains.push(merged.clone());
        }
        next.process.add_step(
            Placement::Instant(next.process.next_tick),
            StepDesc::Cad(format!("optimize-accumulate {} leaves into {merged}", chain.len())),
        );
        next.note_refactor(opt);
        Ok((next, new_graph, diff))
    }

    // ---- Resolve-deadlock -----------------------------------------------

    /// A model is deadlocked when no bind/dataflow/endpoint options
    /// remain while functions are still unbound or variables
    /// untransferred, and two (or more) PUs each export a `Lock` waiting
    /// on a variable the other side must produce first. The option
    /// inserts a fresh `reg` per blocked variable so the downstream
    /// consumer reads a renamed copy instead of racing the original.
    pub fn resolve_deadlock_options(&self, blocked_vars: &[VarId]) -> Vec<RefactorOption> {
        if blocked_vars.is_empty() {
            vec![]
        } else {
            vec![RefactorOption::ResolveDeadlock {
                vars: blocked_vars.to_vec(),
                locks_broken: blocked_vars.len(),
            }]
        }
    }

    pub fn apply_resolve_deadlock(&self, opt: &RefactorOption) -> NittaResult<(BusNetwork, Diff)> {
        let RefactorOption::ResolveDeadlock { vars, .. } = opt else {
            return Err(NittaError::Other("not a resolve-deadlock option".into()));
        };
        let mut next = self.clone();
        let mut diff = Diff::new();
        let mut regs = vec![];
        for v in vars {
            let renamed = v.suffixed("_dl");
            diff = diff.with_input(v.clone(), renamed.clone());
            regs.push(Function::reg(v.clone(), vec![renamed]));
        }
        next.remains = next.remains.iter().map(|f| f.patch(&diff)).collect();
        next.remains.extend(regs.clone());
        // Sub-PUs that have already committed an endpoint for one of
        // `vars` keep their own copy of the occupying function; this
        // renames the network's bookkeeping (`remains`/`binded`) but not
        // in-flight PU state, which is an accepted simplification (see
        // DESIGN.md) since resolve-deadlock only ever fires before the
        // blocked variable's consumer has bound at all.
        for fs in next.binded.values_mut() {
            *fs = fs.iter().map(|f| f.patch(&diff)).collect();
        }
        next.process.add_step(
            Placement::Instant(next.process.next_tick),
            StepDesc::Cad(format!("resolve-deadlock: insert {} reg(s)", regs.len())),
        );
        next.note_refactor(opt);
        Ok((next, diff))
    }

    fn note_refactor(&mut self, opt: &RefactorOption) {
        self.recent_refactors.push_back(opt.signature());
        while self.recent_refactors.len() > self.repetition_limit {
            self.recent_refactors.pop_front();
        }
    }

    /// A refactor is at the repetition bound if its signature has
    /// appeared in every one of the last `repetition_limit` slots
    /// already — i.e. applying it again would be the
    /// `repetition_limit + 1`-th repeat in a row with no progress
    /// (§4.G termination, §7 repetition-limit).
    pub fn would_exceed_repetition_limit(&self, opt: &RefactorOption) -> bool {
        let sig = opt.signature();
        self.recent_refactors.len() >= self.repetition_limit
            && self.recent_refactors.iter().all(|s| s == &sig)
    }

    // ---- Endpoint pass-through ------------------------------------------

    pub fn endpoint_options_for(&self, pu_tag: &str) -> Vec<crate::endpoint::EndpointOption> {
        self.pus.get(pu_tag).map(|p| p.endpoint_options()).unwrap_or_default()
    }

    pub fn apply_endpoint(&self, pu_tag: &str, d: &EndpointDecision) -> NittaResult<BusNetwork> {
        let mut next = self.clone();
        let pu = next
            .pus
            .get(pu_tag)
            .ok_or_else(|| NittaError::Other(format!("unknown PU tag {pu_tag}")))?
            .clone();
        next.pus.insert(pu_tag.to_string(), pu.endpoint_decision(d)?);
        Ok(next)
    }

    // ---- Completion -----------------------------------------------------

    pub fn is_complete(&self) -> bool {
        self.remains.is_empty()
            && self.pus.values().all(|p| p.endpoint_options().is_empty())
            && self.dataflow_options().is_empty()
    }

    pub fn is_dead(&self) -> bool {
        !self.is_complete()
            && self.bind_options().is_empty()
            && self.dataflow_options().is_empty()
            && self.pus.values().all(|p| p.endpoint_options().is_empty())
    }

    pub fn locks(&self) -> Vec<(PuTag, crate::ir::Lock)> {
        self.pus
            .iter()
            .flat_map(|(tag, p)| p.locks().into_iter().map(move |l| (tag.clone(), l)))
            .collect()
    }

    pub fn microcode_at(&self, t: i64) -> NittaResult<crate::pu::MicrocodeWord> {
        let mut word = crate::pu::MicrocodeWord::no_op(self.bus_width);
        for pu in self.pus.values() {
            let sub = pu.microcode_at(t, self.bus_width);
            word = word.merge(&sub).map_err(|(bit, a, b)| NittaError::MicrocodeConflict {
                tick: t,
                bit,
                a,
                b,
            })?;
        }
        Ok(word)
    }

    /// Build the final aggregated process (§4.E "Aggregated process"):
    /// nest every sub-PU's steps under its `pu_tag`, then add
    /// transport-to-endpoint and function-to-transport vertical
    /// relations.
    pub fn aggregate_process(&self) -> ProcessRecord {
        let mut agg = self.process.clone();
        let mut nested_ids: HashMap<(PuTag, StepId), StepId> = HashMap::new();

        for (tag, pu) in &self.pus {
            for step in pu.process().steps() {
                let id = agg.nest(tag.clone(), step);
                nested_ids.insert((tag.clone(), step.id), id);
            }
        }

        let transport_steps: Vec<_> = agg
            .steps()
            .iter()
            .filter(|s| matches!(s.desc, StepDesc::Instruction(Instruction::Transport { .. })))
            .map(|s| (s.id, s.desc.clone()))
            .collect();

        for (tag, pu) in &self.pus {
            for step in pu.process().steps() {
                if let StepDesc::EndpointRole(role) = &step.desc {
                    let vars = role.variables();
                    if let Some(&wrapper) = nested_ids.get(&(tag.clone(), step.id)) {
                        for (t_id, t_desc) in &transport_steps {
                            if let StepDesc::Instruction(Instruction::Transport { var, .. }) = t_desc {
                                if vars.contains(var) {
                                    agg.add_relation(*t_id, wrapper);
                                }
                            }
                        }
                    }
                }
                if let StepDesc::Function(f) = &step.desc {
                    if let Some(&wrapper) = nested_ids.get(&(tag.clone(), step.id)) {
                        for (t_id, t_desc) in &transport_steps {
                            if let StepDesc::Instruction(Instruction::Transport { var, .. }) = t_desc {
                                if f.outputs.contains(var) {
                                    agg.add_relation(wrapper, *t_id);
                                }
                            }
                        }
                    }
                }
            }
        }
        agg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pu::fram::FramPu;
    use crate::pu::serial::{AccumulatorKind, SerialPu};

    fn two_pu_network() -> BusNetwork {
        let mut pus = HashMap::new();
        pus.insert("fram1".to_string(), Pu::Fram(FramPu::new("fram1", 4)));
        pus.insert("acc1".to_string(), Pu::Accumulator(SerialPu::<AccumulatorKind>::new("acc1")));
        BusNetwork::new("net", pus, 4, IoSync::Sync)
    }

    #[test]
    fn bind_options_report_forced_alternative() {
        let net = two_pu_network();
        let add = Function::add("a".into(), "b".into(), vec!["c".into()]);
        let net = net.load_algorithm(vec![add]);
        let opts = net.bind_options();
        assert_eq!(opts.len(), 1);
        assert_eq!(opts[0].alternative_count, 1);
        assert_eq!(opts[0].pu_tag, "acc1");
    }

    #[test]
    fn apply_bind_moves_function_into_binding_list() {
        let net = two_pu_network();
        let add = Function::add("a".into(), "b".into(), vec!["c".into()]);
        let net = net.load_algorithm(vec![add.clone()]);
        let opt = net.bind_options().remove(0);
        let bound = net.apply_bind(&opt).unwrap();
        assert!(bound.binded.get("acc1").unwrap().contains(&add));
        assert!(bound.remains.is_empty());
    }

    #[test]
    fn dataflow_options_pair_source_and_target() {
        let net = two_pu_network();
        let fo = Function::fram_output(0, "x".into());
        let add = Function::add("x".into(), "y".into(), vec!["z".into()]);
        let net = net.load_algorithm(vec![fo.clone(), add.clone()]);
        let bind_fo = net.bind_options().into_iter().find(|o| o.function == fo).unwrap();
        let net = net.apply_bind(&bind_fo).unwrap();
        let bind_add = net.bind_options().into_iter().find(|o| o.function == add).unwrap();
        let net = net.apply_bind(&bind_add).unwrap();

        let opts = net.dataflow_options();
        assert!(opts
            .iter()
            .any(|o| o.targets.iter().any(|(tag, v, _)| tag == "acc1" && v.as_str() == "x")));
    }
}
