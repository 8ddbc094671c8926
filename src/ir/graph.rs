/*!
The dataflow graph (§4.B): either a leaf carrying one function, or a
cluster of sub-graphs; semantics are the flat union of leaves. The two
refactors specified — break-loop and optimize-accumulate — each rewrite
one piece of the graph and emit a `Diff` to propagate the renaming
(§9 "Refactoring as pure rewrite").
*/

use crate::ir::diff::{Diff, Patch};
use crate::ir::function::{Function, FunctionTag};
use crate::ir::variable::VarId;
use std::collections::HashSet;

#[derive(Clone, Debug)]
pub enum DataflowGraph {
    Leaf(Function),
    Cluster(Vec<DataflowGraph>),
}

impl DataflowGraph {
    pub fn leaf(f: Function) -> Self {
        DataflowGraph::Leaf(f)
    }

    pub fn cluster(parts: Vec<DataflowGraph>) -> Self {
        DataflowGraph::Cluster(parts)
    }

    /// Flat union of every leaf function, per §4.B.
    pub fn functions(&self) -> Vec<&Function> {
        match self {
            DataflowGraph::Leaf(f) => vec![f],
            DataflowGraph::Cluster(parts) => parts.iter().flat_map(|p| p.functions()).collect(),
        }
    }

    pub fn patch(&self, diff: &Diff) -> DataflowGraph {
        match self {
            DataflowGraph::Leaf(f) => DataflowGraph::Leaf(f.patch(diff)),
            DataflowGraph::Cluster(parts) => {
                DataflowGraph::Cluster(parts.iter().map(|p| p.patch(diff)).collect())
            }
        }
    }

    /// Replace one leaf (matched by presentation equality) with a
    /// replacement sub-graph.
    fn replace_leaf(&self, target: &Function, replacement: DataflowGraph) -> DataflowGraph {
        match self {
            DataflowGraph::Leaf(f) if f == target => replacement,
            DataflowGraph::Leaf(f) => DataflowGraph::Leaf(f.clone()),
            DataflowGraph::Cluster(parts) => DataflowGraph::Cluster(
                parts.iter().map(|p| p.replace_leaf(target, replacement.clone())).collect(),
            ),
        }
    }
}

/// Break a `loop(x0, input_in, outputs)` leaf into a `begin` pseudo-
/// function (a `constant` producing `x0`, used on the first cycle) and
/// an `end` pseudo-function (a `reg` over `input_in`, used thereafter).
/// The two reuse the closed tag set — `constant`/`reg` — rather than
/// introducing a fourteenth tag; they retain the original output
/// variable identity, so the propagated diff is empty.
pub fn break_loop(graph: &DataflowGraph, target: &Function) -> Option<(DataflowGraph, Diff, Function, Function)> {
    if target.tag != FunctionTag::Loop {
        return None;
    }
    let begin = Function::constant(target.literal[0], target.outputs.clone());
    let end = Function::reg(target.inputs[0].clone(), target.outputs.clone());
    let replacement = DataflowGraph::cluster(vec![
        DataflowGraph::leaf(begin.clone()),
        DataflowGraph::leaf(end.clone()),
    ]);
    let new_graph = graph.replace_leaf(target, replacement);
    Some((new_graph, Diff::new(), begin, end))
}

/// Merge a connected chain of `add`/`sub` leaves, each of whose
/// intermediate output is consumed by exactly one further function in
/// the chain, into a single n-ary accumulate function (§4.B, §9).
///
/// `chain` must be given outer-to-inner: `chain[0]` consumes the
/// algorithm-level inputs first, and each subsequent entry consumes the
/// previous entry's single intermediate output. The merged function's
/// output is the chain's final output variable(s); every intermediate
/// variable is dropped (no consumer outside the chain exists by
/// construction) and the diff renames them to nothing — downstream
/// consumers never saw them.
pub fn optimize_accumulate(graph: &DataflowGraph, chain: &[Function]) -> Option<(DataflowGraph, Diff, Function)> {
    if chain.is_empty() {
        return None;
    }
    if !chain.iter().all(|f| matches!(f.tag, FunctionTag::Add | FunctionTag::Sub)) {
        return None;
    }
    let intermediates: HashSet<VarId> = chain[..chain.len() - 1]
        .iter()
        .flat_map(|f| f.outputs.iter().cloned())
        .collect();

    let mut terms: Vec<(VarId, bool)> = Vec::new();
    for (i, f) in chain.iter().enumerate() {
        for (input, sign) in f.inputs.iter().zip(f.signs.iter()) {
            if i == 0 || !intermediates.contains(input) {
                terms.push((input.clone(), *sign));
            }
        }
    }
    let final_outputs = chain.last().unwrap().outputs.clone();
    let merged = Function::accumulate(terms, final_outputs);

    let mut new_graph = graph.clone();
    for f in &chain[..chain.len() - 1] {
        // Intermediate leaves disappear entirely; only the last leaf's
        // position becomes the merged function.
        new_graph = remove_leaf(&new_graph, f);
    }
    new_graph = new_graph.replace_leaf(chain.last().unwrap(), DataflowGraph::leaf(merged.clone()));
    Some((new_graph, Diff::new(), merged))
}

fn remove_leaf(graph: &DataflowGraph, target: &Function) -> DataflowGraph {
    match graph {
        DataflowGraph::Leaf(f) if f == target => DataflowGraph::Cluster(vec![]),
        DataflowGraph::Leaf(f) => DataflowGraph::Leaf(f.clone()),
        DataflowGraph::Cluster(parts) => {
            DataflowGraph::Cluster(parts.iter().map(|p| remove_leaf(p, target)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn break_loop_preserves_output_identity() {
        let loop_fn = Function::loop_fn(Value::int(32, 0), "b2".into(), vec!["a1".into()]);
        let graph = DataflowGraph::leaf(loop_fn.clone());
        let (new_graph, diff, begin, end) = break_loop(&graph, &loop_fn).unwrap();
        assert!(diff.is_empty());
        assert_eq!(begin.outputs, vec![VarId::new("a1")]);
        assert_eq!(end.outputs, vec![VarId::new("a1")]);
        assert_eq!(new_graph.functions().len(), 2);
    }

    #[test]
    fn optimize_accumulate_merges_chain() {
        // v = (a + b) - c
        let f1 = Function::add("a".into(), "b".into(), vec!["v".into()]);
        let f2 = Function::sub("v".into(), "c".into(), vec!["r".into()]);
        let graph = DataflowGraph::cluster(vec![DataflowGraph::leaf(f1.clone()), DataflowGraph::leaf(f2.clone())]);
        let (new_graph, diff, merged) = optimize_accumulate(&graph, &[f1, f2]).unwrap();
        assert!(diff.is_empty());
        assert_eq!(merged.inputs, vec![VarId::new("a"), VarId::new("b"), VarId::new("c")]);
        assert_eq!(merged.signs, vec![false, false, true]);
        assert_eq!(new_graph.functions().len(), 1);
    }
}
