/*!
`Diff` / `Patch` — the uniform renaming mechanism refactors use to
rewrite variable identities in place (§3, §9 "Refactoring as pure
rewrite").

A diff is two independent mappings: renames that apply to a function's
*input* variables, and renames that apply to its *output* variables.
`patch` applies a diff to anything that names variables; `Patch` is
implemented for `Function`, endpoint roles/options/decisions, and plain
binding lists, so a single `patch(diff, *)` call threads a refactor
through the whole model state.
*/

use crate::ir::VarId;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct Diff {
    pub input: HashMap<VarId, VarId>,
    pub output: HashMap<VarId, VarId>,
}

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, from: impl Into<VarId>, to: impl Into<VarId>) -> Self {
        self.input.insert(from.into(), to.into());
        self
    }

    pub fn with_output(mut self, from: impl Into<VarId>, to: impl Into<VarId>) -> Self {
        self.output.insert(from.into(), to.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// The inverse diff: swaps each mapping's direction so that
    /// `patch(reverse(d), patch(d, f)) = f` (§8 property 6).
    pub fn reverse(&self) -> Diff {
        Diff {
            input: self.input.iter().map(|(k, v)| (v.clone(), k.clone())).collect(),
            output: self.output.iter().map(|(k, v)| (v.clone(), k.clone())).collect(),
        }
    }

    pub fn rename_input(&self, v: &VarId) -> VarId {
        self.input.get(v).cloned().unwrap_or_else(|| v.clone())
    }

    pub fn rename_output(&self, v: &VarId) -> VarId {
        self.output.get(v).cloned().unwrap_or_else(|| v.clone())
    }
}

/// Implemented by anything that carries variable identities and can be
/// rewritten in place by a diff.
pub trait Patch {
    fn patch(&self, diff: &Diff) -> Self;
}

impl Patch for VarId {
    fn patch(&self, diff: &Diff) -> Self {
        // A bare VarId doesn't know whether it's playing an input or
        // output role; callers patch through `Function::patch`, which
        // dispatches each stored variable through the correct side.
        diff.input
            .get(self)
            .or_else(|| diff.output.get(self))
            .cloned()
            .unwrap_or_else(|| self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_is_involutive_on_patch() {
        let diff = Diff::new().with_input("a", "a'").with_output("c", "c'");
        let v: VarId = "a".into();
        let patched = diff.rename_input(&v);
        assert_eq!(patched.as_str(), "a'");
        let back = diff.reverse().rename_input(&patched);
        assert_eq!(back.as_str(), "a");
    }
}
