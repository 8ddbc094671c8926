/*!
`Function` — a typed record over the closed tag set of §3/§4.B, plus
the patch and (pure) simulate operations every function supports.

Equality of `Function` is by external presentation (its `Display`
string): two functions bound to the same tag, inputs and outputs print
identically and compare equal, while structurally equivalent functions
occupying different positions in the algorithm naturally carry
different variable names and so remain distinguishable.
*/

use crate::error::{NittaError, NittaResult};
use crate::ir::diff::{Diff, Patch};
use crate::ir::simulate::CycleContext;
use crate::ir::variable::VarId;
use crate::value::{OverflowPolicy, Value};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FunctionTag {
    Constant,
    Reg,
    Add,
    Sub,
    Mul,
    Div,
    ShiftL,
    ShiftR,
    Loop,
    Send,
    Receive,
    FramInput,
    FramOutput,
}

impl fmt::Display for FunctionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionTag::Constant => "constant",
            FunctionTag::Reg => "reg",
            FunctionTag::Add => "add",
            FunctionTag::Sub => "sub",
            FunctionTag::Mul => "mul",
            FunctionTag::Div => "div",
            FunctionTag::ShiftL => "shiftL",
            FunctionTag::ShiftR => "shiftR",
            FunctionTag::Loop => "loop",
            FunctionTag::Send => "send",
            FunctionTag::Receive => "receive",
            FunctionTag::FramInput => "framInput",
            FunctionTag::FramOutput => "framOutput",
        };
        write!(f, "{s}")
    }
}

/// A lock exported by a function/PU: `locked is lockBy lock_by`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lock {
    pub locked: VarId,
    pub lock_by: VarId,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub tag: FunctionTag,
    pub inputs: Vec<VarId>,
    pub outputs: Vec<VarId>,
    /// Literal operand(s): the initial value for `constant`/`loop`, or
    /// the fixed shift amount for `shiftL`/`shiftR`, or the fram cell
    /// address for `framInput`/`framOutput` (stored as an int literal).
    pub literal: Vec<Value>,
    pub overflow_policy: OverflowPolicy,
    /// One entry per input, `true` meaning "subtracted"; only
    /// meaningful for `Add`/`Sub`. `optimize_accumulate` produces an
    /// n-ary `Add`/`Sub` with a mixed sign vector from a chain of
    /// single-consumer adds/subs; ordinary binary `add`/`sub` carry the
    /// two-element default ([false, false] / [false, true]).
    pub signs: Vec<bool>,
}

impl Function {
    fn new(tag: FunctionTag, inputs: Vec<VarId>, outputs: Vec<VarId>, literal: Vec<Value>) -> Self {
        let signs = vec![false; inputs.len()];
        Self {
            tag,
            inputs,
            outputs,
            literal,
            overflow_policy: OverflowPolicy::default(),
            signs,
        }
    }

    /// An n-ary accumulate built from a chain of single-consumer
    /// adds/subs (§4.B, §9): `inputs[i]` is added if `signs[i]` is
    /// false, subtracted if true.
    pub fn accumulate(terms: Vec<(VarId, bool)>, outputs: impl Into<Vec<VarId>>) -> Self {
        let (inputs, signs): (Vec<_>, Vec<_>) = terms.into_iter().unzip();
        Self {
            tag: FunctionTag::Add,
            inputs,
            outputs: outputs.into(),
            literal: vec![],
            overflow_policy: OverflowPolicy::default(),
            signs,
        }
    }

    pub fn constant(value: Value, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Constant, vec![], outputs.into(), vec![value])
    }

    pub fn reg(input: VarId, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Reg, vec![input], outputs.into(), vec![])
    }

    pub fn add(a: VarId, b: VarId, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Add, vec![a, b], outputs.into(), vec![])
    }

    pub fn sub(a: VarId, b: VarId, outputs: impl Into<Vec<VarId>>) -> Self {
        let mut f = Self::new(FunctionTag::Sub, vec![a, b], outputs.into(), vec![]);
        f.signs = vec![false, true];
        f
    }

    pub fn mul(a: VarId, b: VarId, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Mul, vec![a, b], outputs.into(), vec![])
    }

    pub fn div(a: VarId, b: VarId, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Div, vec![a, b], outputs.into(), vec![])
    }

    pub fn shift_l(a: VarId, by: u32, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(
            FunctionTag::ShiftL,
            vec![a],
            outputs.into(),
            vec![Value::int(32, by as i128)],
        )
    }

    pub fn shift_r(a: VarId, by: u32, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(
            FunctionTag::ShiftR,
            vec![a],
            outputs.into(),
            vec![Value::int(32, by as i128)],
        )
    }

    pub fn loop_fn(x0: Value, input_in: VarId, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Loop, vec![input_in], outputs.into(), vec![x0])
    }

    pub fn send(input: VarId) -> Self {
        Self::new(FunctionTag::Send, vec![input], vec![], vec![])
    }

    pub fn receive(outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(FunctionTag::Receive, vec![], outputs.into(), vec![])
    }

    pub fn fram_input(addr: u32, outputs: impl Into<Vec<VarId>>) -> Self {
        Self::new(
            FunctionTag::FramInput,
            vec![],
            outputs.into(),
            vec![Value::int(32, addr as i128)],
        )
    }

    pub fn fram_output(addr: u32, input: VarId) -> Self {
        Self::new(
            FunctionTag::FramOutput,
            vec![input],
            vec![],
            vec![Value::int(32, addr as i128)],
        )
    }

    /// A `loop` function breaks a cyclic dependency in the dataflow
    /// graph: its output is available with no input dependency on the
    /// first cycle. Every other function tag is acyclic within a single
    /// cycle.
    pub fn breaks_evaluation_loop(&self) -> bool {
        matches!(self.tag, FunctionTag::Loop)
    }

    /// The divider's pipeline (§4.D) can hold a function `in flight`
    /// across several ticks while its own output blocks a downstream
    /// consumer that is itself feeding the divider's next operand — the
    /// one tag able to create a deadlock purely from internal latency.
    pub fn may_cause_internal_lock(&self) -> bool {
        matches!(self.tag, FunctionTag::Div)
    }

    pub fn locks(&self) -> Vec<Lock> {
        match self.tag {
            FunctionTag::Div => {
                // the remainder is only meaningful once the quotient's
                // consumer has observed it, per the pipeline contract.
                if self.outputs.len() >= 2 {
                    vec![Lock {
                        locked: self.outputs[1].clone(),
                        lock_by: self.outputs[0].clone(),
                    }]
                } else {
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    fn literal_int(&self, idx: usize) -> i128 {
        match self.literal[idx].kind {
            crate::value::ValueKind::Int(i) => i.raw,
            crate::value::ValueKind::Fx(f) => f.to_f64() as i128,
        }
    }

    pub fn fram_addr(&self) -> u32 {
        self.literal_int(0) as u32
    }

    pub fn shift_amount(&self) -> u32 {
        self.literal_int(0) as u32
    }

    /// Pure per-cycle simulation: maps this function's visible input
    /// valuation (plus any external channel state) to its output
    /// valuation.
    pub fn simulate(&self, ctx: &mut CycleContext) -> NittaResult<std::collections::HashMap<VarId, Value>> {
        use std::collections::HashMap;
        let mut out = HashMap::new();
        let policy = self.overflow_policy;
        let broadcast = |out: &mut HashMap<VarId, Value>, outputs: &[VarId], v: Value| {
            for o in outputs {
                out.insert(o.clone(), v);
            }
        };
        match self.tag {
            FunctionTag::Constant => {
                broadcast(&mut out, &self.outputs, self.literal[0]);
            }
            FunctionTag::Reg => {
                let v = ctx.input(&self.inputs[0])?;
                broadcast(&mut out, &self.outputs, v);
            }
            FunctionTag::Add | FunctionTag::Sub => {
                let first = ctx.input(&self.inputs[0])?;
                let mut acc = if self.signs[0] { negate(first) } else { first };
                for (input, negate_term) in self.inputs.iter().zip(self.signs.iter()).skip(1) {
                    let v = ctx.input(input)?;
                    acc = if *negate_term { acc.sub(v, policy) } else { acc.add(v, policy) };
                }
                broadcast(&mut out, &self.outputs, acc);
            }
            FunctionTag::Mul => {
                let a = ctx.input(&self.inputs[0])?;
                let b = ctx.input(&self.inputs[1])?;
                broadcast(&mut out, &self.outputs, a.mul(b, policy));
            }
            FunctionTag::Div => {
                let a = ctx.input(&self.inputs[0])?;
                let b = ctx.input(&self.inputs[1])?;
                let (q, r) = a.div_rem(b);
                if let Some(o) = self.outputs.first() {
                    out.insert(o.clone(), q);
                }
                if let Some(o) = self.outputs.get(1) {
                    out.insert(o.clone(), r);
                }
            }
            FunctionTag::ShiftL => {
                let a = ctx.input(&self.inputs[0])?;
                broadcast(&mut out, &self.outputs, a.shift_l(self.shift_amount()));
            }
            FunctionTag::ShiftR => {
                let a = ctx.input(&self.inputs[0])?;
                broadcast(&mut out, &self.outputs, a.shift_r(self.shift_amount()));
            }
            FunctionTag::Loop => {
                // first cycle: initialize to x0; thereafter, carry the
                // previous cycle's value of the loop-carried input.
                let v = if ctx.cycle == 0 {
                    self.literal[0]
                } else {
                    ctx.previous(&self.inputs[0])?
                };
                broadcast(&mut out, &self.outputs, v);
            }
            FunctionTag::Send => {
                let v = ctx.input(&self.inputs[0])?;
                ctx.send(&self.inputs[0], v);
            }
            FunctionTag::Receive => {
                let v = ctx.receive(&self.outputs[0], self.inputs.first())?;
                broadcast(&mut out, &self.outputs, v);
            }
            FunctionTag::FramInput => {
                let v = ctx.fram_read(self.fram_addr());
                broadcast(&mut out, &self.outputs, v);
            }
            FunctionTag::FramOutput => {
                let v = ctx.input(&self.inputs[0])?;
                ctx.fram_write(self.fram_addr(), v);
            }
        }
        Ok(out)
    }
}

impl Patch for Function {
    fn patch(&self, diff: &Diff) -> Function {
        Function {
            tag: self.tag.clone(),
            inputs: self.inputs.iter().map(|v| diff.rename_input(v)).collect(),
            outputs: self.outputs.iter().map(|v| diff.rename_output(v)).collect(),
            literal: self.literal.clone(),
            overflow_policy: self.overflow_policy,
            signs: self.signs.clone(),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lhs = self
            .outputs
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" = ");
        let rhs = match self.tag {
            FunctionTag::Constant => format!("{}", self.literal[0]),
            FunctionTag::Reg => self.inputs[0].to_string(),
            FunctionTag::Add | FunctionTag::Sub => {
                let mut s = if self.signs[0] {
                    format!("-{}", self.inputs[0])
                } else {
                    self.inputs[0].to_string()
                };
                for (input, negate_term) in self.inputs.iter().zip(self.signs.iter()).skip(1) {
                    s.push_str(if *negate_term { " - " } else { " + " });
                    s.push_str(&input.to_string());
                }
                s
            }
            FunctionTag::Mul => format!("{} * {}", self.inputs[0], self.inputs[1]),
            FunctionTag::Div => format!("{} / {}", self.inputs[0], self.inputs[1]),
            FunctionTag::ShiftL => format!("{} << {}", self.inputs[0], self.shift_amount()),
            FunctionTag::ShiftR => format!("{} >> {}", self.inputs[0], self.shift_amount()),
            FunctionTag::Loop => format!("{} | {}", self.literal[0], self.inputs[0]),
            FunctionTag::Send => format!("send({})", self.inputs[0]),
            FunctionTag::Receive => "receive()".to_string(),
            FunctionTag::FramInput => format!("framInput({})", self.fram_addr()),
            FunctionTag::FramOutput => format!("framOutput({}, {})", self.fram_addr(), self.inputs[0]),
        };
        if lhs.is_empty() {
            write!(f, "{rhs}")
        } else {
            write!(f, "{lhs} = {rhs}")
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
impl Eq for Function {}

fn negate(v: Value) -> Value {
    match v.kind {
        crate::value::ValueKind::Int(i) => Value {
            kind: crate::value::ValueKind::Int(crate::value::IntValue::new(i.width, -i.raw)),
            attr: v.attr,
        },
        crate::value::ValueKind::Fx(fx) => Value {
            kind: crate::value::ValueKind::Fx(crate::value::FxValue::from_raw(
                fx.int_bits,
                fx.frac_bits,
                -fx.raw,
            )),
            attr: v.attr,
        },
    }
}

pub fn simulation_failure(var: &VarId, cycle: usize, reason: impl Into<String>) -> NittaError {
    NittaError::SimulationFailure {
        var: var.clone(),
        cycle,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_presentation_round_trips_patch() {
        // S4: f = add(a, b, [c, d])
        let f = Function::add("a".into(), "b".into(), vec!["c".into(), "d".into()]);
        assert_eq!(f.to_string(), "c = d = a + b");

        let d1 = Diff::new().with_input("a", "a'");
        assert_eq!(f.patch(&d1).to_string(), "c = d = a' + b");

        let d2 = Diff::new().with_output("c", "c'");
        assert_eq!(f.patch(&d2).to_string(), "c' = d = a + b");

        let mixed = Diff::new()
            .with_input("b", "b'")
            .with_input("d", "d!")
            .with_output("d", "d'")
            .with_output("b", "b!");
        assert_eq!(f.patch(&mixed).to_string(), "c = d' = a + b'");
    }

    #[test]
    fn equality_is_by_presentation() {
        let a = Function::add("x".into(), "y".into(), vec!["z".into()]);
        let b = Function::add("x".into(), "y".into(), vec!["z".into()]);
        assert_eq!(a, b);
        let c = Function::add("x2".into(), "y".into(), vec!["z".into()]);
        assert_ne!(a, c);
    }

    proptest::proptest! {
        /// §8 property 6: `patch(reverse(d), patch(d, f)) = f` for any
        /// function and any diff whose renames are injective (as any
        /// diff arising from a real refactor is, since it names each
        /// variable at most once on each side). The suffix-per-name
        /// construction below is injective by construction: distinct
        /// original variables always produce distinct renamed ones.
        #[test]
        fn patch_reverse_round_trips(suffix in "[a-z]{1,4}") {
            let f = Function::add("a".into(), "b".into(), vec!["c".into(), "d".into()]);
            let diff = Diff::new()
                .with_input("a", format!("a_{suffix}"))
                .with_input("b", format!("b_{suffix}"))
                .with_output("c", format!("c_{suffix}"))
                .with_output("d", format!("d_{suffix}"));
            let patched = f.patch(&diff);
            let back = patched.patch(&diff.reverse());
            prop_assert_eq!(back, f);
        }
    }
}
