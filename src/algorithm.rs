/*!
algorithm — the algorithm input (§6, ambient): a set of functions with
literal initial values for loops/constants and a named entry point. The
front-end parser that produces this is out of scope (§1); this module
only gives the engine a `serde`-round-trippable surface form so an
algorithm can be lowered to/from JSON without that front-end.

`FunctionSpec`/`ValueSpec` exist because `Function`/`Value` name
variables and numeric cells by internal types (`VarId`, `ValueKind`)
that carry no serde impls by design (§3: `VarId` is opaque, cheap to
clone, not meant to round-trip through a wire format on its own). This
module's types are the wire format; `to_function`/`to_value` lower them
into the real IR once, at load time.
*/

use crate::ir::{Function, VarId};
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValueSpec {
    Int { width: u32, raw: i128 },
    Fx { int_bits: u32, frac_bits: u32, raw: i128 },
}

impl ValueSpec {
    pub fn to_value(&self) -> Value {
        match self {
            ValueSpec::Int { width, raw } => Value::int(*width, *raw),
            ValueSpec::Fx { int_bits, frac_bits, raw } => Value::fx(*int_bits, *frac_bits, *raw),
        }
    }
}

fn vars(names: &[String]) -> Vec<VarId> {
    names.iter().map(|s| VarId::new(s.as_str())).collect()
}

/// One function over the closed tag set of §3/§4.B, in wire form.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "camelCase")]
pub enum FunctionSpec {
    Constant { value: ValueSpec, outputs: Vec<String> },
    Reg { input: String, outputs: Vec<String> },
    Add { a: String, b: String, outputs: Vec<String> },
    Sub { a: String, b: String, outputs: Vec<String> },
    Mul { a: String, b: String, outputs: Vec<String> },
    Div { a: String, b: String, outputs: Vec<String> },
    ShiftL { a: String, by: u32, outputs: Vec<String> },
    ShiftR { a: String, by: u32, outputs: Vec<String> },
    Loop { x0: ValueSpec, input: String, outputs: Vec<String> },
    Send { input: String },
    Receive { outputs: Vec<String> },
    FramInput { addr: u32, outputs: Vec<String> },
    FramOutput { addr: u32, input: String },
}

impl FunctionSpec {
    pub fn to_function(&self) -> Function {
        match self {
            FunctionSpec::Constant { value, outputs } => Function::constant(value.to_value(), vars(outputs)),
            FunctionSpec::Reg { input, outputs } => Function::reg(VarId::new(input.as_str()), vars(outputs)),
            FunctionSpec::Add { a, b, outputs } => {
                Function::add(VarId::new(a.as_str()), VarId::new(b.as_str()), vars(outputs))
            }
            FunctionSpec::Sub { a, b, outputs } => {
                Function::sub(VarId::new(a.as_str()), VarId::new(b.as_str()), vars(outputs))
            }
            FunctionSpec::Mul { a, b, outputs } => {
                Function::mul(VarId::new(a.as_str()), VarId::new(b.as_str()), vars(outputs))
            }
            FunctionSpec::Div { a, b, outputs } => {
                Function::div(VarId::new(a.as_str()), VarId::new(b.as_str()), vars(outputs))
            }
            FunctionSpec::ShiftL { a, by, outputs } => Function::shift_l(VarId::new(a.as_str()), *by, vars(outputs)),
            FunctionSpec::ShiftR { a, by, outputs } => Function::shift_r(VarId::new(a.as_str()), *by, vars(outputs)),
            FunctionSpec::Loop { x0, input, outputs } => {
                Function::loop_fn(x0.to_value(), VarId::new(input.as_str()), vars(outputs))
            }
            FunctionSpec::Send { input } => Function::send(VarId::new(input.as_str())),
            FunctionSpec::Receive { outputs } => Function::receive(vars(outputs)),
            FunctionSpec::FramInput { addr, outputs } => Function::fram_input(*addr, vars(outputs)),
            FunctionSpec::FramOutput { addr, input } => Function::fram_output(*addr, VarId::new(input.as_str())),
        }
    }
}

/// The algorithm as a whole: a flat function set plus the entry point
/// the front-end designated (opaque to the engine beyond naming which
/// output the caller cares about — e.g. for `--fsim` tracing).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub entry: String,
    pub functions: Vec<FunctionSpec>,
}

impl AlgorithmSpec {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn functions(&self) -> Vec<Function> {
        self.functions.iter().map(FunctionSpec::to_function).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_fibonacci_algorithm_through_json() {
        let spec = AlgorithmSpec {
            entry: "a1".to_string(),
            functions: vec![
                FunctionSpec::Loop {
                    x0: ValueSpec::Int { width: 32, raw: 0 },
                    input: "b2".to_string(),
                    outputs: vec!["a1".to_string()],
                },
                FunctionSpec::Loop {
                    x0: ValueSpec::Int { width: 32, raw: 1 },
                    input: "c".to_string(),
                    outputs: vec!["b1".to_string(), "b2".to_string()],
                },
                FunctionSpec::Add {
                    a: "a1".to_string(),
                    b: "b1".to_string(),
                    outputs: vec!["c".to_string()],
                },
            ],
        };
        let json = spec.to_json().unwrap();
        let back = AlgorithmSpec::from_json(&json).unwrap();
        let functions = back.functions();
        assert_eq!(functions.len(), 3);
        assert_eq!(back.entry, "a1");
    }
}
