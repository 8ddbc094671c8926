/*!
pu — the uniform processing-unit contract (§4.D) and the tagged-union
`Pu` sum type that hosts every concrete PU (§9 "Polymorphic PU as sum
type"): Fram, Accumulator, Multiplier, Divider, Shift, SPI.

Every concrete PU implements the `PuOps` trait; `Pu` dispatches each
contract method to the active variant. Adding a PU means adding a
variant here and one arm per dispatch method — the tagged union and its
dispatch tables, not a trait object, so the variant set stays closed
and exhaustive-match enforced by the compiler.
*/

pub mod divider;
pub mod fram;
pub mod serial;
pub mod spi;

use crate::endpoint::{EndpointDecision, EndpointOption};
use crate::error::NittaResult;
use crate::ir::{Function, Lock};
use crate::process::ProcessRecord;
use crate::PuTag;

pub use divider::DividerPu;
pub use fram::FramPu;
pub use serial::{AccumulatorKind, MultiplierKind, SerialPu, ShiftKind};
pub use spi::{IoSync, SpiPu};

/// One bit of the shared control bus, named for HDL emission (out of
/// scope here, but the name survives so a downstream emitter can map
/// it to a pin).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub width: u32,
}

/// The control-signal bundle effective at one tick, as a fixed-width
/// bit vector indexed by signal position on the shared bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MicrocodeWord {
    pub bits: Vec<Option<bool>>,
}

impl MicrocodeWord {
    /// Every bit starts undriven (`None`) rather than an explicit low —
    /// a PU that never touches a signal must be distinguishable from one
    /// that actively holds it low, or merging two PUs' words can never
    /// tell "nobody drives this bit" apart from "this PU drives it low".
    pub fn no_op(width: usize) -> Self {
        Self {
            bits: vec![None; width],
        }
    }

    pub fn set(&mut self, index: usize, value: bool) {
        self.bits[index] = Some(value);
    }

    /// Merge two words bit-by-bit. A signal set by only one side wins;
    /// a signal set by both to different values is a contract
    /// violation per §4.D ("Overlap on the same signal with
    /// conflicting values is a contract violation") and is reported
    /// rather than silently resolved (§9 open question).
    pub fn merge(&self, other: &MicrocodeWord) -> Result<MicrocodeWord, (usize, bool, bool)> {
        let mut out = self.clone();
        for (i, ob) in other.bits.iter().enumerate() {
            if let Some(v) = ob {
                match out.bits[i] {
                    Some(existing) if existing != *v => return Err((i, existing, *v)),
                    _ => out.bits[i] = Some(*v),
                }
            }
        }
        Ok(out)
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::new();
        for chunk in self.bits.chunks(4) {
            let mut nibble = 0u8;
            for (i, b) in chunk.iter().enumerate() {
                if b.unwrap_or(false) {
                    nibble |= 1 << (chunk.len() - 1 - i);
                }
            }
            out.push(std::char::from_digit(nibble as u32, 16).unwrap());
        }
        out
    }
}

/// Dispatch surface every concrete PU implements. `Self` must be
/// `Clone` because every decision produces an immutable new snapshot
/// rather than mutating in place (§5 "states are immutable").
pub trait PuOps: Clone {
    fn tag(&self) -> &PuTag;
    fn try_bind(&self, f: &Function) -> NittaResult<Self>
    where
        Self: Sized;
    fn endpoint_options(&self) -> Vec<EndpointOption>;
    fn endpoint_decision(&self, d: &EndpointDecision) -> NittaResult<Self>
    where
        Self: Sized;
    fn process(&self) -> &ProcessRecord;
    fn microcode_at(&self, t: i64, bus_width: usize) -> MicrocodeWord;
    fn locks(&self) -> Vec<Lock>;
    fn ports(&self) -> Vec<Port>;
}

/// The tagged union of every concrete PU kind.
#[derive(Clone, Debug)]
pub enum Pu {
    Fram(FramPu),
    Accumulator(SerialPu<AccumulatorKind>),
    Multiplier(SerialPu<MultiplierKind>),
    Divider(DividerPu),
    Shift(SerialPu<ShiftKind>),
    Spi(SpiPu),
}

macro_rules! dispatch {
    ($self:expr, $pu:ident => $body:expr) => {
        match $self {
            Pu::Fram($pu) => $body,
            Pu::Accumulator($pu) => $body,
            Pu::Multiplier($pu) => $body,
            Pu::Divider($pu) => $body,
            Pu::Shift($pu) => $body,
            Pu::Spi($pu) => $body,
        }
    };
}

impl Pu {
    pub fn tag(&self) -> &PuTag {
        dispatch!(self, p => p.tag())
    }

    pub fn try_bind(&self, f: &Function) -> NittaResult<Pu> {
        Ok(match self {
            Pu::Fram(p) => Pu::Fram(p.try_bind(f)?),
            Pu::Accumulator(p) => Pu::Accumulator(p.try_bind(f)?),
            Pu::Multiplier(p) => Pu::Multiplier(p.try_bind(f)?),
            Pu::Divider(p) => Pu::Divider(p.try_bind(f)?),
            Pu::Shift(p) => Pu::Shift(p.try_bind(f)?),
            Pu::Spi(p) => Pu::Spi(p.try_bind(f)?),
        })
    }

    pub fn endpoint_options(&self) -> Vec<EndpointOption> {
        dispatch!(self, p => p.endpoint_options())
    }

    pub fn endpoint_decision(&self, d: &EndpointDecision) -> NittaResult<Pu> {
        Ok(match self {
            Pu::Fram(p) => Pu::Fram(p.endpoint_decision(d)?),
            Pu::Accumulator(p) => Pu::Accumulator(p.endpoint_decision(d)?),
            Pu::Multiplier(p) => Pu::Multiplier(p.endpoint_decision(d)?),
            Pu::Divider(p) => Pu::Divider(p.endpoint_decision(d)?),
            Pu::Shift(p) => Pu::Shift(p.endpoint_decision(d)?),
            Pu::Spi(p) => Pu::Spi(p.endpoint_decision(d)?),
        })
    }

    pub fn process(&self) -> &ProcessRecord {
        dispatch!(self, p => p.process())
    }

    pub fn microcode_at(&self, t: i64, bus_width: usize) -> MicrocodeWord {
        dispatch!(self, p => p.microcode_at(t, bus_width))
    }

    pub fn locks(&self) -> Vec<Lock> {
        dispatch!(self, p => p.locks())
    }

    pub fn ports(&self) -> Vec<Port> {
        dispatch!(self, p => p.ports())
    }
}
