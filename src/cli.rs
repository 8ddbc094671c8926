/*!
cli — the command-line surface (§6 "CLI surface (minimal, engine-facing)").

The spec names five engine-facing flags on top of the algorithm file;
it says nothing about how the microarchitecture declaration reaches the
engine, since that's listed as a separate external input. A run cannot
synthesize anything without one, so this module adds `--microarch` as
the obvious missing piece (see DESIGN.md).
*/

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValueTypeParseError(String);

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum IoSyncArg {
    Sync,
    Async,
    Onboard,
}

impl From<IoSyncArg> for crate::pu::IoSync {
    fn from(v: IoSyncArg) -> Self {
        match v {
            IoSyncArg::Sync => crate::pu::IoSync::Sync,
            IoSyncArg::Async => crate::pu::IoSync::Async,
            IoSyncArg::Onboard => crate::pu::IoSync::OnBoard,
        }
    }
}

/// `int` or `fxM.N`, parsed from the `--type` flag (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Int { width: u32 },
    Fx { int_bits: u32, frac_bits: u32 },
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("int") {
            let width = if rest.is_empty() { 32 } else { rest.parse().map_err(|_| format!("bad int width: {rest}"))? };
            return Ok(ValueType::Int { width });
        }
        if let Some(rest) = s.strip_prefix("fx") {
            let (int_bits, frac_bits) = rest
                .split_once('.')
                .ok_or_else(|| format!("expected fxM.N, got {s}"))?;
            let int_bits = int_bits.parse().map_err(|_| format!("bad int_bits in {s}"))?;
            let frac_bits = frac_bits.parse().map_err(|_| format!("bad frac_bits in {s}"))?;
            return Ok(ValueType::Fx { int_bits, frac_bits });
        }
        Err(format!("unrecognized --type value: {s}"))
    }
}

#[derive(Parser, Debug)]
#[command(name = "nitta", about = "CAD synthesis engine: dataflow algorithm -> cycle-accurate bus schedule")]
pub struct Cli {
    /// Path to the algorithm file (JSON, `crate::algorithm::AlgorithmSpec`).
    pub algfile: PathBuf,

    /// Path to the microarchitecture declaration (TOML, `crate::microarch::MicroarchSpec`).
    #[arg(long)]
    pub microarch: PathBuf,

    /// Numeric domain functions in this algorithm are interpreted under.
    #[arg(long = "type")]
    pub value_type: ValueType,

    /// Print the functional trace instead of synthesizing a schedule.
    #[arg(long)]
    pub fsim: bool,

    /// Print the testbench vectors derived from a synthesized schedule.
    #[arg(long)]
    pub lsim: bool,

    /// Cycles to run `--fsim`/`--lsim` for, when the algorithm has no
    /// natural termination (e.g. an unbroken loop).
    #[arg(short = 'n', long = "cycles")]
    pub cycles: Option<usize>,

    /// Overrides the microarchitecture's declared IO synchronization mode.
    #[arg(long = "io-sync")]
    pub io_sync: Option<IoSyncArg>,

    /// Raises the tracing filter to debug.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_int_type() {
        let t: ValueType = "int".parse().unwrap();
        assert!(matches!(t, ValueType::Int { width: 32 }));
    }

    #[test]
    fn parses_sized_int_type() {
        let t: ValueType = "int16".parse().unwrap();
        assert!(matches!(t, ValueType::Int { width: 16 }));
    }

    #[test]
    fn parses_fixed_point_type() {
        let t: ValueType = "fx8.8".parse().unwrap();
        assert!(matches!(t, ValueType::Fx { int_bits: 8, frac_bits: 8 }));
    }

    #[test]
    fn rejects_unrecognized_type() {
        assert!("whatever".parse::<ValueType>().is_err());
    }
}
