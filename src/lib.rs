#![doc = r#"
nitta — a CAD synthesis engine.

Takes a dataflow-style algorithm and a microarchitecture declaration (a
bus-connected set of specialized processing units) and synthesizes a
cycle-accurate schedule binding every function to a PU and every
inter-PU transfer to a concrete time interval on the shared bus.

Modules:
- value: integer / fixed-point value algebra with attribute bits
- time: tagged clock values and closed intervals
- ir: variables, functions, diff/patch, the dataflow graph, the
  functional simulator
- process: the append-only scheduling record
- pu: the uniform processing-unit contract and its concrete PUs (Fram,
  Accumulator, Multiplier, Divider, Shift, SPI)
- network: the bus network, the container PU hosting every sub-PU
- problem: the uniform option/decision surface the driver searches over
- driver: the synthesis tree, metric scoring, search policies
- microarch / algorithm: serde-backed engine inputs
- boundary: functional-simulator driving, testbench vectors, microcode
  dump
- error: the engine-wide error enum
- cli: the command-line surface
"#]

pub mod algorithm;
pub mod boundary;
pub mod cli;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod ir;
pub mod microarch;
pub mod network;
pub mod problem;
pub mod process;
pub mod pu;
pub mod time;
pub mod value;

/// A processing unit's identifying tag, as named in the microarchitecture
/// declaration and threaded through every process step that belongs to it.
pub type PuTag = String;

pub use error::{NittaError, NittaResult};
pub use network::BusNetwork;
