/*!
microarch — the microarchitecture declaration (§6, ambient): a
`serde`-deserializable document naming every sub-PU, its tag and
parameters, the bus width, and the IO synchronization mode. The CLI
reads this from TOML and turns it into the `Pu` set a `BusNetwork` is
constructed from.
*/

use crate::network::BusNetwork;
use crate::pu::{AccumulatorKind, DividerPu, FramPu, IoSync, MultiplierKind, Pu, SerialPu, ShiftKind, SpiPu};
use crate::PuTag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One sub-PU's kind and parameters (§4.D concrete PUs). Field names
/// match the PU constructors so a declaration reads like the call it
/// produces.
///
/// `ports` is the port-to-signal map (§4.D, §6 "port-to-signal mapping
/// on the shared control bus"): signal name to bit offset on the
/// network's control bus. Omitted entries keep the PU's built-in
/// default offsets; declare it to separate co-declared PUs of
/// different kinds that would otherwise claim the same bit (e.g. two
/// `SerialPu` instances both defaulting to bits 1/2).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PuSpec {
    Fram {
        size: usize,
        #[serde(default)]
        ports: HashMap<String, u32>,
    },
    Accumulator {
        #[serde(default)]
        ports: HashMap<String, u32>,
    },
    Multiplier {
        #[serde(default)]
        ports: HashMap<String, u32>,
    },
    Divider {
        pipeline_depth: i64,
        latency: i64,
        #[serde(default)]
        ports: HashMap<String, u32>,
    },
    Shift {
        #[serde(default)]
        ports: HashMap<String, u32>,
    },
    Spi {
        sync: IoSync,
        #[serde(default)]
        ports: HashMap<String, u32>,
    },
}

impl PuSpec {
    fn build(&self, tag: &PuTag) -> Pu {
        match self {
            PuSpec::Fram { size, ports } => Pu::Fram(FramPu::new(tag.clone(), *size).with_ports(ports.clone())),
            PuSpec::Accumulator { ports } => {
                Pu::Accumulator(SerialPu::<AccumulatorKind>::new(tag.clone()).with_ports(ports.clone()))
            }
            PuSpec::Multiplier { ports } => {
                Pu::Multiplier(SerialPu::<MultiplierKind>::new(tag.clone()).with_ports(ports.clone()))
            }
            PuSpec::Divider { pipeline_depth, latency, ports } => {
                Pu::Divider(DividerPu::new(tag.clone(), *pipeline_depth, *latency).with_ports(ports.clone()))
            }
            PuSpec::Shift { ports } => Pu::Shift(SerialPu::<ShiftKind>::new(tag.clone()).with_ports(ports.clone())),
            PuSpec::Spi { sync, ports } => Pu::Spi(SpiPu::new(tag.clone(), *sync).with_ports(ports.clone())),
        }
    }
}

/// The full declaration (§6 "Microarchitecture input"): sub-PUs keyed
/// by tag, the shared control bus width in bits, and the network-wide
/// IO synchronization mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MicroarchSpec {
    pub pus: HashMap<PuTag, PuSpec>,
    pub bus_width: usize,
    pub io_sync: IoSync,
}

impl MicroarchSpec {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Instantiate the declared PUs and build the empty `BusNetwork`
    /// they populate; `load_algorithm` is the caller's next step.
    pub fn build_network(&self, tag: impl Into<PuTag>) -> BusNetwork {
        let pus: HashMap<PuTag, Pu> = self.pus.iter().map(|(t, spec)| (t.clone(), spec.build(t))).collect();
        BusNetwork::new(tag, pus, self.bus_width, self.io_sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_declaration() {
        let toml = r#"
            bus_width = 8
            io_sync = "sync"

            [pus.fram1]
            kind = "fram"
            size = 16

            [pus.acc1]
            kind = "accumulator"

            [pus.div1]
            kind = "divider"
            pipeline_depth = 2
            latency = 1
        "#;
        let spec = MicroarchSpec::from_toml(toml).unwrap();
        assert_eq!(spec.bus_width, 8);
        assert_eq!(spec.pus.len(), 3);
        assert!(matches!(spec.io_sync, IoSync::Sync));
    }

    #[test]
    fn builds_a_network_with_every_declared_pu() {
        let toml = r#"
            bus_width = 4
            io_sync = "async"

            [pus.fram1]
            kind = "fram"
            size = 4
        "#;
        let spec = MicroarchSpec::from_toml(toml).unwrap();
        let network = spec.build_network("net");
        assert!(network.pus().contains_key("fram1"));
    }
}
