/*!
Endpoint roles, options and decisions (§3): the vocabulary every PU and
the bus network use to describe "a moment at which a PU either accepts
a variable from the bus (Target) or publishes one or more variables on
the bus (Source)".
*/

use crate::ir::VarId;
use crate::time::{TimeConstraint, TimeInterval};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum EndpointRole {
    Target(VarId),
    Source(Vec<VarId>),
}

impl EndpointRole {
    pub fn variables(&self) -> Vec<VarId> {
        match self {
            EndpointRole::Target(v) => vec![v.clone()],
            EndpointRole::Source(vs) => vs.clone(),
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Target(v) => write!(f, "Target({v})"),
            EndpointRole::Source(vs) => {
                write!(f, "Source({})", vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
            }
        }
    }
}

/// An admissible move: a role paired with the time constraint under
/// which a PU would accept it.
#[derive(Clone, Debug)]
pub struct EndpointOption {
    pub role: EndpointRole,
    pub time: TimeConstraint,
}

/// A committed move: a role paired with the concrete interval it was
/// scheduled into.
#[derive(Clone, Debug)]
pub struct EndpointDecision {
    pub role: EndpointRole,
    pub at: TimeInterval,
}

impl EndpointOption {
    pub fn admits(&self, decision: &EndpointDecision) -> bool {
        self.role == decision.role && self.time.admits(&decision.at)
    }
}
