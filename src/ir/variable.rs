/*!
`VarId` — an opaque variable identifier carrying ordering and a
printable representation (§3: "an opaque identifier carrying ordering
and printable representation").

Variables are cheap to clone (an `Rc<str>` under the hood) since the
same identifier is threaded through functions, endpoint roles, process
steps and diffs across every model-state snapshot in the synthesis
tree.
*/

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Eq)]
pub struct VarId(Rc<str>);

impl VarId {
    pub fn new(name: impl Into<String>) -> Self {
        VarId(Rc::from(name.into().into_boxed_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a fresh variable by appending a suffix, used by
    /// resolve-deadlock and break-loop to mint renamed copies.
    pub fn suffixed(&self, suffix: &str) -> VarId {
        VarId::new(format!("{}{}", self.0, suffix))
    }
}

impl PartialEq for VarId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl std::hash::Hash for VarId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_ref().hash(state);
    }
}

impl PartialOrd for VarId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VarId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VarId {
    fn from(s: &str) -> Self {
        VarId::new(s)
    }
}

impl From<String> for VarId {
    fn from(s: String) -> Self {
        VarId::new(s)
    }
}
