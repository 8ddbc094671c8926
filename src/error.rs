/*!
Error kinds for the synthesis engine, per §7. Recoverable kinds
(bind-rejection, deadlock-detected) are handled by the search driver
internally — it tries another option — and normally never escape to a
caller; the rest are fatal and bubble up with the offending state
attached by the caller.
*/

use crate::ir::VarId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NittaError {
    /// No PU could host a function; `reasons` concatenates every PU's
    /// rejection reason in enumeration order.
    #[error("no PU accepts function {function}: {reasons}")]
    BindRejection { function: String, reasons: String },

    /// A decision's start precedes the record's `next_tick`. Always a
    /// synthesis-engine bug, never a user-facing condition.
    #[error("time-wrap: decision start {start} precedes next_tick {next_tick}")]
    TimeWrap { start: i64, next_tick: i64 },

    /// A decision does not lie within any option the PU currently
    /// offers.
    #[error("option-violation: decision does not match any offered option on {pu}")]
    OptionViolation { pu: String },

    /// No options remain while functions are unbound or variables are
    /// untransferred, and no refactor can resolve it.
    #[error("deadlock detected: {unbound} unbound function(s), {untransferred} variable(s) untransferred")]
    DeadlockDetected {
        unbound: usize,
        untransferred: usize,
    },

    /// The functional simulator could not produce a value for a
    /// variable (e.g. `receive` on an empty channel with drop disabled).
    #[error("simulation failed for variable {var:?} at cycle {cycle}: {reason}")]
    SimulationFailure {
        var: VarId,
        cycle: usize,
        reason: String,
    },

    /// A refactor would exceed the configured buffer-repetition bound;
    /// the option is withheld rather than offered.
    #[error("repetition limit exceeded for refactor at {site}: {count} >= {limit}")]
    RepetitionLimit {
        site: String,
        count: usize,
        limit: usize,
    },

    /// Two PUs drove the same control-bus bit to conflicting values at
    /// the same tick — a contract violation per §4.D, reported rather
    /// than silently resolved.
    #[error("microcode conflict on bit {bit} at tick {tick}: {a} != {b}")]
    MicrocodeConflict {
        tick: i64,
        bit: usize,
        a: bool,
        b: bool,
    },

    #[error("{0}")]
    Other(String),
}

pub type NittaResult<T> = Result<T, NittaError>;
