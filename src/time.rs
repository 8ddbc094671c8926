/*!
Time algebra: a tagged clock value and closed intervals over it.

`TaggedTime` carries an integer clock together with an optional branch
tag so that (future) divergent control-flow paths can be told apart;
arithmetic between two differently-tagged times is a contract violation
and panics rather than silently picking a side, matching §4.A.

`Interval` is a closed `[inf, sup]` range used both for time constraints
(available-start / duration) and for committed decisions.
*/

use std::fmt;

/// The "no upper limit" sentinel: `bounded_max()` for whichever integer
/// representation is in use.
pub const BOUNDED_MAX: i64 = i64::MAX;

/// An optional branch identifier. `None` means "not yet forked".
pub type BranchTag = Option<u32>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaggedTime {
    pub tag: BranchTag,
    pub clock: i64,
}

impl TaggedTime {
    pub fn new(clock: i64) -> Self {
        Self { tag: None, clock }
    }

    pub fn tagged(tag: u32, clock: i64) -> Self {
        Self {
            tag: Some(tag),
            clock,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(BOUNDED_MAX)
    }

    fn combine_tag(self, other: TaggedTime) -> BranchTag {
        match (self.tag, other.tag) {
            (None, t) => t,
            (t, None) => t,
            (Some(a), Some(b)) if a == b => Some(a),
            _ => panic!(
                "TaggedTime arithmetic between mismatched branch tags ({:?} vs {:?})",
                self.tag, other.tag
            ),
        }
    }

    pub fn checked_add(self, delta: i64) -> TaggedTime {
        TaggedTime {
            tag: self.tag,
            clock: self.clock.saturating_add(delta),
        }
    }

    pub fn combine_add(self, other: TaggedTime) -> TaggedTime {
        let tag = self.combine_tag(other);
        TaggedTime {
            tag,
            clock: self.clock.saturating_add(other.clock),
        }
    }
}

impl fmt::Display for TaggedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(t) => write!(f, "{}@{}", self.clock, t),
            None => write!(f, "{}", self.clock),
        }
    }
}

/// A closed interval `[inf, sup]` over plain integers (used for
/// durations, where a branch tag has no meaning).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IntInterval {
    inf: i64,
    sup: i64,
}

impl IntInterval {
    pub fn new(inf: i64, sup: i64) -> Self {
        assert!(inf <= sup, "interval inf {inf} > sup {sup}");
        Self { inf, sup }
    }

    pub fn singleton(v: i64) -> Self {
        Self::new(v, v)
    }

    pub fn inf(&self) -> i64 {
        self.inf
    }

    pub fn sup(&self) -> i64 {
        self.sup
    }

    pub fn width(&self) -> i64 {
        self.sup - self.inf + 1
    }

    pub fn contains(&self, v: i64) -> bool {
        v >= self.inf && v <= self.sup
    }
}

/// A closed interval `[inf, sup]` of `TaggedTime` ticks — a committed
/// placement in the schedule, or the `available` side of a time
/// constraint.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeInterval {
    inf: TaggedTime,
    sup: TaggedTime,
}

impl TimeInterval {
    pub fn new(inf: TaggedTime, sup: TaggedTime) -> Self {
        assert!(inf.clock <= sup.clock, "time interval inf > sup");
        Self { inf, sup }
    }

    pub fn singleton(t: TaggedTime) -> Self {
        Self::new(t, t)
    }

    pub fn inf(&self) -> TaggedTime {
        self.inf
    }

    pub fn sup(&self) -> TaggedTime {
        self.sup
    }

    pub fn width(&self) -> i64 {
        self.sup.clock - self.inf.clock + 1
    }

    pub fn contains(&self, t: TaggedTime) -> bool {
        t.clock >= self.inf.clock && t.clock <= self.sup.clock
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.inf, self.sup)
    }
}

/// `{available: [a,b], duration: [d_min,d_max]}` as specified in §4.A. A
/// decision satisfies the constraint iff `start >= a`, `start+dur-1 <=
/// b`, and `d_min <= dur <= d_max`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeConstraint {
    pub available: TimeInterval,
    pub duration: IntInterval,
}

impl TimeConstraint {
    pub fn new(available: TimeInterval, duration: IntInterval) -> Self {
        Self {
            available,
            duration,
        }
    }

    /// A constraint admitting a single start tick and a single duration
    /// — used when a PU offers an exact slot rather than a range.
    pub fn exact(start: TaggedTime, duration: i64) -> Self {
        Self {
            available: TimeInterval::singleton(start),
            duration: IntInterval::singleton(duration),
        }
    }

    pub fn admits(&self, decision: &TimeInterval) -> bool {
        let start = decision.inf();
        let end = decision.sup();
        if start.tag != self.available.inf().tag && start.tag.is_some() && self.available.inf().tag.is_some()
        {
            return false;
        }
        let dur = decision.width();
        start.clock >= self.available.inf().clock
            && end.clock <= self.available.sup().clock
            && self.duration.contains(dur)
    }

    /// Earliest tick at which this constraint could start, given a
    /// lower bound imposed by the caller (e.g. `network.next_tick`).
    pub fn earliest_start(&self, lower_bound: TaggedTime) -> TaggedTime {
        TaggedTime {
            tag: self.available.inf().tag.or(lower_bound.tag),
            clock: self.available.inf().clock.max(lower_bound.clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn interval_width_is_inclusive() {
        let iv = IntInterval::new(3, 5);
        assert_eq!(iv.width(), 3);
    }

    #[test]
    fn admits_checks_all_three_bounds() {
        let tc = TimeConstraint::new(
            TimeInterval::new(TaggedTime::new(0), TaggedTime::new(10)),
            IntInterval::new(1, 3),
        );
        let ok = TimeInterval::new(TaggedTime::new(2), TaggedTime::new(3));
        assert!(tc.admits(&ok));

        let too_long = TimeInterval::new(TaggedTime::new(2), TaggedTime::new(9));
        assert!(!tc.admits(&too_long));

        let before_start = TimeInterval::new(TaggedTime::new(-1), TaggedTime::new(0));
        assert!(!tc.admits(&before_start));
    }

    #[test]
    #[should_panic]
    fn mismatched_tags_panic_on_add() {
        let a = TaggedTime::tagged(1, 5);
        let b = TaggedTime::tagged(2, 5);
        let _ = a.combine_add(b);
    }

    #[test]
    fn unbounded_available_is_sup() {
        let t = TaggedTime::unbounded();
        assert_eq!(t.clock, BOUNDED_MAX);
    }

    proptest::proptest! {
        /// A non-negative delta never moves a clock backwards — the
        /// primitive `next_tick` monotonicity (§8 property 3) is built
        /// from.
        #[test]
        fn checked_add_is_monotone(clock in 0i64..1_000_000, delta in 0i64..1_000_000) {
            let t = TaggedTime::new(clock);
            let advanced = t.checked_add(delta);
            prop_assert!(advanced.clock >= t.clock);
        }

        /// Matching tags combine without panicking and the result
        /// carries the shared tag forward (§4.A).
        #[test]
        fn combine_add_keeps_matching_tag(tag in 0u32..8, a in 0i64..10_000, b in 0i64..10_000) {
            let x = TaggedTime::tagged(tag, a);
            let y = TaggedTime::tagged(tag, b);
            let sum = x.combine_add(y);
            prop_assert_eq!(sum.tag, Some(tag));
            prop_assert_eq!(sum.clock, a + b);
        }
    }
}
