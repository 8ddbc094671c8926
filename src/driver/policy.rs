/*!
Search policies (§4.G). All three must yield the same completed
schedule when a unique completion exists — they differ only in how
eagerly they narrow the option set before falling back to the scored
top pick.
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPolicy {
    /// Always take the single top-scoring option.
    GreedyBestFirst,
    /// Take only bindings with `alternative_count == 1` until none
    /// remain, then behave like greedy best-first.
    ObviousBinding,
    /// Expand the top `k` options per node to depth `d`, then greedy
    /// below that depth.
    BoundedAllThreads { width: usize, depth: u32 },
}

impl Default for SearchPolicy {
    fn default() -> Self {
        SearchPolicy::GreedyBestFirst
    }
}
