//! Join-semilattice values attached to CFG edges.

/// A dataflow fact attached to a CFG edge, drawn from a join semilattice.
///
/// `join` must be commutative, associative, and idempotent. Analyses
/// designate an absorbing top element (joining top with anything yields
/// top). Termination of the solver requires the lattice to have finite
/// height in practice; unbounded lattices are the analysis author's
/// responsibility.
pub trait Assumption: Clone + PartialEq + std::fmt::Debug {
    /// The lattice bottom: the value of every interior edge before the
    /// solver has learned anything, and the join over an empty edge set.
    fn bottom() -> Self;

    /// The least upper bound of two values.
    fn join(&self, other: &Self) -> Self;
}

/// Joins an iterator of values, starting from bottom.
pub fn join_all<'a, V: Assumption + 'a>(values: impl Iterator<Item = &'a V>) -> V {
    values.fold(V::bottom(), |acc, v| acc.join(v))
}
