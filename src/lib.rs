//! Crate root: public surface, core aliases, and crate-wide invariants
//!
//! This crate counts integer points in parameterized rational polytopes by
//! Barvinok's signed decomposition of vertex cones into unimodular cones and
//! specialization of the resulting rational generating functions. Given a
//! polytope `P ⊂ Q^d` whose description may depend on integer parameters
//! `p ∈ Z^m`, it produces an exact [`Int`] (`m = 0`), a piecewise
//! quasi-polynomial [`EValue`] equal to `|P(p) ∩ Z^d|` on a parameter
//! context, or a multivariate rational generating function [`GenFun`], and
//! supports counting under existential quantification of a variable subset.
//!
//! ## Invariants
//!
//! - **Exact arithmetic.** Every computation is carried out over `Z` or `Q`
//!   ([`Int`], [`Rat`]); there is no floating point anywhere in the crate and
//!   we **forbid unsafe** throughout.
//!
//! - **Value semantics.** Polyhedra, cones, series, quasi-polynomials and
//!   generating functions are plain owned values; cloning is deep. The
//!   polyhedral layer is the only allocator of derived polyhedra and every
//!   borrowed polyhedron is scoped to a single operation.
//!
//! - **Single-threaded core.** No operation suspends and there are no
//!   background workers. Long-running recursions (cone decomposition,
//!   existential elimination) poll a cooperative [`CancelFlag`] and unwind
//!   with [`CoreError::Cancelled`] when it is raised.
//!
//! - **Reproducibility.** The only randomness is the generic-vector search in
//!   the counter; its RNG is owned by the running operation and seeded from
//!   [`Options::seed`], never a process global.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Exact integer and matrix kernel (gcd/lcm, determinant, inverse, HNF, LLL).
pub mod arith;
/// Rational polyhedra: dual description, cones, chambers, gateway surface.
pub mod polyhedron;
/// Signed decomposition of simplicial cones into unimodular cones.
pub mod cone;
/// Truncated power-series engine (`DPoly`, `DPolyR`).
pub mod series;
/// Piecewise quasi-polynomial values and their algebra.
pub mod evalue;
/// Lattice-point representatives of parametric vertices.
pub mod lattice_point;
/// Scalar counting and parametric enumeration over vertex cones.
pub mod counter;
/// Todd-expansion local counter (alternative scalar evaluator).
pub mod todd;
/// Multivariate rational generating functions with canonical denominators.
pub mod genfun;
/// Existential elimination by case-rule recursion.
pub mod exist;
/// Run-time options, statistics and cooperative cancellation.
pub mod options;
/// Public entry points: `count`, `enumerate`, `series`, `enumerate_exists`.
pub mod api;

// ============================================================================
// Canonical aliases and root-level re-exports
// ============================================================================

/// Arbitrary-precision signed integer used across the crate.
pub type Int = num::BigInt;

/// Arbitrary-precision rational used across the crate.
pub type Rat = num::BigRational;

pub use crate::api::{count, enumerate, enumerate_exists, series};
pub use crate::evalue::EValue;
pub use crate::genfun::GenFun;
pub use crate::options::{CancelFlag, CountStrategy, Options, Stats};
pub use crate::polyhedron::Polyhedron;

// ============================================================================
// Shared error categories
// ============================================================================

/// Errors surfaced at the public API boundary.
///
/// `count` maps [`CoreError::Unbounded`] to the sentinel value `-1`; every
/// other entry point propagates it. A set cancellation flag unwinds the
/// current call with [`CoreError::Cancelled`]; all intermediate polyhedra are
/// plain values, so unwinding releases them on every exit path.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Non-integer data, non-square cone matrix, zero-determinant cone.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// `count`/`enumerate` on a polyhedron with a ray.
    #[error("polyhedron is unbounded")]
    Unbounded,
    /// The bounded random search for a generic vector failed.
    #[error("no non-orthogonal lambda found after {tries} draws")]
    LambdaSearchFailed {
        /// Total draws spent before giving up.
        tries: u32,
    },
    /// The cooperative cancellation flag was raised.
    #[error("operation cancelled")]
    Cancelled,
    /// Failure inside the polyhedral layer, propagated unchanged.
    #[error("polyhedral gateway: {0}")]
    Gateway(#[from] crate::polyhedron::PolyError),
    /// Failure inside the arithmetic kernel, propagated unchanged.
    #[error("arithmetic kernel: {0}")]
    Arith(#[from] crate::arith::ArithError),
}
