//! Public entry points
//!
//! Thin validation wrappers over the counting engine. All inputs and
//! outputs are in-memory values; the crate ships no CLI and keeps no
//! persisted state.
//!
//! - [`count`] — exact lattice-point count of a non-parametric polyhedron;
//!   an unbounded input yields the sentinel `-1`.
//! - [`enumerate`] — piecewise quasi-polynomial counting function of a
//!   parametric polytope over a parameter context.
//! - [`series`] — multivariate rational generating function of the same
//!   counting function.
//! - [`enumerate_exists`] — counting under existential quantification of a
//!   variable block.

use num::One;

use crate::evalue::EValue;
use crate::genfun::GenFun;
use crate::options::Options;
use crate::polyhedron::Polyhedron;
use crate::{counter, exist, CoreError, Int};

/// Number of integer points of `poly`, or `-1` if it is unbounded.
pub fn count(poly: &Polyhedron, opts: &Options) -> Result<Int, CoreError> {
    match counter::count(poly, opts) {
        Ok(n) => Ok(n),
        Err(CoreError::Unbounded) => Ok(-Int::one()),
        Err(e) => Err(e),
    }
}

/// Piecewise quasi-polynomial equal to `|P(p) ∩ Z^d|` for every integer
/// `p ∈ context`. `poly` lives in the combined space, counted variables
/// first; the parameter count is `context.dim()`.
pub fn enumerate(
    poly: &Polyhedron,
    context: &Polyhedron,
    opts: &Options,
) -> Result<EValue, CoreError> {
    let nparam = context.dim();
    if nparam > poly.dim() {
        return Err(CoreError::InvalidInput(format!(
            "context dimension {} exceeds polyhedron dimension {}",
            nparam,
            poly.dim()
        )));
    }
    counter::enumerate(poly, poly.dim() - nparam, context, opts)
}

/// Multivariate rational generating function `Σ_p |P(p) ∩ Z^d| x^p` over
/// `nparam` parameters (the trailing coordinates of `poly`).
pub fn series(
    poly: &Polyhedron,
    nparam: usize,
    opts: &Options,
) -> Result<GenFun, CoreError> {
    if nparam > poly.dim() {
        return Err(CoreError::InvalidInput(format!(
            "parameter count {} exceeds polyhedron dimension {}",
            nparam,
            poly.dim()
        )));
    }
    counter::series(poly, poly.dim() - nparam, opts)
}

/// Count `{x : ∃ e ∈ Z^{n_exist}, (x, e, p) ∈ P}` as a quasi-polynomial in
/// the trailing `n_param` parameters.
pub fn enumerate_exists(
    poly: &Polyhedron,
    n_exist: usize,
    n_param: usize,
    opts: &Options,
) -> Result<EValue, CoreError> {
    if n_exist + n_param > poly.dim() {
        return Err(CoreError::InvalidInput(format!(
            "existential + parameter count {} exceeds polyhedron dimension {}",
            n_exist + n_param,
            poly.dim()
        )));
    }
    exist::enumerate_exists(poly, n_exist, n_param, opts)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedron::Constraint;
    use crate::Rat;

    fn int(v: i64) -> Int {
        Int::from(v)
    }

    fn ints(v: &[i64]) -> Vec<Int> {
        v.iter().map(|&x| int(x)).collect()
    }

    fn poly(dim: usize, rows: &[(&[i64], i64)]) -> Polyhedron {
        Polyhedron::from_constraints(
            dim,
            rows.iter()
                .map(|(c, cst)| Constraint::ineq(ints(c), int(*cst)))
                .collect(),
        )
        .unwrap()
    }

    /// Route decomposition/chamber traces to the test output when
    /// `RUST_LOG` asks for them.
    fn trace_init() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn unbounded_count_is_minus_one() {
        let p = poly(2, &[(&[1, 0], 0), (&[0, 1], 0)]);
        assert_eq!(count(&p, &Options::default()).unwrap(), int(-1));
    }

    #[test]
    fn empty_count_is_zero() {
        let p = poly(1, &[(&[1], 0), (&[-1], -2)]);
        assert_eq!(count(&p, &Options::default()).unwrap(), Int::from(0));
    }

    #[test]
    fn square_scenario() {
        trace_init();
        // S_n = {0 ≤ x, y ≤ n}: n² + 2n + 1 on n ≥ 0.
        let combined = poly(
            3,
            &[
                (&[1, 0, 0], 0),
                (&[-1, 0, 1], 0),
                (&[0, 1, 0], 0),
                (&[0, -1, 1], 0),
            ],
        );
        let ctx = poly(1, &[(&[1], 0)]);
        let e = enumerate(&combined, &ctx, &Options::default()).unwrap();
        for n in 0..10i64 {
            assert_eq!(
                e.eval(&[int(n)]),
                Rat::from_integer(int(n * n + 2 * n + 1)),
                "n = {n}"
            );
        }
    }

    #[test]
    fn triangle_scenario() {
        // T_n = {0 ≤ x ≤ y ≤ n}: ½n² + 3/2·n + 1 on n ≥ 0.
        let combined = poly(3, &[(&[1, 0, 0], 0), (&[-1, 1, 0], 0), (&[0, -1, 1], 0)]);
        let ctx = poly(1, &[(&[1], 0)]);
        let e = enumerate(&combined, &ctx, &Options::default()).unwrap();
        for n in 0..10i64 {
            assert_eq!(
                e.eval(&[int(n)]),
                Rat::from_integer(int((n * n + 3 * n + 2) / 2)),
                "n = {n}"
            );
        }
    }

    #[test]
    fn enumeration_agrees_with_specialized_count_everywhere() {
        // min(p, q) + 1 over two parameters: exercises chamber refinement.
        let combined = poly(
            3,
            &[(&[1, 0, 0], 0), (&[-1, 1, 0], 0), (&[-1, 0, 1], 0)],
        );
        let ctx = poly(2, &[(&[1, 0], 0), (&[0, 1], 0)]);
        let opts = Options::default();
        let e = enumerate(&combined, &ctx, &opts).unwrap();
        for p in 0..6i64 {
            for q in 0..6i64 {
                let specialized = poly(1, &[(&[1], 0), (&[-1], p), (&[-1], q)]);
                let direct = count(&specialized, &opts).unwrap();
                assert_eq!(
                    e.eval(&[int(p), int(q)]),
                    Rat::from_integer(direct.clone()),
                    "p = {p}, q = {q}"
                );
                assert_eq!(direct, int(p.min(q) + 1));
            }
        }
    }

    #[test]
    fn series_agrees_with_enumeration() {
        // {0 ≤ x ≤ y ≤ p}: series coefficients equal the enumeration.
        let combined = poly(3, &[(&[1, 0, 0], 0), (&[-1, 1, 0], 0), (&[0, -1, 1], 0)]);
        let ctx = poly(1, &[(&[1], 0)]);
        let opts = Options::default();
        let gf = series(&combined, 1, &opts).unwrap();
        let e = enumerate(&combined, &ctx, &opts).unwrap();
        for p in 0..6i64 {
            assert_eq!(
                gf.coefficient(&ints(&[p]), &opts).unwrap(),
                e.eval(&[int(p)]),
                "p = {p}"
            );
        }
    }

    #[test]
    fn dimension_validation() {
        let p = poly(1, &[(&[1], 0)]);
        let ctx = poly(2, &[]);
        assert!(matches!(
            enumerate(&p, &ctx, &Options::default()),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            series(&p, 2, &Options::default()),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            enumerate_exists(&p, 1, 1, &Options::default()),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
